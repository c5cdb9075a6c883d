//! Postgres Backend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{Buf, Bytes};
use std::fmt;

use super::{DecodeError, Oid, PayloadError, frame::Frame};
use crate::ext::BytesExt;

/// A type that can be decoded from a postgres backend message body.
pub trait BackendProtocol: Sized {
    /// Message type.
    const MSGTYPE: u8;

    /// Decode the message body, the type byte and length are already consumed.
    fn decode(body: Bytes) -> Result<Self, PayloadError>;
}

/// Postgres backend messages
#[derive(Debug, Clone)]
pub enum BackendMessage {
    AuthenticationRequest(AuthenticationRequest),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    ErrorResponse(ErrorResponse),
    EmptyQueryResponse(EmptyQueryResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }

            /// Decode a complete frame.
            pub fn decode(frame: Frame) -> Result<Self, DecodeError> {
                let Frame { msgtype, body } = frame;
                match msgtype {
                    $($name::MSGTYPE => match <$name as BackendProtocol>::decode(body) {
                        Ok(ok) => Ok(Self::$name(ok)),
                        Err(reason) => Err(DecodeError::MessageParseFailed {
                            message: stringify!($name),
                            reason,
                        }),
                    },)*
                    _ => Err(DecodeError::UnrecognisedMessageType(msgtype)),
                }
            }
        }
    };
}

match_backend! {
    AuthenticationRequest,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    DataRow,
    ErrorResponse,
    EmptyQueryResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

/// Reject leftover bytes after the last field.
fn finish(body: &Bytes) -> Result<(), PayloadError> {
    match body.remaining() {
        0 => Ok(()),
        n => Err(PayloadError::TrailingBytes(n)),
    }
}

/// Identifies the message as an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationRequest {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that Kerberos V5 authentication is required.
    KerberosV5,
    /// Specifies that a clear-text password is required.
    CleartextPassword,
    /// Specifies that an MD5-encrypted password is required.
    MD5Password {
        /// The salt to use when encrypting the password.
        salt: [u8; 4],
    },
    /// Specifies that GSSAPI authentication is required.
    GSS,
    /// GSSAPI or SSPI authentication data.
    GSSContinue { data: Bytes },
    /// Specifies that SSPI authentication is required.
    SSPI,
    /// Specifies that SASL authentication is required.
    SASL {
        /// Authentication mechanisms, in the server's order of preference.
        mechanisms: Vec<String>,
    },
    /// Specifies that this message contains a SASL challenge.
    SASLContinue { data: Bytes },
    /// Specifies that SASL authentication has completed.
    SASLFinal { data: Bytes },
}

impl AuthenticationRequest {
    /// Human readable method name.
    pub fn method(&self) -> &'static str {
        match self {
            AuthenticationRequest::Ok => "ok",
            AuthenticationRequest::KerberosV5 => "KerberosV5",
            AuthenticationRequest::CleartextPassword => "cleartext password",
            AuthenticationRequest::MD5Password { .. } => "MD5 password",
            AuthenticationRequest::GSS => "GSSAPI",
            AuthenticationRequest::GSSContinue { .. } => "GSSAPI continue",
            AuthenticationRequest::SSPI => "SSPI",
            AuthenticationRequest::SASL { .. } => "SASL",
            AuthenticationRequest::SASLContinue { .. } => "SASL continue",
            AuthenticationRequest::SASLFinal { .. } => "SASL final",
        }
    }
}

impl BackendProtocol for AuthenticationRequest {
    const MSGTYPE: u8 = b'R';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let auth = match body.get_i32_checked()? {
            0 => AuthenticationRequest::Ok,
            2 => AuthenticationRequest::KerberosV5,
            3 => AuthenticationRequest::CleartextPassword,
            5 => {
                let salt = body.get_u32_checked()?.to_be_bytes();
                AuthenticationRequest::MD5Password { salt }
            }
            7 => AuthenticationRequest::GSS,
            8 => return Ok(AuthenticationRequest::GSSContinue { data: body }),
            9 => AuthenticationRequest::SSPI,
            10 => {
                // list of names, terminated by an empty name
                let mut mechanisms = vec![];
                loop {
                    let name = body.get_nul_string()?;
                    if name.is_empty() {
                        break;
                    }
                    mechanisms.push(name);
                }
                AuthenticationRequest::SASL { mechanisms }
            }
            11 => return Ok(AuthenticationRequest::SASLContinue { data: body }),
            12 => return Ok(AuthenticationRequest::SASLFinal { data: body }),
            kind => return Err(PayloadError::Invalid { field: "authentication kind", value: kind.into() }),
        };
        finish(&body)?;
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue CancelRequest messages later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: u32,
    /// The secret key of this backend.
    pub secret_key: u32,
}

impl BackendProtocol for BackendKeyData {
    const MSGTYPE: u8 = b'K';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let key = Self {
            process_id: body.get_u32_checked()?,
            secret_key: body.get_u32_checked()?,
        };
        finish(&body)?;
        Ok(key)
    }
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: String,
    /// The current value of the parameter
    pub value: String,
}

impl BackendProtocol for ParameterStatus {
    const MSGTYPE: u8 = b'S';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let param = Self {
            name: body.get_nul_string()?,
            value: body.get_nul_string()?,
        };
        finish(&body)?;
        Ok(param)
    }
}

/// Current backend transaction status, reported by [`ReadyForQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Not in a transaction block.
    #[default]
    Idle,
    /// In a transaction block.
    InTransaction,
    /// In a failed transaction block, queries will be rejected until block is ended.
    Failed,
}

/// Identifies the message type. ReadyForQuery is sent whenever the backend is ready for a new query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyForQuery {
    pub status: TransactionStatus,
}

impl BackendProtocol for ReadyForQuery {
    const MSGTYPE: u8 = b'Z';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let status = match body.get_u8_checked()? {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            s => return Err(PayloadError::Invalid { field: "transaction status", value: s.into() }),
        };
        finish(&body)?;
        Ok(Self { status })
    }
}

/// Fields of an [`ErrorResponse`] or [`NoticeResponse`].
///
/// The message body consists of one or more identified fields, followed by a zero byte as a terminator.
/// Fields can appear in any order. Fields of unrecognized type are silently ignored.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    /// `ERROR`, `FATAL`, or `PANIC` (in an error message), or `WARNING`, `NOTICE`, `DEBUG`,
    /// `INFO`, or `LOG` (in a notice message). Never localized.
    pub severity: String,
    /// The SQLSTATE code for the error.
    pub code: String,
    /// The primary human-readable error message.
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// Cursor position as an index into the original query string.
    pub position: Option<String>,
    pub internal_position: Option<String>,
    pub internal_query: Option<String>,
    /// Context in which the error occurred.
    pub where_: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub datatype: Option<String>,
    pub constraint: Option<String>,
    pub file: Option<String>,
    pub line: Option<String>,
    pub routine: Option<String>,
}

impl ErrorResponse {
    /// Returns `true` if the backend session is terminating, `FATAL` or `PANIC` severity.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity.as_str(), "FATAL" | "PANIC")
    }

    fn decode_fields(mut body: Bytes) -> Result<Self, PayloadError> {
        let mut me = Self::default();
        let mut localized = None;

        loop {
            let field = body.get_u8_checked()?;
            if field == b'\0' {
                break;
            }
            let value = body.get_nul_string()?;
            match field {
                b'S' => localized = Some(value),
                b'V' => me.severity = value,
                b'C' => me.code = value,
                b'M' => me.message = value,
                b'D' => me.detail = Some(value),
                b'H' => me.hint = Some(value),
                b'P' => me.position = Some(value),
                b'p' => me.internal_position = Some(value),
                b'q' => me.internal_query = Some(value),
                b'W' => me.where_ = Some(value),
                b's' => me.schema = Some(value),
                b't' => me.table = Some(value),
                b'c' => me.column = Some(value),
                b'd' => me.datatype = Some(value),
                b'n' => me.constraint = Some(value),
                b'F' => me.file = Some(value),
                b'L' => me.line = Some(value),
                b'R' => me.routine = Some(value),
                _ => { }
            }
        }
        finish(&body)?;

        // `V` only exists since 9.6
        if me.severity.is_empty() {
            me.severity = localized.ok_or(PayloadError::Missing("severity field"))?;
        }
        if me.code.is_empty() {
            return Err(PayloadError::Missing("code field"));
        }

        Ok(me)
    }
}

impl BackendProtocol for ErrorResponse {
    const MSGTYPE: u8 = b'E';

    fn decode(body: Bytes) -> Result<Self, PayloadError> {
        Self::decode_fields(body)
    }
}

impl std::error::Error for ErrorResponse { }

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (SQLSTATE {})", self.severity, self.message, self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A warning message. The frontend should display the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeResponse(pub ErrorResponse);

impl BackendProtocol for NoticeResponse {
    const MSGTYPE: u8 = b'N';

    fn decode(body: Bytes) -> Result<Self, PayloadError> {
        ErrorResponse::decode_fields(body).map(NoticeResponse)
    }
}

impl fmt::Display for NoticeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifies the message as a notification response, sent by `NOTIFY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

impl BackendProtocol for NotificationResponse {
    const MSGTYPE: u8 = b'A';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let notification = Self {
            process_id: body.get_u32_checked()?,
            channel: body.get_nul_string()?,
            payload: body.get_nul_string()?,
        };
        finish(&body)?;
        Ok(notification)
    }
}

/// Description of a single result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// The field name.
    pub name: String,
    /// If the field can be identified as a column of a specific table,
    /// the object ID of the table; otherwise zero.
    pub table_oid: Oid,
    /// If the field can be identified as a column of a specific table,
    /// the attribute number of the column; otherwise zero.
    pub column_id: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size (see pg_type.typlen).
    /// Note that negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier (see pg_attribute.atttypmod).
    pub type_modifier: i32,
    /// The format code being used for the field.
    pub format_code: i16,
}

/// Identifies the message as a row description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

impl RowDescription {
    /// Column names, in order.
    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|e| e.name.clone()).collect()
    }
}

impl BackendProtocol for RowDescription {
    const MSGTYPE: u8 = b'T';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let len = body.get_i16_checked()?;
        let Ok(len) = usize::try_from(len) else {
            return Err(PayloadError::Invalid { field: "field count", value: len.into() });
        };

        let mut fields = Vec::with_capacity(len);
        for _ in 0..len {
            fields.push(FieldDescription {
                name: body.get_nul_string()?,
                table_oid: body.get_u32_checked()?,
                column_id: body.get_i16_checked()?,
                type_oid: body.get_u32_checked()?,
                type_size: body.get_i16_checked()?,
                type_modifier: body.get_i32_checked()?,
                format_code: body.get_i16_checked()?,
            });
        }
        finish(&body)?;

        Ok(Self { fields })
    }
}

/// Identifies the message as a data row.
///
/// Values are in text format, `None` is SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    pub values: Vec<Option<String>>,
}

impl BackendProtocol for DataRow {
    const MSGTYPE: u8 = b'D';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let len = body.get_i16_checked()?;
        let Ok(len) = usize::try_from(len) else {
            return Err(PayloadError::Invalid { field: "column count", value: len.into() });
        };

        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            // -1 indicates a NULL column value
            let value = match body.get_i32_checked()? {
                -1 => None,
                n if n < -1 => return Err(PayloadError::Invalid { field: "value length", value: n.into() }),
                n => {
                    let bytes = body.get_exact(n as usize)?;
                    match std::str::from_utf8(&bytes) {
                        Ok(s) => Some(s.to_owned()),
                        Err(err) => return Err(PayloadError::Utf8(err)),
                    }
                }
            };
            values.push(value);
        }
        finish(&body)?;

        Ok(Self { values })
    }
}

/// Identifies the message as a command-completed response
///
/// For an INSERT command, the tag is `INSERT oid rows`, for DELETE, UPDATE, MERGE, SELECT,
/// MOVE, FETCH and COPY the tag is the command name followed by the number of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which SQL command was completed.
    pub tag: String,
}

impl CommandComplete {
    /// Number of rows affected by the command, zero if the tag carries no row count.
    pub fn rows_affected(&self) -> u64 {
        let mut whs = self.tag.split_whitespace();
        let Some(tag) = whs.next() else {
            return 0;
        };
        let Some(rows) = whs.next() else {
            return 0;
        };
        match tag {
            "INSERT" => whs.next().unwrap_or_default(),
            "SELECT" | "UPDATE" | "DELETE" | "MERGE" | "FETCH" | "MOVE" | "COPY" => rows,
            _ => return 0,
        }
        .parse()
        .unwrap_or_default()
    }
}

impl BackendProtocol for CommandComplete {
    const MSGTYPE: u8 = b'C';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let tag = body.get_nul_string()?;
        finish(&body)?;
        Ok(Self { tag })
    }
}

/// Identifies the message as a protocol version negotiation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateProtocolVersion {
    /// Newest minor protocol version supported by the server for the major protocol version requested by the client.
    pub minor: u32,
    /// Protocol options not recognized by the server.
    pub options: Vec<String>,
}

impl BackendProtocol for NegotiateProtocolVersion {
    const MSGTYPE: u8 = b'v';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let minor = body.get_u32_checked()?;
        let len = body.get_u32_checked()?;
        let options = (0..len).map(|_| body.get_nul_string()).collect::<Result<_, _>>()?;
        finish(&body)?;
        Ok(Self { minor, options })
    }
}

/// Identifies the message as a parameter description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    /// The object ID of each parameter data type.
    pub oids: Vec<Oid>,
}

impl BackendProtocol for ParameterDescription {
    const MSGTYPE: u8 = b't';

    fn decode(mut body: Bytes) -> Result<Self, PayloadError> {
        let len = body.get_i16_checked()?;
        let Ok(len) = u16::try_from(len) else {
            return Err(PayloadError::Invalid { field: "parameter count", value: len.into() });
        };
        let oids = (0..len).map(|_| body.get_u32_checked()).collect::<Result<_, _>>()?;
        finish(&body)?;
        Ok(Self { oids })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl BackendProtocol for $name {
            const MSGTYPE: u8 = $ty;

            fn decode(body: Bytes) -> Result<Self, PayloadError> {
                finish(&body)?;
                Ok(Self)
            }
        }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was reached.
    struct PortalSuspended, b's';
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn decode(msgtype: u8, body: &[u8]) -> Result<BackendMessage, DecodeError> {
        BackendMessage::decode(Frame { msgtype, body: Bytes::copy_from_slice(body) })
    }

    #[test]
    fn unrecognised_type() {
        let err = decode(b'!', b"").unwrap_err();
        assert_eq!(err, DecodeError::UnrecognisedMessageType(b'!'));
        assert_eq!(err.to_string(), "unrecognised message type `!` (0x21)");
    }

    #[test]
    fn authentication() {
        let msg = decode(b'R', &[0, 0, 0, 5, 1, 2, 3, 4]).unwrap();
        let BackendMessage::AuthenticationRequest(auth) = msg else { panic!() };
        assert_eq!(auth, AuthenticationRequest::MD5Password { salt: [1, 2, 3, 4] });

        let msg = decode(b'R', b"\0\0\0\x0aSCRAM-SHA-256\0\0").unwrap();
        let BackendMessage::AuthenticationRequest(auth) = msg else { panic!() };
        assert_eq!(auth, AuthenticationRequest::SASL { mechanisms: vec!["SCRAM-SHA-256".into()] });
    }

    #[test]
    fn authentication_unknown_kind() {
        let err = decode(b'R', &[0, 0, 0, 42]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MessageParseFailed {
                message: "AuthenticationRequest",
                reason: PayloadError::Invalid { field: "authentication kind", value: 42 },
            }
        );
    }

    #[test]
    fn ready_for_query() {
        let BackendMessage::ReadyForQuery(ready) = decode(b'Z', b"T").unwrap() else { panic!() };
        assert_eq!(ready.status, TransactionStatus::InTransaction);
        assert!(decode(b'Z', b"X").is_err());
        assert!(decode(b'Z', b"").is_err());
    }

    #[test]
    fn error_response() {
        let body = b"SFATAL\0VFATAL\0C57P01\0Mterminating connection due to administrator command\0\0";
        let BackendMessage::ErrorResponse(err) = decode(b'E', body).unwrap() else { panic!() };
        assert_eq!(err.severity, "FATAL");
        assert_eq!(err.code, "57P01");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "FATAL: terminating connection due to administrator command (SQLSTATE 57P01)"
        );
    }

    #[test]
    fn error_response_missing_code() {
        let err = decode(b'E', b"SERROR\0Moops\0\0").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MessageParseFailed { message: "ErrorResponse", reason: PayloadError::Missing(_) }
        ));
    }

    #[test]
    fn row_description() {
        let mut body = BytesMut::new();
        body.put_i16(2);
        for name in ["id", "name"] {
            body.put_slice(name.as_bytes());
            body.put_u8(0);
            body.put_u32(0);
            body.put_i16(0);
            body.put_u32(23);
            body.put_i16(4);
            body.put_i32(-1);
            body.put_i16(0);
        }
        let BackendMessage::RowDescription(rd) = decode(b'T', &body).unwrap() else { panic!() };
        assert_eq!(rd.column_names(), ["id", "name"]);
        assert_eq!(rd.fields[0].type_oid, 23);

        let err = decode(b'T', &body[..body.len() - 1]).unwrap_err();
        assert!(matches!(err, DecodeError::MessageParseFailed { message: "RowDescription", .. }));
    }

    #[test]
    fn data_row() {
        let mut body = BytesMut::new();
        body.put_i16(3);
        body.put_i32(3);
        body.put_slice(b"420");
        body.put_i32(-1);
        body.put_i32(0);
        let BackendMessage::DataRow(row) = decode(b'D', &body).unwrap() else { panic!() };
        assert_eq!(row.values, [Some("420".into()), None, Some(String::new())]);
    }

    #[test]
    fn data_row_value_overrun() {
        let mut body = BytesMut::new();
        body.put_i16(1);
        body.put_i32(10);
        body.put_slice(b"abc");
        let err = decode(b'D', &body).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MessageParseFailed {
                message: "DataRow",
                reason: PayloadError::Truncated { requested: 10, available: 3 },
            }
        );
    }

    #[test]
    fn unit_message_with_body() {
        let err = decode(b'1', b"x").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MessageParseFailed { message: "ParseComplete", reason: PayloadError::TrailingBytes(1) }
        );
    }

    #[test]
    fn command_complete_rows() {
        let cmd = |tag: &str| CommandComplete { tag: tag.into() }.rows_affected();
        assert_eq!(cmd("INSERT 0 14"), 14);
        assert_eq!(cmd("SELECT 3"), 3);
        assert_eq!(cmd("CREATE TABLE"), 0);
        assert_eq!(cmd("BEGIN"), 0);
    }

    #[test]
    fn message_names() {
        assert_eq!(BackendMessage::message_name(b'D'), "DataRow");
        assert_eq!(BackendMessage::message_name(b'R'), "AuthenticationRequest");
        assert_eq!(BackendMessage::message_name(b'?'), "Unknown");
    }
}
