//! Postgres Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, BytesMut};

use super::{Oid, PgFormat};
use crate::{
    encode::Param,
    ext::{BufMutExt, StrExt, UsizeExt},
};

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "Frontend message body size not equal to size hint"
    );
}

/// A type which can be encoded into postgres frontend message
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is **only** the size of main body as oppose of actual postgres message which
    /// include the length itself.
    fn size_hint(&self) -> u32;

    /// Write the main body of the message.
    ///
    /// The lenght of body written must be equal to the
    /// length returned by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// Protocol version 3.0
const PROTOCOL_VERSION: u32 = 196_608;

/// Postgres Startup frontend message
///
/// For historical reasons, the very first message sent by the client (the [`Startup`] message)
/// has no initial message-type byte, thus [`Startup`] does not implement [`FrontendProtocol`].
///
/// To write startup message, use [`Startup::write`].
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
    /// Value reported back in `pg_stat_activity.application_name`.
    pub application_name: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // length including self, written last
        buf.put_u32(0);
        buf.put_u32(PROTOCOL_VERSION);

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(db) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(db);
        }

        if let Some(name) = self.application_name {
            buf.put_nul_string("application_name");
            buf.put_nul_string(name);
        }

        buf.put_nul_string("client_encoding");
        buf.put_nul_string("UTF8");

        // terminator after the last name/value pair
        buf.put_u8(b'\0');

        let mut written_buf = &mut buf[offset..];
        written_buf.put_u32(written_buf.len().to_u32());
    }
}

/// Identifies the message as a password response.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested)
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.password.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.password);
    }
}

/// Identifies the message as an initial SASL response.
///
/// Shares the `p` message type with [`PasswordMessage`].
#[derive(Debug)]
pub struct SASLInitialResponse<'a> {
    /// Name of the SASL authentication mechanism that the client selected.
    pub mechanism: &'a str,
    /// SASL mechanism specific "Initial Response".
    pub data: &'a [u8],
}

impl FrontendProtocol for SASLInitialResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.mechanism.nul_string_len() + 4 + self.data.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.mechanism);
        buf.put_i32(self.data.len().to_u32() as i32);
        buf.put_slice(self.data);
    }
}

/// Identifies the message as a SASL response.
#[derive(Debug)]
pub struct SASLResponse<'a> {
    /// SASL mechanism specific message data.
    pub data: &'a [u8],
}

impl FrontendProtocol for SASLResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.data.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_slice(self.data);
    }
}

/// Identifies the message as a Parse command
#[derive(Debug)]
pub struct Parse<'a> {
    /// prepared statement name (an empty string selects the unnamed prepared statement).
    pub prepare_name: &'a str,
    /// The query string to be parsed.
    pub sql: &'a str,
    /// The object ID of each parameter data type.
    ///
    /// Placing a zero here is equivalent to leaving the type unspecified.
    pub params: &'a [Param],
}

impl FrontendProtocol for Parse<'_> {
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> u32 {
        self.prepare_name.nul_string_len()
            + self.sql.nul_string_len()
            + 2
            + self.params.len().to_u32() * size_of::<Oid>().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.prepare_name);
        buf.put_nul_string(self.sql);
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            buf.put_u32(param.oid());
        }
    }
}

/// Identifies the message as a Bind command.
///
/// Every parameter and every result column uses the [`Text`][PgFormat::Text] format.
#[derive(Debug)]
pub struct Bind<'a> {
    /// The name of the destination portal (an empty string selects the unnamed portal).
    pub portal_name: &'a str,
    /// The name of the source prepared statement (an empty string selects the unnamed prepared statement).
    pub stmt_name: &'a str,
    /// Parameter values, `None` is sent as NULL.
    pub params: &'a [Param],
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> u32 {
        let params = self
            .params
            .iter()
            .map(|e| 4 + e.value().map(str::len).unwrap_or_default().to_u32())
            .sum::<u32>();

        self.portal_name.nul_string_len()
            + self.stmt_name.nul_string_len()
            // one parameter format code
            + 2 + 2
            + 2 + params
            // one result format code
            + 2 + 2
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_nul_string(self.stmt_name);

        // a single format code applies to all parameters
        buf.put_u16(1);
        buf.put_u16(PgFormat::Text.format_code());

        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            match param.value() {
                Some(value) => {
                    buf.put_i32(value.len().to_u32() as i32);
                    buf.put_slice(value.as_bytes());
                }
                // -1 for NULL, no value bytes follow
                None => buf.put_i32(-1),
            }
        }

        buf.put_u16(1);
        buf.put_u16(PgFormat::Text.format_code());
    }
}

/// Identifies the message as a Describe command.
#[derive(Debug)]
pub struct Describe<'a> {
    /// 'S' to describe a prepared statement; or 'P' to describe a portal.
    pub kind: u8,
    /// The name of the prepared statement or portal to describe
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> u32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// Identifies the message as a Execute command
#[derive(Debug)]
pub struct Execute<'a> {
    /// The name of the portal to execute (an empty string selects the unnamed portal).
    pub portal_name: &'a str,
    /// Maximum number of rows to return, if portal contains a query that returns rows
    /// (ignored otherwise). Zero denotes “no limit”.
    pub max_row: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> u32 {
        self.portal_name.nul_string_len() + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_u32(self.max_row);
    }
}

macro_rules! empty_msg {
    ($($(#[$doc:meta])* struct $name:ident, $ty:literal;)*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        impl FrontendProtocol for $name {
            const MSGTYPE: u8 = $ty;

            fn size_hint(&self) -> u32 { 0 }

            fn encode(self, _: impl BufMut) { }
        }
    )*};
}

empty_msg! {
    /// Identifies the message as a Sync command
    struct Sync, b'S';

    /// Identifies the message as a Flush command.
    struct Flush, b'H';

    /// Identifies the message as a termination.
    struct Terminate, b'X';
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Encode;

    #[test]
    fn startup() {
        let mut buf = BytesMut::new();
        Startup { user: "u", database: Some("d"), application_name: None }.write(&mut buf);
        let expected = b"\0\0\0\x30\0\x03\0\0user\0u\0database\0d\0client_encoding\0UTF8\0\0";
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn empty_messages() {
        let mut buf = BytesMut::new();
        write(Flush, &mut buf);
        write(Sync, &mut buf);
        write(Terminate, &mut buf);
        assert_eq!(&buf[..], b"H\0\0\0\x04S\0\0\0\x04X\0\0\0\x04");
    }

    #[test]
    fn parse() {
        let params = [420i32.encode(), "foo".encode()];
        let mut buf = BytesMut::new();
        write(Parse { prepare_name: "", sql: "SELECT $1", params: &params }, &mut buf);
        assert_eq!(&buf[..], b"P\0\0\0\x19\0SELECT $1\0\0\x02\0\0\0\x17\0\0\0\0");
    }

    #[test]
    fn bind_with_null() {
        let params = [Some(7i16).encode(), None::<i16>.encode()];
        let mut buf = BytesMut::new();
        write(Bind { portal_name: "", stmt_name: "", params: &params }, &mut buf);
        assert_eq!(
            &buf[..],
            b"B\0\0\0\x19\0\0\0\x01\0\0\0\x02\0\0\0\x017\xff\xff\xff\xff\0\x01\0\0"
        );
    }

    #[test]
    fn sasl_initial_response() {
        let mut buf = BytesMut::new();
        write(SASLInitialResponse { mechanism: "M", data: b"abc" }, &mut buf);
        assert_eq!(&buf[..], b"p\0\0\0\x0dM\0\0\0\0\x03abc");
    }
}
