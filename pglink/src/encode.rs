//! Query parameters.
//!
//! Every parameter is transmitted in text format together with the oid of its type,
//! see [`PgFormat`][crate::postgres::PgFormat].
use std::fmt;

use crate::postgres::{Oid, PgType, UNSPECIFIED};

/// Value that can be encoded to be bound to sql parameter.
pub trait Encode {
    fn encode(self) -> Param;
}

/// Postgres encoded parameter, text representation and type oid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    value: Option<String>,
    oid: Oid,
}

impl Param {
    /// Create parameter from its text representation.
    pub fn new(value: impl Into<String>, oid: Oid) -> Self {
        Self { value: Some(value.into()), oid }
    }

    /// SQL `NULL` of given type.
    pub fn null(oid: Oid) -> Self {
        Self { value: None, oid }
    }

    /// Text representation, [`None`] if `NULL`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns parameter type [`Oid`].
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Return `true` if value is NULL.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

impl Encode for Param {
    fn encode(self) -> Param {
        self
    }
}

// strings leave the type to the backend, so a string can bind to any column type
impl Encode for &str {
    fn encode(self) -> Param {
        Param::new(self, UNSPECIFIED)
    }
}

impl Encode for String {
    fn encode(self) -> Param {
        Param::new(self, UNSPECIFIED)
    }
}

impl Encode for &String {
    fn encode(self) -> Param {
        Param::new(self.as_str(), UNSPECIFIED)
    }
}

impl Encode for bool {
    fn encode(self) -> Param {
        Param::new(if self { "t" } else { "f" }, Self::OID)
    }
}

macro_rules! encode_int {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(self) -> Param {
                Param::new(itoa::Buffer::new().format(self), Self::OID)
            }
        }
    )*};
}

encode_int!(i16, i32, i64);

macro_rules! encode_float {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(self) -> Param {
                let value = if self.is_nan() {
                    "NaN".into()
                } else if self.is_infinite() {
                    if self.is_sign_positive() { "Infinity" } else { "-Infinity" }.into()
                } else {
                    self.to_string()
                };
                Param::new(value, Self::OID)
            }
        }
    )*};
}

encode_float!(f32, f64);

impl<T> Encode for Option<T>
where
    T: Encode + OptionOid,
{
    fn encode(self) -> Param {
        match self {
            Some(value) => value.encode(),
            None => Param::null(T::NULL_OID),
        }
    }
}

/// Type oid used for a `None` value.
pub trait OptionOid {
    const NULL_OID: Oid;
}

impl<T: PgType> OptionOid for T {
    const NULL_OID: Oid = T::OID;
}

impl OptionOid for &str {
    const NULL_OID: Oid = UNSPECIFIED;
}

impl OptionOid for String {
    const NULL_OID: Oid = UNSPECIFIED;
}

/// Query that cannot be represented on the wire.
#[derive(Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Sql text contains a nul byte, which terminates strings in the protocol.
    NulInSql { position: usize },
    /// More parameters than the 16 bit count field can hold.
    TooManyParameters(usize),
    /// Encoded message length does not fit the 32 bit length field.
    MessageTooLong { msgtype: u8, len: usize },
}

/// Maximum message length, the length field is a signed 32 bit integer.
const MAX_MESSAGE_LEN: usize = i32::MAX as usize;

/// Check that `sql` and `params` can be written as `Parse` and `Bind` messages.
pub(crate) fn check(sql: &str, params: &[Param]) -> Result<(), EncodeError> {
    if let Some(position) = sql.bytes().position(|b| b == b'\0') {
        return Err(EncodeError::NulInSql { position });
    }

    if params.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyParameters(params.len()));
    }

    // length + unnamed statement + sql + nul + count + oids
    let parse = 4usize
        .saturating_add(1)
        .saturating_add(sql.len() + 1)
        .saturating_add(2)
        .saturating_add(params.len() * 4);
    if parse > MAX_MESSAGE_LEN {
        return Err(EncodeError::MessageTooLong { msgtype: b'P', len: parse });
    }

    // length + portal + statement + formats + count + values + result formats
    let bind = params
        .iter()
        .map(|e| 4 + e.value().map(str::len).unwrap_or_default())
        .fold(4 + 1 + 1 + 4 + 2 + 4, usize::saturating_add);
    if bind > MAX_MESSAGE_LEN {
        return Err(EncodeError::MessageTooLong { msgtype: b'B', len: bind });
    }

    Ok(())
}

impl std::error::Error for EncodeError { }

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::NulInSql { position } => {
                write!(f, "sql contains a nul byte at position {position}")
            }
            EncodeError::TooManyParameters(n) => {
                write!(f, "too many parameters: {n}, limit is {}", u16::MAX)
            }
            EncodeError::MessageTooLong { msgtype, len } => write!(
                f,
                "message too long: `{}` message would be {len} bytes, limit is {MAX_MESSAGE_LEN}",
                *msgtype as char,
            ),
        }
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::NulInSql { position } => write!(f, "NulInSql({position})"),
            EncodeError::TooManyParameters(n) => write!(f, "TooManyParameters({n})"),
            EncodeError::MessageTooLong { len, .. } => write!(f, "MessageTooLong({len})"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn check_rejects_unrepresentable() {
        assert_eq!(check("SELECT 1", &[1i32.encode()]), Ok(()));
        assert_eq!(check("SELECT '\0'", &[]), Err(EncodeError::NulInSql { position: 8 }));

        let params = vec![Param::null(UNSPECIFIED); u16::MAX as usize];
        assert_eq!(check("SELECT 1", &params), Ok(()));

        let params = vec![Param::null(UNSPECIFIED); u16::MAX as usize + 1];
        assert_eq!(check("SELECT 1", &params), Err(EncodeError::TooManyParameters(65536)));
        assert_eq!(
            EncodeError::TooManyParameters(65536).to_string(),
            "too many parameters: 65536, limit is 65535",
        );
    }

    #[test]
    fn integers() {
        assert_eq!(420i32.encode(), Param::new("420", 23));
        assert_eq!((-7i64).encode(), Param::new("-7", 20));
        assert_eq!(i16::MIN.encode().value(), Some("-32768"));
    }

    #[test]
    fn text_is_untyped() {
        let param = "foo".encode();
        assert_eq!(param.value(), Some("foo"));
        assert_eq!(param.oid(), UNSPECIFIED);
    }

    #[test]
    fn floats() {
        assert_eq!(1.5f64.encode().value(), Some("1.5"));
        assert_eq!(f64::NEG_INFINITY.encode().value(), Some("-Infinity"));
        assert_eq!(f32::NAN.encode().value(), Some("NaN"));
        assert_eq!(1.5f32.encode().oid(), 700);
    }

    #[test]
    fn nulls() {
        let param = None::<bool>.encode();
        assert!(param.is_null());
        assert_eq!(param.oid(), 16);
        assert_eq!(Some(true).encode(), Param::new("t", 16));
        assert!(None::<&str>.encode().is_null());
    }
}
