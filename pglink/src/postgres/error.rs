//! Protocol error
use std::{fmt, str::Utf8Error};

use super::BackendMessage;
use crate::ext::FmtExt;

/// A backend message arrived that the current state does not allow.
///
/// Both variants mean the exchange can no longer be trusted, the connection is failed.
#[derive(Clone)]
pub enum ProtocolError {
    UnexpectedMessageType {
        observed: u8,
        state: &'static str,
    },
    ColumnCountMismatch {
        column_names: Vec<String>,
        values: Vec<Option<String>>,
    },
}

impl ProtocolError {
    pub(crate) fn unexpected(observed: u8, state: &'static str) -> ProtocolError {
        Self::UnexpectedMessageType { observed, state }
    }

    pub(crate) fn column_count(column_names: Vec<String>, values: Vec<Option<String>>) -> ProtocolError {
        Self::ColumnCountMismatch { column_names, values }
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedMessageType { observed, state } => write!(
                f,
                "unexpected message `{}` (`{}`) in state `{state}`",
                BackendMessage::message_name(*observed),
                [*observed].lossy(),
            ),
            ProtocolError::ColumnCountMismatch { column_names, values } => write!(
                f,
                "column count mismatch: RowDescription has {} columns {column_names:?}, DataRow has {} values {values:?}",
                column_names.len(),
                values.len(),
            ),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An error when translating a complete frame into a [`BackendMessage`].
#[derive(Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The message type byte is not a known backend message.
    UnrecognisedMessageType(u8),
    /// The message type is known but its body is malformed.
    MessageParseFailed {
        message: &'static str,
        reason: PayloadError,
    },
}

impl std::error::Error for DecodeError { }

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnrecognisedMessageType(msgtype) => write!(
                f,
                "unrecognised message type `{}` (0x{msgtype:02x})",
                [*msgtype].lossy(),
            ),
            DecodeError::MessageParseFailed { message, reason } => {
                write!(f, "failed to parse `{message}`: {reason}")
            }
        }
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// What exactly is wrong with a message body.
#[derive(Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Body ended before a field was complete.
    Truncated { requested: usize, available: usize },
    /// String field is missing its nul terminator.
    Unterminated,
    /// String field is not utf8.
    Utf8(Utf8Error),
    /// Field holds a value with no meaning.
    Invalid { field: &'static str, value: i64 },
    /// Required field is absent.
    Missing(&'static str),
    /// Bytes left over after the last field.
    TrailingBytes(usize),
}

impl From<bytes::TryGetError> for PayloadError {
    fn from(value: bytes::TryGetError) -> Self {
        PayloadError::Truncated { requested: value.requested, available: value.available }
    }
}

impl std::error::Error for PayloadError { }

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Truncated { requested, available } => {
                write!(f, "body truncated, {requested} bytes requested but {available} available")
            }
            PayloadError::Unterminated => f.write_str("string is not nul terminated"),
            PayloadError::Utf8(e) => write!(f, "{e}"),
            PayloadError::Invalid { field, value } => write!(f, "invalid {field} {value}"),
            PayloadError::Missing(field) => write!(f, "missing {field}"),
            PayloadError::TrailingBytes(n) => write!(f, "{n} trailing bytes"),
        }
    }
}

impl fmt::Debug for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
