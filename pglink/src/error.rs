//! `pglink` error types.
use std::{backtrace::Backtrace, fmt, io, sync::Arc};

use crate::{
    auth::AuthError,
    connection::ParseError,
    encode::EncodeError,
    postgres::{DecodeError, ErrorResponse, FrameError, ProtocolError},
};

/// A specialized [`Result`] type for `pglink` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pglink` library.
///
/// Cloning is cheap, the same failure is handed to every waiter of a failed connection.
#[derive(Clone)]
pub struct Error {
    backtrace: Arc<Backtrace>,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the server error, if this error is one.
    pub fn as_database(&self) -> Option<&ErrorResponse> {
        match &self.kind {
            ErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the connection is no longer usable after this error.
    pub fn is_fatal(&self) -> bool {
        match &self.kind {
            ErrorKind::Database(e) => e.is_fatal(),
            ErrorKind::Config(_)
            | ErrorKind::Encode(_)
            | ErrorKind::QueryInProgress
            | ErrorKind::UnexpectedRows { .. } => false,
            _ => true,
        }
    }

    /// Returns `true` if the connection ended with an EOF, directly or as the recorded failure.
    pub fn is_eof(&self) -> bool {
        match &self.kind {
            ErrorKind::Frame(e) => e.is_eof(),
            ErrorKind::FailedConnection(e) => e.is_eof(),
            _ => false,
        }
    }

    /// Wrap the recorded failure of a connection.
    pub(crate) fn failed_connection(cause: Error) -> Error {
        ErrorKind::FailedConnection(Box::new(cause)).into()
    }

    pub(crate) fn writer_failed(err: io::Error) -> Error {
        ErrorKind::WriterFailed(Arc::new(err)).into()
    }
}

/// All possible error kind from `pglink` library.
#[derive(Clone)]
pub enum ErrorKind {
    Config(ParseError),
    /// Query could not be written, nothing was sent.
    Encode(EncodeError),
    /// Byte stream could not be split into messages.
    Frame(FrameError),
    /// Message body could not be decoded.
    Decode(DecodeError),
    /// Message arrived in a state that does not allow it.
    Protocol(ProtocolError),
    /// Server reported an error.
    Database(ErrorResponse),
    Io(Arc<io::Error>),
    /// Writing to the backend failed in the background.
    WriterFailed(Arc<io::Error>),
    /// Operation attempted on a connection that already failed, holds the original failure.
    FailedConnection(Box<Error>),
    Auth(AuthError),
    /// A previous query was abandoned before the backend finished responding.
    QueryInProgress,
    /// Connection was closed by [`Connection::close`][crate::Connection::close].
    Closed,
    /// [`Connection::query_expect_no_data`][crate::Connection::query_expect_no_data] was given
    /// a statement that returns rows, the statement was not executed.
    UnexpectedRows { columns: Vec<String> },
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = Arc::new(Backtrace::capture());
                Self { backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<EncodeError>e => ErrorKind::Encode(e));
from!(<FrameError>e => ErrorKind::Frame(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<ErrorResponse>e => ErrorKind::Database(e));
from!(<io::Error>e => ErrorKind::Io(Arc::new(e)));
from!(<AuthError>e => ErrorKind::Auth(e));

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::FailedConnection(e) => Some(&**e),
            ErrorKind::Io(e) | ErrorKind::WriterFailed(e) => Some(&**e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Encode(e) => e.fmt(f),
            Self::Frame(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::WriterFailed(e) => write!(f, "writer failed asynchronously: {e}"),
            Self::FailedConnection(e) => write!(f, "query against failed connection: {}", e.kind),
            Self::Auth(e) => e.fmt(f),
            Self::QueryInProgress => f.write_str("a previous query was abandoned before it completed"),
            Self::Closed => f.write_str("connection is closed"),
            Self::UnexpectedRows { columns } => {
                write!(f, "expected no data, but the statement returns rows with columns {columns:?}")
            }
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => fmt::Debug::fmt(e, f),
            Self::FailedConnection(e) => write!(f, "FailedConnection({:?})", e.kind),
            _ => write!(f, "\"{self}\""),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failed_connection_wraps_cause() {
        let eof = Error::from(FrameError::UnexpectedEof { unconsumed: 0 });
        let err = Error::failed_connection(eof.clone());
        assert!(err.is_eof());
        assert!(err.is_fatal());
        assert_eq!(format!("{:?}", err.kind()), "FailedConnection(UnexpectedEof(0))");
        assert!(err.kind().to_string().starts_with("query against failed connection: unexpected EOF"));
    }

    #[test]
    fn writer_failed() {
        let err = Error::writer_failed(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.kind().to_string().starts_with("writer failed asynchronously"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn server_error_severity() {
        let response = |severity: &str| ErrorResponse {
            severity: severity.into(),
            code: "57P01".into(),
            ..Default::default()
        };
        assert!(Error::from(response("FATAL")).is_fatal());
        assert!(!Error::from(response("ERROR")).is_fatal());
        assert_eq!(Error::from(response("ERROR")).as_database().map(|e| e.code.as_str()), Some("57P01"));
    }

    #[test]
    fn recoverable_kinds() {
        let rows = Error::from(ErrorKind::UnexpectedRows { columns: vec!["id".into()] });
        assert!(!rows.is_fatal());
        assert_eq!(
            rows.kind().to_string(),
            "expected no data, but the statement returns rows with columns [\"id\"]",
        );
        assert!(!Error::from(EncodeError::TooManyParameters(70_000)).is_fatal());
    }
}
