//! Postgres Protocol
//!
//! The framing, backend message model, and frontend messages of the
//! postgres frontend/backend protocol version 3.0.
//!
//! Nothing in this module performs I/O.
//!
//! <https://www.postgresql.org/docs/current/protocol.html>
pub mod frame;
pub mod backend;
pub mod frontend;

mod error;
mod pg_type;
mod pg_format;

pub use backend::{BackendMessage, BackendProtocol, ErrorResponse, TransactionStatus};
pub use error::{DecodeError, PayloadError, ProtocolError};
pub use frame::{Frame, FrameError};
pub use frontend::FrontendProtocol;
pub use pg_format::PgFormat;
pub use pg_type::{Oid, PgType, UNSPECIFIED};
