//! Startup and authentication.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
use bytes::BytesMut;

use super::{Config, Connection};
use crate::{
    Result,
    auth::{Authenticator, Progress},
    common::verbose,
    postgres::{BackendMessage, ProtocolError, frontend},
};

const AUTHENTICATING: &str = "authenticating";

/// Send the startup message and answer the backend until the first `ReadyForQuery`.
///
/// Every failure here is fatal, the backend closes the session after a login error.
pub(crate) async fn login(conn: &mut Connection, config: &Config) -> Result<()> {
    use BackendMessage as B;

    let mut buf = BytesMut::new();

    frontend::Startup {
        user: config.user(),
        database: config.database(),
        application_name: config.application_name(),
    }
    .write(&mut buf);
    conn.shared.send(buf.split().freeze());

    let mut auth = Authenticator::new(config.user(), config.password());
    let mut progress = Progress::Pending;

    loop {
        match conn.recv().await? {
            B::AuthenticationRequest(req) if progress == Progress::Pending => {
                verbose!(method = req.method(), "AuthenticationRequest");
                match auth.respond(req, &mut buf) {
                    Ok(next) => progress = next,
                    Err(err) => return Err(conn.fail(err.into())),
                }
                if !buf.is_empty() {
                    conn.shared.send(buf.split().freeze());
                }
            }
            B::NegotiateProtocolVersion(version) => {
                verbose!(minor = version.minor, options = ?version.options, "NegotiateProtocolVersion");
            }
            B::ErrorResponse(err) => return Err(conn.fail(err.into())),
            // session values only follow a successful authentication
            msg if progress == Progress::Pending => {
                let err = ProtocolError::unexpected(msg.msgtype(), AUTHENTICATING);
                return Err(conn.fail(err.into()));
            }
            B::BackendKeyData(key) => {
                conn.shared.lock().session.backend_key = Some(key);
            }
            B::ReadyForQuery(ready) => {
                conn.finish(ready.status);
                return Ok(());
            }
            msg => {
                let err = ProtocolError::unexpected(msg.msgtype(), "logging in");
                return Err(conn.fail(err.into()));
            }
        }
    }
}
