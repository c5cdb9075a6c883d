//! State shared between the [`Connection`][super::Connection] handle and its background tasks.
use bytes::{Bytes, BytesMut};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, OnceLock, PoisonError},
};
use tokio::sync::{mpsc, watch};

use crate::{
    Error, Result,
    common::{debug, error, verbose, warning},
    postgres::{
        BackendMessage, ProtocolError, TransactionStatus,
        backend::{BackendKeyData, ParameterStatus},
        frame, frontend,
    },
    query::{AWAITING_DISCONNECT, IDLE},
};

/// Overall connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Startup and authentication in progress.
    LoggingIn,
    /// Ready for a query.
    Idle,
    /// A query is in flight.
    Executing,
    /// A fatal error occurred, terminal.
    Failed,
    /// Closed by the client, terminal.
    Closed,
}

impl ConnectionState {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            ConnectionState::LoggingIn => "logging in",
            ConnectionState::Idle => IDLE,
            ConnectionState::Executing => "executing",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Message or failure handed from the monitor to the operation in flight.
pub(crate) type Inbound = Result<BackendMessage>;

/// Request to the writer task.
#[derive(Debug)]
pub(crate) enum Command {
    Write(Bytes),
    Shutdown,
}

/// Session values reported by the backend.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub parameters: HashMap<String, String>,
    pub backend_key: Option<BackendKeyData>,
    pub transaction_status: TransactionStatus,
}

/// Where incoming messages go, guarded by one lock.
#[derive(Debug)]
pub(crate) struct Route {
    pub state: ConnectionState,
    /// `Terminate` was sent, the coming EOF is clean.
    pub closing: bool,
    /// A fatal server error was received, the backend is closing the session.
    pub fatal: bool,
    pub inbox: mpsc::UnboundedSender<Inbound>,
    pub session: Session,
}

#[derive(Debug)]
pub(crate) struct Shared {
    /// The first fatal error, never replaced.
    failure: OnceLock<Error>,
    /// Resolved once, on the first entry into a terminal state.
    close_finished: watch::Sender<Option<Result<()>>>,
    route: Mutex<Route>,
    writer: mpsc::UnboundedSender<Command>,
}

impl Shared {
    pub fn new(
        inbox: mpsc::UnboundedSender<Inbound>,
        writer: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            failure: OnceLock::new(),
            close_finished: watch::Sender::new(None),
            route: Mutex::new(Route {
                state: ConnectionState::LoggingIn,
                closing: false,
                fatal: false,
                inbox,
                session: Session::default(),
            }),
            writer,
        }
    }

    /// Lock the routing state.
    ///
    /// Never held across an await point, a poisoned lock is still consistent.
    pub fn lock(&self) -> MutexGuard<'_, Route> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.get()
    }

    /// Queue bytes for the writer task.
    pub fn send(&self, bytes: Bytes) {
        verbose!(len = bytes.len(), "send");
        // writer is gone only after a failure, which is reported through the inbox
        let _ = self.writer.send(Command::Write(bytes));
    }

    /// Ask the writer task to shut down the write half after pending writes.
    pub fn shutdown_writer(&self) {
        let _ = self.writer.send(Command::Shutdown);
    }

    pub fn subscribe_close(&self) -> watch::Receiver<Option<Result<()>>> {
        self.close_finished.subscribe()
    }

    /// Resolve `close_finished`, first writer wins.
    fn resolve(&self, outcome: Result<()>) {
        self.close_finished.send_if_modified(|current| match current {
            Some(_) => false,
            None => {
                *current = Some(outcome);
                true
            }
        });
    }

    /// Record a fatal error.
    pub fn fail(&self, err: Error) {
        let mut route = self.lock();
        self.fail_locked(&mut route, err);
    }

    /// Record a fatal error.
    ///
    /// The first failure becomes sticky, the connection becomes [`Failed`] unless it was
    /// already closed, an operation in flight is woken with the failure, and the
    /// writer is shut down.
    ///
    /// [`Failed`]: ConnectionState::Failed
    pub fn fail_locked(&self, route: &mut Route, err: Error) {
        let failure = match self.failure.set(err) {
            Ok(()) => match self.failure.get() {
                Some(failure) => failure.clone(),
                None => return,
            },
            // already failed
            Err(_) => return,
        };

        error!("connection failed while {}: {}", route.state.label(), failure);

        if matches!(route.state, ConnectionState::LoggingIn | ConnectionState::Executing) {
            let _ = route.inbox.send(Err(failure.clone()));
        }
        if route.state != ConnectionState::Closed {
            route.state = ConnectionState::Failed;
        }

        self.resolve(Err(failure));
        self.shutdown_writer();
    }

    /// A fatal server error ended the operation in flight.
    ///
    /// The backend is closing the session, its disconnect becomes the recorded failure. Until
    /// then any other message is a protocol failure.
    pub fn fatal_locked(&self, route: &mut Route) {
        debug!("fatal server error while {}, {AWAITING_DISCONNECT}", route.state.label());
        route.fatal = true;
        if route.state != ConnectionState::Closed {
            route.state = ConnectionState::Failed;
        }
        self.shutdown_writer();
    }

    /// Mark the connection closed and send `Terminate`, unless already terminal.
    pub fn close_locked(&self, route: &mut Route) {
        if matches!(route.state, ConnectionState::Failed | ConnectionState::Closed) {
            return;
        }
        route.state = ConnectionState::Closed;
        route.closing = true;

        let mut buf = BytesMut::new();
        frontend::write(frontend::Terminate, &mut buf);
        self.send(buf.freeze());
        self.shutdown_writer();
    }

    /// The monitor reached the end of the stream.
    pub fn eof(&self, unconsumed: &[u8]) {
        let mut route = self.lock();
        if route.closing {
            verbose!("clean EOF after Terminate");
            self.resolve(Ok(()));
        } else {
            self.fail_locked(&mut route, frame::eof(unconsumed).into());
        }
    }

    /// Route a message decoded by the monitor.
    pub fn dispatch(&self, msg: BackendMessage) {
        use BackendMessage as B;

        let mut route = self.lock();

        let msg = match msg {
            B::NoticeResponse(notice) => {
                warning!("{notice}");
                return;
            }
            B::NotificationResponse(notification) => {
                verbose!(?notification, "NotificationResponse");
                return;
            }
            B::ParameterStatus(ParameterStatus { name, value }) => {
                verbose!(%name, %value, "ParameterStatus");
                route.session.parameters.insert(name, value);
                return;
            }
            msg => msg,
        };

        if route.fatal {
            return self.unsolicited(&mut route, msg);
        }

        match route.state {
            ConnectionState::LoggingIn | ConnectionState::Executing => {
                let _ = route.inbox.send(Ok(msg));
            }
            ConnectionState::Idle => self.unsolicited(&mut route, msg),
            // nothing is listening anymore
            ConnectionState::Failed | ConnectionState::Closed => { }
        }
    }

    /// A message arrived while no operation is in flight.
    ///
    /// Only an asynchronous server error or a stray message can get here, both are fatal.
    /// After a fatal server error only the disconnect may follow.
    pub fn unsolicited(&self, route: &mut Route, msg: BackendMessage) {
        let err = match msg {
            msg if route.fatal => ProtocolError::unexpected(msg.msgtype(), AWAITING_DISCONNECT).into(),
            BackendMessage::ErrorResponse(err) => Error::from(err),
            msg => ProtocolError::unexpected(msg.msgtype(), IDLE).into(),
        };
        self.fail_locked(route, err);
    }
}
