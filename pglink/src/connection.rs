//! Postgres connection.
//!
//! A [`Connection`] owns two background tasks: a monitor reading every backend message,
//! and a writer. Operations run on the caller's task, the monitor hands them messages
//! through a channel while they are in flight.
//!
//! The first fatal error is recorded once and never replaced. Every later operation fails
//! with [`FailedConnection`][ErrorKind::FailedConnection] wrapping it, without any I/O.
use bytes::BytesMut;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{
    Error, ErrorKind, Result,
    common::verbose,
    encode::Param,
    postgres::{BackendMessage, TransactionStatus, backend::BackendKeyData},
    query::{self, QueryState, Step},
    row::{QueryResult, Row},
    transport::{Socket, Transport},
};

mod config;
mod monitor;
mod shared;
mod startup;

pub use config::{Config, ParseError, Target};
pub use shared::ConnectionState;

use shared::{Inbound, Shared};

/// Postgres connection.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
}

impl Connection {
    /// Connect to the backend described by `config`.
    pub async fn connect(config: &Config) -> Result<Connection> {
        let target = config.target();
        verbose!(%target, "connect");
        let socket = Socket::connect(&target).await?;
        Self::connect_with(socket, config).await
    }

    /// Connect using [`Config::from_env`].
    pub async fn connect_env() -> Result<Connection> {
        Self::connect(&Config::from_env()).await
    }

    /// Login over an already established transport.
    ///
    /// Spawns the monitor and writer tasks, so it must be called within a tokio runtime.
    pub async fn connect_with<T: Transport>(io: T, config: &Config) -> Result<Connection> {
        let (read, write) = tokio::io::split(io);
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared::new(inbox_tx, writer_tx));
        tokio::spawn(monitor::monitor(read, shared.clone()));
        tokio::spawn(monitor::writer(write, writer_rx, shared.clone()));

        let mut conn = Connection { shared, inbox };
        startup::login(&mut conn, config).await?;
        Ok(conn)
    }

    /// Run `sql` with `params` using the extended query protocol.
    ///
    /// Every result row is handed to `handle_row` in arrival order, before the next message
    /// is processed. A server error fails the query, the connection stays usable unless
    /// the error is fatal. A query that cannot be encoded fails with
    /// [`Encode`][ErrorKind::Encode] before anything is sent.
    pub async fn query<F>(&mut self, sql: &str, params: &[Param], handle_row: F) -> Result<QueryResult>
    where
        F: FnMut(Row),
    {
        let mut buf = BytesMut::new();
        query::write_query(sql, params, &mut buf)?;

        self.begin().await?;
        self.shared.send(buf.freeze());
        self.run(QueryState::new(), handle_row).await
    }

    /// Run `sql` that must not return rows, such as DDL.
    ///
    /// The result shape is described before the statement is executed. A statement that
    /// returns rows is never executed and fails with
    /// [`UnexpectedRows`][ErrorKind::UnexpectedRows], the connection stays usable.
    pub async fn query_expect_no_data(&mut self, sql: &str) -> Result<QueryResult> {
        let mut buf = BytesMut::new();
        query::write_describe(sql, &[], &mut buf)?;

        self.begin().await?;
        self.shared.send(buf.freeze());
        self.run(QueryState::no_data(), |_| { }).await
    }

    /// Run `sql` with `params`, discarding any rows.
    pub async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult> {
        self.query(sql, params, |_| { }).await
    }

    /// Send `Terminate` and shut down the writer, then wait for [`close_finished`].
    ///
    /// Returns the recorded failure if the connection failed. Calling it again returns
    /// the same outcome.
    ///
    /// [`close_finished`]: Connection::close_finished
    pub async fn close(&mut self) -> Result<()> {
        {
            let mut route = self.shared.lock();
            self.shared.close_locked(&mut route);
        }
        self.close_finished().await
    }

    /// Resolves once the connection reached a terminal state.
    ///
    /// `Ok` after a clean [`close`][Connection::close], otherwise the recorded failure,
    /// including a failure observed while no operation was in flight. Any number of
    /// futures can wait on it.
    pub fn close_finished(&self) -> impl Future<Output = Result<()>> + Send + use<> {
        let mut rx = self.shared.subscribe_close();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(outcome) => match &*outcome {
                    Some(outcome) => outcome.clone(),
                    None => Ok(()),
                },
                Err(_) => Err(ErrorKind::Closed.into()),
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// The recorded failure, if any.
    ///
    /// After a fatal server error the failure is recorded once the backend disconnects.
    pub fn failure(&self) -> Option<Error> {
        self.shared.failure().cloned()
    }

    /// Transaction status reported by the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.shared.lock().session.transaction_status
    }

    /// Run-time parameter reported by the backend, such as `server_version`.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.shared.lock().session.parameters.get(name).cloned()
    }

    /// Process id and secret key of the backend.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.shared.lock().session.backend_key
    }
}

impl Connection {
    /// Check the connection is idle, and mark it executing.
    ///
    /// After a fatal server error, waits for the backend to disconnect so the recorded
    /// failure can be reported.
    async fn begin(&mut self) -> Result<()> {
        let fatal = self.shared.lock().fatal;
        if fatal {
            let _ = self.close_finished().await;
        }

        let mut route = self.shared.lock();

        if let Some(failure) = self.shared.failure() {
            return Err(Error::failed_connection(failure.clone()));
        }

        match route.state {
            ConnectionState::Idle => {
                route.state = ConnectionState::Executing;
                Ok(())
            }
            ConnectionState::Closed => Err(ErrorKind::Closed.into()),
            ConnectionState::LoggingIn
            | ConnectionState::Executing
            | ConnectionState::Failed => Err(ErrorKind::QueryInProgress.into()),
        }
    }

    /// Feed the operation in flight until the backend ends it.
    async fn run<F>(&mut self, mut state: QueryState, mut handle_row: F) -> Result<QueryResult>
    where
        F: FnMut(Row),
    {
        loop {
            let msg = self.recv().await?;
            verbose!(phase = state.label(), msgtype = msg.msgtype(), "query");
            match state.handle(msg) {
                Ok(Step::Continue) => { }
                Ok(Step::Row(row)) => handle_row(row),
                Ok(Step::Execute) => self.write(query::write_execute),
                Ok(Step::Sync) => self.write(query::write_sync),
                Ok(Step::Complete { result, status }) => {
                    self.finish(status);
                    return Ok(result);
                }
                Ok(Step::ServerError { error, status }) => {
                    self.finish(status);
                    return Err(error.into());
                }
                Ok(Step::Rejected { columns, status }) => {
                    self.finish(status);
                    return Err(ErrorKind::UnexpectedRows { columns }.into());
                }
                Ok(Step::FatalError(error)) => {
                    self.fatal();
                    return Err(error.into());
                }
                Err(err) => return Err(self.fail(err.into())),
            }
        }
    }

    fn write(&self, f: fn(&mut BytesMut)) {
        let mut buf = BytesMut::new();
        f(&mut buf);
        self.shared.send(buf.freeze());
    }

    /// Next message for the operation in flight, or the failure that ended it.
    async fn recv(&mut self) -> Result<BackendMessage> {
        match self.inbox.recv().await {
            Some(inbound) => inbound,
            None => Err(self.terminal_error()),
        }
    }

    fn terminal_error(&self) -> Error {
        match self.shared.failure() {
            Some(failure) => failure.clone(),
            None => ErrorKind::Closed.into(),
        }
    }

    /// Operation completed with `ReadyForQuery`, return to idle.
    ///
    /// Anything the monitor forwarded after `ReadyForQuery` was not expected.
    fn finish(&mut self, status: TransactionStatus) {
        let mut route = self.shared.lock();
        route.session.transaction_status = status;

        if matches!(route.state, ConnectionState::LoggingIn | ConnectionState::Executing) {
            route.state = ConnectionState::Idle;
        }

        while let Ok(inbound) = self.inbox.try_recv() {
            if let Ok(msg) = inbound {
                self.shared.unsolicited(&mut route, msg);
            }
        }
    }

    /// Record `err` as fatal, returns it.
    fn fail(&self, err: Error) -> Error {
        self.shared.fail(err.clone());
        err
    }

    /// A fatal server error ended the operation in flight.
    ///
    /// Anything the monitor forwarded after it was not expected.
    fn fatal(&mut self) {
        let mut route = self.shared.lock();
        self.shared.fatal_locked(&mut route);

        while let Ok(inbound) = self.inbox.try_recv() {
            if let Ok(msg) = inbound {
                self.shared.unsolicited(&mut route, msg);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let mut route = self.shared.lock();
        self.shared.close_locked(&mut route);
    }
}
