//! Extended query exchange.
//!
//! A query writes `Parse`, `Bind`, `Describe`, `Execute` and `Sync` in one go, then the
//! backend replies with a fixed sequence that [`QueryState`] walks through:
//!
//! | phase                   | accepts                                   |
//! |-------------------------|-------------------------------------------|
//! | Parsing                 | ParseComplete                             |
//! | Binding                 | BindComplete                              |
//! | describing result shape | NoData, RowDescription                    |
//! | reading DataRows        | DataRow, CommandComplete, EmptyQuery, ... |
//! | awaiting rows           | CommandComplete, EmptyQuery, ...          |
//! | awaiting ReadyForQuery  | ReadyForQuery                             |
//!
//! An `ErrorResponse` is accepted in every phase. The backend then skips to `Sync`, so only
//! `ReadyForQuery` may follow, unless the error is fatal and the backend is going away.
//!
//! A query that must not return rows ([`QueryState::no_data`]) writes `Flush` in place of
//! `Execute` and `Sync`. The statement is only executed once the backend answered `NoData`,
//! a `RowDescription` rejects it with a bare `Sync`.
//!
//! [`QueryState`] performs no I/O, the connection feeds it every message in arrival order.
use bytes::BytesMut;
use std::sync::Arc;

use crate::{
    common::{span, verbose},
    encode::{self, EncodeError, Param},
    postgres::{
        BackendMessage, ErrorResponse, ProtocolError, TransactionStatus,
        backend::DataRow,
        frontend,
    },
    row::{QueryResult, Row},
};

/// Write the whole extended query exchange to `buf`.
///
/// Uses the unnamed statement and unnamed portal, with no row limit. Nothing is written when
/// the query cannot be encoded.
pub fn write_query(sql: &str, params: &[Param], buf: &mut BytesMut) -> Result<(), EncodeError> {
    span!("write_query", sql, params = params.len());
    write_prelude(sql, params, buf)?;
    write_execute(buf);
    Ok(())
}

/// Write `Parse`, `Bind` and `Describe` of the unnamed portal, followed by `Flush`.
///
/// The backend answers up to the result shape without executing the statement.
pub fn write_describe(sql: &str, params: &[Param], buf: &mut BytesMut) -> Result<(), EncodeError> {
    span!("write_describe", sql, params = params.len());
    write_prelude(sql, params, buf)?;
    frontend::write(frontend::Flush, buf);
    Ok(())
}

fn write_prelude(sql: &str, params: &[Param], buf: &mut BytesMut) -> Result<(), EncodeError> {
    encode::check(sql, params)?;
    frontend::write(frontend::Parse { prepare_name: "", sql, params }, buf);
    frontend::write(frontend::Bind { portal_name: "", stmt_name: "", params }, buf);
    frontend::write(frontend::Describe { kind: b'P', name: "" }, buf);
    Ok(())
}

/// Write `Execute` of the unnamed portal followed by `Sync`.
pub fn write_execute(buf: &mut BytesMut) {
    frontend::write(frontend::Execute { portal_name: "", max_row: 0 }, buf);
    frontend::write(frontend::Sync, buf);
}

/// Write `Sync` alone, ending the exchange without executing the portal.
pub fn write_sync(buf: &mut BytesMut) {
    frontend::write(frontend::Sync, buf);
}

#[derive(Debug)]
enum Phase {
    Parsing,
    Binding,
    DescribingResultShape,
    ReadingDataRows(Arc<[String]>),
    AwaitingRows,
    AwaitingReadyForQuery(QueryResult),
    /// Backend reported a non fatal error and is skipping to `Sync`.
    Draining(ErrorResponse),
    /// Statement returns rows where none are allowed, waiting for the bare `Sync` to finish.
    Rejected(Vec<String>),
    Finished,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Parsing => "Parsing",
            Phase::Binding => "Binding",
            Phase::DescribingResultShape => "describing result shape",
            Phase::ReadingDataRows(_) => "reading DataRows",
            Phase::AwaitingRows => "awaiting rows",
            Phase::AwaitingReadyForQuery(_) | Phase::Draining(_) | Phase::Rejected(_) => {
                "awaiting ReadyForQuery"
            }
            Phase::Finished => "finished",
        }
    }
}

/// What the connection should do after a message is accepted.
#[derive(Debug)]
pub enum Step {
    /// Keep reading.
    Continue,
    /// Hand this row to the callback, then keep reading.
    Row(Row),
    /// Write [`write_execute`], then keep reading.
    Execute,
    /// Write [`write_sync`], then keep reading.
    Sync,
    /// Query finished successfully, the connection is idle.
    Complete {
        result: QueryResult,
        status: TransactionStatus,
    },
    /// Query failed with a non fatal server error, the connection is idle.
    ServerError {
        error: ErrorResponse,
        status: TransactionStatus,
    },
    /// Statement returns rows but none are allowed, it was not executed, the connection is idle.
    Rejected {
        columns: Vec<String>,
        status: TransactionStatus,
    },
    /// Query failed with a fatal server error, the backend is terminating the session.
    FatalError(ErrorResponse),
}

/// Where a single extended query exchange is within its message sequence.
#[derive(Debug)]
pub struct QueryState {
    phase: Phase,
    rows: u64,
    expect_no_data: bool,
    /// `Sync` was written, the backend will end the exchange with `ReadyForQuery`.
    synced: bool,
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryState {
    /// State right after [`write_query`].
    pub fn new() -> Self {
        Self { phase: Phase::Parsing, rows: 0, expect_no_data: false, synced: true }
    }

    /// State right after [`write_describe`], for a statement that must not return rows.
    pub fn no_data() -> Self {
        Self { phase: Phase::Parsing, rows: 0, expect_no_data: true, synced: false }
    }

    /// Human readable label of the current phase.
    pub fn label(&self) -> &'static str {
        self.phase.label()
    }

    /// Validate `msg` against the current phase and advance.
    ///
    /// Any error means the exchange can no longer be trusted.
    pub fn handle(&mut self, msg: BackendMessage) -> Result<Step, ProtocolError> {
        use BackendMessage as B;

        let phase = std::mem::replace(&mut self.phase, Phase::Finished);

        let (phase, step) = match (phase, msg) {
            (Phase::Draining(_) | Phase::Rejected(_) | Phase::Finished, B::ErrorResponse(err))
                if err.is_fatal() =>
            {
                (Phase::Finished, Step::FatalError(err))
            }
            (Phase::Draining(error), B::ReadyForQuery(ready)) => {
                (Phase::Finished, Step::ServerError { error, status: ready.status })
            }
            (Phase::Rejected(columns), B::ReadyForQuery(ready)) => {
                (Phase::Finished, Step::Rejected { columns, status: ready.status })
            }
            (phase @ (Phase::Draining(_) | Phase::Rejected(_) | Phase::Finished), msg) => {
                return self.unexpected(phase, msg.msgtype());
            }

            (_, B::ErrorResponse(err)) if err.is_fatal() => (Phase::Finished, Step::FatalError(err)),
            (_, B::ErrorResponse(err)) => (Phase::Draining(err), self.sync()),

            (Phase::Parsing, B::ParseComplete(_)) => (Phase::Binding, Step::Continue),
            (Phase::Binding, B::BindComplete(_)) => (Phase::DescribingResultShape, Step::Continue),

            (Phase::DescribingResultShape, B::NoData(_)) if !self.synced => {
                self.synced = true;
                (Phase::AwaitingRows, Step::Execute)
            }
            (Phase::DescribingResultShape, B::NoData(_)) => (Phase::AwaitingRows, Step::Continue),
            (Phase::DescribingResultShape, B::RowDescription(desc)) if self.expect_no_data => {
                let columns = desc.column_names();
                verbose!(?columns, "RowDescription rejected");
                (Phase::Rejected(columns), self.sync())
            }
            (Phase::DescribingResultShape, B::RowDescription(desc)) => {
                let columns: Arc<[String]> = desc.column_names().into();
                verbose!(?columns, "RowDescription");
                (Phase::ReadingDataRows(columns), Step::Continue)
            }

            (Phase::ReadingDataRows(columns), B::DataRow(DataRow { values })) => {
                if values.len() != columns.len() {
                    return Err(ProtocolError::column_count(columns.to_vec(), values));
                }
                self.rows += 1;
                let row = Row::new(columns.clone(), values);
                (Phase::ReadingDataRows(columns), Step::Row(row))
            }

            (Phase::ReadingDataRows(_) | Phase::AwaitingRows, B::CommandComplete(cmd)) => {
                (Phase::AwaitingReadyForQuery(cmd.into()), Step::Continue)
            }
            (Phase::ReadingDataRows(_) | Phase::AwaitingRows, B::EmptyQueryResponse(_)) => {
                (Phase::AwaitingReadyForQuery(QueryResult::default()), Step::Continue)
            }
            (Phase::ReadingDataRows(_) | Phase::AwaitingRows, B::PortalSuspended(_)) => {
                let result = QueryResult { rows_affected: self.rows, tag: String::new() };
                (Phase::AwaitingReadyForQuery(result), Step::Continue)
            }

            (Phase::AwaitingReadyForQuery(result), B::ReadyForQuery(ready)) => {
                (Phase::Finished, Step::Complete { result, status: ready.status })
            }

            (phase, msg) => return self.unexpected(phase, msg.msgtype()),
        };

        self.phase = phase;
        Ok(step)
    }

    /// `Sync` is written at most once per exchange.
    fn sync(&mut self) -> Step {
        if std::mem::replace(&mut self.synced, true) {
            Step::Continue
        } else {
            Step::Sync
        }
    }

    fn unexpected(&mut self, phase: Phase, msgtype: u8) -> Result<Step, ProtocolError> {
        let label = phase.label();
        self.phase = Phase::Finished;
        Err(ProtocolError::unexpected(msgtype, label))
    }
}

/// State label for messages that arrive while no operation is in flight.
pub(crate) const IDLE: &str = "idle";

/// State label for messages that arrive after a fatal server error, before the backend hangs up.
pub(crate) const AWAITING_DISCONNECT: &str = "awaiting disconnect";

#[cfg(test)]
mod test {
    use crate::postgres::backend::{
        BindComplete, CommandComplete, EmptyQueryResponse, FieldDescription, NoData,
        ParseComplete, ReadyForQuery, RowDescription,
    };

    use super::*;

    fn ready() -> BackendMessage {
        BackendMessage::ReadyForQuery(ReadyForQuery { status: TransactionStatus::Idle })
    }

    fn description(names: &[&str]) -> BackendMessage {
        let fields = names
            .iter()
            .map(|name| FieldDescription {
                name: name.to_string(),
                table_oid: 0,
                column_id: 0,
                type_oid: 25,
                type_size: -1,
                type_modifier: -1,
                format_code: 0,
            })
            .collect();
        BackendMessage::RowDescription(RowDescription { fields })
    }

    fn data_row(values: &[Option<&str>]) -> BackendMessage {
        let values = values.iter().map(|e| e.map(str::to_owned)).collect();
        BackendMessage::DataRow(DataRow { values })
    }

    fn complete(tag: &str) -> BackendMessage {
        BackendMessage::CommandComplete(CommandComplete { tag: tag.into() })
    }

    fn server_error(severity: &str, code: &str) -> BackendMessage {
        BackendMessage::ErrorResponse(ErrorResponse {
            severity: severity.into(),
            code: code.into(),
            message: "boom".into(),
            ..Default::default()
        })
    }

    fn prelude(state: &mut QueryState) {
        assert!(matches!(state.handle(BackendMessage::ParseComplete(ParseComplete)), Ok(Step::Continue)));
        assert!(matches!(state.handle(BackendMessage::BindComplete(BindComplete)), Ok(Step::Continue)));
    }

    fn unexpected(result: Result<Step, ProtocolError>) -> (u8, &'static str) {
        match result {
            Err(ProtocolError::UnexpectedMessageType { observed, state }) => (observed, state),
            other => panic!("expected UnexpectedMessageType, got {other:?}"),
        }
    }

    fn tags(buf: &[u8]) -> Vec<u8> {
        let mut tags = vec![];
        let mut rest = buf;
        while !rest.is_empty() {
            tags.push(rest[0]);
            let len = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
            rest = &rest[1 + len..];
        }
        tags
    }

    #[test]
    fn write_sequence() {
        let mut buf = BytesMut::new();
        write_query("SELECT 1", &[], &mut buf).unwrap();
        assert_eq!(tags(&buf), b"PBDES");

        let mut buf = BytesMut::new();
        write_describe("CREATE TABLE t()", &[], &mut buf).unwrap();
        assert_eq!(tags(&buf), b"PBDH");
        write_execute(&mut buf);
        write_sync(&mut buf);
        assert_eq!(tags(&buf), b"PBDHESS");
    }

    #[test]
    fn unencodable_writes_nothing() {
        let mut buf = BytesMut::new();
        let err = write_query("SELECT 1\0", &[], &mut buf).unwrap_err();
        assert_eq!(err, EncodeError::NulInSql { position: 8 });
        assert!(buf.is_empty());
    }

    #[test]
    fn rows_in_order() {
        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(description(&["a", "b"])).unwrap();
        assert_eq!(state.label(), "reading DataRows");

        let Step::Row(first) = state.handle(data_row(&[Some("1"), None])).unwrap() else { panic!() };
        let Step::Row(second) = state.handle(data_row(&[Some("2"), Some("x")])).unwrap() else { panic!() };
        assert_eq!(first.get(0), Some("1"));
        assert_eq!(first.get(1), None);
        assert_eq!(second.get_by_name("b"), Some("x"));

        state.handle(complete("SELECT 2")).unwrap();
        assert_eq!(state.label(), "awaiting ReadyForQuery");

        let Step::Complete { result, status } = state.handle(ready()).unwrap() else { panic!() };
        assert_eq!(result.rows_affected, 2);
        assert_eq!(status, TransactionStatus::Idle);
        assert_eq!(state.label(), "finished");
    }

    #[test]
    fn no_data() {
        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(BackendMessage::NoData(NoData)).unwrap();
        assert_eq!(state.label(), "awaiting rows");
        state.handle(complete("CREATE TABLE")).unwrap();
        let Step::Complete { result, .. } = state.handle(ready()).unwrap() else { panic!() };
        assert_eq!(result.tag, "CREATE TABLE");
        assert_eq!(result.rows_affected, 0);
    }

    #[test]
    fn empty_query() {
        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(BackendMessage::NoData(NoData)).unwrap();
        state.handle(BackendMessage::EmptyQueryResponse(EmptyQueryResponse)).unwrap();
        let Step::Complete { result, .. } = state.handle(ready()).unwrap() else { panic!() };
        assert_eq!(result, QueryResult::default());
    }

    #[test]
    fn unexpected_in_every_phase() {
        let mut state = QueryState::new();
        assert_eq!(unexpected(state.handle(ready())), (b'Z', "Parsing"));

        let mut state = QueryState::new();
        state.handle(BackendMessage::ParseComplete(ParseComplete)).unwrap();
        assert_eq!(unexpected(state.handle(complete("SELECT 0"))), (b'C', "Binding"));

        let mut state = QueryState::new();
        prelude(&mut state);
        assert_eq!(unexpected(state.handle(data_row(&[]))), (b'D', "describing result shape"));

        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(description(&["a"])).unwrap();
        assert_eq!(unexpected(state.handle(ready())), (b'Z', "reading DataRows"));

        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(BackendMessage::NoData(NoData)).unwrap();
        assert_eq!(unexpected(state.handle(data_row(&[Some("1")]))), (b'D', "awaiting rows"));

        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(BackendMessage::NoData(NoData)).unwrap();
        state.handle(complete("SET")).unwrap();
        assert_eq!(unexpected(state.handle(complete("SET"))), (b'C', "awaiting ReadyForQuery"));
        assert_eq!(state.label(), "finished");
    }

    #[test]
    fn unexpected_message_display() {
        let mut state = QueryState::new();
        state.handle(BackendMessage::ParseComplete(ParseComplete)).unwrap();
        let err = state.handle(ready()).unwrap_err();
        assert_eq!(err.to_string(), "unexpected message `ReadyForQuery` (`Z`) in state `Binding`");
    }

    #[test]
    fn column_count_mismatch() {
        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(description(&["a", "b"])).unwrap();
        let err = state.handle(data_row(&[Some("1")])).unwrap_err();
        let ProtocolError::ColumnCountMismatch { column_names, values } = err else { panic!() };
        assert_eq!(column_names, ["a", "b"]);
        assert_eq!(values, [Some("1".to_owned())]);
    }

    #[test]
    fn server_error_drains_to_ready() {
        let mut state = QueryState::new();
        state.handle(BackendMessage::ParseComplete(ParseComplete)).unwrap();
        assert!(matches!(state.handle(server_error("ERROR", "42P01")), Ok(Step::Continue)));
        assert_eq!(state.label(), "awaiting ReadyForQuery");

        // nothing but ReadyForQuery after the backend skipped to Sync
        let Step::ServerError { error, status } = state.handle(ready()).unwrap() else { panic!() };
        assert_eq!(error.code, "42P01");
        assert_eq!(status, TransactionStatus::Idle);
        assert_eq!(state.label(), "finished");
    }

    #[test]
    fn only_ready_after_server_error() {
        let mut state = QueryState::new();
        state.handle(server_error("ERROR", "42601")).unwrap();
        assert_eq!(unexpected(state.handle(complete("SELECT 1"))), (b'C', "awaiting ReadyForQuery"));
    }

    #[test]
    fn error_after_command_complete() {
        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(BackendMessage::NoData(NoData)).unwrap();
        state.handle(complete("INSERT 0 1")).unwrap();
        state.handle(server_error("ERROR", "23505")).unwrap();
        assert!(matches!(state.handle(ready()), Ok(Step::ServerError { .. })));
    }

    #[test]
    fn fatal_error() {
        let mut state = QueryState::new();
        prelude(&mut state);
        state.handle(BackendMessage::NoData(NoData)).unwrap();
        let Step::FatalError(err) = state.handle(server_error("FATAL", "57P01")).unwrap() else { panic!() };
        assert_eq!(err.code, "57P01");
        assert_eq!(state.label(), "finished");
    }

    #[test]
    fn expect_no_data_executes_after_no_data() {
        let mut state = QueryState::no_data();
        prelude(&mut state);
        assert!(matches!(state.handle(BackendMessage::NoData(NoData)), Ok(Step::Execute)));
        state.handle(complete("CREATE TABLE")).unwrap();
        let Step::Complete { result, .. } = state.handle(ready()).unwrap() else { panic!() };
        assert_eq!(result.tag, "CREATE TABLE");
    }

    #[test]
    fn expect_no_data_rejects_row_description() {
        let mut state = QueryState::no_data();
        prelude(&mut state);
        assert!(matches!(state.handle(description(&["id"])), Ok(Step::Sync)));
        assert_eq!(unexpected(state.handle(data_row(&[Some("1")]))), (b'D', "awaiting ReadyForQuery"));

        let mut state = QueryState::no_data();
        prelude(&mut state);
        state.handle(description(&["id", "name"])).unwrap();
        let Step::Rejected { columns, status } = state.handle(ready()).unwrap() else { panic!() };
        assert_eq!(columns, ["id", "name"]);
        assert_eq!(status, TransactionStatus::Idle);
    }

    #[test]
    fn expect_no_data_syncs_once_after_error() {
        let mut state = QueryState::no_data();
        state.handle(BackendMessage::ParseComplete(ParseComplete)).unwrap();
        assert!(matches!(state.handle(server_error("ERROR", "42601")), Ok(Step::Sync)));
        assert!(matches!(state.handle(ready()), Ok(Step::ServerError { .. })));

        // after Execute the pending Sync ends the exchange
        let mut state = QueryState::no_data();
        prelude(&mut state);
        assert!(matches!(state.handle(BackendMessage::NoData(NoData)), Ok(Step::Execute)));
        assert!(matches!(state.handle(server_error("ERROR", "23505")), Ok(Step::Continue)));
        assert!(matches!(state.handle(ready()), Ok(Step::ServerError { .. })));
    }
}
