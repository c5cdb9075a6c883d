use pglink::{Connection, Encode, ErrorKind, Result};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    // recoverable, the connection stays idle
    let err = conn.execute("SELECT foo", &[]).await.unwrap_err();
    tracing::info!(%err, state = ?conn.state());

    let err = conn.query_expect_no_data("SELECT 1").await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnexpectedRows { .. }));

    // a failure while idle is observed by the monitor
    let mut victim = Connection::connect_env().await?;
    let finished = victim.close_finished();
    let pid = victim.backend_key().map(|key| key.process_id as i32);

    conn.execute("SELECT pg_terminate_backend($1)", &[pid.encode()]).await?;

    if let Err(err) = finished.await {
        tracing::info!(%err, "victim terminated");
    }

    let err = victim.execute("SELECT 1", &[]).await.unwrap_err();
    tracing::info!(%err, state = ?victim.state());

    conn.close().await
}
