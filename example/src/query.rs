use pglink::{Connection, Encode, Result};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    conn.query_expect_no_data(
        "CREATE TEMP TABLE post(
            id serial primary key,
            name text not null,
            score float8
        )",
    )
    .await?;

    for (name, score) in [("foo", Some(4.2)), ("bar", None), ("baz", Some(f64::NAN))] {
        conn.execute(
            "INSERT INTO post(name, score) VALUES ($1, $2)",
            &[name.encode(), score.encode()],
        )
        .await?;
    }

    let result = conn
        .query("SELECT id, name, score FROM post ORDER BY id", &[], |row| {
            tracing::info!(?row);
        })
        .await?;
    assert_eq!(result.rows_affected, 3);

    let begin = conn.execute("BEGIN", &[]).await?;
    tracing::info!(tag = %begin.tag, status = ?conn.transaction_status());
    conn.execute("ROLLBACK", &[]).await?;

    conn.close().await
}
