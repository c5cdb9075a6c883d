use std::env::var;
use pglink::{Config, Connection, Result};


pub async fn main() -> Result<()> {

    let config = Config::parse(&var("DATABASE_URL").unwrap())?;
    let mut conn = Connection::connect(&config).await?;
    conn.execute("SELECT 1", &[]).await?;
    conn.close().await?;

    let mut conn = Connection::connect_env().await?;
    tracing::info!(
        server_version = ?conn.parameter("server_version"),
        backend_key = ?conn.backend_key(),
        "connected",
    );
    conn.close().await?;

    let tag = pglink::with_connection(&config, |conn| Box::pin(async move {
        Ok(conn.execute("SELECT 1", &[]).await?.tag)
    }))
    .await?;
    tracing::info!(%tag, "scoped connection");

    Ok(())
}
