use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Open the pooled connection used for both ingestion and serving.
///
/// WAL mode lets the read pool run concurrently with a writer; the busy
/// timeout turns short lock contention into waiting instead of `SQLITE_BUSY`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.db.acquire_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .acquire_timeout(Duration::from_millis(config.db.acquire_timeout_ms))
        .connect_with(options)
        .await?;

    tracing::debug!(
        path = %db_path.display(),
        max_connections = config.db.max_connections,
        "connected to database"
    );

    Ok(pool)
}
