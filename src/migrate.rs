use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS apis (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            api_key TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            version TEXT NOT NULL,
            description TEXT,
            base_url TEXT NOT NULL,
            servers_json TEXT NOT NULL DEFAULT '[]',
            spec_format TEXT NOT NULL,
            spec_hash TEXT NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS endpoints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            api_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            method TEXT NOT NULL,
            operation_id TEXT,
            summary TEXT,
            description TEXT,
            parameters_json TEXT NOT NULL DEFAULT '[]',
            request_body_ref TEXT,
            request_body_schema_json TEXT,
            response_refs_json TEXT NOT NULL DEFAULT '[]',
            tags_json TEXT NOT NULL DEFAULT '[]',
            category TEXT NOT NULL,
            deprecated INTEGER NOT NULL DEFAULT 0,
            auth_json TEXT,
            UNIQUE(api_id, path, method),
            FOREIGN KEY (api_id) REFERENCES apis(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schemas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            api_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            original_name TEXT NOT NULL,
            description TEXT,
            schema_type TEXT,
            properties_json TEXT NOT NULL DEFAULT '{}',
            required_json TEXT NOT NULL DEFAULT '[]',
            example_json TEXT,
            refs_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(api_id, name),
            FOREIGN KEY (api_id) REFERENCES apis(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            api_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            display_name TEXT NOT NULL,
            group_name TEXT,
            description TEXT,
            endpoint_count INTEGER NOT NULL DEFAULT 0,
            http_methods_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(api_id, name),
            FOREIGN KEY (api_id) REFERENCES apis(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    create_fts_table(
        pool,
        "endpoints_fts",
        r#"
        CREATE VIRTUAL TABLE endpoints_fts USING fts5(
            endpoint_id UNINDEXED,
            api_id UNINDEXED,
            path,
            summary,
            description,
            params
        )
        "#,
    )
    .await?;

    create_fts_table(
        pool,
        "schemas_fts",
        r#"
        CREATE VIRTUAL TABLE schemas_fts USING fts5(
            schema_id UNINDEXED,
            api_id UNINDEXED,
            name,
            description,
            props
        )
        "#,
    )
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_endpoints_api_path ON endpoints(api_id, path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_endpoints_api_method ON endpoints(api_id, method)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_schemas_api ON schemas(api_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_categories_api ON categories(api_id)")
        .execute(pool)
        .await?;

    tracing::debug!("migrations applied");
    Ok(())
}

async fn create_fts_table(pool: &SqlitePool, name: &str, ddl: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    if !exists {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}
