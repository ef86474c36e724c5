//! Database overview for `atlas stats`.
//!
//! Lists every ingested API with its row counts so an operator can confirm
//! an ingestion landed before starting the server.

use anyhow::Result;

use api_atlas_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool.clone());

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let apis = store.list_apis().await?;

    println!("API Atlas: Database Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  APIs:        {}", apis.len());

    if !apis.is_empty() {
        println!();
        println!(
            "  {:<24} {:<10} {:<16} {:>9} {:>8} {:>10}   {}",
            "API", "VERSION", "FORMAT", "ENDPOINTS", "SCHEMAS", "CATEGORIES", "INGESTED"
        );
        println!("  {}", "-".repeat(100));

        for api in &apis {
            let counts = store.table_counts(api.id).await?;
            println!(
                "  {:<24} {:<10} {:<16} {:>9} {:>8} {:>10}   {}",
                api.api_key,
                api.version,
                api.spec_format,
                counts.endpoints,
                counts.schemas,
                counts.categories,
                format_ts(api.ingested_at)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
