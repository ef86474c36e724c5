//! Ingestion pipeline orchestration.
//!
//! Coordinates one ingestion run: decode (JSON or YAML) → normalize →
//! categorize → storage. Re-ingesting a document under the same API key
//! replaces the previous rows in one storage transaction, so readers see
//! either the old set or the new one, never a mix or nothing.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

use api_atlas_core::categorize::categorize;
use api_atlas_core::models::NewApiMetadata;
use api_atlas_core::spec::{FlatteningCollision, ParsedSpec};
use api_atlas_core::store::{ApiContent, BatchReport, ReplaceReport, Store};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub api_id: i64,
    pub api_key: String,
    pub title: String,
    pub version: String,
    pub spec_format: String,
    pub spec_hash: String,
    /// Whether an earlier ingestion under the same key was replaced.
    pub replaced: bool,
    pub endpoints: BatchReport,
    pub schemas: BatchReport,
    pub categories: BatchReport,
    pub flattening_collisions: Vec<FlatteningCollision>,
}

/// A decoded specification file and the hash of its raw bytes.
pub struct SpecDocument {
    pub value: Value,
    pub hash: String,
}

/// Read a specification file, accepting JSON or YAML regardless of
/// extension.
pub fn load_spec_document(path: &Path) -> Result<SpecDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read specification: {}", path.display()))?;
    parse_spec_document(&raw)
}

pub fn parse_spec_document(raw: &str) -> Result<SpecDocument> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => serde_yaml::from_str(raw)
            .with_context(|| "Specification is neither valid JSON nor valid YAML")?,
    };

    Ok(SpecDocument {
        value,
        hash: content_hash(raw),
    })
}

pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Ingest a decoded document into any [`Store`].
///
/// The API key defaults to the document title when `api_key` is `None`.
pub async fn ingest_document<S: Store + ?Sized>(
    store: &S,
    doc: &SpecDocument,
    api_key: Option<&str>,
) -> Result<IngestReport> {
    let spec = ParsedSpec::from_value(&doc.value)?;
    let api_key = api_key
        .map(str::to_string)
        .unwrap_or_else(|| spec.title.clone());

    let collisions = spec.flattening_collisions();
    for c in &collisions {
        tracing::warn!(
            flattened = %c.flattened,
            originals = ?c.original_names,
            "schema names collide after flattening; first declaration kept"
        );
    }

    let categorization = categorize(&spec);
    let metadata = NewApiMetadata {
        api_key: api_key.clone(),
        title: spec.title.clone(),
        version: spec.version.clone(),
        description: spec.description.clone(),
        base_url: spec.base_url.clone(),
        servers: spec.servers.clone(),
        spec_format: spec.format.to_string(),
        spec_hash: doc.hash.clone(),
    };
    let ReplaceReport {
        api,
        replaced,
        endpoints,
        schemas,
        categories,
    } = store
        .replace_api(
            &metadata,
            ApiContent {
                endpoints: &categorization.endpoints,
                schemas: &spec.schemas,
                categories: &categorization.catalog,
            },
        )
        .await
        .with_context(|| format!("Failed to store API '{}'; previous data kept", api_key))?;
    if replaced {
        tracing::info!(api_key = %api_key, "replaced previous ingestion");
    }

    tracing::info!(
        api_id = api.id,
        api_key = %api.api_key,
        endpoints = endpoints.inserted,
        schemas = schemas.inserted,
        categories = categories.inserted,
        skipped = endpoints.skipped_count() + schemas.skipped_count() + categories.skipped_count(),
        "ingestion complete"
    );

    Ok(IngestReport {
        api_id: api.id,
        api_key: api.api_key,
        title: api.title,
        version: api.version,
        spec_format: api.spec_format,
        spec_hash: api.spec_hash,
        replaced,
        endpoints,
        schemas,
        categories,
        flattening_collisions: collisions,
    })
}

/// Ingest a file into the configured SQLite database.
///
/// Identity precedence: `name_override`, then `[api] name`, then the
/// document title.
pub async fn ingest_file(
    config: &Config,
    path: &Path,
    name_override: Option<&str>,
) -> Result<IngestReport> {
    let doc = load_spec_document(path)?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool.clone());

    let api_key = name_override.or(config.api.name.as_deref());
    let report = ingest_document(&store, &doc, api_key).await;
    pool.close().await;
    report
}

pub fn print_report(path: &Path, report: &IngestReport) {
    println!("ingest {}", path.display());
    println!("  api: {} ({} {})", report.api_key, report.title, report.version);
    println!("  format: {}", report.spec_format);
    println!("  sha256: {}", report.spec_hash);
    if report.replaced {
        println!("  replaced previous ingestion");
    }
    print_batch("endpoints", &report.endpoints);
    print_batch("schemas", &report.schemas);
    print_batch("categories", &report.categories);
    for c in &report.flattening_collisions {
        println!(
            "  collision: {} <- {}",
            c.flattened,
            c.original_names.join(", ")
        );
    }
    println!("ok");
}

fn print_batch(label: &str, batch: &BatchReport) {
    if batch.skipped.is_empty() {
        println!("  {}: {}", label, batch.inserted);
    } else {
        println!(
            "  {}: {} (skipped {}: {})",
            label,
            batch.inserted,
            batch.skipped_count(),
            batch.skipped.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_atlas_core::store::memory::InMemoryStore;

    const YAML_SPEC: &str = r#"
openapi: 3.0.3
info:
  title: Shop
  version: "2.1"
servers:
  - url: https://shop.example.com/api
paths:
  /orders:
    get:
      tags: [orders]
      summary: List orders
    post:
      tags: [orders]
      summary: Place an order
components:
  schemas:
    Order:
      type: object
      properties:
        id: {type: integer}
"#;

    #[test]
    fn yaml_documents_are_accepted() {
        let doc = parse_spec_document(YAML_SPEC).unwrap();
        assert_eq!(doc.value["info"]["title"], "Shop");
        assert_eq!(doc.hash.len(), 64);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_spec_document("{ not: [valid").is_err());
    }

    #[tokio::test]
    async fn title_is_default_identity_and_reingest_replaces() {
        let store = InMemoryStore::new();
        let doc = parse_spec_document(YAML_SPEC).unwrap();

        let first = ingest_document(&store, &doc, None).await.unwrap();
        assert_eq!(first.api_key, "Shop");
        assert!(!first.replaced);
        assert_eq!(first.endpoints.inserted, 2);
        assert_eq!(first.schemas.inserted, 1);

        let second = ingest_document(&store, &doc, None).await.unwrap();
        assert!(second.replaced);
        assert_ne!(first.api_id, second.api_id);
        assert_eq!(store.list_apis().await.unwrap().len(), 1);
        assert!(store
            .search_endpoint_candidates(first.api_id, None, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failed_reingest_keeps_the_served_api() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&format!(
                "sqlite:{}?mode=rwc",
                tmp.path().join("atlas.sqlite").display()
            ))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        let store = SqliteStore::new(pool.clone());

        let doc = parse_spec_document(YAML_SPEC).unwrap();
        let first = ingest_document(&store, &doc, None).await.unwrap();

        // Category rows are written last; rejecting them fails the run
        // after endpoints and schemas have already been inserted.
        sqlx::query(
            "CREATE TRIGGER reject_categories BEFORE INSERT ON categories \
             BEGIN SELECT RAISE(ABORT, 'category writes disabled'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let updated = parse_spec_document(&YAML_SPEC.replace("\"2.1\"", "\"3.0\"")).unwrap();
        assert!(ingest_document(&store, &updated, None).await.is_err());

        let kept = store.get_api_by_key("Shop").await.unwrap().unwrap();
        assert_eq!(kept.id, first.api_id);
        assert_eq!(kept.version, "2.1");
        assert_eq!(kept.spec_hash, doc.hash);
        let counts = store.table_counts(kept.id).await.unwrap();
        assert_eq!(counts.endpoints, 2);
        assert_eq!(counts.schemas, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn non_openapi_documents_fail() {
        let store = InMemoryStore::new();
        let doc = parse_spec_document(r#"{"hello": "world"}"#).unwrap();
        assert!(ingest_document(&store, &doc, Some("x")).await.is_err());
    }
}
