//! Storage abstraction for API Atlas.
//!
//! The [`Store`] trait defines every storage operation needed by ingestion
//! and the query engine, so the same query code runs against SQLite in the
//! application crate and against [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::categorize::CategorizedEndpoint;
use crate::error::Result;
use crate::models::{ApiMetadata, Endpoint, EndpointCategory, NewApiMetadata, SchemaComponent};
use crate::spec::ParsedSchema;

/// Outcome of a batch insert. Rows rejected by a unique key are skipped,
/// not fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub inserted: usize,
    /// Natural keys of the skipped rows (`GET /pets`, a schema name, ...).
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Everything one ingestion writes under a single API row.
#[derive(Debug, Clone, Copy)]
pub struct ApiContent<'a> {
    pub endpoints: &'a [CategorizedEndpoint],
    pub schemas: &'a [ParsedSchema],
    pub categories: &'a [EndpointCategory],
}

/// Outcome of [`Store::replace_api`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaceReport {
    pub api: ApiMetadata,
    /// Whether an earlier API with the same key was removed.
    pub replaced: bool,
    pub endpoints: BatchReport,
    pub schemas: BatchReport,
    pub categories: BatchReport,
}

/// A lightweight endpoint row returned by candidate search.
///
/// Carries enough to apply category filters, paginate, and build result
/// summaries without fetching the full endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCandidate {
    pub id: i64,
    pub path: String,
    pub method: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub category: String,
    pub deprecated: bool,
    /// bm25 rank for keyword queries (lower is better), `None` otherwise.
    pub rank: Option<f64>,
}

/// A ranked schema full-text hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCandidate {
    pub name: String,
    pub description: Option<String>,
    pub rank: f64,
}

/// Split free-text keywords into lower-case alphanumeric tokens.
///
/// Matches how the FTS5 `unicode61` tokenizer splits indexed text, so a
/// keyword such as `/pets/{id}` becomes `pets` and `id`.
pub fn keyword_tokens(keywords: &str) -> Vec<String> {
    keywords
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// FTS5 `MATCH` expression requiring every token as a quoted prefix.
///
/// Returns `None` when the keywords contain no searchable token.
pub fn fts_match_expression(keywords: &str) -> Option<String> {
    let tokens = keyword_tokens(keywords);
    if tokens.is_empty() {
        return None;
    }
    Some(
        tokens
            .iter()
            .map(|t| format!("\"{}\"*", t))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// Abstract storage backend for API Atlas.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_api_metadata`](Store::create_api_metadata) | Insert the owning API row |
/// | [`delete_api`](Store::delete_api) | Remove an API and everything it owns |
/// | [`replace_api`](Store::replace_api) | Delete and re-create an API in one unit |
/// | [`create_endpoints`](Store::create_endpoints) | Transactional endpoint batch |
/// | [`create_schemas`](Store::create_schemas) | Transactional schema batch |
/// | [`create_categories`](Store::create_categories) | Transactional category batch |
/// | [`search_endpoint_candidates`](Store::search_endpoint_candidates) | Ranked or full endpoint scan |
/// | [`search_schemas`](Store::search_schemas) | Ranked schema full-text search |
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_api_metadata(&self, api: &NewApiMetadata) -> Result<ApiMetadata>;

    /// Delete the API with `api_key` and all rows it owns, in one
    /// transaction. Returns whether anything was removed.
    async fn delete_api(&self, api_key: &str) -> Result<bool>;

    /// Remove any API stored under `api.api_key` and write `api` with
    /// `content` in its place. Either every row lands or none does: on
    /// error the previous API is still intact.
    async fn replace_api(
        &self,
        api: &NewApiMetadata,
        content: ApiContent<'_>,
    ) -> Result<ReplaceReport>;

    async fn create_endpoints(
        &self,
        api_id: i64,
        endpoints: &[CategorizedEndpoint],
    ) -> Result<BatchReport>;

    async fn create_schemas(&self, api_id: i64, schemas: &[ParsedSchema]) -> Result<BatchReport>;

    async fn create_categories(
        &self,
        api_id: i64,
        categories: &[EndpointCategory],
    ) -> Result<BatchReport>;

    async fn get_api_metadata(&self, api_id: i64) -> Result<Option<ApiMetadata>>;

    async fn get_api_by_key(&self, api_key: &str) -> Result<Option<ApiMetadata>>;

    async fn list_apis(&self) -> Result<Vec<ApiMetadata>>;

    async fn get_endpoint(&self, api_id: i64, id: i64) -> Result<Option<Endpoint>>;

    /// Lowest-id endpoint with exactly `path`, optionally restricted to
    /// `method` (upper-case).
    async fn get_endpoint_by_path(
        &self,
        api_id: i64,
        path: &str,
        method: Option<&str>,
    ) -> Result<Option<Endpoint>>;

    /// Endpoint candidates, ranked by relevance then id when `keywords`
    /// holds a searchable token, ordered by id otherwise.
    async fn search_endpoint_candidates(
        &self,
        api_id: i64,
        keywords: Option<&str>,
        method: Option<&str>,
    ) -> Result<Vec<EndpointCandidate>>;

    async fn get_schema(&self, api_id: i64, name: &str) -> Result<Option<SchemaComponent>>;

    async fn list_schema_names(&self, api_id: i64) -> Result<Vec<String>>;

    async fn list_categories(&self, api_id: i64) -> Result<Vec<EndpointCategory>>;

    async fn search_schemas(
        &self,
        api_id: i64,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<SchemaCandidate>>;
}
