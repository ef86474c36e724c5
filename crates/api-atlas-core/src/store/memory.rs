//! In-memory [`Store`] implementation for tests and embedding.
//!
//! All tables live behind one `std::sync::RwLock`, so every batch is
//! applied atomically. Keyword search counts prefix hits per token instead
//! of bm25 but keeps the same "every token required" semantics.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::categorize::CategorizedEndpoint;
use crate::error::{AtlasError, Result};
use crate::models::{ApiMetadata, Endpoint, EndpointCategory, NewApiMetadata, SchemaComponent};
use crate::spec::ParsedSchema;

use super::{
    keyword_tokens, ApiContent, BatchReport, EndpointCandidate, ReplaceReport, SchemaCandidate,
    Store,
};

#[derive(Default)]
struct Tables {
    apis: Vec<ApiMetadata>,
    endpoints: Vec<Endpoint>,
    schemas: Vec<SchemaComponent>,
    categories: Vec<(i64, EndpointCategory)>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AtlasError::Storage("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AtlasError::Storage("in-memory store lock poisoned".into()))
    }
}

/// Number of `(token, word)` prefix hits, or `None` when some token has
/// no hit at all.
fn prefix_hits(tokens: &[String], words: &[String]) -> Option<usize> {
    let mut total = 0;
    for token in tokens {
        let hits = words.iter().filter(|w| w.starts_with(token.as_str())).count();
        if hits == 0 {
            return None;
        }
        total += hits;
    }
    Some(total)
}

fn endpoint_words(e: &Endpoint) -> Vec<String> {
    let mut text = e.path.clone();
    for part in [&e.summary, &e.description].into_iter().flatten() {
        text.push(' ');
        text.push_str(part);
    }
    for p in &e.parameters {
        text.push(' ');
        text.push_str(&p.name);
    }
    keyword_tokens(&text)
}

fn schema_words(s: &SchemaComponent) -> Vec<String> {
    let mut text = s.name.clone();
    if let Some(d) = &s.description {
        text.push(' ');
        text.push_str(d);
    }
    for name in s.properties.keys() {
        text.push(' ');
        text.push_str(name);
    }
    keyword_tokens(&text)
}

fn by_rank_then<T>(a: (f64, T), b: (f64, T)) -> std::cmp::Ordering
where
    T: Ord,
{
    a.0.partial_cmp(&b.0)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.1.cmp(&b.1))
}

impl Tables {
    fn insert_api(&mut self, api: &NewApiMetadata) -> Result<ApiMetadata> {
        if self.apis.iter().any(|a| a.api_key == api.api_key) {
            return Err(AtlasError::DuplicateEntity(format!("api {}", api.api_key)));
        }
        let id = self.next_id();
        let row = ApiMetadata {
            id,
            api_key: api.api_key.clone(),
            title: api.title.clone(),
            version: api.version.clone(),
            description: api.description.clone(),
            base_url: api.base_url.clone(),
            servers: api.servers.clone(),
            spec_format: api.spec_format.clone(),
            spec_hash: api.spec_hash.clone(),
            ingested_at: chrono::Utc::now().timestamp(),
        };
        self.apis.push(row.clone());
        Ok(row)
    }

    fn remove_api(&mut self, api_key: &str) -> bool {
        let Some(pos) = self.apis.iter().position(|a| a.api_key == api_key) else {
            return false;
        };
        let api_id = self.apis.remove(pos).id;
        self.endpoints.retain(|e| e.api_id != api_id);
        self.schemas.retain(|s| s.api_id != api_id);
        self.categories.retain(|(owner, _)| *owner != api_id);
        true
    }

    fn insert_endpoints(&mut self, api_id: i64, endpoints: &[CategorizedEndpoint]) -> BatchReport {
        let mut report = BatchReport::default();
        for ce in endpoints {
            let e = &ce.endpoint;
            let method = e.method.to_ascii_uppercase();
            let exists = self
                .endpoints
                .iter()
                .any(|x| x.api_id == api_id && x.path == e.path && x.method == method);
            if exists {
                report.skipped.push(format!("{} {}", method, e.path));
                continue;
            }
            let id = self.next_id();
            self.endpoints.push(Endpoint {
                id,
                api_id,
                path: e.path.clone(),
                method,
                operation_id: e.operation_id.clone(),
                summary: e.summary.clone(),
                description: e.description.clone(),
                parameters: e.parameters.clone(),
                request_body_ref: e.request_body_ref.clone(),
                request_body_schema: e.request_body_schema.clone(),
                response_refs: e.response_refs.clone(),
                tags: e.tags.clone(),
                category: ce.category.clone(),
                deprecated: e.deprecated,
                auth: e.auth.clone(),
            });
            report.inserted += 1;
        }
        report
    }

    fn insert_schemas(&mut self, api_id: i64, schemas: &[ParsedSchema]) -> BatchReport {
        let mut report = BatchReport::default();
        for s in schemas {
            if self.schemas.iter().any(|x| x.api_id == api_id && x.name == s.name) {
                report.skipped.push(s.original_name.clone());
                continue;
            }
            let id = self.next_id();
            self.schemas.push(SchemaComponent {
                id,
                api_id,
                name: s.name.clone(),
                original_name: s.original_name.clone(),
                description: s.description.clone(),
                schema_type: s.schema_type.clone(),
                properties: s.properties.clone(),
                required: s.required.clone(),
                example: s.example.clone(),
                refs: s.refs.clone(),
            });
            report.inserted += 1;
        }
        report
    }

    fn insert_categories(&mut self, api_id: i64, categories: &[EndpointCategory]) -> BatchReport {
        let mut report = BatchReport::default();
        for c in categories {
            if self
                .categories
                .iter()
                .any(|(owner, x)| *owner == api_id && x.name == c.name)
            {
                report.skipped.push(c.name.clone());
                continue;
            }
            self.categories.push((api_id, c.clone()));
            report.inserted += 1;
        }
        report
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_api_metadata(&self, api: &NewApiMetadata) -> Result<ApiMetadata> {
        self.write()?.insert_api(api)
    }

    async fn delete_api(&self, api_key: &str) -> Result<bool> {
        Ok(self.write()?.remove_api(api_key))
    }

    async fn replace_api(
        &self,
        api: &NewApiMetadata,
        content: ApiContent<'_>,
    ) -> Result<ReplaceReport> {
        let mut t = self.write()?;
        let replaced = t.remove_api(&api.api_key);
        let api = t.insert_api(api)?;
        let endpoints = t.insert_endpoints(api.id, content.endpoints);
        let schemas = t.insert_schemas(api.id, content.schemas);
        let categories = t.insert_categories(api.id, content.categories);
        Ok(ReplaceReport {
            api,
            replaced,
            endpoints,
            schemas,
            categories,
        })
    }

    async fn create_endpoints(
        &self,
        api_id: i64,
        endpoints: &[CategorizedEndpoint],
    ) -> Result<BatchReport> {
        Ok(self.write()?.insert_endpoints(api_id, endpoints))
    }

    async fn create_schemas(&self, api_id: i64, schemas: &[ParsedSchema]) -> Result<BatchReport> {
        Ok(self.write()?.insert_schemas(api_id, schemas))
    }

    async fn create_categories(
        &self,
        api_id: i64,
        categories: &[EndpointCategory],
    ) -> Result<BatchReport> {
        Ok(self.write()?.insert_categories(api_id, categories))
    }

    async fn get_api_metadata(&self, api_id: i64) -> Result<Option<ApiMetadata>> {
        Ok(self.read()?.apis.iter().find(|a| a.id == api_id).cloned())
    }

    async fn get_api_by_key(&self, api_key: &str) -> Result<Option<ApiMetadata>> {
        Ok(self
            .read()?
            .apis
            .iter()
            .find(|a| a.api_key == api_key)
            .cloned())
    }

    async fn list_apis(&self) -> Result<Vec<ApiMetadata>> {
        Ok(self.read()?.apis.clone())
    }

    async fn get_endpoint(&self, api_id: i64, id: i64) -> Result<Option<Endpoint>> {
        Ok(self
            .read()?
            .endpoints
            .iter()
            .find(|e| e.api_id == api_id && e.id == id)
            .cloned())
    }

    async fn get_endpoint_by_path(
        &self,
        api_id: i64,
        path: &str,
        method: Option<&str>,
    ) -> Result<Option<Endpoint>> {
        Ok(self
            .read()?
            .endpoints
            .iter()
            .filter(|e| e.api_id == api_id && e.path == path)
            .filter(|e| method.map_or(true, |m| e.method == m))
            .min_by_key(|e| e.id)
            .cloned())
    }

    async fn search_endpoint_candidates(
        &self,
        api_id: i64,
        keywords: Option<&str>,
        method: Option<&str>,
    ) -> Result<Vec<EndpointCandidate>> {
        let tokens = keywords.map(keyword_tokens).unwrap_or_default();
        let t = self.read()?;
        let mut out: Vec<EndpointCandidate> = t
            .endpoints
            .iter()
            .filter(|e| e.api_id == api_id)
            .filter(|e| method.map_or(true, |m| e.method == m))
            .filter_map(|e| {
                let rank = if tokens.is_empty() {
                    None
                } else {
                    Some(-(prefix_hits(&tokens, &endpoint_words(e))? as f64))
                };
                Some(EndpointCandidate {
                    id: e.id,
                    path: e.path.clone(),
                    method: e.method.clone(),
                    operation_id: e.operation_id.clone(),
                    summary: e.summary.clone(),
                    tags: e.tags.clone(),
                    category: e.category.clone(),
                    deprecated: e.deprecated,
                    rank,
                })
            })
            .collect();
        out.sort_by(|a, b| by_rank_then((a.rank.unwrap_or(0.0), a.id), (b.rank.unwrap_or(0.0), b.id)));
        Ok(out)
    }

    async fn get_schema(&self, api_id: i64, name: &str) -> Result<Option<SchemaComponent>> {
        Ok(self
            .read()?
            .schemas
            .iter()
            .find(|s| s.api_id == api_id && s.name == name)
            .cloned())
    }

    async fn list_schema_names(&self, api_id: i64) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .read()?
            .schemas
            .iter()
            .filter(|s| s.api_id == api_id)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn list_categories(&self, api_id: i64) -> Result<Vec<EndpointCategory>> {
        let mut cats: Vec<EndpointCategory> = self
            .read()?
            .categories
            .iter()
            .filter(|(owner, _)| *owner == api_id)
            .map(|(_, c)| c.clone())
            .collect();
        cats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cats)
    }

    async fn search_schemas(
        &self,
        api_id: i64,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<SchemaCandidate>> {
        let tokens = keyword_tokens(keywords);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let t = self.read()?;
        let mut out: Vec<SchemaCandidate> = t
            .schemas
            .iter()
            .filter(|s| s.api_id == api_id)
            .filter_map(|s| {
                let hits = prefix_hits(&tokens, &schema_words(s))?;
                Some(SchemaCandidate {
                    name: s.name.clone(),
                    description: s.description.clone(),
                    rank: -(hits as f64),
                })
            })
            .collect();
        out.sort_by(|a, b| by_rank_then((a.rank, &a.name), (b.rank, &b.name)));
        out.truncate(limit);
        Ok(out)
    }
}
