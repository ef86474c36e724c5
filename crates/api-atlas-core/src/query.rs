//! The four query operations: `searchEndpoints`, `getSchema`, `getExample`,
//! and `getEndpointCategories`.
//!
//! Every operation works through the [`Store`] trait plus a read-only
//! [`CatalogSnapshot`]; nothing here owns a connection or a runtime. Request
//! validation runs before the first storage call, so a rejected request
//! never touches the backend.
//!
//! # Search pipeline
//!
//! 1. Validate and normalize the request (empty strings mean "absent").
//! 2. Fetch candidates: bm25-ranked when keywords are present, id-ordered
//!    otherwise, already restricted to the requested method.
//! 3. Apply category / category-group membership against each tag.
//! 4. Min-max normalize keyword ranks to `[0, 1]`.
//! 5. Paginate.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::categorize::tag_matches_category;
use crate::error::{AtlasError, Result};
use crate::models::{method_has_body, ApiMetadata, Endpoint, EndpointCategory, HTTP_METHODS};
use crate::schema::{
    example_for_component, example_for_schema, fetch_component_closure, resolve_references,
    ResolvedReference, DEFAULT_MAX_DEPTH, EXAMPLE_MAX_DEPTH, MAX_DEPTH_LIMIT,
};
use crate::snippet::{join_url, render, Language, RequestShape, Snippet};
use crate::spec::{collect_schema_refs, flatten_schema_name, FLATTENING_RULE};
use crate::store::{keyword_tokens, EndpointCandidate, Store};
use crate::suggest::{suggest, DEFAULT_MAX_SUGGESTIONS};

/// Read-only per-API state shared by every query.
///
/// Built once after ingestion (or on reload) and shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub api: ApiMetadata,
    pub categories: Vec<EndpointCategory>,
    pub schema_names: Vec<String>,
}

impl CatalogSnapshot {
    /// Load the snapshot for `api_id`, or `None` when no such API exists.
    pub async fn load<S: Store + ?Sized>(store: &S, api_id: i64) -> Result<Option<Self>> {
        let Some(api) = store.get_api_metadata(api_id).await? else {
            return Ok(None);
        };
        Ok(Some(Self {
            categories: store.list_categories(api_id).await?,
            schema_names: store.list_schema_names(api_id).await?,
            api,
        }))
    }

    pub fn category(&self, name: &str) -> Option<&EndpointCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Distinct parent groups, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .categories
            .iter()
            .filter_map(|c| c.group.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        groups.sort();
        groups
    }
}

/// Tunables the query engine reads from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLimits {
    pub default_per_page: usize,
    pub max_per_page: usize,
    pub default_max_depth: usize,
    pub max_suggestions: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
            default_max_depth: DEFAULT_MAX_DEPTH,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }
}

fn provided(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ─── searchEndpoints ─────────────────────────────────────────────────

/// `searchEndpoints` arguments as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchEndpointsRequest {
    pub keywords: Option<String>,
    pub http_method: Option<String>,
    pub category: Option<String>,
    pub category_group: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A validated search.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSearch {
    pub keywords: Option<String>,
    pub http_method: Option<String>,
    pub category: Option<String>,
    pub category_group: Option<String>,
    pub page: usize,
    pub per_page: usize,
}

impl SearchEndpointsRequest {
    /// Check the request without touching storage.
    pub fn validate(&self, limits: &QueryLimits) -> Result<NormalizedSearch> {
        let category = provided(&self.category).map(|c| c.to_lowercase());
        let category_group = provided(&self.category_group);
        if category.is_some() && category_group.is_some() {
            return Err(AtlasError::Validation(
                "category and categoryGroup are mutually exclusive; pass at most one".into(),
            ));
        }

        let http_method = match provided(&self.http_method) {
            Some(m) => {
                let upper = m.to_ascii_uppercase();
                if !HTTP_METHODS.contains(&upper.as_str()) {
                    return Err(AtlasError::Validation(format!(
                        "unknown httpMethod '{}': expected one of {}",
                        m,
                        HTTP_METHODS.join(", ")
                    )));
                }
                Some(upper)
            }
            None => None,
        };

        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(AtlasError::Validation(format!(
                "page must be >= 1, got {}",
                page
            )));
        }
        let per_page = self.per_page.unwrap_or(limits.default_per_page as i64);
        if per_page < 1 || per_page > limits.max_per_page as i64 {
            return Err(AtlasError::Validation(format!(
                "perPage must be between 1 and {}, got {}",
                limits.max_per_page, per_page
            )));
        }

        Ok(NormalizedSearch {
            keywords: provided(&self.keywords),
            http_method,
            category,
            category_group,
            page: page as usize,
            per_page: per_page as usize,
        })
    }
}

/// One endpoint in a search page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub id: i64,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    /// Relevance in `[0, 1]`, keyword queries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total_results: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    pub fn new(page: usize, per_page: usize, total_results: usize) -> Self {
        let total_pages = total_results.div_ceil(per_page);
        Self {
            page,
            per_page,
            total_results,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1,
        }
    }
}

/// Filters echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub keywords: Option<String>,
    pub http_method: Option<String>,
    pub category: Option<String>,
    pub category_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEndpointsResponse {
    pub endpoints: Vec<EndpointSummary>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
}

/// Whether an endpoint belongs to `category`: any tag matches, or the
/// category resolved at ingestion equals it.
pub fn candidate_in_category(candidate: &EndpointCandidate, category: &str) -> bool {
    candidate.category == category
        || candidate
            .tags
            .iter()
            .any(|tag| tag_matches_category(tag, category))
}

/// Min-max normalize bm25 ranks (lower is better) to scores in `[0, 1]`.
fn normalize_ranks(candidates: &[EndpointCandidate]) -> Vec<Option<f64>> {
    let ranks: Vec<f64> = candidates.iter().filter_map(|c| c.rank).collect();
    if ranks.is_empty() {
        return vec![None; candidates.len()];
    }
    let min = ranks.iter().copied().fold(f64::INFINITY, f64::min);
    let max = ranks.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    candidates
        .iter()
        .map(|c| {
            c.rank.map(|r| {
                if range.abs() < f64::EPSILON {
                    1.0
                } else {
                    (max - r) / range
                }
            })
        })
        .collect()
}

/// Run `searchEndpoints`.
pub async fn search_endpoints<S: Store + ?Sized>(
    store: &S,
    catalog: &CatalogSnapshot,
    request: &SearchEndpointsRequest,
    limits: &QueryLimits,
) -> Result<SearchEndpointsResponse> {
    let search = request.validate(limits)?;

    if let Some(category) = &search.category {
        if catalog.category(category).is_none() {
            let names: Vec<String> = catalog.categories.iter().map(|c| c.name.clone()).collect();
            let close = suggest(category, &names, limits.max_suggestions);
            return Err(AtlasError::Validation(format!(
                "unknown category '{}'{}",
                category,
                if close.is_empty() {
                    String::new()
                } else {
                    format!("; did you mean: {}", close.join(", "))
                }
            )));
        }
    }

    let group_categories: Option<Vec<String>> = match &search.category_group {
        Some(group) => {
            let members: Vec<String> = catalog
                .categories
                .iter()
                .filter(|c| {
                    c.group
                        .as_deref()
                        .is_some_and(|g| g.eq_ignore_ascii_case(group))
                })
                .map(|c| c.name.clone())
                .collect();
            if members.is_empty() {
                return Err(AtlasError::Validation(format!(
                    "unknown categoryGroup '{}'; available groups: {}",
                    group,
                    catalog.groups().join(", ")
                )));
            }
            Some(members)
        }
        None => None,
    };

    let candidates = store
        .search_endpoint_candidates(
            catalog.api.id,
            search.keywords.as_deref(),
            search.http_method.as_deref(),
        )
        .await?;

    let matching: Vec<EndpointCandidate> = candidates
        .into_iter()
        .filter(|c| {
            search
                .category
                .as_deref()
                .map_or(true, |cat| candidate_in_category(c, cat))
        })
        .filter(|c| {
            group_categories.as_ref().map_or(true, |members| {
                members.iter().any(|cat| candidate_in_category(c, cat))
            })
        })
        .collect();

    let scores = normalize_ranks(&matching);
    let pagination = Pagination::new(search.page, search.per_page, matching.len());
    let offset = (search.page - 1).saturating_mul(search.per_page);

    let endpoints = matching
        .into_iter()
        .zip(scores)
        .skip(offset)
        .take(search.per_page)
        .map(|(c, score)| EndpointSummary {
            id: c.id,
            method: c.method,
            path: c.path,
            operation_id: c.operation_id,
            summary: c.summary,
            category: c.category,
            tags: c.tags,
            deprecated: c.deprecated,
            score,
        })
        .collect();

    Ok(SearchEndpointsResponse {
        endpoints,
        pagination,
        filters: AppliedFilters {
            keywords: search.keywords,
            http_method: search.http_method,
            category: search.category,
            category_group: search.category_group,
        },
    })
}

// ─── getSchema ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetSchemaRequest {
    pub name: String,
    pub include_examples: Option<bool>,
    pub max_depth: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDetail {
    pub name: String,
    pub original_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    pub max_depth: usize,
    pub references: Vec<ResolvedReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMiss {
    pub requested: String,
    pub flattened_name: String,
    pub suggestions: Vec<String>,
    pub flattening_rule: String,
    pub message: String,
}

/// Outcome of `getSchema`. A miss is a result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SchemaLookup {
    Found(SchemaDetail),
    NotFound(SchemaMiss),
}

impl GetSchemaRequest {
    /// Check the arguments without touching storage; returns the effective
    /// `maxDepth`.
    pub fn validate(&self, limits: &QueryLimits) -> Result<usize> {
        if self.name.trim().is_empty() {
            return Err(AtlasError::Validation("name must not be empty".into()));
        }
        let max_depth = self.max_depth.unwrap_or(limits.default_max_depth as i64);
        if max_depth < 1 || max_depth > MAX_DEPTH_LIMIT as i64 {
            return Err(AtlasError::Validation(format!(
                "maxDepth must be between 1 and {}, got {}",
                MAX_DEPTH_LIMIT, max_depth
            )));
        }
        Ok(max_depth as usize)
    }
}

/// Run `getSchema`.
pub async fn get_schema<S: Store + ?Sized>(
    store: &S,
    catalog: &CatalogSnapshot,
    request: &GetSchemaRequest,
    limits: &QueryLimits,
) -> Result<SchemaLookup> {
    let max_depth = request.validate(limits)?;
    let requested = request.name.trim();
    let include_examples = request.include_examples.unwrap_or(true);
    let flattened = flatten_schema_name(requested);
    let api_id = catalog.api.id;

    let Some(component) = store.get_schema(api_id, &flattened).await? else {
        let mut suggestions = suggest(&flattened, &catalog.schema_names, limits.max_suggestions);
        if suggestions.len() < limits.max_suggestions {
            for hit in store
                .search_schemas(api_id, requested, limits.max_suggestions)
                .await?
            {
                if suggestions.len() >= limits.max_suggestions {
                    break;
                }
                if !suggestions.contains(&hit.name) {
                    suggestions.push(hit.name);
                }
            }
        }
        return Ok(SchemaLookup::NotFound(SchemaMiss {
            requested: requested.to_string(),
            message: format!("No schema named '{}'", flattened),
            flattened_name: flattened,
            suggestions,
            flattening_rule: FLATTENING_RULE.to_string(),
        }));
    };

    let references = resolve_references(store, api_id, &component, max_depth).await?;
    let example = if include_examples {
        match &component.example {
            Some(e) => Some(e.clone()),
            None => {
                let closure =
                    fetch_component_closure(store, api_id, &component.refs, EXAMPLE_MAX_DEPTH)
                        .await?;
                Some(example_for_component(&component, &closure))
            }
        }
    } else {
        None
    };

    Ok(SchemaLookup::Found(SchemaDetail {
        name: component.name,
        original_name: component.original_name,
        description: component.description,
        schema_type: component.schema_type,
        properties: component.properties,
        required: component.required,
        example,
        max_depth,
        references,
    }))
}

// ─── getExample ──────────────────────────────────────────────────────

/// An endpoint identifier: a primary key, or text (numeric string, path
/// with optional method prefix, or keywords).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EndpointIdentifier {
    Id(i64),
    Text(String),
}

impl Default for EndpointIdentifier {
    fn default() -> Self {
        EndpointIdentifier::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetExampleRequest {
    pub identifier: EndpointIdentifier,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointExample {
    pub endpoint_id: i64,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleMiss {
    pub message: String,
    pub suggestion: String,
}

/// Outcome of `getExample`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExampleLookup {
    Found(EndpointExample),
    NotFound(ExampleMiss),
}

impl GetExampleRequest {
    /// Check the arguments without touching storage; returns the selected
    /// languages (`curl` when none is given).
    pub fn validate(&self) -> Result<Vec<Language>> {
        let languages = Language::parse_selection(self.language.as_deref().unwrap_or("curl"))?;
        if let EndpointIdentifier::Text(t) = &self.identifier {
            if t.trim().is_empty() {
                return Err(AtlasError::Validation("identifier must not be empty".into()));
            }
        }
        Ok(languages)
    }
}

/// Split `POST /pets` into a method and a path. Text without a leading
/// HTTP verb yields no method.
fn split_method_prefix(text: &str) -> (Option<String>, &str) {
    if let Some((head, rest)) = text.split_once(char::is_whitespace) {
        let upper = head.to_ascii_uppercase();
        if HTTP_METHODS.contains(&upper.as_str()) {
            return (Some(upper), rest.trim());
        }
    }
    (None, text)
}

/// `pets/` → `/pets`; the root path stays `/`.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

async fn resolve_endpoint<S: Store + ?Sized>(
    store: &S,
    api_id: i64,
    identifier: &EndpointIdentifier,
) -> Result<Option<Endpoint>> {
    let text = match identifier {
        EndpointIdentifier::Id(id) => return store.get_endpoint(api_id, *id).await,
        EndpointIdentifier::Text(t) => t.trim(),
    };

    if let Ok(id) = text.parse::<i64>() {
        if let Some(e) = store.get_endpoint(api_id, id).await? {
            return Ok(Some(e));
        }
    }

    let (method, rest) = split_method_prefix(text);
    if !rest.is_empty() && !rest.contains(char::is_whitespace) {
        let path = normalize_path(rest);
        if let Some(e) = store
            .get_endpoint_by_path(api_id, &path, method.as_deref())
            .await?
        {
            return Ok(Some(e));
        }
        if path != "/" {
            let with_slash = format!("{}/", path);
            if let Some(e) = store
                .get_endpoint_by_path(api_id, &with_slash, method.as_deref())
                .await?
            {
                return Ok(Some(e));
            }
        }
    }

    // Punctuation-only text has no keywords; an unfiltered search would
    // otherwise return the first endpoint.
    if keyword_tokens(rest).is_empty() {
        return Ok(None);
    }

    let top = store
        .search_endpoint_candidates(api_id, Some(rest), method.as_deref())
        .await?
        .into_iter()
        .next();
    match top {
        Some(c) => store.get_endpoint(api_id, c.id).await,
        None => Ok(None),
    }
}

async fn example_body<S: Store + ?Sized>(
    store: &S,
    api_id: i64,
    endpoint: &Endpoint,
) -> Result<Option<Value>> {
    if !method_has_body(&endpoint.method) {
        return Ok(None);
    }
    if let Some(name) = &endpoint.request_body_ref {
        let closure =
            fetch_component_closure(store, api_id, std::slice::from_ref(name), EXAMPLE_MAX_DEPTH)
                .await?;
        return Ok(Some(match closure.get(name) {
            Some(component) => example_for_component(component, &closure),
            None => Value::Object(Map::new()),
        }));
    }
    if let Some(schema) = &endpoint.request_body_schema {
        let refs = collect_schema_refs(schema);
        let closure = fetch_component_closure(store, api_id, &refs, EXAMPLE_MAX_DEPTH).await?;
        return Ok(Some(example_for_schema(schema, &closure)));
    }
    Ok(Some(Value::Object(Map::new())))
}

/// Run `getExample`. The output depends only on the resolved endpoint, so
/// every identifier form for one endpoint yields identical output.
pub async fn get_example<S: Store + ?Sized>(
    store: &S,
    catalog: &CatalogSnapshot,
    request: &GetExampleRequest,
) -> Result<ExampleLookup> {
    let languages = request.validate()?;

    let api_id = catalog.api.id;
    let Some(endpoint) = resolve_endpoint(store, api_id, &request.identifier).await? else {
        return Ok(ExampleLookup::NotFound(ExampleMiss {
            message: "No endpoint matches the given identifier".into(),
            suggestion:
                "Use searchEndpoints with keywords to find the endpoint id, then call getExample with that id"
                    .into(),
        }));
    };

    let body = example_body(store, api_id, &endpoint).await?;
    let url = join_url(&catalog.api.base_url, &endpoint.path);
    let shape = RequestShape {
        method: endpoint.method.clone(),
        url: url.clone(),
        auth: endpoint.auth.clone(),
        body: body.clone(),
    };
    let snippets = languages.into_iter().map(|l| render(l, &shape)).collect();

    Ok(ExampleLookup::Found(EndpointExample {
        endpoint_id: endpoint.id,
        method: endpoint.method,
        path: endpoint.path,
        operation_id: endpoint.operation_id,
        summary: endpoint.summary,
        url,
        request_body: body,
        snippets,
    }))
}

// ─── getEndpointCategories ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategorySort {
    #[default]
    Name,
    EndpointCount,
    Group,
}

impl std::str::FromStr for CategorySort {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "name" => Ok(CategorySort::Name),
            "endpointCount" | "endpoint_count" | "count" => Ok(CategorySort::EndpointCount),
            "group" => Ok(CategorySort::Group),
            other => Err(AtlasError::Validation(format!(
                "unknown sortBy '{}': expected name, endpointCount, or group",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEndpointCategoriesRequest {
    pub category_group: Option<String>,
    pub include_empty: bool,
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMetadata {
    pub total_categories: usize,
    pub total_endpoints: i64,
    pub api_title: String,
    pub api_version: String,
    pub available_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCategoriesResponse {
    pub categories: Vec<EndpointCategory>,
    pub metadata: CatalogMetadata,
}

impl GetEndpointCategoriesRequest {
    pub fn validate(&self) -> Result<CategorySort> {
        self.sort_by.as_deref().unwrap_or("name").parse()
    }
}

/// Run `getEndpointCategories`. Served entirely from the snapshot.
pub fn get_endpoint_categories(
    catalog: &CatalogSnapshot,
    request: &GetEndpointCategoriesRequest,
) -> Result<EndpointCategoriesResponse> {
    let sort = request.validate()?;
    let group = provided(&request.category_group);

    let mut categories: Vec<EndpointCategory> = catalog
        .categories
        .iter()
        .filter(|c| request.include_empty || c.endpoint_count > 0)
        .filter(|c| match &group {
            Some(g) => c.group.as_deref().is_some_and(|cg| cg.eq_ignore_ascii_case(g)),
            None => true,
        })
        .cloned()
        .collect();

    match sort {
        CategorySort::Name => categories.sort_by(|a, b| a.name.cmp(&b.name)),
        CategorySort::EndpointCount => categories.sort_by(|a, b| {
            b.endpoint_count
                .cmp(&a.endpoint_count)
                .then_with(|| a.name.cmp(&b.name))
        }),
        CategorySort::Group => categories.sort_by(|a, b| {
            // Ungrouped categories sort after every group.
            let key = |c: &EndpointCategory| (c.group.is_none(), c.group.clone());
            key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
        }),
    }

    let metadata = CatalogMetadata {
        total_categories: categories.len(),
        total_endpoints: categories.iter().map(|c| c.endpoint_count).sum(),
        api_title: catalog.api.title.clone(),
        api_version: catalog.api.version.clone(),
        available_groups: catalog.groups(),
    };
    Ok(EndpointCategoriesResponse {
        categories,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::categorize;
    use crate::models::NewApiMetadata;
    use crate::spec::ParsedSpec;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn ad_spec() -> Value {
        let mut paths = Map::new();
        for i in 0..4 {
            paths.insert(
                format!("/campaigns/{}", i),
                json!({ "get": {
                    "tags": ["Campaign"],
                    "summary": format!("Fetch campaign variant {}", i)
                }}),
            );
        }
        for i in 0..13 {
            paths.insert(
                format!("/statistics/report{}", i),
                json!({ "get": {
                    "tags": ["Statistics"],
                    "summary": format!("Statistics report {}", i)
                }}),
            );
        }
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Ads", "version": "2.1.0" },
            "servers": [{ "url": "https://ads.example.com/v2/" }],
            "tags": [
                { "name": "Campaign", "description": "Campaign management" },
                { "name": "Statistics" },
                { "name": "Archive" }
            ],
            "x-tagGroups": [
                { "name": "Management", "tags": ["Campaign"] },
                { "name": "Reporting", "tags": ["Statistics"] }
            ],
            "paths": paths,
            "components": { "schemas": {
                "CreateProductCampaignRequest.V2.ProductCampaignPlacement.V2": {
                    "type": "object",
                    "properties": { "slot": { "type": "string" } }
                },
                "Campaign": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string" },
                        "budget": { "$ref": "#/components/schemas/Budget" }
                    }
                },
                "Budget": {
                    "type": "object",
                    "properties": { "amount": { "type": "number", "example": 12.5 } }
                }
            }}
        })
    }

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": { "title": "Petstore", "version": "1.0.0" },
            "servers": [{ "url": "https://petstore.example.com/api/" }],
            "components": {
                "securitySchemes": { "bearer": { "type": "http", "scheme": "bearer" } },
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "example": "Rex" },
                            "kind": { "type": "string", "enum": ["dog", "cat"] }
                        }
                    }
                }
            },
            "paths": {
                "/pets": {
                    "get": { "tags": ["Pets"], "summary": "List pets" },
                    "post": {
                        "tags": ["Pets"],
                        "summary": "Create a pet",
                        "security": [{ "bearer": [] }],
                        "requestBody": { "content": { "application/json": {
                            "schema": { "$ref": "#/components/schemas/Pet" }
                        }}}
                    }
                },
                "/pets/{petId}": {
                    "get": { "tags": ["Pets"], "summary": "Show a pet by id" }
                }
            }
        })
    }

    async fn load(doc: Value) -> (InMemoryStore, CatalogSnapshot) {
        let spec = ParsedSpec::from_value(&doc).unwrap();
        let categorization = categorize(&spec);
        let store = InMemoryStore::new();
        let api = store
            .create_api_metadata(&NewApiMetadata {
                api_key: spec.title.clone(),
                title: spec.title.clone(),
                version: spec.version.clone(),
                description: spec.description.clone(),
                base_url: spec.base_url.clone(),
                servers: spec.servers.clone(),
                spec_format: spec.format.to_string(),
                spec_hash: "test".into(),
            })
            .await
            .unwrap();
        store
            .create_endpoints(api.id, &categorization.endpoints)
            .await
            .unwrap();
        store.create_schemas(api.id, &spec.schemas).await.unwrap();
        store
            .create_categories(api.id, &categorization.catalog)
            .await
            .unwrap();
        let snapshot = CatalogSnapshot::load(&store, api.id).await.unwrap().unwrap();
        (store, snapshot)
    }

    fn search(category: Option<&str>, keywords: &str) -> SearchEndpointsRequest {
        SearchEndpointsRequest {
            keywords: Some(keywords.into()),
            category: category.map(str::to_string),
            per_page: Some(100),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_catalog_counts_match_filtered_search() {
        let (store, catalog) = load(ad_spec()).await;
        let limits = QueryLimits::default();

        let cats = get_endpoint_categories(&catalog, &GetEndpointCategoriesRequest::default())
            .unwrap();
        let summary: Vec<(String, i64)> = cats
            .categories
            .iter()
            .map(|c| (c.name.clone(), c.endpoint_count))
            .collect();
        assert_eq!(
            summary,
            vec![("campaign".to_string(), 4), ("statistics".to_string(), 13)]
        );
        assert_eq!(cats.metadata.total_endpoints, 17);
        assert_eq!(cats.metadata.api_title, "Ads");

        for category in &cats.categories {
            let res = search_endpoints(&store, &catalog, &search(Some(&category.name), ""), &limits)
                .await
                .unwrap();
            assert_eq!(res.pagination.total_results as i64, category.endpoint_count);
        }

        let stats = search_endpoints(&store, &catalog, &search(Some("statistics"), ""), &limits)
            .await
            .unwrap();
        assert_eq!(stats.endpoints.len(), 13);
        assert!(stats
            .endpoints
            .iter()
            .all(|e| !e.tags.contains(&"Campaign".to_string())));
    }

    #[tokio::test]
    async fn test_keyword_and_category_intersect() {
        let (store, catalog) = load(ad_spec()).await;
        let limits = QueryLimits::default();
        let ids = |r: &SearchEndpointsResponse| -> HashSet<i64> {
            r.endpoints.iter().map(|e| e.id).collect()
        };

        let kw = search_endpoints(&store, &catalog, &search(None, "report"), &limits)
            .await
            .unwrap();
        let cat = search_endpoints(&store, &catalog, &search(Some("statistics"), ""), &limits)
            .await
            .unwrap();
        let both = search_endpoints(&store, &catalog, &search(Some("statistics"), "report"), &limits)
            .await
            .unwrap();
        let expected: HashSet<i64> = ids(&kw).intersection(&ids(&cat)).copied().collect();
        assert_eq!(ids(&both), expected);
        assert!(both
            .endpoints
            .iter()
            .all(|e| e.score.is_some_and(|s| (0.0..=1.0).contains(&s))));
    }

    #[tokio::test]
    async fn test_category_and_group_are_mutually_exclusive() {
        let (store, catalog) = load(ad_spec()).await;
        // An empty store proves the rejection happens before any lookup.
        let empty = InMemoryStore::new();
        let req = SearchEndpointsRequest {
            category: Some("campaign".into()),
            category_group: Some("Management".into()),
            ..Default::default()
        };
        let err = search_endpoints(&empty, &catalog, &req, &QueryLimits::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        // Empty strings count as absent.
        let req = SearchEndpointsRequest {
            category: Some("".into()),
            category_group: Some("management".into()),
            ..Default::default()
        };
        let res = search_endpoints(&store, &catalog, &req, &QueryLimits::default())
            .await
            .unwrap();
        assert_eq!(res.pagination.total_results, 4);
    }

    #[tokio::test]
    async fn test_pagination_is_disjoint_and_complete() {
        let (store, catalog) = load(ad_spec()).await;
        let limits = QueryLimits::default();
        let mut seen = Vec::new();
        let mut page = 1;
        loop {
            let req = SearchEndpointsRequest {
                page: Some(page),
                per_page: Some(5),
                ..Default::default()
            };
            let res = search_endpoints(&store, &catalog, &req, &limits).await.unwrap();
            assert_eq!(res.pagination.total_results, 17);
            assert_eq!(res.pagination.total_pages, 4);
            seen.extend(res.endpoints.iter().map(|e| e.id));
            if !res.pagination.has_next {
                break;
            }
            page += 1;
        }
        let unique: HashSet<i64> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 17);
        assert_eq!(unique.len(), 17);
    }

    #[test]
    fn test_invalid_search_arguments() {
        let limits = QueryLimits::default();
        for req in [
            SearchEndpointsRequest { page: Some(0), ..Default::default() },
            SearchEndpointsRequest { per_page: Some(101), ..Default::default() },
            SearchEndpointsRequest { http_method: Some("FETCH".into()), ..Default::default() },
        ] {
            assert!(matches!(req.validate(&limits), Err(AtlasError::Validation(_))));
        }
        let ok = SearchEndpointsRequest {
            http_method: Some("get".into()),
            ..Default::default()
        }
        .validate(&limits)
        .unwrap();
        assert_eq!(ok.http_method.as_deref(), Some("GET"));
        assert_eq!(ok.per_page, 20);
    }

    #[tokio::test]
    async fn test_unknown_category_is_rejected() {
        let (store, catalog) = load(ad_spec()).await;
        let err = search_endpoints(&store, &catalog, &search(Some("campain"), ""), &QueryLimits::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("campaign"));
    }

    #[tokio::test]
    async fn test_flattened_schema_lookup() {
        let (store, catalog) = load(ad_spec()).await;
        let limits = QueryLimits::default();
        for name in [
            "CreateProductCampaignRequestV2ProductCampaignPlacementV2",
            "CreateProductCampaignRequest.V2.ProductCampaignPlacement.V2",
        ] {
            let req = GetSchemaRequest {
                name: name.into(),
                ..Default::default()
            };
            match get_schema(&store, &catalog, &req, &limits).await.unwrap() {
                SchemaLookup::Found(detail) => assert_eq!(
                    detail.name,
                    "CreateProductCampaignRequestV2ProductCampaignPlacementV2"
                ),
                other => panic!("expected a hit, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_schema_hit_resolves_refs_and_example() {
        let (store, catalog) = load(ad_spec()).await;
        let req = GetSchemaRequest {
            name: "Campaign".into(),
            ..Default::default()
        };
        let SchemaLookup::Found(detail) = get_schema(&store, &catalog, &req, &QueryLimits::default())
            .await
            .unwrap()
        else {
            panic!("Campaign should resolve");
        };
        assert_eq!(detail.required, vec!["name".to_string()]);
        assert_eq!(detail.references.len(), 1);
        assert_eq!(detail.references[0].name, "Budget");
        assert_eq!(
            detail.example,
            Some(json!({ "name": "string", "budget": { "amount": 12.5 } }))
        );

        let json = serde_json::to_value(SchemaLookup::Found(detail)).unwrap();
        assert_eq!(json["status"], "found");
    }

    #[tokio::test]
    async fn test_schema_miss_returns_suggestions() {
        let (store, catalog) = load(ad_spec()).await;
        let req = GetSchemaRequest {
            name: "Campaing".into(),
            ..Default::default()
        };
        let SchemaLookup::NotFound(miss) = get_schema(&store, &catalog, &req, &QueryLimits::default())
            .await
            .unwrap()
        else {
            panic!("Campaing should miss");
        };
        assert!(miss.suggestions.len() <= 5);
        assert_eq!(miss.suggestions[0], "Campaign");
        assert!(miss.flattening_rule.contains('.'));

        let bad_depth = GetSchemaRequest {
            name: "Campaign".into(),
            max_depth: Some(0),
            ..Default::default()
        };
        assert!(get_schema(&store, &catalog, &bad_depth, &QueryLimits::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_example_identifier_forms_are_equivalent() {
        let (store, catalog) = load(petstore()).await;
        let by_path = GetExampleRequest {
            identifier: EndpointIdentifier::Text("POST /pets/".into()),
            language: Some("all".into()),
        };
        let ExampleLookup::Found(found) = get_example(&store, &catalog, &by_path).await.unwrap()
        else {
            panic!("POST /pets should resolve");
        };
        let id = found.endpoint_id;

        let forms = [
            EndpointIdentifier::Id(id),
            EndpointIdentifier::Text(id.to_string()),
            EndpointIdentifier::Text("post pets".into()),
        ];
        let reference = serde_json::to_string(&ExampleLookup::Found(found.clone())).unwrap();
        for identifier in forms {
            let req = GetExampleRequest {
                identifier,
                language: Some("all".into()),
            };
            let out = get_example(&store, &catalog, &req).await.unwrap();
            assert_eq!(serde_json::to_string(&out).unwrap(), reference);
        }

        assert_eq!(found.url, "https://petstore.example.com/api/pets");
        assert_eq!(found.request_body, Some(json!({ "name": "Rex", "kind": "dog" })));
        assert_eq!(found.snippets.len(), 4);
        assert!(found.snippets[0].code.contains("Authorization: Bearer <TOKEN>"));
    }

    #[tokio::test]
    async fn test_example_path_without_method_picks_lowest_id() {
        let (store, catalog) = load(petstore()).await;
        let req = GetExampleRequest {
            identifier: EndpointIdentifier::Text("pets".into()),
            language: None,
        };
        let ExampleLookup::Found(found) = get_example(&store, &catalog, &req).await.unwrap() else {
            panic!("pets should resolve");
        };
        assert_eq!(found.method, "GET");
        assert!(found.request_body.is_none());
        assert!(!found.snippets[0].code.contains("Content-Type"));
    }

    #[tokio::test]
    async fn test_example_punctuation_identifiers_miss() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": { "title": "Single", "version": "1" },
            "paths": { "/pets": { "get": { "summary": "List pets" } } }
        });
        let (store, catalog) = load(doc).await;
        for text in ["/", "?", "---", "GET /"] {
            let req = GetExampleRequest {
                identifier: EndpointIdentifier::Text(text.into()),
                language: None,
            };
            assert!(
                matches!(
                    get_example(&store, &catalog, &req).await.unwrap(),
                    ExampleLookup::NotFound(_)
                ),
                "{:?} should not resolve",
                text
            );
        }
    }

    #[tokio::test]
    async fn test_example_miss_and_bad_language() {
        let (store, catalog) = load(petstore()).await;
        let miss = GetExampleRequest {
            identifier: EndpointIdentifier::Text("/nowhere/at/all".into()),
            language: None,
        };
        let ExampleLookup::NotFound(m) = get_example(&store, &catalog, &miss).await.unwrap() else {
            panic!("expected a miss");
        };
        assert!(m.suggestion.contains("searchEndpoints"));

        let bad = GetExampleRequest {
            identifier: EndpointIdentifier::Id(1),
            language: Some("cobol".into()),
        };
        assert!(matches!(
            get_example(&store, &catalog, &bad).await,
            Err(AtlasError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_categories_sorting_and_empty() {
        let (_store, catalog) = load(ad_spec()).await;
        let req = GetEndpointCategoriesRequest {
            include_empty: true,
            sort_by: Some("endpointCount".into()),
            ..Default::default()
        };
        let res = get_endpoint_categories(&catalog, &req).unwrap();
        let names: Vec<&str> = res.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["statistics", "campaign", "archive"]);

        let req = GetEndpointCategoriesRequest {
            include_empty: true,
            sort_by: Some("group".into()),
            ..Default::default()
        };
        let res = get_endpoint_categories(&catalog, &req).unwrap();
        assert_eq!(res.categories.last().unwrap().name, "archive");
        assert_eq!(res.metadata.available_groups, vec!["Management", "Reporting"]);

        let req = GetEndpointCategoriesRequest {
            category_group: Some("reporting".into()),
            ..Default::default()
        };
        let res = get_endpoint_categories(&catalog, &req).unwrap();
        assert_eq!(res.categories.len(), 1);
        assert_eq!(res.metadata.total_endpoints, 13);

        let bad = GetEndpointCategoriesRequest {
            sort_by: Some("size".into()),
            ..Default::default()
        };
        assert!(get_endpoint_categories(&catalog, &bad).is_err());
    }

    #[test]
    fn test_substring_rule_over_matches_short_names() {
        let candidate = EndpointCandidate {
            id: 1,
            path: "/advanced/search".into(),
            method: "GET".into(),
            operation_id: None,
            summary: None,
            tags: vec!["Advanced".into()],
            category: "advanced".into(),
            deprecated: false,
            rank: None,
        };
        // Known over-match of the tag rule: "ad" is a substring of "Advanced".
        assert!(candidate_in_category(&candidate, "ad"));
    }
}
