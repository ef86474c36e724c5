//! Core data models used throughout API Atlas.
//!
//! These types represent the normalized entities persisted for one API:
//! its metadata, endpoints, schema components, and categories. List-valued
//! fields are typed here and only become JSON at the persistence boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One ingested specification. Owns every other row through `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMetadata {
    pub id: i64,
    /// Identity used to detect re-ingestion of the same API.
    pub api_key: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Fully resolved base URL used to build request URLs.
    pub base_url: String,
    /// Raw server URLs as declared.
    pub servers: Vec<String>,
    /// `openapi-3.0.3`, `swagger-2.0`, ...
    pub spec_format: String,
    /// Hex SHA-256 of the ingested document.
    pub spec_hash: String,
    /// Unix timestamp of the ingestion run.
    pub ingested_at: i64,
}

/// API metadata before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApiMetadata {
    pub api_key: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub base_url: String,
    pub servers: Vec<String>,
    pub spec_format: String,
    pub spec_hash: String,
}

/// A single operation parameter (path, query, header, cookie, body, form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    /// The `in` field of the declaration.
    pub location: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// How a caller is expected to authenticate against an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthHint {
    Bearer,
    Basic,
    ApiKeyHeader { name: String },
    ApiKeyQuery { name: String },
    OAuth2,
}

/// A persisted `(path, method)` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: i64,
    pub api_id: i64,
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    /// Flattened name of the request body component, if referenced.
    pub request_body_ref: Option<String>,
    /// Inline request body schema when no component is referenced.
    pub request_body_schema: Option<Value>,
    /// Flattened names of components referenced by success responses.
    pub response_refs: Vec<String>,
    /// Tags in declaration order.
    pub tags: Vec<String>,
    /// Category resolved at ingestion time.
    pub category: String,
    pub deprecated: bool,
    pub auth: Option<AuthHint>,
}

/// A persisted named schema component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaComponent {
    pub id: i64,
    pub api_id: i64,
    /// Flattened name (every `.` removed).
    pub name: String,
    /// Name exactly as declared in the document.
    pub original_name: String,
    pub description: Option<String>,
    pub schema_type: Option<String>,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    pub example: Option<Value>,
    /// Flattened names of directly referenced components.
    pub refs: Vec<String>,
}

/// A category in the per-API catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCategory {
    /// Normalized `lower_snake_case` name.
    pub name: String,
    pub display_name: String,
    pub group: Option<String>,
    pub description: Option<String>,
    pub endpoint_count: i64,
    /// Sorted, deduplicated upper-case methods.
    pub http_methods: Vec<String>,
}

/// HTTP methods that carry a JSON request body in generated examples.
pub fn method_has_body(method: &str) -> bool {
    matches!(method.to_ascii_uppercase().as_str(), "POST" | "PUT" | "PATCH")
}

/// Methods accepted by the `httpMethod` filter.
pub const HTTP_METHODS: [&str; 8] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE",
];

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
