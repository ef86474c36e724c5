//! Tool trait and registry for the agent-facing adapters.
//!
//! Both the HTTP surface (`POST /tools/{name}`) and the MCP bridge dispatch
//! through the same [`ToolRegistry`], so a tool registered once is
//! reachable over both transports.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ToolRegistry                 │
//! │  searchEndpoints  getSchema  getExample      │
//! │  getEndpointCategories  stats  (+ custom)    │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!        AtlasService → Resilience → query engine
//! ```
//!
//! # Usage
//!
//! ```rust
//! use api_atlas::traits::ToolRegistry;
//!
//! let mut tools = ToolRegistry::with_builtins();
//! // tools.register(Box::new(MyTool::new()));
//! assert_eq!(tools.len(), 5);
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use api_atlas_core::error::AtlasError;
use api_atlas_core::query::{
    GetEndpointCategoriesRequest, GetExampleRequest, GetSchemaRequest, SearchEndpointsRequest,
};

use crate::service::AtlasService;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A callable tool exposed to agents.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use api_atlas::traits::{Tool, ToolContext};
///
/// pub struct BaseUrlTool;
///
/// #[async_trait]
/// impl Tool for BaseUrlTool {
///     fn name(&self) -> &str { "baseUrl" }
///     fn description(&self) -> &str { "Return the base URL of the served API" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({ "baseUrl": ctx.service().catalog().api.base_url }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route segment and MCP tool name (e.g. `"searchEndpoints"`).
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this tool ships with the binary. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema for the tool's arguments (`type: "object"`).
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. The returned value is wrapped in
    /// `{ "result": ... }` by the HTTP adapter.
    ///
    /// Errors that downcast to [`AtlasError`] keep their classification
    /// (validation, timeout, circuit open, ...) all the way to the caller.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Per-invocation access to the shared [`AtlasService`].
#[derive(Clone)]
pub struct ToolContext {
    service: Arc<AtlasService>,
}

impl ToolContext {
    pub fn new(service: Arc<AtlasService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &AtlasService {
        &self.service
    }
}

/// Decode tool arguments; shape errors become validation errors.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| AtlasError::Validation(format!("invalid arguments: {}", e)).into())
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

pub struct SearchEndpointsTool;

#[async_trait]
impl Tool for SearchEndpointsTool {
    fn name(&self) -> &str {
        "searchEndpoints"
    }

    fn description(&self) -> &str {
        "Search API endpoints by keywords, HTTP method, category, or category group, with pagination"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keywords": { "type": "string", "description": "Words matched against path, summary, description, and parameter names" },
                "httpMethod": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE"] },
                "category": { "type": "string", "description": "Category name from getEndpointCategories; exclusive with categoryGroup" },
                "categoryGroup": { "type": "string", "description": "Parent group name; exclusive with category" },
                "page": { "type": "integer", "minimum": 1, "default": 1 },
                "perPage": { "type": "integer", "minimum": 1, "maximum": 100, "default": 20 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: SearchEndpointsRequest = parse_params(params)?;
        let response = ctx.service.search_endpoints(&request).await?;
        Ok(serde_json::to_value(response)?)
    }
}

pub struct GetSchemaTool;

#[async_trait]
impl Tool for GetSchemaTool {
    fn name(&self) -> &str {
        "getSchema"
    }

    fn description(&self) -> &str {
        "Get a schema component with its properties, example, and resolved references"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Schema name; dotted names are flattened by removing '.'" },
                "includeExamples": { "type": "boolean", "default": true },
                "maxDepth": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: GetSchemaRequest = parse_params(params)?;
        let lookup = ctx.service.get_schema(&request).await?;
        Ok(serde_json::to_value(lookup)?)
    }
}

pub struct GetExampleTool;

#[async_trait]
impl Tool for GetExampleTool {
    fn name(&self) -> &str {
        "getExample"
    }

    fn description(&self) -> &str {
        "Generate request code for an endpoint identified by id, path, or keywords"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "identifier": {
                    "type": ["integer", "string"],
                    "description": "Endpoint id, path such as '/pets' or 'POST /pets', or keywords"
                },
                "language": {
                    "type": "string",
                    "enum": ["curl", "python", "javascript", "typescript", "all"],
                    "default": "curl"
                }
            },
            "required": ["identifier"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: GetExampleRequest = parse_params(params)?;
        let lookup = ctx.service.get_example(&request).await?;
        Ok(serde_json::to_value(lookup)?)
    }
}

pub struct GetEndpointCategoriesTool;

#[async_trait]
impl Tool for GetEndpointCategoriesTool {
    fn name(&self) -> &str {
        "getEndpointCategories"
    }

    fn description(&self) -> &str {
        "List endpoint categories with counts, methods, and parent groups"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "categoryGroup": { "type": "string" },
                "includeEmpty": { "type": "boolean", "default": false },
                "sortBy": { "type": "string", "enum": ["name", "endpointCount", "group"], "default": "name" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: GetEndpointCategoriesRequest = parse_params(params)?;
        let response = ctx.service.get_endpoint_categories(&request).await?;
        Ok(serde_json::to_value(response)?)
    }
}

/// Served API identity plus per-operation telemetry.
pub struct StatsTool;

#[async_trait]
impl Tool for StatsTool {
    fn name(&self) -> &str {
        "stats"
    }

    fn description(&self) -> &str {
        "Report the served API and per-operation latency, retry, and circuit-breaker telemetry"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.service.stats().await)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of tools, looked up by name.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with the four query tools and `stats`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchEndpointsTool));
        registry.register(Box::new(GetSchemaTool));
        registry.register(Box::new(GetExampleTool));
        registry.register(Box::new(GetEndpointCategoriesTool));
        registry.register(Box::new(StatsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
