//! Agent-facing HTTP server.
//!
//! Every tool in the [`ToolRegistry`] is dispatched through the same
//! `POST /tools/{name}` handler, and the same registry is mounted as an MCP
//! Streamable HTTP endpoint at `/mcp`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/stats` | Served API and per-operation telemetry |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `*`    | `/mcp` | MCP Streamable HTTP (JSON-RPC) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "searchEndpoints: invalid request: ..." } }
//! ```
//!
//! | Status | Codes |
//! |--------|-------|
//! | 400 | `bad_request`, `validation_error`, `invalid_spec` |
//! | 404 | `not_found` (unknown tool) |
//! | 408 | `timeout` |
//! | 503 | `circuit_open`, `transient_storage_error`, `retries_exhausted` |
//! | 500 | `storage_error`, `tool_error` |
//!
//! Schema and endpoint misses are not errors: they come back as `200` with
//! `"status": "not_found"` inside `result`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use api_atlas_core::error::AtlasError;

use crate::config::Config;
use crate::mcp::McpBridge;
use crate::service::{AtlasService, ServiceStats};
use crate::traits::{ToolContext, ToolRegistry};

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// Starts the server with the built-in tools on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_tools(config, ToolRegistry::with_builtins()).await
}

/// Like [`run_server`], but serves the given registry (typically the
/// built-ins plus custom tools).
///
/// ```rust,no_run
/// use api_atlas::server::run_server_with_tools;
/// use api_atlas::traits::ToolRegistry;
///
/// # async fn example(config: &api_atlas::config::Config) -> anyhow::Result<()> {
/// let mut tools = ToolRegistry::with_builtins();
/// // tools.register(Box::new(MyTool::new()));
/// run_server_with_tools(config, tools).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server_with_tools(config: &Config, tools: ToolRegistry) -> anyhow::Result<()> {
    let service = Arc::new(AtlasService::open(config).await?);
    let listener = TcpListener::bind(&config.server.bind).await?;

    for t in tools.tools() {
        let tag = if t.is_builtin() { "builtin" } else { "custom" };
        tracing::debug!(tool = t.name(), kind = tag, "registered tool");
    }
    tracing::info!(
        bind = %config.server.bind,
        tools = tools.len(),
        api = %service.catalog().api.title,
        "server listening"
    );
    println!("API Atlas listening on http://{}", config.server.bind);

    serve(listener, service, tools).await
}

/// Serve on an already-bound listener until the task is dropped.
pub async fn serve(
    listener: TcpListener,
    service: Arc<AtlasService>,
    tools: ToolRegistry,
) -> anyhow::Result<()> {
    axum::serve(listener, router(service, tools)).await?;
    Ok(())
}

pub fn router(service: Arc<AtlasService>, tools: ToolRegistry) -> Router {
    let state = AppState {
        ctx: ToolContext::new(service),
        tools: Arc::new(tools),
    };

    let bridge = McpBridge::new(state.ctx.clone(), state.tools.clone());
    let mcp = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp)
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// HTTP status for a typed query failure.
fn status_for(err: &AtlasError) -> StatusCode {
    match err {
        AtlasError::Validation(_) | AtlasError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
        AtlasError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
        AtlasError::CircuitOpen { .. }
        | AtlasError::TransientStorage(_)
        | AtlasError::RetriesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AtlasError::Storage(_) | AtlasError::DuplicateEntity(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let message = format!("{}: {}", tool_name, err);
    match err.downcast_ref::<AtlasError>() {
        Some(atlas) => AppError {
            status: status_for(atlas),
            code: atlas.code().to_string(),
            message,
        },
        None => tool_error(message),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Json<ServiceStats> {
    Json(state.ctx.service().stats().await)
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            parameters: t.parameters_schema(),
        })
        .collect();

    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Unified tool dispatch: `404` for unknown tools, otherwise the status
/// derived from the tool's error, or `200` with `{ "result": ... }`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
