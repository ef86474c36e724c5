//! # API Atlas
//!
//! A queryable knowledge base over one OpenAPI 3.x or Swagger 2.0
//! specification, built for AI agents that need to discover and call a
//! large API without reading the whole document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌─────────────┐
//! │ openapi.yaml │──▶│ Parse+Categorize │──▶│   SQLite    │
//! │ swagger.json │   │  (api-atlas-core)│   │ rows + FTS5 │
//! └──────────────┘   └─────────────────┘   └──────┬──────┘
//!                                                 │
//!                             AtlasService ◀──────┘
//!                         (catalog + resilience)
//!                      ┌──────────┴──────────┐
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌────────────┐
//!                 │   CLI    │         │ HTTP + MCP │
//!                 │ (atlas)  │         │  (/tools)  │
//!                 └──────────┘         └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`ingest`] | Spec loading and ingestion pipeline |
//! | [`resilience`] | Timeouts, retries, circuit breakers, telemetry |
//! | [`service`] | Shared service handle used by every adapter |
//! | [`traits`] | Tool trait and registry |
//! | [`server`] | HTTP server |
//! | [`mcp`] | MCP bridge |
//! | [`stats`] | `atlas stats` |
//!
//! Parsing, categorization, schema resolution, snippets, and the query
//! engine live in the `api-atlas-core` crate.

pub mod config;
pub mod db;
pub mod ingest;
pub mod mcp;
pub mod migrate;
pub mod resilience;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod stats;
pub mod traits;
