//! # API Atlas CLI (`atlas`)
//!
//! Ingest an OpenAPI/Swagger document into SQLite, query it from the
//! terminal, or serve it to agents over HTTP and MCP.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `atlas init` | Create the SQLite database and run schema migrations |
//! | `atlas ingest <FILE>` | Parse a JSON or YAML spec and (re)load it |
//! | `atlas categories` | List endpoint categories |
//! | `atlas search [KEYWORDS]` | Search endpoints |
//! | `atlas schema <NAME>` | Show a schema component |
//! | `atlas example <IDENTIFIER>` | Generate request code for an endpoint |
//! | `atlas stats` | Show ingested APIs and row counts |
//! | `atlas serve` | Start the HTTP + MCP server |
//!
//! ## Examples
//!
//! ```bash
//! atlas init --config ./config/atlas.toml
//! atlas ingest ./openapi.yaml --name petstore
//! atlas search "create pet" --method POST
//! atlas schema Pet.V2 --max-depth 3
//! atlas example "POST /pets" --language python
//! atlas serve
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api_atlas::config::{self, Config};
use api_atlas::service::AtlasService;
use api_atlas::{ingest, migrate, server, stats};
use api_atlas_core::query::{
    EndpointIdentifier, GetEndpointCategoriesRequest, GetExampleRequest, GetSchemaRequest,
    SearchEndpointsRequest,
};

/// API Atlas: a queryable knowledge base over one OpenAPI specification.
#[derive(Parser)]
#[command(
    name = "atlas",
    about = "API Atlas: a queryable knowledge base over an OpenAPI specification",
    version,
    long_about = "API Atlas ingests an OpenAPI 3.x or Swagger 2.0 document into SQLite, \
    groups endpoints into categories, and answers endpoint search, schema lookup, and \
    code example queries from the CLI or an HTTP/MCP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/atlas.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a specification, replacing any previous ingestion of the same API.
    Ingest {
        /// Path to a JSON or YAML document.
        file: PathBuf,

        /// API identity; defaults to `[api].name`, then the document title.
        #[arg(long)]
        name: Option<String>,
    },

    /// List endpoint categories.
    Categories {
        /// Only categories under this parent group.
        #[arg(long)]
        group: Option<String>,

        /// Include categories with no endpoints.
        #[arg(long)]
        include_empty: bool,

        /// `name`, `endpointCount`, or `group`.
        #[arg(long)]
        sort_by: Option<String>,
    },

    /// Search endpoints.
    Search {
        /// Keywords matched against path, summary, description, and parameter names.
        keywords: Option<String>,

        #[arg(long)]
        method: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        group: Option<String>,

        #[arg(long)]
        page: Option<i64>,

        #[arg(long)]
        per_page: Option<i64>,
    },

    /// Show a schema component.
    Schema {
        name: String,

        #[arg(long)]
        max_depth: Option<i64>,

        /// Omit the schema's example.
        #[arg(long)]
        no_examples: bool,
    },

    /// Generate request code for an endpoint.
    Example {
        /// Endpoint id, path (`/pets`, `POST /pets`), or keywords.
        identifier: String,

        /// `curl`, `python`, `javascript`, `typescript`, or `all`.
        #[arg(long)]
        language: Option<String>,
    },

    /// Show ingested APIs and row counts.
    Stats,

    /// Start the HTTP server (tool routes plus MCP at `/mcp`).
    Serve,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_service(cfg: &Config) -> Result<Arc<AtlasService>> {
    Ok(Arc::new(AtlasService::open(cfg).await?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, name } => {
            let report = ingest::ingest_file(&cfg, &file, name.as_deref()).await?;
            ingest::print_report(&file, &report);
        }
        Commands::Categories {
            group,
            include_empty,
            sort_by,
        } => {
            let service = open_service(&cfg).await?;
            let request = GetEndpointCategoriesRequest {
                category_group: group,
                include_empty,
                sort_by,
            };
            print_json(&service.get_endpoint_categories(&request).await?)?;
        }
        Commands::Search {
            keywords,
            method,
            category,
            group,
            page,
            per_page,
        } => {
            let service = open_service(&cfg).await?;
            let request = SearchEndpointsRequest {
                keywords,
                http_method: method,
                category,
                category_group: group,
                page,
                per_page,
            };
            print_json(&service.search_endpoints(&request).await?)?;
        }
        Commands::Schema {
            name,
            max_depth,
            no_examples,
        } => {
            let service = open_service(&cfg).await?;
            let request = GetSchemaRequest {
                name,
                include_examples: Some(!no_examples),
                max_depth,
            };
            print_json(&service.get_schema(&request).await?)?;
        }
        Commands::Example {
            identifier,
            language,
        } => {
            let service = open_service(&cfg).await?;
            let request = GetExampleRequest {
                identifier: EndpointIdentifier::Text(identifier),
                language,
            };
            print_json(&service.get_example(&request).await?)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
