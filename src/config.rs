use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use api_atlas_core::query::QueryLimits;
use api_atlas_core::schema::MAX_DEPTH_LIMIT;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    32
}
fn default_acquire_timeout_ms() -> u64 {
    2000
}

/// Identity of the API served by this database. When unset, the spec
/// title is used at ingestion time and the most recent API is served.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: usize,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_per_page() -> usize {
    20
}
fn default_max_per_page() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchemaConfig {
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            default_max_depth: default_max_depth(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

fn default_max_depth() -> usize {
    10
}
fn default_max_suggestions() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,
    #[serde(default = "default_min_calls")]
    pub min_calls: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_latency_sample")]
    pub latency_sample: usize,
    /// Calls slower than this count as slow in telemetry.
    #[serde(default = "default_latency_target_ms")]
    pub latency_target_ms: u64,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            failure_ratio: default_failure_ratio(),
            min_calls: default_min_calls(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
            latency_sample: default_latency_sample(),
            latency_target_ms: default_latency_target_ms(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    20
}
fn default_backoff_max_ms() -> u64 {
    200
}
fn default_failure_ratio() -> f64 {
    0.5
}
fn default_min_calls() -> usize {
    10
}
fn default_window_secs() -> u64 {
    30
}
fn default_cooldown_secs() -> u64 {
    15
}
fn default_latency_sample() -> usize {
    512
}
fn default_latency_target_ms() -> u64 {
    200
}

/// Per-operation time budgets. Each bounds the whole retry loop.
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_query_timeout_ms")]
    pub search_endpoints_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub get_schema_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub get_example_ms: u64,
    #[serde(default = "default_categories_timeout_ms")]
    pub get_endpoint_categories_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            search_endpoints_ms: default_query_timeout_ms(),
            get_schema_ms: default_query_timeout_ms(),
            get_example_ms: default_query_timeout_ms(),
            get_endpoint_categories_ms: default_categories_timeout_ms(),
        }
    }
}

fn default_query_timeout_ms() -> u64 {
    500
}
fn default_categories_timeout_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Query-engine tunables derived from `[search]` and `[schema]`.
    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            default_per_page: self.search.default_per_page,
            max_per_page: self.search.max_per_page,
            default_max_depth: self.schema.default_max_depth,
            max_suggestions: self.schema.max_suggestions,
        }
    }
}

impl ResilienceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if config.search.max_per_page == 0 {
        anyhow::bail!("search.max_per_page must be > 0");
    }
    if config.search.default_per_page == 0
        || config.search.default_per_page > config.search.max_per_page
    {
        anyhow::bail!(
            "search.default_per_page must be in [1, {}]",
            config.search.max_per_page
        );
    }

    if config.schema.default_max_depth == 0 || config.schema.default_max_depth > MAX_DEPTH_LIMIT {
        anyhow::bail!("schema.default_max_depth must be in [1, {}]", MAX_DEPTH_LIMIT);
    }

    let r = &config.resilience;
    if !(0.0..=1.0).contains(&r.failure_ratio) || r.failure_ratio == 0.0 {
        anyhow::bail!("resilience.failure_ratio must be in (0.0, 1.0]");
    }
    if r.min_calls == 0 {
        anyhow::bail!("resilience.min_calls must be > 0");
    }
    if r.backoff_base_ms > r.backoff_max_ms {
        anyhow::bail!("resilience.backoff_base_ms must not exceed resilience.backoff_max_ms");
    }
    if r.latency_sample == 0 {
        anyhow::bail!("resilience.latency_sample must be > 0");
    }

    let t = &r.timeouts;
    for (name, ms) in [
        ("search_endpoints_ms", t.search_endpoints_ms),
        ("get_schema_ms", t.get_schema_ms),
        ("get_example_ms", t.get_example_ms),
        ("get_endpoint_categories_ms", t.get_endpoint_categories_ms),
    ] {
        if ms == 0 {
            anyhow::bail!("resilience.timeouts.{} must be > 0", name);
        }
    }

    Ok(())
}
