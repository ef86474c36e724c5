//! The service handle passed to every adapter.
//!
//! [`AtlasService`] owns the store, the read-only [`CatalogSnapshot`], the
//! query limits, and the [`Resilience`] stack. Every query goes through
//! [`Resilience::call`]; nothing here is global.
//!
//! Each query attempt first checks which API row is stored under the served
//! identity. When `atlas ingest` replaced it while the server was running,
//! the snapshot is rebuilt from the new row before the query runs.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::{Arc, RwLock};

use api_atlas_core::error::{AtlasError, Result as AtlasResult};
use api_atlas_core::models::{format_ts_iso, ApiMetadata};
use api_atlas_core::query::{
    self, CatalogSnapshot, EndpointCategoriesResponse, ExampleLookup,
    GetEndpointCategoriesRequest, GetExampleRequest, GetSchemaRequest, QueryLimits, SchemaLookup,
    SearchEndpointsRequest, SearchEndpointsResponse,
};
use api_atlas_core::store::Store;

use crate::config::{Config, ResilienceConfig};
use crate::db;
use crate::migrate;
use crate::resilience::{Operation, OperationStats, Resilience};
use crate::sqlite_store::SqliteStore;

pub struct AtlasService {
    store: Arc<dyn Store>,
    api_key: Option<String>,
    catalog: RwLock<Arc<CatalogSnapshot>>,
    limits: QueryLimits,
    resilience: Resilience,
}

/// Identity and size of the API being served.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSummary {
    pub id: i64,
    pub api_key: String,
    pub title: String,
    pub version: String,
    pub base_url: String,
    pub spec_format: String,
    pub ingested_at: String,
    pub categories: usize,
    pub schemas: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub api: ApiSummary,
    pub operations: Vec<OperationStats>,
}

/// Pick the API to serve: the one named `api_key`, or the most recently
/// ingested one.
pub async fn resolve_api<S: Store + ?Sized>(
    store: &S,
    api_key: Option<&str>,
) -> Result<ApiMetadata> {
    match api_key {
        Some(key) => match store.get_api_by_key(key).await? {
            Some(api) => Ok(api),
            None => bail!("API '{}' has not been ingested. Run `atlas ingest <FILE>` first.", key),
        },
        None => match store.list_apis().await?.into_iter().max_by_key(|a| a.id) {
            Some(api) => Ok(api),
            None => bail!("No API has been ingested. Run `atlas ingest <FILE>` first."),
        },
    }
}

async fn load_catalog<S: Store + ?Sized>(store: &S, api_key: Option<&str>) -> Result<CatalogSnapshot> {
    let api = resolve_api(store, api_key).await?;
    match CatalogSnapshot::load(store, api.id).await? {
        Some(snapshot) => Ok(snapshot),
        None => bail!("API '{}' disappeared while loading its catalog", api.api_key),
    }
}

impl AtlasService {
    /// Open the configured SQLite database and load the served API.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        Self::with_store(
            store,
            config.api.name.clone(),
            config.query_limits(),
            &config.resilience,
        )
        .await
    }

    pub async fn with_store(
        store: Arc<dyn Store>,
        api_key: Option<String>,
        limits: QueryLimits,
        resilience: &ResilienceConfig,
    ) -> Result<Self> {
        let catalog = load_catalog(store.as_ref(), api_key.as_deref()).await?;
        tracing::info!(
            api_id = catalog.api.id,
            api_key = %catalog.api.api_key,
            categories = catalog.categories.len(),
            schemas = catalog.schema_names.len(),
            "catalog loaded"
        );
        Ok(Self {
            store,
            api_key,
            catalog: RwLock::new(Arc::new(catalog)),
            limits,
            resilience: Resilience::from_config(resilience),
        })
    }

    /// Current catalog snapshot. Callers keep the `Arc` for the whole call,
    /// so a concurrent reload never changes data mid-query.
    pub fn catalog(&self) -> Arc<CatalogSnapshot> {
        match self.catalog.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Snapshot for the API currently stored under the served identity.
    async fn fresh_catalog(&self) -> AtlasResult<Arc<CatalogSnapshot>> {
        let current = self.catalog();
        let latest = match self.api_key.as_deref() {
            Some(key) => self.store.get_api_by_key(key).await?,
            None => self.store.list_apis().await?.into_iter().max_by_key(|a| a.id),
        };
        let Some(latest) = latest else {
            return Err(AtlasError::Storage(format!(
                "API '{}' is no longer ingested",
                current.api.api_key
            )));
        };
        if latest.id == current.api.id {
            return Ok(current);
        }

        match CatalogSnapshot::load(self.store.as_ref(), latest.id).await? {
            Some(fresh) => Ok(self.install(Arc::new(fresh))),
            // Replaced again between the two reads.
            None => Err(AtlasError::TransientStorage(format!(
                "API '{}' changed while its catalog was loading",
                latest.api_key
            ))),
        }
    }

    /// Swap in `fresh` unless a newer snapshot is already installed.
    fn install(&self, fresh: Arc<CatalogSnapshot>) -> Arc<CatalogSnapshot> {
        let mut guard = match self.catalog.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.api.id < fresh.api.id {
            tracing::info!(
                api_id = fresh.api.id,
                previous_id = guard.api.id,
                categories = fresh.categories.len(),
                schemas = fresh.schema_names.len(),
                "catalog reloaded after re-ingestion"
            );
            *guard = fresh;
        }
        guard.clone()
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    pub async fn search_endpoints(
        &self,
        request: &SearchEndpointsRequest,
    ) -> AtlasResult<SearchEndpointsResponse> {
        let limits = &self.limits;
        self.resilience
            .call(
                Operation::SearchEndpoints,
                || request.validate(limits).map(|_| ()),
                move || async move {
                    let catalog = self.fresh_catalog().await?;
                    query::search_endpoints(self.store.as_ref(), &catalog, request, limits).await
                },
            )
            .await
    }

    pub async fn get_schema(&self, request: &GetSchemaRequest) -> AtlasResult<SchemaLookup> {
        let limits = &self.limits;
        self.resilience
            .call(
                Operation::GetSchema,
                || request.validate(limits).map(|_| ()),
                move || async move {
                    let catalog = self.fresh_catalog().await?;
                    query::get_schema(self.store.as_ref(), &catalog, request, limits).await
                },
            )
            .await
    }

    pub async fn get_example(&self, request: &GetExampleRequest) -> AtlasResult<ExampleLookup> {
        self.resilience
            .call(
                Operation::GetExample,
                || request.validate().map(|_| ()),
                move || async move {
                    let catalog = self.fresh_catalog().await?;
                    query::get_example(self.store.as_ref(), &catalog, request).await
                },
            )
            .await
    }

    pub async fn get_endpoint_categories(
        &self,
        request: &GetEndpointCategoriesRequest,
    ) -> AtlasResult<EndpointCategoriesResponse> {
        self.resilience
            .call(
                Operation::GetEndpointCategories,
                || request.validate().map(|_| ()),
                move || async move {
                    let catalog = self.fresh_catalog().await?;
                    query::get_endpoint_categories(&catalog, request)
                },
            )
            .await
    }

    /// Served API and telemetry. Falls back to the last snapshot when the
    /// store cannot be read.
    pub async fn stats(&self) -> ServiceStats {
        let catalog = match self.fresh_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "stats served from the last loaded catalog");
                self.catalog()
            }
        };
        let api = &catalog.api;
        ServiceStats {
            api: ApiSummary {
                id: api.id,
                api_key: api.api_key.clone(),
                title: api.title.clone(),
                version: api.version.clone(),
                base_url: api.base_url.clone(),
                spec_format: api.spec_format.clone(),
                ingested_at: format_ts_iso(api.ingested_at),
                categories: catalog.categories.len(),
                schemas: catalog.schema_names.len(),
            },
            operations: self.resilience.snapshot(),
        }
    }
}
