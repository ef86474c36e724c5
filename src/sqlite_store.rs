//! SQLite-backed [`Store`] implementation.
//!
//! Every batch insert runs in one transaction and writes its FTS5 rows in
//! the same transaction as the primary rows. [`Store::replace_api`] runs the
//! delete and every batch for one API inside a single transaction.
//! List-valued fields are stored as JSON text columns and decoded back into
//! typed models on read.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use api_atlas_core::categorize::CategorizedEndpoint;
use api_atlas_core::error::{AtlasError, Result};
use api_atlas_core::models::{
    ApiMetadata, Endpoint, EndpointCategory, NewApiMetadata, SchemaComponent,
};
use api_atlas_core::spec::ParsedSchema;
use api_atlas_core::store::{
    fts_match_expression, ApiContent, BatchReport, EndpointCandidate, ReplaceReport,
    SchemaCandidate, Store,
};

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Row counts owned by one API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCounts {
    pub endpoints: i64,
    pub schemas: i64,
    pub categories: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn table_counts(&self, api_id: i64) -> Result<TableCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM endpoints WHERE api_id = ?) AS endpoints,
                (SELECT COUNT(*) FROM schemas WHERE api_id = ?) AS schemas,
                (SELECT COUNT(*) FROM categories WHERE api_id = ?) AS categories
            "#,
        )
        .bind(api_id)
        .bind(api_id)
        .bind(api_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(TableCounts {
            endpoints: col(&row, "endpoints")?,
            schemas: col(&row, "schemas")?,
            categories: col(&row, "categories")?,
        })
    }
}

/// Classify a sqlx failure as transient (worth retrying) or permanent.
pub fn map_sqlx_error(err: sqlx::Error) -> AtlasError {
    match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => AtlasError::TransientStorage(err.to_string()),
        sqlx::Error::Database(db) if is_busy_code(db.code().as_deref()) => {
            AtlasError::TransientStorage(err.to_string())
        }
        _ => AtlasError::Storage(err.to_string()),
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(map_sqlx_error)
}

fn json_col<T: serde::de::DeserializeOwned>(row: &SqliteRow, name: &str) -> Result<T> {
    let raw: String = col(row, name)?;
    Ok(serde_json::from_str(&raw)?)
}

fn opt_json_col<T: serde::de::DeserializeOwned>(row: &SqliteRow, name: &str) -> Result<Option<T>> {
    let raw: Option<String> = col(row, name)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(AtlasError::from)
}

fn api_from_row(row: &SqliteRow) -> Result<ApiMetadata> {
    Ok(ApiMetadata {
        id: col(row, "id")?,
        api_key: col(row, "api_key")?,
        title: col(row, "title")?,
        version: col(row, "version")?,
        description: col(row, "description")?,
        base_url: col(row, "base_url")?,
        servers: json_col(row, "servers_json")?,
        spec_format: col(row, "spec_format")?,
        spec_hash: col(row, "spec_hash")?,
        ingested_at: col(row, "ingested_at")?,
    })
}

fn endpoint_from_row(row: &SqliteRow) -> Result<Endpoint> {
    Ok(Endpoint {
        id: col(row, "id")?,
        api_id: col(row, "api_id")?,
        path: col(row, "path")?,
        method: col(row, "method")?,
        operation_id: col(row, "operation_id")?,
        summary: col(row, "summary")?,
        description: col(row, "description")?,
        parameters: json_col(row, "parameters_json")?,
        request_body_ref: col(row, "request_body_ref")?,
        request_body_schema: opt_json_col(row, "request_body_schema_json")?,
        response_refs: json_col(row, "response_refs_json")?,
        tags: json_col(row, "tags_json")?,
        category: col(row, "category")?,
        deprecated: col(row, "deprecated")?,
        auth: opt_json_col(row, "auth_json")?,
    })
}

fn schema_from_row(row: &SqliteRow) -> Result<SchemaComponent> {
    Ok(SchemaComponent {
        id: col(row, "id")?,
        api_id: col(row, "api_id")?,
        name: col(row, "name")?,
        original_name: col(row, "original_name")?,
        description: col(row, "description")?,
        schema_type: col(row, "schema_type")?,
        properties: json_col(row, "properties_json")?,
        required: json_col(row, "required_json")?,
        example: opt_json_col(row, "example_json")?,
        refs: json_col(row, "refs_json")?,
    })
}

fn candidate_from_row(row: &SqliteRow) -> Result<EndpointCandidate> {
    Ok(EndpointCandidate {
        id: col(row, "id")?,
        path: col(row, "path")?,
        method: col(row, "method")?,
        operation_id: col(row, "operation_id")?,
        summary: col(row, "summary")?,
        tags: json_col(row, "tags_json")?,
        category: col(row, "category")?,
        deprecated: col(row, "deprecated")?,
        rank: col(row, "rank")?,
    })
}

fn join_words<'a>(words: impl IntoIterator<Item = &'a String>) -> String {
    words
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

async fn insert_api(conn: &mut SqliteConnection, api: &NewApiMetadata) -> Result<ApiMetadata> {
    let ingested_at = chrono::Utc::now().timestamp();
    let servers_json = serde_json::to_string(&api.servers)?;

    let result = sqlx::query(
        r#"
        INSERT INTO apis (api_key, title, version, description, base_url,
                          servers_json, spec_format, spec_hash, ingested_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&api.api_key)
    .bind(&api.title)
    .bind(&api.version)
    .bind(&api.description)
    .bind(&api.base_url)
    .bind(&servers_json)
    .bind(&api.spec_format)
    .bind(&api.spec_hash)
    .bind(ingested_at)
    .execute(&mut *conn)
    .await;

    let result = match result {
        Ok(r) => r,
        Err(e) if is_unique_violation(&e) => {
            return Err(AtlasError::DuplicateEntity(format!("api {}", api.api_key)))
        }
        Err(e) => return Err(map_sqlx_error(e)),
    };

    Ok(ApiMetadata {
        id: result.last_insert_rowid(),
        api_key: api.api_key.clone(),
        title: api.title.clone(),
        version: api.version.clone(),
        description: api.description.clone(),
        base_url: api.base_url.clone(),
        servers: api.servers.clone(),
        spec_format: api.spec_format.clone(),
        spec_hash: api.spec_hash.clone(),
        ingested_at,
    })
}

async fn remove_api(conn: &mut SqliteConnection, api_key: &str) -> Result<bool> {
    let api_id: Option<i64> = sqlx::query_scalar("SELECT id FROM apis WHERE api_key = ?")
        .bind(api_key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

    let Some(api_id) = api_id else {
        return Ok(false);
    };

    for stmt in [
        "DELETE FROM endpoints_fts WHERE api_id = ?",
        "DELETE FROM schemas_fts WHERE api_id = ?",
        "DELETE FROM endpoints WHERE api_id = ?",
        "DELETE FROM schemas WHERE api_id = ?",
        "DELETE FROM categories WHERE api_id = ?",
        "DELETE FROM apis WHERE id = ?",
    ] {
        sqlx::query(stmt)
            .bind(api_id)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
    }

    tracing::debug!(api_id, api_key, "deleted api");
    Ok(true)
}

async fn insert_endpoints(
    conn: &mut SqliteConnection,
    api_id: i64,
    endpoints: &[CategorizedEndpoint],
) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    for ce in endpoints {
        let e = &ce.endpoint;
        let method = e.method.to_ascii_uppercase();
        let request_body_schema_json = e
            .request_body_schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let auth_json = e.auth.as_ref().map(serde_json::to_string).transpose()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO endpoints (api_id, path, method, operation_id, summary, description,
                                   parameters_json, request_body_ref, request_body_schema_json,
                                   response_refs_json, tags_json, category, deprecated, auth_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(api_id)
        .bind(&e.path)
        .bind(&method)
        .bind(&e.operation_id)
        .bind(&e.summary)
        .bind(&e.description)
        .bind(serde_json::to_string(&e.parameters)?)
        .bind(&e.request_body_ref)
        .bind(&request_body_schema_json)
        .bind(serde_json::to_string(&e.response_refs)?)
        .bind(serde_json::to_string(&e.tags)?)
        .bind(&ce.category)
        .bind(e.deprecated)
        .bind(&auth_json)
        .execute(&mut *conn)
        .await;

        let endpoint_id = match inserted {
            Ok(r) => r.last_insert_rowid(),
            Err(err) if is_unique_violation(&err) => {
                let key = format!("{} {}", method, e.path);
                tracing::warn!(api_id, endpoint = %key, "duplicate endpoint skipped");
                report.skipped.push(key);
                continue;
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        sqlx::query(
            "INSERT INTO endpoints_fts (endpoint_id, api_id, path, summary, description, params) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(endpoint_id)
        .bind(api_id)
        .bind(&e.path)
        .bind(e.summary.as_deref().unwrap_or(""))
        .bind(e.description.as_deref().unwrap_or(""))
        .bind(join_words(e.parameters.iter().map(|p| &p.name)))
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        report.inserted += 1;
    }

    Ok(report)
}

async fn insert_schemas(
    conn: &mut SqliteConnection,
    api_id: i64,
    schemas: &[ParsedSchema],
) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    for s in schemas {
        let example_json = s.example.as_ref().map(serde_json::to_string).transpose()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO schemas (api_id, name, original_name, description, schema_type,
                                 properties_json, required_json, example_json, refs_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(api_id)
        .bind(&s.name)
        .bind(&s.original_name)
        .bind(&s.description)
        .bind(&s.schema_type)
        .bind(serde_json::to_string(&s.properties)?)
        .bind(serde_json::to_string(&s.required)?)
        .bind(&example_json)
        .bind(serde_json::to_string(&s.refs)?)
        .execute(&mut *conn)
        .await;

        let schema_id = match inserted {
            Ok(r) => r.last_insert_rowid(),
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!(
                    api_id,
                    schema = %s.original_name,
                    flattened = %s.name,
                    "duplicate schema skipped"
                );
                report.skipped.push(s.original_name.clone());
                continue;
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        sqlx::query(
            "INSERT INTO schemas_fts (schema_id, api_id, name, description, props) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(schema_id)
        .bind(api_id)
        .bind(&s.name)
        .bind(s.description.as_deref().unwrap_or(""))
        .bind(join_words(s.properties.keys()))
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        report.inserted += 1;
    }

    Ok(report)
}

async fn insert_categories(
    conn: &mut SqliteConnection,
    api_id: i64,
    categories: &[EndpointCategory],
) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    for c in categories {
        let inserted = sqlx::query(
            r#"
            INSERT INTO categories (api_id, name, display_name, group_name, description,
                                    endpoint_count, http_methods_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(api_id)
        .bind(&c.name)
        .bind(&c.display_name)
        .bind(&c.group)
        .bind(&c.description)
        .bind(c.endpoint_count)
        .bind(serde_json::to_string(&c.http_methods)?)
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(_) => report.inserted += 1,
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!(api_id, category = %c.name, "duplicate category skipped");
                report.skipped.push(c.name.clone());
            }
            Err(err) => return Err(map_sqlx_error(err)),
        }
    }

    Ok(report)
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_api_metadata(&self, api: &NewApiMetadata) -> Result<ApiMetadata> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        insert_api(&mut conn, api).await
    }

    async fn delete_api(&self, api_key: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let removed = remove_api(&mut tx, api_key).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(removed)
    }

    async fn replace_api(
        &self,
        api: &NewApiMetadata,
        content: ApiContent<'_>,
    ) -> Result<ReplaceReport> {
        // Dropping `tx` on any early return rolls the whole replacement back.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let replaced = remove_api(&mut tx, &api.api_key).await?;
        let api = insert_api(&mut tx, api).await?;
        let endpoints = insert_endpoints(&mut tx, api.id, content.endpoints).await?;
        let schemas = insert_schemas(&mut tx, api.id, content.schemas).await?;
        let categories = insert_categories(&mut tx, api.id, content.categories).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

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
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let report = insert_endpoints(&mut tx, api_id, endpoints).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn create_schemas(&self, api_id: i64, schemas: &[ParsedSchema]) -> Result<BatchReport> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let report = insert_schemas(&mut tx, api_id, schemas).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn create_categories(
        &self,
        api_id: i64,
        categories: &[EndpointCategory],
    ) -> Result<BatchReport> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let report = insert_categories(&mut tx, api_id, categories).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn get_api_metadata(&self, api_id: i64) -> Result<Option<ApiMetadata>> {
        let row = sqlx::query("SELECT * FROM apis WHERE id = ?")
            .bind(api_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(api_from_row).transpose()
    }

    async fn get_api_by_key(&self, api_key: &str) -> Result<Option<ApiMetadata>> {
        let row = sqlx::query("SELECT * FROM apis WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(api_from_row).transpose()
    }

    async fn list_apis(&self) -> Result<Vec<ApiMetadata>> {
        let rows = sqlx::query("SELECT * FROM apis ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(api_from_row).collect()
    }

    async fn get_endpoint(&self, api_id: i64, id: i64) -> Result<Option<Endpoint>> {
        let row = sqlx::query("SELECT * FROM endpoints WHERE api_id = ? AND id = ?")
            .bind(api_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(endpoint_from_row).transpose()
    }

    async fn get_endpoint_by_path(
        &self,
        api_id: i64,
        path: &str,
        method: Option<&str>,
    ) -> Result<Option<Endpoint>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM endpoints
            WHERE api_id = ? AND path = ? AND (? IS NULL OR method = ?)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(api_id)
        .bind(path)
        .bind(method)
        .bind(method)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(endpoint_from_row).transpose()
    }

    async fn search_endpoint_candidates(
        &self,
        api_id: i64,
        keywords: Option<&str>,
        method: Option<&str>,
    ) -> Result<Vec<EndpointCandidate>> {
        let rows = match keywords.and_then(fts_match_expression) {
            Some(expr) => sqlx::query(
                r#"
                SELECT e.id, e.path, e.method, e.operation_id, e.summary, e.tags_json,
                       e.category, e.deprecated, endpoints_fts.rank AS rank
                FROM endpoints_fts
                JOIN endpoints e ON e.id = endpoints_fts.endpoint_id
                WHERE endpoints_fts MATCH ?
                  AND endpoints_fts.api_id = ?
                  AND (? IS NULL OR e.method = ?)
                ORDER BY endpoints_fts.rank, e.id
                "#,
            )
            .bind(expr)
            .bind(api_id)
            .bind(method)
            .bind(method)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?,
            None => sqlx::query(
                r#"
                SELECT id, path, method, operation_id, summary, tags_json,
                       category, deprecated, CAST(NULL AS REAL) AS rank
                FROM endpoints
                WHERE api_id = ? AND (? IS NULL OR method = ?)
                ORDER BY id
                "#,
            )
            .bind(api_id)
            .bind(method)
            .bind(method)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?,
        };

        rows.iter().map(candidate_from_row).collect()
    }

    async fn get_schema(&self, api_id: i64, name: &str) -> Result<Option<SchemaComponent>> {
        let row = sqlx::query("SELECT * FROM schemas WHERE api_id = ? AND name = ?")
            .bind(api_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(schema_from_row).transpose()
    }

    async fn list_schema_names(&self, api_id: i64) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM schemas WHERE api_id = ? ORDER BY name")
            .bind(api_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_categories(&self, api_id: i64) -> Result<Vec<EndpointCategory>> {
        let rows = sqlx::query("SELECT * FROM categories WHERE api_id = ? ORDER BY name")
            .bind(api_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| -> Result<EndpointCategory> {
                Ok(EndpointCategory {
                    name: col(row, "name")?,
                    display_name: col(row, "display_name")?,
                    group: col(row, "group_name")?,
                    description: col(row, "description")?,
                    endpoint_count: col(row, "endpoint_count")?,
                    http_methods: json_col(row, "http_methods_json")?,
                })
            })
            .collect()
    }

    async fn search_schemas(
        &self,
        api_id: i64,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<SchemaCandidate>> {
        let Some(expr) = fts_match_expression(keywords) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT s.name, s.description, schemas_fts.rank AS rank
            FROM schemas_fts
            JOIN schemas s ON s.id = schemas_fts.schema_id
            WHERE schemas_fts MATCH ? AND schemas_fts.api_id = ?
            ORDER BY schemas_fts.rank, s.name
            LIMIT ?
            "#,
        )
        .bind(expr)
        .bind(api_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| -> Result<SchemaCandidate> {
                Ok(SchemaCandidate {
                    name: col(row, "name")?,
                    description: col(row, "description")?,
                    rank: col(row, "rank")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_atlas_core::categorize::categorize;
    use api_atlas_core::spec::ParsedSpec;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteStore {
        let path = tmp.path().join("atlas.sqlite");
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn petstore() -> ParsedSpec {
        ParsedSpec::from_value(&json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "paths": {
                "/pets": {
                    "get": {"tags": ["pets"], "summary": "List all pets",
                            "parameters": [{"name": "limit", "in": "query"}]},
                    "post": {"tags": ["pets"], "summary": "Create a pet"}
                },
                "/pets/{petId}": {
                    "get": {"tags": ["pets"], "summary": "Info for a specific pet"}
                },
                "/stores/inventory": {
                    "get": {"tags": ["store"], "summary": "Returns inventory"}
                }
            },
            "components": {"schemas": {
                "Pet": {"type": "object", "description": "A pet in the store",
                        "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}},
                "Pet.V2": {"type": "object"},
                "PetV2": {"type": "object"}
            }}
        }))
        .unwrap()
    }

    fn new_api(key: &str) -> NewApiMetadata {
        NewApiMetadata {
            api_key: key.into(),
            title: "Petstore".into(),
            version: "1.0.0".into(),
            description: None,
            base_url: "https://petstore.example.com/v1".into(),
            servers: vec!["https://petstore.example.com/v1".into()],
            spec_format: "openapi-3.0.3".into(),
            spec_hash: "abc".into(),
        }
    }

    #[tokio::test]
    async fn endpoints_round_trip_through_json_columns() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let spec = petstore();
        let api = store.create_api_metadata(&new_api("petstore")).await.unwrap();
        let cat = categorize(&spec);

        let report = store.create_endpoints(api.id, &cat.endpoints).await.unwrap();
        assert_eq!(report.inserted, 4);

        let found = store
            .get_endpoint_by_path(api.id, "/pets", Some("GET"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tags, vec!["pets"]);
        assert_eq!(found.parameters[0].name, "limit");
        assert_eq!(found.category, "pets");

        let again = store.create_endpoints(api.id, &cat.endpoints[..1]).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.skipped.len(), 1);
    }

    #[tokio::test]
    async fn flattening_collision_keeps_first_declaration() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let spec = petstore();
        let api = store.create_api_metadata(&new_api("petstore")).await.unwrap();

        let report = store.create_schemas(api.id, &spec.schemas).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped.len(), 1);

        let names = store.list_schema_names(api.id).await.unwrap();
        assert_eq!(names, vec!["Pet", "PetV2"]);
    }

    #[tokio::test]
    async fn fts_search_ranks_and_filters_by_method() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let spec = petstore();
        let api = store.create_api_metadata(&new_api("petstore")).await.unwrap();
        store
            .create_endpoints(api.id, &categorize(&spec).endpoints)
            .await
            .unwrap();

        let hits = store
            .search_endpoint_candidates(api.id, Some("pet"), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.rank.is_some()));

        let gets = store
            .search_endpoint_candidates(api.id, Some("pets"), Some("POST"))
            .await
            .unwrap();
        assert_eq!(gets.len(), 1);
        assert_eq!(gets[0].method, "POST");

        let all = store
            .search_endpoint_candidates(api.id, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert!(all.iter().all(|h| h.rank.is_none()));
    }

    #[tokio::test]
    async fn schema_search_matches_property_names() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let spec = petstore();
        let api = store.create_api_metadata(&new_api("petstore")).await.unwrap();
        store.create_schemas(api.id, &spec.schemas).await.unwrap();

        let hits = store.search_schemas(api.id, "store", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Pet");
    }

    #[tokio::test]
    async fn delete_api_removes_rows_and_index_entries() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let spec = petstore();
        let api = store.create_api_metadata(&new_api("petstore")).await.unwrap();
        let cat = categorize(&spec);
        store.create_endpoints(api.id, &cat.endpoints).await.unwrap();
        store.create_schemas(api.id, &spec.schemas).await.unwrap();
        store.create_categories(api.id, &cat.catalog).await.unwrap();

        assert!(store.delete_api("petstore").await.unwrap());
        assert!(!store.delete_api("petstore").await.unwrap());

        let fts_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM endpoints_fts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(fts_rows, 0);
        assert_eq!(store.table_counts(api.id).await.unwrap(), TableCounts::default());
    }

    #[tokio::test]
    async fn failed_replace_leaves_previous_api_intact() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let spec = petstore();
        let cat = categorize(&spec);
        let content = ApiContent {
            endpoints: &cat.endpoints,
            schemas: &spec.schemas,
            categories: &cat.catalog,
        };

        let first = store.replace_api(&new_api("petstore"), content).await.unwrap();
        assert!(!first.replaced);
        let before = store.table_counts(first.api.id).await.unwrap();
        assert_eq!(before.endpoints, 4);

        // Schema inserts fail after the old rows are deleted and the new
        // endpoints are written.
        sqlx::query(
            "CREATE TRIGGER reject_schemas BEFORE INSERT ON schemas \
             BEGIN SELECT RAISE(ABORT, 'schema writes disabled'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store
            .replace_api(&new_api("petstore"), content)
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::Storage(_)));

        let kept = store.get_api_by_key("petstore").await.unwrap().unwrap();
        assert_eq!(kept.id, first.api.id);
        assert_eq!(store.table_counts(kept.id).await.unwrap(), before);
        assert_eq!(store.list_apis().await.unwrap().len(), 1);
        let hits = store
            .search_endpoint_candidates(kept.id, Some("pets"), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_api_key_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.create_api_metadata(&new_api("petstore")).await.unwrap();
        let err = store
            .create_api_metadata(&new_api("petstore"))
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::DuplicateEntity(_)));
    }

    #[test]
    fn busy_codes_are_transient() {
        assert!(is_busy_code(Some("5")));
        assert!(is_busy_code(Some("517")));
        assert!(is_busy_code(Some("6")));
        assert!(!is_busy_code(Some("2067")));
        assert!(!is_busy_code(None));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            AtlasError::TransientStorage(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            AtlasError::Storage(_)
        ));
    }
}
