//! Normalization of decoded OpenAPI 3.x / Swagger 2.0 documents.
//!
//! The byte-level decoder lives outside this crate; it hands over a
//! `serde_json::Value`. [`ParsedSpec::from_value`] turns that tree into the
//! typed shape the categorizer and store consume:
//!
//! - one [`ParsedEndpoint`] per `(path, method)` with path-level parameters
//!   merged into operation parameters and `$ref` parameters resolved,
//! - one [`ParsedSchema`] per named component, with its name flattened,
//! - the resolved base URL, tag declarations, and `x-tagGroups` hierarchy.

use serde_json::{Map, Value};

use crate::error::{AtlasError, Result};
use crate::models::{AuthHint, Parameter};

/// Base URL used when the document declares no server or host.
pub const PLACEHOLDER_BASE_URL: &str = "https://api.example.com";

/// Operation keys of a path item, in the order endpoints are emitted.
const OPERATION_KEYS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Flatten a dotted component name: every `.` is removed, case and order kept.
///
/// `CreateProductCampaignRequest.V2.ProductCampaignPlacement.V2` becomes
/// `CreateProductCampaignRequestV2ProductCampaignPlacementV2`.
pub fn flatten_schema_name(name: &str) -> String {
    name.chars().filter(|c| *c != '.').collect()
}

/// Human-readable statement of the flattening rule, returned with misses.
pub const FLATTENING_RULE: &str = "Schema names are flattened by removing every '.' separator \
     while preserving case and order, e.g. 'Order.V2.Item' is stored as 'OrderV2Item'.";

/// Spec dialect of the decoded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecFormat {
    OpenApi3(String),
    Swagger2,
}

impl std::fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecFormat::OpenApi3(v) => write!(f, "openapi-{}", v),
            SpecFormat::Swagger2 => write!(f, "swagger-2.0"),
        }
    }
}

/// A top-level `tags[]` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDefinition {
    pub name: String,
    pub description: Option<String>,
}

/// One entry of the `x-tagGroups` vendor extension.
#[derive(Debug, Clone, PartialEq)]
pub struct TagGroup {
    pub name: String,
    pub tags: Vec<String>,
}

/// An operation as declared, before categorization.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEndpoint {
    pub path: String,
    pub method: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub request_body_ref: Option<String>,
    pub request_body_schema: Option<Value>,
    pub response_refs: Vec<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    pub auth: Option<AuthHint>,
}

/// A named schema component as declared, name already flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSchema {
    pub name: String,
    pub original_name: String,
    pub description: Option<String>,
    pub schema_type: Option<String>,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    pub example: Option<Value>,
    pub refs: Vec<String>,
}

/// The normalized specification handed to the categorizer and the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpec {
    pub format: SpecFormat,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub servers: Vec<String>,
    pub base_url: String,
    pub endpoints: Vec<ParsedEndpoint>,
    pub schemas: Vec<ParsedSchema>,
    pub tags: Vec<TagDefinition>,
    pub tag_groups: Vec<TagGroup>,
}

/// Two or more declared components that flatten to the same name.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatteningCollision {
    pub flattened: String,
    pub original_names: Vec<String>,
}

impl ParsedSpec {
    /// Normalize a decoded OpenAPI 3.x or Swagger 2.0 document.
    pub fn from_value(doc: &Value) -> Result<Self> {
        let root = doc
            .as_object()
            .ok_or_else(|| AtlasError::InvalidSpec("document root is not an object".into()))?;

        let format = if let Some(v) = root.get("openapi").and_then(Value::as_str) {
            SpecFormat::OpenApi3(v.to_string())
        } else if root.get("swagger").and_then(Value::as_str).is_some() {
            SpecFormat::Swagger2
        } else {
            return Err(AtlasError::InvalidSpec(
                "missing 'openapi' or 'swagger' version field".into(),
            ));
        };

        let info = root.get("info");
        let title = str_at(info, "title").unwrap_or_else(|| "Untitled API".to_string());
        let version = str_at(info, "version").unwrap_or_else(|| "0.0.0".to_string());
        let description = str_at(info, "description");

        let (servers, base_url) = match format {
            SpecFormat::OpenApi3(_) => openapi_servers(root),
            SpecFormat::Swagger2 => swagger_servers(root),
        };

        let security_schemes = match format {
            SpecFormat::OpenApi3(_) => root
                .get("components")
                .and_then(|c| c.get("securitySchemes")),
            SpecFormat::Swagger2 => root.get("securityDefinitions"),
        };
        let global_security = root.get("security");

        let mut endpoints = Vec::new();
        if let Some(paths) = root.get("paths").and_then(Value::as_object) {
            for (path, item) in paths {
                let Some(item) = item.as_object() else {
                    continue;
                };
                let shared_params = item.get("parameters");
                for key in OPERATION_KEYS {
                    let Some(op) = item.get(key).and_then(Value::as_object) else {
                        continue;
                    };
                    endpoints.push(parse_operation(
                        root,
                        &format,
                        path,
                        key,
                        op,
                        shared_params,
                        security_schemes,
                        global_security,
                    ));
                }
            }
        }

        let schema_map = match format {
            SpecFormat::OpenApi3(_) => root.get("components").and_then(|c| c.get("schemas")),
            SpecFormat::Swagger2 => root.get("definitions"),
        };
        let schemas = schema_map
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(name, schema)| parse_schema(name, schema))
                    .collect()
            })
            .unwrap_or_default();

        let tags = root
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        Some(TagDefinition {
                            name: t.get("name")?.as_str()?.to_string(),
                            description: str_at(Some(t), "description"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let tag_groups = root
            .get("x-tagGroups")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|g| {
                        Some(TagGroup {
                            name: g.get("name")?.as_str()?.to_string(),
                            tags: string_list(g.get("tags")),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            format,
            title,
            version,
            description,
            servers,
            base_url,
            endpoints,
            schemas,
            tags,
            tag_groups,
        })
    }

    /// Components whose flattened names coincide.
    ///
    /// No resolution is attempted: the store keeps whichever declaration is
    /// inserted first and reports the rest as duplicates.
    pub fn flattening_collisions(&self) -> Vec<FlatteningCollision> {
        let mut seen: Vec<FlatteningCollision> = Vec::new();
        for schema in &self.schemas {
            match seen.iter_mut().find(|c| c.flattened == schema.name) {
                Some(c) => c.original_names.push(schema.original_name.clone()),
                None => seen.push(FlatteningCollision {
                    flattened: schema.name.clone(),
                    original_names: vec![schema.original_name.clone()],
                }),
            }
        }
        seen.retain(|c| c.original_names.len() > 1);
        seen
    }
}

fn str_at(v: Option<&Value>, key: &str) -> Option<String> {
    v.and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn openapi_servers(root: &Map<String, Value>) -> (Vec<String>, String) {
    let servers = root.get("servers").and_then(Value::as_array);
    let raw: Vec<String> = servers
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.get("url").and_then(Value::as_str).map(|u| u.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let base = match servers.and_then(|arr| arr.first()) {
        Some(first) => {
            let url = first.get("url").and_then(Value::as_str).unwrap_or("");
            let substituted = substitute_server_variables(url, first.get("variables"));
            if substituted.is_empty() {
                PLACEHOLDER_BASE_URL.to_string()
            } else if substituted.starts_with('/') {
                format!("{}{}", PLACEHOLDER_BASE_URL, substituted)
            } else {
                substituted
            }
        }
        None => PLACEHOLDER_BASE_URL.to_string(),
    };

    (raw, base.trim_end_matches('/').to_string())
}

fn substitute_server_variables(url: &str, variables: Option<&Value>) -> String {
    let Some(vars) = variables.and_then(Value::as_object) else {
        return url.to_string();
    };
    let mut out = url.to_string();
    for (name, var) in vars {
        if let Some(default) = var.get("default").and_then(Value::as_str) {
            out = out.replace(&format!("{{{}}}", name), default);
        }
    }
    out
}

fn swagger_servers(root: &Map<String, Value>) -> (Vec<String>, String) {
    let base_path = root.get("basePath").and_then(Value::as_str).unwrap_or("");
    let base = match root.get("host").and_then(Value::as_str) {
        Some(host) => {
            let scheme = root
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .unwrap_or("https");
            format!("{}://{}{}", scheme, host, base_path)
        }
        None => format!("{}{}", PLACEHOLDER_BASE_URL, base_path),
    };
    let base = base.trim_end_matches('/').to_string();
    (vec![base.clone()], base)
}

/// Resolve a local JSON pointer such as `#/components/parameters/Limit`.
fn resolve_pointer<'a>(root: &'a Map<String, Value>, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    let mut segments = pointer.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    let mut current = root.get(&unescape_pointer(first))?;
    for seg in segments {
        current = current.get(unescape_pointer(seg))?;
    }
    Some(current)
}

fn unescape_pointer(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Flattened component name targeted by a schema `$ref`, if it points at
/// `#/components/schemas/*` or `#/definitions/*`.
pub fn schema_ref_target(reference: &str) -> Option<String> {
    let name = reference
        .strip_prefix("#/components/schemas/")
        .or_else(|| reference.strip_prefix("#/definitions/"))?;
    Some(flatten_schema_name(&unescape_pointer(name)))
}

/// Every schema `$ref` reachable inside `value`, flattened, deduplicated,
/// in first-seen order.
pub fn collect_schema_refs(value: &Value) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let mut stack: Vec<&Value> = vec![value];
    while let Some(v) = stack.pop() {
        match v {
            Value::Object(map) => {
                if let Some(target) = map
                    .get("$ref")
                    .and_then(Value::as_str)
                    .and_then(schema_ref_target)
                {
                    if !refs.contains(&target) {
                        refs.push(target);
                    }
                }
                // Reverse so the stack pops keys in map order.
                for child in map.values().rev() {
                    stack.push(child);
                }
            }
            Value::Array(items) => {
                for child in items.iter().rev() {
                    stack.push(child);
                }
            }
            _ => {}
        }
    }
    refs
}

#[allow(clippy::too_many_arguments)]
fn parse_operation(
    root: &Map<String, Value>,
    format: &SpecFormat,
    path: &str,
    method: &str,
    op: &Map<String, Value>,
    shared_params: Option<&Value>,
    security_schemes: Option<&Value>,
    global_security: Option<&Value>,
) -> ParsedEndpoint {
    let mut parameters: Vec<Parameter> = Vec::new();
    let mut request_body_ref = None;
    let mut request_body_schema = None;

    let declared = shared_params
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .chain(op.get("parameters").and_then(Value::as_array).into_iter().flatten());

    for raw in declared {
        let resolved = match raw.get("$ref").and_then(Value::as_str) {
            Some(r) => match resolve_pointer(root, r) {
                Some(v) => v,
                None => continue,
            },
            None => raw,
        };
        let Some(name) = resolved.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = resolved
            .get("in")
            .and_then(Value::as_str)
            .unwrap_or("query")
            .to_string();

        if location == "body" {
            if let Some(schema) = resolved.get("schema") {
                match schema.get("$ref").and_then(Value::as_str).and_then(schema_ref_target) {
                    Some(target) => request_body_ref = Some(target),
                    None => request_body_schema = Some(schema.clone()),
                }
            }
        }

        let schema_type = resolved
            .get("type")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .or_else(|| {
                let schema = resolved.get("schema")?;
                schema
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
                    .or_else(|| schema.get("$ref")?.as_str().and_then(schema_ref_target))
            });

        let param = Parameter {
            name: name.to_string(),
            location,
            required: resolved
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            schema_type,
            description: str_at(Some(resolved), "description"),
        };

        // Operation-level declarations override path-level ones.
        match parameters
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(existing) => *existing = param,
            None => parameters.push(param),
        }
    }

    if let SpecFormat::OpenApi3(_) = format {
        if let Some(body) = op.get("requestBody") {
            let body = match body.get("$ref").and_then(Value::as_str) {
                Some(r) => resolve_pointer(root, r).unwrap_or(body),
                None => body,
            };
            if let Some(schema) = json_media_schema(body.get("content")) {
                match schema.get("$ref").and_then(Value::as_str).and_then(schema_ref_target) {
                    Some(target) => request_body_ref = Some(target),
                    None => request_body_schema = Some(schema.clone()),
                }
            }
        }
    }

    let mut response_refs: Vec<String> = Vec::new();
    if let Some(responses) = op.get("responses").and_then(Value::as_object) {
        for (status, response) in responses {
            if !status.starts_with('2') {
                continue;
            }
            let response = match response.get("$ref").and_then(Value::as_str) {
                Some(r) => resolve_pointer(root, r).unwrap_or(response),
                None => response,
            };
            let schema = match format {
                SpecFormat::OpenApi3(_) => json_media_schema(response.get("content")),
                SpecFormat::Swagger2 => response.get("schema"),
            };
            if let Some(schema) = schema {
                for target in collect_schema_refs(schema) {
                    if !response_refs.contains(&target) {
                        response_refs.push(target);
                    }
                }
            }
        }
    }

    let security = op.get("security").or(global_security);

    ParsedEndpoint {
        path: path.to_string(),
        method: method.to_ascii_uppercase(),
        operation_id: op
            .get("operationId")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        summary: op.get("summary").and_then(Value::as_str).map(|s| s.to_string()),
        description: op
            .get("description")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        parameters,
        request_body_ref,
        request_body_schema,
        response_refs,
        tags: string_list(op.get("tags")),
        deprecated: op.get("deprecated").and_then(Value::as_bool).unwrap_or(false),
        auth: auth_hint(security, security_schemes),
    }
}

/// Pick the JSON media type schema from a `content` map, falling back to the
/// first media type declared.
fn json_media_schema(content: Option<&Value>) -> Option<&Value> {
    let content = content?.as_object()?;
    let media = content
        .get("application/json")
        .or_else(|| {
            content
                .iter()
                .find(|(k, _)| k.contains("json"))
                .map(|(_, v)| v)
        })
        .or_else(|| content.values().next())?;
    media.get("schema")
}

fn auth_hint(security: Option<&Value>, schemes: Option<&Value>) -> Option<AuthHint> {
    let requirement = security?.as_array()?.first()?.as_object()?;
    let scheme_name = requirement.keys().next()?;
    let scheme = schemes?.get(scheme_name)?;
    let kind = scheme.get("type").and_then(Value::as_str)?;
    match kind {
        "http" => match scheme
            .get("scheme")
            .and_then(Value::as_str)
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("basic") => Some(AuthHint::Basic),
            _ => Some(AuthHint::Bearer),
        },
        "basic" => Some(AuthHint::Basic),
        "apiKey" => {
            let name = scheme
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("X-API-Key")
                .to_string();
            match scheme.get("in").and_then(Value::as_str) {
                Some("query") => Some(AuthHint::ApiKeyQuery { name }),
                _ => Some(AuthHint::ApiKeyHeader { name }),
            }
        }
        "oauth2" | "openIdConnect" => Some(AuthHint::OAuth2),
        _ => None,
    }
}

fn parse_schema(original_name: &str, schema: &Value) -> ParsedSchema {
    let mut properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let mut required = string_list(schema.get("required"));

    // Inline allOf members contribute their properties; referenced members
    // show up in `refs` and are resolved on lookup.
    if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
        for member in members {
            if let Some(props) = member.get("properties").and_then(Value::as_object) {
                for (k, v) in props {
                    properties.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            for r in string_list(member.get("required")) {
                if !required.contains(&r) {
                    required.push(r);
                }
            }
        }
    }

    let schema_type = schema
        .get("type")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .or_else(|| (!properties.is_empty()).then(|| "object".to_string()));

    let example = schema.get("example").cloned().or_else(|| {
        schema
            .get("examples")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .cloned()
    });

    ParsedSchema {
        name: flatten_schema_name(original_name),
        original_name: original_name.to_string(),
        description: str_at(Some(schema), "description"),
        schema_type,
        properties,
        required,
        example,
        refs: collect_schema_refs(schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore_v3() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Petstore", "version": "1.2.0", "description": "Pets." },
            "servers": [
                { "url": "https://{region}.petstore.io/v1/", "variables": { "region": { "default": "eu" } } },
                { "url": "https://backup.petstore.io" }
            ],
            "security": [{ "bearerAuth": [] }],
            "tags": [{ "name": "Pets", "description": "Pet operations" }],
            "paths": {
                "/pets/{petId}": {
                    "parameters": [
                        { "name": "petId", "in": "path", "required": true, "schema": { "type": "string" } }
                    ],
                    "get": {
                        "operationId": "getPet",
                        "summary": "Get a pet",
                        "tags": ["Pets"],
                        "parameters": [{ "$ref": "#/components/parameters/Verbose" }],
                        "responses": {
                            "200": { "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Pet" } } } },
                            "404": { "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } } }
                        }
                    },
                    "put": {
                        "tags": ["Pets"],
                        "security": [],
                        "requestBody": { "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Pet.Update" } } } },
                        "responses": { "204": { "description": "ok" } }
                    }
                }
            },
            "components": {
                "securitySchemes": { "bearerAuth": { "type": "http", "scheme": "bearer" } },
                "parameters": {
                    "Verbose": { "name": "verbose", "in": "query", "schema": { "type": "boolean" } }
                },
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": { "type": "string" },
                            "owner": { "$ref": "#/components/schemas/Owner" }
                        }
                    },
                    "Pet.Update": { "properties": { "name": { "type": "string" } } },
                    "Owner": { "type": "object", "properties": { "pets": { "type": "array", "items": { "$ref": "#/components/schemas/Pet" } } } },
                    "Error": { "type": "object", "example": { "code": 404 } }
                }
            }
        })
    }

    #[test]
    fn test_flatten_removes_every_dot() {
        assert_eq!(flatten_schema_name("A.B.C"), "ABC");
        assert_eq!(
            flatten_schema_name("CreateProductCampaignRequest.V2.ProductCampaignPlacement.V2"),
            "CreateProductCampaignRequestV2ProductCampaignPlacementV2"
        );
        assert_eq!(flatten_schema_name("plain"), "plain");
    }

    #[test]
    fn test_openapi_base_url_substitutes_variables() {
        let spec = ParsedSpec::from_value(&petstore_v3()).unwrap();
        assert_eq!(spec.format, SpecFormat::OpenApi3("3.0.3".into()));
        assert_eq!(spec.base_url, "https://eu.petstore.io/v1");
        assert_eq!(spec.servers.len(), 2);
        assert_eq!(spec.title, "Petstore");
        assert_eq!(spec.version, "1.2.0");
    }

    #[test]
    fn test_openapi_endpoints() {
        let spec = ParsedSpec::from_value(&petstore_v3()).unwrap();
        assert_eq!(spec.endpoints.len(), 2);

        let get = &spec.endpoints[0];
        assert_eq!(get.method, "GET");
        assert_eq!(get.operation_id.as_deref(), Some("getPet"));
        assert_eq!(get.tags, vec!["Pets".to_string()]);
        let names: Vec<&str> = get.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["petId", "verbose"]);
        assert_eq!(get.response_refs, vec!["Pet".to_string()]);
        assert_eq!(get.auth, Some(AuthHint::Bearer));

        let put = &spec.endpoints[1];
        assert_eq!(put.method, "PUT");
        assert_eq!(put.request_body_ref.as_deref(), Some("PetUpdate"));
        assert_eq!(put.auth, None, "empty security array disables auth");
    }

    #[test]
    fn test_schemas_are_flattened_with_refs() {
        let spec = ParsedSpec::from_value(&petstore_v3()).unwrap();
        let pet = spec.schemas.iter().find(|s| s.name == "Pet").unwrap();
        assert_eq!(pet.refs, vec!["Owner".to_string()]);
        assert_eq!(pet.required, vec!["name".to_string()]);

        let update = spec.schemas.iter().find(|s| s.name == "PetUpdate").unwrap();
        assert_eq!(update.original_name, "Pet.Update");
        assert_eq!(update.schema_type.as_deref(), Some("object"));

        let error = spec.schemas.iter().find(|s| s.name == "Error").unwrap();
        assert_eq!(error.example, Some(json!({ "code": 404 })));
    }

    #[test]
    fn test_swagger_base_url() {
        let doc = json!({
            "swagger": "2.0",
            "info": { "title": "Legacy", "version": "2" },
            "host": "legacy.example.org",
            "basePath": "/api/",
            "schemes": ["http", "https"],
            "paths": {
                "/items": {
                    "post": {
                        "tags": ["Items"],
                        "parameters": [
                            { "name": "body", "in": "body", "schema": { "$ref": "#/definitions/Item.New" } }
                        ],
                        "responses": { "201": { "schema": { "type": "array", "items": { "$ref": "#/definitions/Item" } } } }
                    }
                }
            },
            "definitions": { "Item": { "type": "object" }, "Item.New": { "type": "object" } }
        });
        let spec = ParsedSpec::from_value(&doc).unwrap();
        assert_eq!(spec.format, SpecFormat::Swagger2);
        assert_eq!(spec.base_url, "http://legacy.example.org/api");
        let ep = &spec.endpoints[0];
        assert_eq!(ep.request_body_ref.as_deref(), Some("ItemNew"));
        assert_eq!(ep.response_refs, vec!["Item".to_string()]);
    }

    #[test]
    fn test_missing_host_uses_placeholder() {
        let doc = json!({ "swagger": "2.0", "info": { "title": "t", "version": "1" }, "paths": {} });
        let spec = ParsedSpec::from_value(&doc).unwrap();
        assert_eq!(spec.base_url, PLACEHOLDER_BASE_URL);

        let doc = json!({ "openapi": "3.1.0", "info": { "title": "t", "version": "1" } });
        let spec = ParsedSpec::from_value(&doc).unwrap();
        assert_eq!(spec.base_url, PLACEHOLDER_BASE_URL);
        assert!(spec.endpoints.is_empty());
    }

    #[test]
    fn test_rejects_non_spec_documents() {
        let err = ParsedSpec::from_value(&json!({ "hello": "world" })).unwrap_err();
        assert!(matches!(err, AtlasError::InvalidSpec(_)));
        let err = ParsedSpec::from_value(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, AtlasError::InvalidSpec(_)));
    }

    #[test]
    fn test_tag_groups() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": { "title": "t", "version": "1" },
            "x-tagGroups": [{ "name": "Advertising", "tags": ["Campaign", "Statistics"] }]
        });
        let spec = ParsedSpec::from_value(&doc).unwrap();
        assert_eq!(spec.tag_groups.len(), 1);
        assert_eq!(spec.tag_groups[0].tags, vec!["Campaign", "Statistics"]);
    }

    #[test]
    fn test_flattening_collisions_are_reported_not_resolved() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": { "title": "t", "version": "1" },
            "components": { "schemas": {
                "A.BC": { "type": "object" },
                "AB.C": { "type": "string" },
                "Unique": { "type": "object" }
            }}
        });
        let spec = ParsedSpec::from_value(&doc).unwrap();
        let collisions = spec.flattening_collisions();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].flattened, "ABC");
        assert_eq!(collisions[0].original_names.len(), 2);
        // Both declarations survive normalization; nothing is renamed.
        assert_eq!(spec.schemas.iter().filter(|s| s.name == "ABC").count(), 2);
    }
}
