//! Schema reference resolution and example synthesis.
//!
//! Resolution walks component references breadth-first through an arena of
//! nodes and a visited set, so self-referential or mutually recursive
//! components terminate with a [`Truncation`] marker instead of recursing.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::SchemaComponent;
use crate::spec::schema_ref_target;
use crate::store::Store;

/// Default `maxDepth` for `getSchema`.
pub const DEFAULT_MAX_DEPTH: usize = 10;
/// Largest accepted `maxDepth`.
pub const MAX_DEPTH_LIMIT: usize = 50;
/// Reference depth followed when synthesizing example bodies.
pub const EXAMPLE_MAX_DEPTH: usize = 3;

/// Why a reference was not expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// The reference points back at one of its ancestors.
    Cycle,
    /// Already expanded elsewhere in this tree.
    Seen,
    /// Deeper than the requested `maxDepth`.
    MaxDepth,
    /// No component with that name exists.
    Missing,
}

/// One node of the resolved reference tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReference {
    pub name: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ResolvedReference>,
}

struct Node {
    name: String,
    depth: usize,
    parent: Option<usize>,
    component: Option<SchemaComponent>,
    truncated: Option<Truncation>,
}

fn is_ancestor(nodes: &[Node], root: &str, mut parent: Option<usize>, name: &str) -> bool {
    if root == name {
        return true;
    }
    while let Some(idx) = parent {
        if nodes[idx].name == name {
            return true;
        }
        parent = nodes[idx].parent;
    }
    false
}

/// Resolve the references of `root` up to `max_depth` levels.
pub async fn resolve_references<S: Store + ?Sized>(
    store: &S,
    api_id: i64,
    root: &SchemaComponent,
    max_depth: usize,
) -> Result<Vec<ResolvedReference>> {
    let mut nodes: Vec<Node> = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::from([root.name.clone()]);
    let mut cache: HashMap<String, Option<SchemaComponent>> = HashMap::new();

    for name in &root.refs {
        nodes.push(Node {
            name: name.clone(),
            depth: 1,
            parent: None,
            component: None,
            truncated: None,
        });
        queue.push_back(nodes.len() - 1);
    }

    while let Some(idx) = queue.pop_front() {
        let name = nodes[idx].name.clone();
        let depth = nodes[idx].depth;

        if is_ancestor(&nodes, &root.name, nodes[idx].parent, &name) {
            nodes[idx].truncated = Some(Truncation::Cycle);
            continue;
        }
        if visited.contains(&name) {
            nodes[idx].truncated = Some(Truncation::Seen);
            continue;
        }
        if depth > max_depth {
            nodes[idx].truncated = Some(Truncation::MaxDepth);
            continue;
        }

        let component = match cache.get(&name) {
            Some(c) => c.clone(),
            None => {
                let fetched = store.get_schema(api_id, &name).await?;
                cache.insert(name.clone(), fetched.clone());
                fetched
            }
        };

        let Some(component) = component else {
            nodes[idx].truncated = Some(Truncation::Missing);
            continue;
        };

        visited.insert(name);
        for child in &component.refs {
            nodes.push(Node {
                name: child.clone(),
                depth: depth + 1,
                parent: Some(idx),
                component: None,
                truncated: None,
            });
            queue.push_back(nodes.len() - 1);
        }
        nodes[idx].component = Some(component);
    }

    // Children are always created after their parent, so a reverse sweep
    // sees every child before the node that owns it.
    let mut pending: Vec<Vec<ResolvedReference>> = vec![Vec::new(); nodes.len()];
    let mut top: Vec<ResolvedReference> = Vec::new();
    for idx in (0..nodes.len()).rev() {
        let mut children = std::mem::take(&mut pending[idx]);
        children.reverse();
        let node = &mut nodes[idx];
        let component = node.component.take();
        let resolved = ResolvedReference {
            name: std::mem::take(&mut node.name),
            depth: node.depth,
            schema_type: component.as_ref().and_then(|c| c.schema_type.clone()),
            description: component.as_ref().and_then(|c| c.description.clone()),
            properties: component
                .as_ref()
                .map(|c| c.properties.clone())
                .unwrap_or_default(),
            required: component.map(|c| c.required).unwrap_or_default(),
            truncated: node.truncated,
            references: children,
        };
        match node.parent {
            Some(p) => pending[p].push(resolved),
            None => top.push(resolved),
        }
    }
    top.reverse();
    Ok(top)
}

/// Fetch `roots` and every component they reference, up to `max_depth`
/// levels, into a name-keyed map.
pub async fn fetch_component_closure<S: Store + ?Sized>(
    store: &S,
    api_id: i64,
    roots: &[String],
    max_depth: usize,
) -> Result<HashMap<String, SchemaComponent>> {
    let mut found: HashMap<String, SchemaComponent> = HashMap::new();
    let mut missing: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = roots.iter().map(|r| (r.clone(), 0)).collect();

    while let Some((name, depth)) = queue.pop_front() {
        if found.contains_key(&name) || missing.contains(&name) || depth > max_depth {
            continue;
        }
        match store.get_schema(api_id, &name).await? {
            Some(component) => {
                for child in &component.refs {
                    queue.push_back((child.clone(), depth + 1));
                }
                found.insert(name, component);
            }
            None => {
                missing.insert(name);
            }
        }
    }
    Ok(found)
}

/// Example value for a stored component: its declared example, else one
/// synthesized from its properties.
pub fn example_for_component(
    component: &SchemaComponent,
    components: &HashMap<String, SchemaComponent>,
) -> Value {
    let mut visiting = vec![component.name.clone()];
    component_example(component, components, &mut visiting)
}

/// Example value for an inline schema object.
pub fn example_for_schema(schema: &Value, components: &HashMap<String, SchemaComponent>) -> Value {
    let mut visiting = Vec::new();
    schema_example(schema, components, &mut visiting)
}

fn component_example(
    component: &SchemaComponent,
    components: &HashMap<String, SchemaComponent>,
    visiting: &mut Vec<String>,
) -> Value {
    if let Some(example) = &component.example {
        return example.clone();
    }
    if component.properties.is_empty() {
        return match component.schema_type.as_deref() {
            Some(t) => primitive_example(t, None),
            None => Value::Object(Map::new()),
        };
    }
    let mut out = Map::new();
    for (name, prop) in &component.properties {
        out.insert(name.clone(), schema_example(prop, components, visiting));
    }
    Value::Object(out)
}

fn schema_example(
    schema: &Value,
    components: &HashMap<String, SchemaComponent>,
    visiting: &mut Vec<String>,
) -> Value {
    if let Some(v) = schema.get("example").or_else(|| schema.get("default")) {
        return v.clone();
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|e| e.first())
    {
        return first.clone();
    }
    if let Some(target) = schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(schema_ref_target)
    {
        if visiting.contains(&target) || visiting.len() > EXAMPLE_MAX_DEPTH {
            return Value::Object(Map::new());
        }
        return match components.get(&target) {
            Some(component) => {
                visiting.push(target);
                let v = component_example(component, components, visiting);
                visiting.pop();
                v
            }
            None => Value::Object(Map::new()),
        };
    }
    if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
        let mut merged = Map::new();
        for member in members {
            if let Value::Object(m) = schema_example(member, components, visiting) {
                merged.extend(m);
            }
        }
        return Value::Object(merged);
    }
    for key in ["oneOf", "anyOf"] {
        if let Some(first) = schema.get(key).and_then(Value::as_array).and_then(|a| a.first()) {
            return schema_example(first, components, visiting);
        }
    }

    let declared = schema.get("type").and_then(Value::as_str);
    let properties = schema.get("properties").and_then(Value::as_object);
    match (declared, properties) {
        (Some("array"), _) => match schema.get("items") {
            Some(items) => Value::Array(vec![schema_example(items, components, visiting)]),
            None => Value::Array(Vec::new()),
        },
        (Some("object"), Some(props)) | (None, Some(props)) => {
            let mut out = Map::new();
            for (name, prop) in props {
                out.insert(name.clone(), schema_example(prop, components, visiting));
            }
            Value::Object(out)
        }
        (Some(t), _) => primitive_example(t, schema.get("format").and_then(Value::as_str)),
        (None, None) => Value::Null,
    }
}

fn primitive_example(schema_type: &str, format: Option<&str>) -> Value {
    match schema_type {
        "string" => Value::String(
            match format {
                Some("date-time") => "2024-01-01T00:00:00Z",
                Some("date") => "2024-01-01",
                Some("email") => "user@example.com",
                Some("uuid") => "00000000-0000-0000-0000-000000000000",
                Some("uri") | Some("url") => "https://example.com",
                _ => "string",
            }
            .to_string(),
        ),
        "integer" => Value::from(0),
        "number" => Value::from(0.0),
        "boolean" => Value::Bool(true),
        "array" => Value::Array(Vec::new()),
        "object" => Value::Object(Map::new()),
        _ => Value::Null,
    }
}
