use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn atlas_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("atlas");
    path
}

const PETSTORE: &str = r##"{
  "openapi": "3.0.3",
  "info": { "title": "Petstore", "version": "1.0.0" },
  "servers": [{ "url": "https://petstore.example.com/v1" }],
  "paths": {
    "/pets": {
      "get": {
        "tags": ["pets"],
        "summary": "List all pets",
        "parameters": [{ "name": "limit", "in": "query", "schema": { "type": "integer" } }]
      },
      "post": {
        "tags": ["pets"],
        "summary": "Create a pet",
        "requestBody": {
          "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Pet" } } }
        }
      }
    },
    "/pets/{petId}": {
      "get": {
        "tags": ["pets"],
        "summary": "Info for a specific pet",
        "parameters": [{ "name": "petId", "in": "path", "required": true, "schema": { "type": "string" } }]
      }
    },
    "/stores/{storeId}/orders": {
      "get": { "tags": ["store"], "summary": "List orders for a store" }
    }
  },
  "components": {
    "schemas": {
      "Pet": {
        "type": "object",
        "required": ["id", "name"],
        "properties": {
          "id": { "type": "integer" },
          "name": { "type": "string" },
          "owner": { "$ref": "#/components/schemas/Owner" }
        },
        "example": { "id": 1, "name": "Rex" }
      },
      "Owner": { "type": "object", "properties": { "email": { "type": "string" } } },
      "Pet.V2": { "type": "object", "properties": { "nickname": { "type": "string" } } },
      "PetV2": { "type": "object", "properties": { "legacy": { "type": "boolean" } } }
    }
  }
}"##;

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let spec_path = root.join("petstore.json");
    fs::write(&spec_path, PETSTORE).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/atlas.sqlite"

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("atlas.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, spec_path)
}

fn run_atlas(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = atlas_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run atlas binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingested_env() -> (TempDir, PathBuf) {
    let (tmp, config_path, spec_path) = setup_test_env();
    let (stdout, stderr, success) =
        run_atlas(&config_path, &["ingest", spec_path.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

fn json_stdout(config_path: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, success) = run_atlas(config_path, args);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_atlas(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_atlas(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_atlas(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_counts_and_collisions() {
    let (_tmp, config_path, spec_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_atlas(&config_path, &["ingest", spec_path.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("api: Petstore (Petstore 1.0.0)"));
    assert!(stdout.contains("format: openapi-3.0.3"));
    assert!(stdout.contains("endpoints: 4"));
    assert!(stdout.contains("collision: PetV2"));
    assert!(stdout.contains("ok"));
    assert!(!stdout.contains("replaced"));
}

#[test]
fn test_reingest_replaces_previous_rows() {
    let (_tmp, config_path) = ingested_env();
    let spec = config_path.parent().unwrap().parent().unwrap().join("petstore.json");

    let (stdout, _, success) = run_atlas(&config_path, &["ingest", spec.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("replaced previous ingestion"));
    assert!(stdout.contains("endpoints: 4"));

    let (stats, _, success) = run_atlas(&config_path, &["stats"]);
    assert!(success);
    assert!(stats.contains("APIs:        1"));
}

#[test]
fn test_ingest_name_override() {
    let (_tmp, config_path, spec_path) = setup_test_env();

    let (stdout, _, success) = run_atlas(
        &config_path,
        &["ingest", spec_path.to_str().unwrap(), "--name", "pets-v1"],
    );
    assert!(success);
    assert!(stdout.contains("api: pets-v1"));
}

#[test]
fn test_ingest_rejects_non_spec_document() {
    let (tmp, config_path, _) = setup_test_env();
    let bogus = tmp.path().join("bogus.yaml");
    fs::write(&bogus, "just: [a, yaml, document]\n").unwrap();

    let (_, stderr, success) = run_atlas(&config_path, &["ingest", bogus.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("invalid specification"), "stderr={}", stderr);
}

#[test]
fn test_search_before_ingest_explains_next_step() {
    let (_tmp, config_path, _) = setup_test_env();
    run_atlas(&config_path, &["init"]);

    let (_, stderr, success) = run_atlas(&config_path, &["search", "pets"]);
    assert!(!success);
    assert!(stderr.contains("atlas ingest"), "stderr={}", stderr);
}

#[test]
fn test_search_keyword_and_method() {
    let (_tmp, config_path) = ingested_env();

    let body = json_stdout(&config_path, &["search", "pet", "--method", "post"]);
    let endpoints = body["endpoints"].as_array().unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0]["method"], "POST");
    assert_eq!(endpoints[0]["path"], "/pets");
    assert_eq!(body["pagination"]["totalResults"], 1);
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = ingested_env();

    let a = json_stdout(&config_path, &["search", "pets"]);
    let b = json_stdout(&config_path, &["search", "pets"]);
    assert_eq!(a, b);
}

#[test]
fn test_search_by_category_paginates() {
    let (_tmp, config_path) = ingested_env();

    let body = json_stdout(
        &config_path,
        &["search", "--category", "pets", "--per-page", "2"],
    );
    assert_eq!(body["endpoints"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["totalResults"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["hasNext"], true);
}

#[test]
fn test_search_category_and_group_conflict() {
    let (_tmp, config_path) = ingested_env();

    let (_, stderr, success) = run_atlas(
        &config_path,
        &["search", "--category", "pets", "--group", "anything"],
    );
    assert!(!success);
    assert!(stderr.contains("invalid request"), "stderr={}", stderr);
}

#[test]
fn test_categories_lists_tag_categories() {
    let (_tmp, config_path) = ingested_env();

    let body = json_stdout(&config_path, &["categories", "--sort-by", "endpointCount"]);
    let names: Vec<&str> = body["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.first(), Some(&"pets"));
    assert!(names.contains(&"store"));
    assert_eq!(body["metadata"]["apiTitle"], "Petstore");
}

#[test]
fn test_schema_found_with_dotted_name() {
    let (_tmp, config_path) = ingested_env();

    let body = json_stdout(&config_path, &["schema", "Pet"]);
    assert_eq!(body["status"], "found");
    assert_eq!(body["name"], "Pet");
    assert_eq!(body["example"]["name"], "Rex");

    let dotted = json_stdout(&config_path, &["schema", "Pet.V2"]);
    assert_eq!(dotted["status"], "found");
    assert_eq!(dotted["name"], "PetV2");
}

#[test]
fn test_schema_miss_is_not_an_error() {
    let (_tmp, config_path) = ingested_env();

    let body = json_stdout(&config_path, &["schema", "Nonexistent"]);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["requested"], "Nonexistent");
}

#[test]
fn test_example_by_method_and_path() {
    let (_tmp, config_path) = ingested_env();

    let body = json_stdout(&config_path, &["example", "POST /pets"]);
    assert_eq!(body["status"], "found");
    assert_eq!(body["method"], "POST");
    assert_eq!(body["url"], "https://petstore.example.com/v1/pets");
    let snippets = body["snippets"].as_array().unwrap();
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0]["code"].as_str().unwrap().contains("curl"));
}

#[test]
fn test_example_unknown_language_errors() {
    let (_tmp, config_path) = ingested_env();

    let (_, stderr, success) =
        run_atlas(&config_path, &["example", "/pets", "--language", "cobol"]);
    assert!(!success);
    assert!(stderr.contains("invalid request"), "stderr={}", stderr);
}

#[test]
fn test_stats_lists_ingested_api() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_atlas(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Petstore"));
    assert!(stdout.contains("openapi-3.0.3"));
}
