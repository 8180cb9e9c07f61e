//! Integration tests for configuration loading, merging and startup checks

mod common;

use axum::http::StatusCode;
use common::{RECORDS_YAML, records_config, server_with};
use records_rest::prelude::*;
use serde_json::{Value, json};
use std::io::Write;

const DOCUMENTS_YAML: &str = r#"
endpoints:
  docid:
    pid_type: docid
    pid_minter: uuid
    pid_fetcher: uuid
    list_route: /documents/
    item_route: /documents/{pid_value}
    search_index: documents
    create_permission_factory: allow_all
sort_options:
  documents:
    name:
      title: Name
      fields: [name]
default_sort:
  documents:
    noquery: name
"#;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn config_error(result: anyhow::Result<Router>) -> ConfigError {
    let err = result.err().expect("build should fail");
    match err.downcast::<ConfigError>() {
        Ok(config_error) => config_error,
        Err(other) => panic!("Expected ConfigError, got {:?}", other),
    }
}

// =============================================================================
// Merging
// =============================================================================

#[test]
fn test_merge_adds_endpoints_and_search_settings() {
    let records = records_config();
    let documents = RestConfig::from_yaml_str(DOCUMENTS_YAML).unwrap();

    let merged = records.merge(documents);

    assert_eq!(
        merged.endpoints.keys().collect::<Vec<_>>(),
        vec!["recid", "docid"]
    );
    assert!(merged.sort_options.contains_key("records"));
    assert!(merged.sort_options.contains_key("documents"));
    assert!(merged.facets.contains_key("records"));
}

#[test]
fn test_merge_later_endpoint_wins() {
    let first = records_config();
    let mut second = records_config();
    second.endpoints.get_mut("recid").unwrap().max_result_window = 7;

    let merged = first.merge(second);
    assert_eq!(merged.endpoints.len(), 1);
    assert_eq!(merged.endpoints["recid"].max_result_window, 7);
}

#[test]
fn test_minimal_endpoint_defaults() {
    let config = RestConfig::from_yaml_str(DOCUMENTS_YAML).unwrap();
    let endpoint = &config.endpoints["docid"];

    assert_eq!(endpoint.default_media_type, "application/json");
    assert_eq!(endpoint.search_query_parser, "or");
    assert_eq!(endpoint.max_result_window, 10_000);
    assert!(endpoint.read_permission_factory.is_none());
    assert_eq!(config.default_results_size, 10);
    assert_eq!(config.format_query_arg, "format");
}

// =============================================================================
// Loading from files
// =============================================================================

#[tokio::test]
async fn test_endpoints_from_config_files() {
    let records = write_config(RECORDS_YAML);
    let documents = write_config(DOCUMENTS_YAML);

    let server = server_with(
        ServerBuilder::new()
            .with_config_file(records.path().to_str().unwrap())
            .unwrap()
            .with_config_file(documents.path().to_str().unwrap())
            .unwrap()
            .in_memory(),
    );

    let response = server
        .post("/documents/")
        .json(&json!({"name": "report"}))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    let id = body["id"].as_str().unwrap();
    assert!(Uuid::parse_str(id).is_ok());
    assert_eq!(body["metadata"]["id"], id);
    assert_eq!(body["links"]["self"], format!("/documents/{}", id));

    server
        .get(&format!("/documents/{}", id))
        .await
        .assert_status_ok();

    let body: Value = server.get("/documents/").await.json();
    assert_eq!(body["hits"]["total"], 1);
    assert_eq!(body["sort"], "name");

    // The records endpoint does not see documents
    let body: Value = server.get("/records/").await.json();
    assert_eq!(body["hits"]["total"], 0);
}

#[test]
fn test_missing_config_file() {
    let result = ServerBuilder::new().with_config_file("/nonexistent/records.yaml");
    assert!(result.is_err());
}

#[test]
fn test_malformed_config_file() {
    let file = write_config("endpoints: [not, a, map");
    let err = RestConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap_err();

    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::ParseError { file: Some(_), .. }) => {}
        other => panic!("Expected ParseError, got {:?}", other),
    }
}

// =============================================================================
// Several endpoints over one pid type
// =============================================================================

#[tokio::test]
async fn test_links_point_at_default_endpoint() {
    let mut config = records_config();
    let mut public = config.endpoints["recid"].clone();
    public.list_route = "/public/".to_string();
    public.item_route = "/public/<pid(recid):pid_value>".to_string();
    public.default_endpoint_prefix = false;
    public.suggesters.clear();
    public.use_options_view = false;
    config.endpoints.insert("public".to_string(), public);

    let server = server_with(ServerBuilder::new().with_config(config).in_memory());

    server
        .post("/public/")
        .json(&json!({"title": "shared"}))
        .await
        .assert_status(StatusCode::CREATED);

    let body: Value = server.get("/public/1").await.json();
    assert_eq!(body["links"]["self"], "/records/1");

    let body: Value = server.get("/records/1").await.json();
    assert_eq!(body["metadata"]["title"], "shared");
}

// =============================================================================
// Startup errors
// =============================================================================

#[test]
fn test_route_collision_fails_build() {
    let mut config = records_config();
    let mut clash = config.endpoints["recid"].clone();
    clash.item_route = "/records/{pid_value}".to_string();
    clash.list_route = "/elsewhere/".to_string();
    clash.default_endpoint_prefix = false;
    clash.suggesters.clear();
    clash.use_options_view = false;
    config.endpoints.insert("clash".to_string(), clash);

    let err = config_error(ServerBuilder::new().with_config(config).in_memory().build());
    assert!(matches!(err, ConfigError::RouteCollision { .. }));
}

#[test]
fn test_two_default_endpoints_fail_build() {
    let mut config = records_config();
    let mut second = config.endpoints["recid"].clone();
    second.list_route = "/second/".to_string();
    second.item_route = "/second/<pid_value>".to_string();
    second.suggesters.clear();
    second.use_options_view = false;
    config.endpoints.insert("second".to_string(), second);

    let err = config_error(ServerBuilder::new().with_config(config).in_memory().build());
    assert!(matches!(err, ConfigError::AmbiguousDefault { .. }));
}

#[test]
fn test_unknown_plugin_fails_build() {
    let mut config = records_config();
    config
        .endpoints
        .get_mut("recid")
        .unwrap()
        .record_serializers
        .insert("application/xml".to_string(), "xml".to_string());

    let err = config_error(ServerBuilder::new().with_config(config).in_memory().build());
    assert!(matches!(
        err,
        ConfigError::MissingPlugin {
            kind: "serializer",
            ..
        }
    ));
}

#[test]
fn test_item_route_without_pid_value_fails_build() {
    let mut config = records_config();
    config.endpoints.get_mut("recid").unwrap().item_route = "/records/<id>".to_string();

    let err = config_error(ServerBuilder::new().with_config(config).in_memory().build());
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn test_unbound_default_media_type_fails_build() {
    let mut config = records_config();
    config.endpoints.get_mut("recid").unwrap().default_media_type = "text/csv".to_string();

    let err = config_error(ServerBuilder::new().with_config(config).in_memory().build());
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn test_custom_plugins_are_resolvable() {
    let mut config = records_config();
    config
        .endpoints
        .get_mut("recid")
        .unwrap()
        .record_serializers
        .insert("application/vnd.pretty+json".to_string(), "pretty".to_string());

    let result = ServerBuilder::new()
        .with_config(config)
        .register_plugins(|plugins| {
            plugins.register_serializer("pretty", std::sync::Arc::new(JsonSerializer::pretty()))
        })
        .unwrap()
        .in_memory()
        .build();

    assert!(result.is_ok());
}
