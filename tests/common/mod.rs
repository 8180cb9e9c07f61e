//! Shared fixtures for the integration tests

#![allow(dead_code)]

use axum_test::TestServer;
use records_rest::prelude::*;
use serde_json::{Value, json};

/// One `recid` endpoint with writes opened up, two formats, suggesters,
/// the options view and a `removal_reason` handler for 410
pub const RECORDS_YAML: &str = r#"
endpoints:
  recid:
    pid_type: recid
    pid_minter: recid
    pid_fetcher: recid
    list_route: /records/
    item_route: /records/<pid(recid):pid_value>
    search_index: records
    default_endpoint_prefix: true
    use_options_view: true
    record_serializers:
      application/json: json
      application/x-yaml: yaml
    search_serializers:
      application/json: json
      application/x-yaml: yaml
    record_serializers_aliases:
      json: application/json
      yaml: application/x-yaml
    search_serializers_aliases:
      json: application/json
      yaml: application/x-yaml
    create_permission_factory: allow_all
    update_permission_factory: allow_all
    delete_permission_factory: allow_all
    max_result_window: 100
    suggesters:
      title:
        field: title
        size: 3
      subject:
        field: subject
        context: type
    error_handlers:
      "410": removal_reason

sort_options:
  records:
    bestmatch:
      title: Best match
      fields: [-_score]
      default_order: desc
      order: 1
    mostrecent:
      title: Most recent
      fields: [-_created]
      order: 2
    title:
      title: Title
      fields: [title]
      order: 3
    year:
      title: Year
      fields: [-year]
      order: 4

default_sort:
  records:
    query: bestmatch
    noquery: mostrecent

facets:
  records:
    aggs:
      type:
        terms:
          field: type
      subject:
        terms:
          field: subject
    filters:
      language:
        terms: language
    post_filters:
      type:
        terms: type
      subject:
        terms: subject
      year:
        range: year
"#;

pub fn records_config() -> RestConfig {
    RestConfig::from_yaml_str(RECORDS_YAML).expect("fixture config parses")
}

pub fn server_with(builder: ServerBuilder) -> TestServer {
    let app = builder.build().expect("Failed to build app");
    TestServer::new(app)
}

/// In-memory server over [`RECORDS_YAML`], reading actors from headers
pub fn records_server() -> TestServer {
    server_with(
        ServerBuilder::new()
            .with_config(records_config())
            .with_actor_provider(HeaderActorProvider)
            .in_memory(),
    )
}

pub fn sample_records() -> Vec<Value> {
    vec![
        json!({"title": "Rust in Action", "type": "book", "subject": "programming", "year": 2021, "language": "en"}),
        json!({"title": "Programming Rust", "type": "book", "subject": "programming", "year": 2017, "language": "en"}),
        json!({"title": "Ownership explained", "type": "article", "subject": "programming", "year": 2019, "language": "fr"}),
        json!({"title": "Physics of stars", "type": "article", "subject": "physics", "year": 2015, "language": "en"}),
        json!({"title": "Rusty machines", "type": "thesis", "subject": "engineering", "year": 2020, "language": "de"}),
    ]
}

/// POST every sample record, returning the minted pid values
pub async fn seed(server: &TestServer) -> Vec<String> {
    let mut pids = Vec::new();
    for record in sample_records() {
        let response = server.post("/records/").json(&record).await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        pids.push(body["id"].as_str().expect("minted id").to_string());
    }
    pids
}
