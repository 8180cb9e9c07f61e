//! Integration tests for the list route: query, facets, sort and paging

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{records_config, records_server, seed, server_with};
use records_rest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn titles(body: &Value) -> Vec<String> {
    body["hits"]["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| hit["metadata"]["title"].as_str().unwrap().to_string())
        .collect()
}

fn bucket(body: &Value, agg: &str, key: &str) -> u64 {
    body["aggregations"][agg]["buckets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["key"] == key)
        .map(|b| b["doc_count"].as_u64().unwrap())
        .unwrap_or(0)
}

async fn seeded() -> TestServer {
    let server = records_server();
    seed(&server).await;
    server
}

// =============================================================================
// Query
// =============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_index() {
        let server = records_server();

        let response = server.get("/records/").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["hits"]["total"], 0);
        assert_eq!(body["hits"]["hits"], json!([]));
        assert_eq!(body["links"]["self"], "/records/?size=10&page=1");
        assert!(body["links"].get("next").is_none());
    }

    #[tokio::test]
    async fn test_match_all_returns_everything() {
        let server = seeded().await;

        let body: Value = server.get("/records/").await.json();
        assert_eq!(body["hits"]["total"], 5);
        assert_eq!(body["sort"], "mostrecent");

        let hit = &body["hits"]["hits"][0];
        assert!(hit["links"]["self"].as_str().unwrap().starts_with("/records/"));
        assert_eq!(hit["links"]["self"], format!("/records/{}", hit["id"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn test_free_text_query() {
        let server = seeded().await;

        let body: Value = server.get("/records/?q=rust").await.json();
        assert_eq!(body["hits"]["total"], 3);
        assert_eq!(body["sort"], "bestmatch");

        let mut found = titles(&body);
        found.sort();
        assert_eq!(found, vec!["Programming Rust", "Rust in Action", "Rusty machines"]);
    }

    #[tokio::test]
    async fn test_field_query() {
        let server = seeded().await;

        let body: Value = server.get("/records/?q=title:stars").await.json();
        assert_eq!(titles(&body), vec!["Physics of stars"]);
    }

    #[tokio::test]
    async fn test_malformed_query_is_400() {
        let server = seeded().await;

        let response = server.get("/records/?q=(rust").await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn test_invalid_paging_arguments_are_400() {
        let server = seeded().await;

        for query in ["page=0", "size=abc", "page=-1"] {
            server
                .get(&format!("/records/?{}", query))
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_yaml_search_document() {
        let server = seeded().await;

        let response = server.get("/records/?format=yaml&q=physics").await;
        response.assert_status_ok();

        let body: Value = serde_yaml::from_str(&response.text()).unwrap();
        assert_eq!(body["hits"]["total"], 1);
    }
}

// =============================================================================
// Facets
// =============================================================================

mod facet_tests {
    use super::*;

    #[tokio::test]
    async fn test_aggregations_over_all_matches() {
        let server = seeded().await;

        let body: Value = server.get("/records/").await.json();
        assert_eq!(bucket(&body, "type", "book"), 2);
        assert_eq!(bucket(&body, "type", "article"), 2);
        assert_eq!(bucket(&body, "type", "thesis"), 1);
        assert_eq!(bucket(&body, "subject", "programming"), 3);
        assert_eq!(
            body["aggregations"]["type"]["buckets"][0],
            json!({"key": "article", "doc_count": 2})
        );
    }

    #[tokio::test]
    async fn test_filter_restricts_hits_and_aggregations() {
        let server = seeded().await;

        let body: Value = server.get("/records/?language=en").await.json();
        assert_eq!(body["hits"]["total"], 3);
        assert_eq!(bucket(&body, "type", "book"), 2);
        assert_eq!(bucket(&body, "type", "article"), 1);
        assert_eq!(bucket(&body, "type", "thesis"), 0);
    }

    #[tokio::test]
    async fn test_post_filter_restricts_hits_only() {
        let server = seeded().await;

        let body: Value = server.get("/records/?type=article").await.json();
        assert_eq!(body["hits"]["total"], 2);
        assert_eq!(bucket(&body, "type", "book"), 2);
        assert_eq!(bucket(&body, "type", "article"), 2);
        assert_eq!(bucket(&body, "subject", "programming"), 3);
    }

    #[tokio::test]
    async fn test_repeated_values_are_alternatives() {
        let server = seeded().await;

        let body: Value = server.get("/records/?type=article&type=thesis").await.json();
        assert_eq!(body["hits"]["total"], 3);
    }

    #[tokio::test]
    async fn test_range_post_filter() {
        let server = seeded().await;

        let body: Value = server.get("/records/?year=2017--2020&sort=year").await.json();
        assert_eq!(
            titles(&body),
            vec!["Rusty machines", "Ownership explained", "Programming Rust"]
        );

        let body: Value = server.get("/records/?year=2020--").await.json();
        assert_eq!(body["hits"]["total"], 2);
    }

    #[tokio::test]
    async fn test_unknown_facet_is_ignored() {
        let server = seeded().await;

        let body: Value = server.get("/records/?colour=red").await.json();
        assert_eq!(body["hits"]["total"], 5);
    }

    #[tokio::test]
    async fn test_propagated_post_filters_restrict_other_aggregations() {
        let mut config = records_config();
        config.facets_post_filters_propagate = true;
        let server = server_with(ServerBuilder::new().with_config(config).in_memory());
        seed(&server).await;

        let body: Value = server.get("/records/?type=article").await.json();
        assert_eq!(body["hits"]["total"], 2);

        // Own post-filter is not applied to its aggregation
        assert_eq!(bucket(&body, "type", "book"), 2);
        assert_eq!(bucket(&body, "subject", "programming"), 1);
        assert_eq!(bucket(&body, "subject", "physics"), 1);
        assert_eq!(bucket(&body, "subject", "engineering"), 0);
    }
}

// =============================================================================
// Sort
// =============================================================================

mod sort_tests {
    use super::*;

    #[tokio::test]
    async fn test_sort_option_and_reverse() {
        let server = seeded().await;

        let body: Value = server.get("/records/?sort=title").await.json();
        assert_eq!(body["sort"], "title");
        assert_eq!(
            titles(&body),
            vec![
                "Ownership explained",
                "Physics of stars",
                "Programming Rust",
                "Rust in Action",
                "Rusty machines"
            ]
        );

        let body: Value = server.get("/records/?sort=-title").await.json();
        assert_eq!(body["sort"], "-title");
        assert_eq!(titles(&body)[0], "Rusty machines");
    }

    #[tokio::test]
    async fn test_descending_field_in_option() {
        let server = seeded().await;

        let body: Value = server.get("/records/?sort=year").await.json();
        assert_eq!(titles(&body)[0], "Rust in Action");

        let body: Value = server.get("/records/?sort=-year").await.json();
        assert_eq!(titles(&body)[0], "Physics of stars");
    }

    #[tokio::test]
    async fn test_unknown_sort_is_ignored() {
        let server = seeded().await;

        let response = server.get("/records/?sort=popularity").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["hits"]["total"], 5);
        assert_eq!(body["sort"], Value::Null);
        assert_eq!(body["links"]["self"], "/records/?size=10&page=1");
    }

    #[tokio::test]
    async fn test_default_order_does_not_reverse() {
        let mut config = records_config();
        config.sort_options["records"]["title"].default_order = SortDirection::Desc;
        let server = server_with(ServerBuilder::new().with_config(config).in_memory());
        seed(&server).await;

        let body: Value = server.get("/records/?sort=title").await.json();
        assert_eq!(titles(&body)[0], "Ownership explained");

        let body: Value = server.get("/records/?sort=-title").await.json();
        assert_eq!(titles(&body)[0], "Rusty machines");

        let options: Value = server.get("/records/_options").await.json();
        assert_eq!(options["sort_fields"][2]["title"]["default_order"], "desc");
    }
}

// =============================================================================
// Paging
// =============================================================================

mod paging_tests {
    use super::*;

    #[tokio::test]
    async fn test_page_links() {
        let server = seeded().await;

        let body: Value = server.get("/records/?size=2&page=2&sort=title").await.json();
        assert_eq!(titles(&body), vec!["Programming Rust", "Rust in Action"]);
        assert_eq!(body["links"]["self"], "/records/?sort=title&size=2&page=2");
        assert_eq!(body["links"]["prev"], "/records/?sort=title&size=2&page=1");
        assert_eq!(body["links"]["next"], "/records/?sort=title&size=2&page=3");

        let body: Value = server.get("/records/?size=2&page=3&sort=title").await.json();
        assert_eq!(titles(&body), vec!["Rusty machines"]);
        assert!(body["links"].get("next").is_none());
    }

    #[tokio::test]
    async fn test_links_keep_query_and_facets() {
        let server = seeded().await;

        let body: Value = server.get("/records/?q=rust&size=1&type=book").await.json();
        assert_eq!(body["hits"]["total"], 2);
        assert_eq!(
            body["links"]["next"],
            "/records/?q=rust&size=1&type=book&page=2"
        );
    }

    #[tokio::test]
    async fn test_result_window() {
        let server = seeded().await;

        server
            .get("/records/?page=10&size=10")
            .await
            .assert_status_ok();

        let response = server.get("/records/?page=11&size=10").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("100"));
    }

    #[tokio::test]
    async fn test_window_is_checked_before_the_index() {
        let searches = Arc::new(AtomicUsize::new(0));
        let server = server_with(
            ServerBuilder::new()
                .with_config(records_config())
                .with_identifier_service(InMemoryIdentifierService::new())
                .with_record_store(InMemoryRecordStore::new())
                .with_search_index(CountingIndex {
                    inner: InMemoryIndex::new(),
                    searches: searches.clone(),
                }),
        );
        seed(&server).await;

        server
            .get("/records/?page=11&size=10")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(searches.load(Ordering::SeqCst), 0);

        server.get("/records/?page=10&size=10").await.assert_status_ok();
        assert_eq!(searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_links_keep_format() {
        let server = seeded().await;

        let response = server.get("/records/?format=yaml&size=2").await;
        response.assert_status_ok();
        let body: Value = serde_yaml::from_str(&response.text()).unwrap();
        assert_eq!(body["links"]["self"], "/records/?size=2&format=yaml&page=1");
        assert_eq!(body["links"]["next"], "/records/?size=2&format=yaml&page=2");
    }

    #[tokio::test]
    async fn test_next_link_stops_at_window() {
        let mut config = records_config();
        config.endpoints.get_mut("recid").unwrap().max_result_window = 4;
        let server = server_with(ServerBuilder::new().with_config(config).in_memory());
        seed(&server).await;

        let body: Value = server.get("/records/?size=2&page=1").await.json();
        assert!(body["links"].get("next").is_some());

        let body: Value = server.get("/records/?size=2&page=2").await.json();
        assert_eq!(body["hits"]["total"], 5);
        assert!(body["links"].get("next").is_none());
    }
}

/// Delegates to an in-memory index and counts searches
struct CountingIndex {
    inner: InMemoryIndex,
    searches: Arc<AtomicUsize>,
}

#[async_trait]
impl SearchIndex for CountingIndex {
    async fn index(&self, index: &str, record: &Record) -> Result<()> {
        self.inner.index(index, record).await
    }

    async fn remove(&self, index: &str, id: &Uuid) -> Result<()> {
        self.inner.remove(index, id).await
    }

    async fn search(&self, index: &str, search: &PreparedSearch) -> Result<SearchResult> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(index, search).await
    }

    async fn suggest(&self, index: &str, request: &SuggestRequest) -> Result<Vec<Suggestion>> {
        self.inner.suggest(index, request).await
    }
}
