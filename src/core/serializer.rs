//! Record serializers, body loaders and response rendering
//!
//! A [`RecordSerializer`] turns a record or a search result into a body
//! string. [`RecordResponder`] and [`SearchResponder`] bind a serializer to
//! its media type and produce a [`RenderedResponse`] with status code and
//! extra headers.

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::core::error::{RestError, ValidationError};
use crate::core::identity::{Fetcher, Identity};
use crate::core::links::{Links, RecordLinker};
use crate::core::record::Record;
use crate::search::SearchResult;

/// Everything a search serializer needs besides the hits
pub struct SearchRenderContext<'a> {
    pub pid_type: &'a str,
    /// Search-level links (self, next, prev)
    pub links: Links,
    /// Builds per-hit links
    pub linker: Option<&'a RecordLinker>,
    /// Name of the resolved sort option
    pub sort: Option<String>,
}

impl<'a> SearchRenderContext<'a> {
    pub fn new(pid_type: &'a str) -> Self {
        Self {
            pid_type,
            links: Links::new(),
            linker: None,
            sort: None,
        }
    }
}

/// Serializes records and search results
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, identity: &Identity, record: &Record, links: &Links)
    -> Result<String, RestError>;

    fn serialize_search(
        &self,
        fetcher: &dyn Fetcher,
        result: &SearchResult,
        context: &SearchRenderContext<'_>,
    ) -> Result<String, RestError>;
}

/// Parses request bodies
pub trait Loader: Send + Sync {
    fn load(&self, body: &[u8]) -> Result<Value, RestError>;
}

// =============================================================================
// Document builders shared by the JSON and YAML serializers
// =============================================================================

fn record_document(identity: &Identity, record: &Record, links: &Links) -> Value {
    json!({
        "id": identity.pid_value,
        "metadata": record.data,
        "revision": record.revision,
        "created": record.created.to_rfc3339(),
        "updated": record.updated.to_rfc3339(),
        "links": links,
    })
}

fn search_document(
    fetcher: &dyn Fetcher,
    result: &SearchResult,
    context: &SearchRenderContext<'_>,
) -> Value {
    let hits: Vec<Value> = result
        .hits
        .iter()
        .map(|hit| {
            let identity = fetcher
                .fetch(context.pid_type, &hit.record.data)
                .unwrap_or_else(|| Identity::new(context.pid_type, hit.record.id.to_string()));
            let links = context
                .linker
                .map(|linker| linker.links(&identity))
                .unwrap_or_default();
            record_document(&identity, &hit.record, &links)
        })
        .collect();

    let aggregations: Map<String, Value> = result
        .aggregations
        .iter()
        .map(|(name, agg)| (name.clone(), json!(agg)))
        .collect();

    json!({
        "hits": {
            "hits": hits,
            "total": result.total,
        },
        "aggregations": aggregations,
        "links": context.links,
        "sort": context.sort,
    })
}

fn to_json_string(value: &Value, pretty: bool) -> Result<String, RestError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.map_err(|e| RestError::Internal(format!("JSON serialization failed: {}", e)))
}

/// JSON serializer (`application/json`)
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSerializer for JsonSerializer {
    fn serialize(
        &self,
        identity: &Identity,
        record: &Record,
        links: &Links,
    ) -> Result<String, RestError> {
        to_json_string(&record_document(identity, record, links), self.pretty)
    }

    fn serialize_search(
        &self,
        fetcher: &dyn Fetcher,
        result: &SearchResult,
        context: &SearchRenderContext<'_>,
    ) -> Result<String, RestError> {
        to_json_string(&search_document(fetcher, result, context), self.pretty)
    }
}

/// YAML serializer (`application/x-yaml`)
pub struct YamlSerializer;

impl RecordSerializer for YamlSerializer {
    fn serialize(
        &self,
        identity: &Identity,
        record: &Record,
        links: &Links,
    ) -> Result<String, RestError> {
        serde_yaml::to_string(&record_document(identity, record, links))
            .map_err(|e| RestError::Internal(format!("YAML serialization failed: {}", e)))
    }

    fn serialize_search(
        &self,
        fetcher: &dyn Fetcher,
        result: &SearchResult,
        context: &SearchRenderContext<'_>,
    ) -> Result<String, RestError> {
        serde_yaml::to_string(&search_document(fetcher, result, context))
            .map_err(|e| RestError::Internal(format!("YAML serialization failed: {}", e)))
    }
}

/// Loads a JSON object
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn load(&self, body: &[u8]) -> Result<Value, RestError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::InvalidBody {
                message: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(ValidationError::InvalidBody {
                message: "expected a JSON object".to_string(),
            }
            .into());
        }
        Ok(value)
    }
}

/// Loads an RFC 6902 JSON patch document
pub struct JsonPatchLoader;

impl Loader for JsonPatchLoader {
    fn load(&self, body: &[u8]) -> Result<Value, RestError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::InvalidPatch {
                message: e.to_string(),
            })?;
        if !value.is_array() {
            return Err(ValidationError::InvalidPatch {
                message: "expected an array of operations".to_string(),
            }
            .into());
        }
        Ok(value)
    }
}

// =============================================================================
// Response rendering
// =============================================================================

/// A fully rendered response
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl RenderedResponse {
    fn new(
        status: StatusCode,
        content_type: &str,
        body: String,
        extra_headers: &[(String, String)],
    ) -> Self {
        // The serializer owns the content type
        let headers = extra_headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
            .cloned()
            .collect();
        Self {
            status,
            content_type: content_type.to_string(),
            body,
            headers,
        }
    }

    /// First value of header `name`, content type included
    pub fn header(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid response header"),
            }
        }
        response
    }
}

/// Renders single records with one serializer
#[derive(Clone)]
pub struct RecordResponder {
    serializer: Arc<dyn RecordSerializer>,
    media_type: String,
}

/// Bind a serializer to its media type for record responses
pub fn record_responsify(
    serializer: Arc<dyn RecordSerializer>,
    media_type: impl Into<String>,
) -> RecordResponder {
    RecordResponder {
        serializer,
        media_type: media_type.into(),
    }
}

impl RecordResponder {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn render(
        &self,
        identity: &Identity,
        record: &Record,
        links: &Links,
        status: StatusCode,
        extra_headers: &[(String, String)],
    ) -> Result<RenderedResponse, RestError> {
        let body = self.serializer.serialize(identity, record, links)?;
        Ok(RenderedResponse::new(
            status,
            &self.media_type,
            body,
            extra_headers,
        ))
    }
}

/// Renders search results with one serializer
#[derive(Clone)]
pub struct SearchResponder {
    serializer: Arc<dyn RecordSerializer>,
    media_type: String,
}

/// Bind a serializer to its media type for search responses
pub fn search_responsify(
    serializer: Arc<dyn RecordSerializer>,
    media_type: impl Into<String>,
) -> SearchResponder {
    SearchResponder {
        serializer,
        media_type: media_type.into(),
    }
}

impl SearchResponder {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn render_search(
        &self,
        fetcher: &dyn Fetcher,
        result: &SearchResult,
        context: &SearchRenderContext<'_>,
        status: StatusCode,
        extra_headers: &[(String, String)],
    ) -> Result<RenderedResponse, RestError> {
        let body = self.serializer.serialize_search(fetcher, result, context)?;
        Ok(RenderedResponse::new(
            status,
            &self.media_type,
            body,
            extra_headers,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::FieldFetcher;
    use crate::search::{AggregationResult, Bucket, SearchHit};
    use indexmap::IndexMap;
    use uuid::Uuid;

    fn record(data: Value) -> Record {
        Record::new(Uuid::new_v4(), data)
    }

    fn result(n: usize) -> SearchResult {
        SearchResult {
            total: n,
            hits: (0..n)
                .map(|i| SearchHit {
                    score: 1.0,
                    record: record(json!({"control_number": i.to_string(), "title": "x"})),
                })
                .collect(),
            aggregations: IndexMap::from([(
                "type".to_string(),
                AggregationResult {
                    buckets: vec![Bucket {
                        key: "book".to_string(),
                        doc_count: n,
                    }],
                },
            )]),
        }
    }

    #[test]
    fn test_json_record_round_trip() {
        let identity = Identity::new("recid", "1");
        let rec = record(json!({"title": "Hello", "tags": ["a", "b"]}));
        let links = Links::from([("self".to_string(), "/records/1".to_string())]);

        let body = JsonSerializer::new().serialize(&identity, &rec, &links).unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(parsed["id"], "1");
        assert_eq!(parsed["metadata"], rec.data);
        assert_eq!(parsed["revision"], 1);
        assert_eq!(parsed["links"]["self"], "/records/1");
    }

    #[test]
    fn test_yaml_record_round_trip() {
        let identity = Identity::new("recid", "9");
        let rec = record(json!({"title": "Hello", "pages": 12}));

        let body = YamlSerializer
            .serialize(&identity, &rec, &Links::new())
            .unwrap();
        let parsed: Value = serde_yaml::from_str(&body).unwrap();

        assert_eq!(parsed["id"], "9");
        assert_eq!(parsed["metadata"], rec.data);
    }

    #[test]
    fn test_search_document_uses_fetcher_and_reports_all_hits() {
        let fetcher = FieldFetcher::new("control_number");
        let mut context = SearchRenderContext::new("recid");
        context.sort = Some("mostrecent".to_string());

        let body = JsonSerializer::new()
            .serialize_search(&fetcher, &result(3), &context)
            .unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(parsed["hits"]["total"], 3);
        assert_eq!(parsed["hits"]["hits"].as_array().unwrap().len(), 3);
        assert_eq!(parsed["hits"]["hits"][2]["id"], "2");
        assert_eq!(parsed["aggregations"]["type"]["buckets"][0]["doc_count"], 3);
        assert_eq!(parsed["sort"], "mostrecent");
    }

    #[test]
    fn test_search_hit_without_identity_falls_back_to_object_id() {
        let fetcher = FieldFetcher::new("missing");
        let res = result(1);
        let body = JsonSerializer::new()
            .serialize_search(&fetcher, &res, &SearchRenderContext::new("recid"))
            .unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["hits"]["hits"][0]["id"], res.hits[0].record.id.to_string());
    }

    #[test]
    fn test_json_loader() {
        assert!(JsonLoader.load(br#"{"title": "x"}"#).is_ok());
        assert!(JsonLoader.load(b"[1]").is_err());
        assert!(JsonLoader.load(b"{not json").is_err());
    }

    #[test]
    fn test_json_patch_loader() {
        assert!(JsonPatchLoader.load(br#"[{"op": "remove", "path": "/a"}]"#).is_ok());
        assert!(JsonPatchLoader.load(br#"{"op": "remove"}"#).is_err());
    }

    #[test]
    fn test_rendered_response_keeps_serializer_content_type() {
        let responder = record_responsify(Arc::new(JsonSerializer::new()), "application/json");
        let rendered = responder
            .render(
                &Identity::new("recid", "1"),
                &record(json!({})),
                &Links::new(),
                StatusCode::CREATED,
                &[
                    ("X-Test".to_string(), "test".to_string()),
                    ("Content-Type".to_string(), "text/plain".to_string()),
                ],
            )
            .unwrap();

        assert_eq!(rendered.status, StatusCode::CREATED);
        assert_eq!(rendered.header("content-type"), Some("application/json"));
        assert_eq!(rendered.header("x-test"), Some("test"));
        assert_eq!(rendered.headers.len(), 1);
    }

    #[test]
    fn test_into_response_sets_headers() {
        let rendered = RenderedResponse::new(
            StatusCode::OK,
            "application/x-custom",
            "body".to_string(),
            &[("X-Test".to_string(), "test".to_string())],
        );
        let response = rendered.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/x-custom");
        assert_eq!(response.headers()["x-test"], "test");
    }
}
