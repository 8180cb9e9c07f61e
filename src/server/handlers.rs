//! HTTP handlers for record endpoints
//!
//! Every handler follows the same order: negotiate the representation,
//! resolve the subject, run the permission gate, then act. A failure at any
//! step short-circuits into the endpoint's error handler chain.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{
        HeaderMap, StatusCode,
        header::{ACCEPT, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH, LOCATION},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use url::form_urlencoded;
use uuid::Uuid;

use crate::core::error::{
    IdentityError, RestError, SearchError, StorageError, ValidationError,
};
use crate::core::identity::{Identity, IdentityResolver};
use crate::core::links::{Links, RecordLinker};
use crate::core::negotiation::{select, select_loader};
use crate::core::patch::JsonPatch;
use crate::core::permission::{ActorProvider, Operation, PermissionContext};
use crate::core::query::{PaginationMeta, SearchRequest};
use crate::core::record::Record;
use crate::core::serializer::{RecordResponder, SearchRenderContext};
use crate::core::service::{PidStatus, RecordStore, SearchIndex};
use crate::search::SuggestRequest;
use crate::server::endpoint::EndpointConfig;
use crate::server::error_handlers::{ErrorHandlers, render_error};

type QueryPairs = Query<Vec<(String, String)>>;

/// State shared by the handlers of one endpoint
#[derive(Clone)]
pub struct EndpointState {
    pub config: Arc<EndpointConfig>,
    pub resolver: IdentityResolver,
    pub records: Arc<dyn RecordStore>,
    pub index: Arc<dyn SearchIndex>,
    pub actors: Arc<dyn ActorProvider>,
    pub linker: RecordLinker,
    pub global_errors: Arc<ErrorHandlers>,
    pub default_results_size: usize,
    pub format_arg: String,
}

impl EndpointState {
    fn respond(&self, result: Result<Response, RestError>) -> Response {
        result.unwrap_or_else(|error| {
            render_error(error, &self.config.error_handlers, &self.global_errors)
        })
    }

    fn negotiate_record(
        &self,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<&RecordResponder, RestError> {
        let format = param(params, &self.format_arg);
        let (media_type, responder) = select(
            format,
            header(headers, ACCEPT.as_str()),
            &self.config.record_serializers_aliases,
            &self.config.record_serializers,
            &self.config.default_media_type,
        )?;
        tracing::debug!(prefix = %self.config.prefix, media_type, "Negotiated record format");
        Ok(responder)
    }

    fn load_body(&self, headers: &HeaderMap, body: &[u8]) -> Result<Value, RestError> {
        let (media_type, loader) = select_loader(
            header(headers, CONTENT_TYPE.as_str()),
            &self.config.loaders,
            &self.config.default_media_type,
        )?;
        tracing::debug!(prefix = %self.config.prefix, media_type, "Selected body loader");
        loader.load(body)
    }

    /// Resolve a URL value to its identity and live record
    ///
    /// A deleted identity yields `Gone` carrying the tombstone payload.
    async fn resolve(&self, pid_value: &str) -> Result<(Identity, Record), RestError> {
        match self.resolver.lookup(pid_value).await? {
            (identity, PidStatus::Registered { object_id }) => {
                let record = self
                    .records
                    .get(&object_id)
                    .await
                    .map_err(RestError::storage)?
                    .ok_or(StorageError::MissingRecord { id: object_id })?;
                Ok((identity, record))
            }
            (identity, PidStatus::Deleted { object_id }) => {
                let tombstone = self
                    .records
                    .get(&object_id)
                    .await
                    .map_err(RestError::storage)?
                    .map(|record| record.data);
                Err(IdentityError::Gone {
                    identity,
                    record: tombstone,
                }
                .into())
            }
            (identity, PidStatus::Unknown) => Err(IdentityError::NotFound {
                pid_type: identity.pid_type,
                pid_value: identity.pid_value,
            }
            .into()),
        }
    }

    fn render_record(
        &self,
        responder: &RecordResponder,
        identity: &Identity,
        record: &Record,
        status: StatusCode,
        mut headers: Vec<(String, String)>,
    ) -> Result<Response, RestError> {
        headers.push((ETAG.to_string(), record.etag()));
        let links = self.linker.links(identity);
        Ok(responder
            .render(identity, record, &links, status, &headers)?
            .into_response())
    }

    async fn reindex(&self, record: &Record) -> Result<(), RestError> {
        self.index
            .index(&self.config.search.index, record)
            .await
            .map_err(RestError::storage)
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn matches_etag(header_value: &str, etag: &str) -> bool {
    header_value
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || tag.trim_start_matches("W/") == etag)
}

/// Reject a write whose `If-Match` does not name the current revision
fn check_if_match(headers: &HeaderMap, record: &Record) -> Result<(), ValidationError> {
    match header(headers, IF_MATCH.as_str()) {
        Some(value) if !matches_etag(value, &record.etag()) => {
            Err(ValidationError::PreconditionFailed {
                current: record.revision,
            })
        }
        _ => Ok(()),
    }
}

fn require_object(value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::InvalidBody {
            message: "record payload must be a JSON object".to_string(),
        })
    }
}

/// List route URL for `page`, keeping the search arguments
fn page_url(route: &str, args: &[(String, String)], page: usize) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in args {
        query.append_pair(key, value);
    }
    query.append_pair("page", &page.to_string());
    format!("{}?{}", route, query.finish())
}

// =============================================================================
// Routes
// =============================================================================

/// Build the routes of one endpoint
///
/// - GET/POST {list_route}
/// - GET/PUT/PATCH/DELETE {item_route}
/// - GET {list_route}_suggest when suggesters are configured
/// - GET {list_route}_options when the options view is enabled
pub fn endpoint_routes(state: EndpointState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route(&config.list_route, get(search_records).post(create_record))
        .route(
            &config.item_route,
            get(read_record)
                .put(replace_record)
                .patch(patch_record)
                .delete(delete_record),
        );

    if !config.suggesters.is_empty() {
        router = router.route(&config.suggest_route(), get(suggest_records));
    }
    if config.use_options_view {
        router = router.route(&config.options_route(), get(endpoint_options));
    }

    router.with_state(state)
}

// =============================================================================
// Item handlers
// =============================================================================

/// GET {item_route}
pub async fn read_record(
    State(state): State<EndpointState>,
    Path(pid_value): Path<String>,
    Query(params): QueryPairs,
    headers: HeaderMap,
) -> Response {
    let result = read(&state, &pid_value, &params, &headers).await;
    state.respond(result)
}

async fn read(
    state: &EndpointState,
    pid_value: &str,
    params: &[(String, String)],
    headers: &HeaderMap,
) -> Result<Response, RestError> {
    let responder = state.negotiate_record(params, headers)?;
    let (identity, record) = state.resolve(pid_value).await?;

    let actor = state.actors.actor(headers);
    let context = PermissionContext::new(Operation::Read).with_record(&identity, &record);
    state.config.permissions.check(&context, &actor)?;

    let etag = record.etag();
    if header(headers, IF_NONE_MATCH.as_str()).is_some_and(|value| matches_etag(value, &etag)) {
        return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response());
    }

    state.render_record(responder, &identity, &record, StatusCode::OK, Vec::new())
}

/// PUT {item_route}
pub async fn replace_record(
    State(state): State<EndpointState>,
    Path(pid_value): Path<String>,
    Query(params): QueryPairs,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = replace(&state, &pid_value, &params, &headers, &body).await;
    state.respond(result)
}

async fn replace(
    state: &EndpointState,
    pid_value: &str,
    params: &[(String, String)],
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, RestError> {
    let responder = state.negotiate_record(params, headers)?;
    let (identity, record) = state.resolve(pid_value).await?;

    let mut data = state.load_body(headers, body)?;
    require_object(&data)?;

    let actor = state.actors.actor(headers);
    let context = PermissionContext::new(Operation::Update)
        .with_record(&identity, &record)
        .with_payload(&data);
    state.config.permissions.check(&context, &actor)?;
    check_if_match(headers, &record)?;

    state.resolver.stamp(&identity, &mut data)?;
    let updated = state
        .records
        .update(&record.id, data)
        .await
        .map_err(RestError::storage)?;
    state.reindex(&updated).await?;

    tracing::info!(identity = %identity, revision = updated.revision, "Replaced record");
    state.render_record(responder, &identity, &updated, StatusCode::OK, Vec::new())
}

/// PATCH {item_route}
pub async fn patch_record(
    State(state): State<EndpointState>,
    Path(pid_value): Path<String>,
    Query(params): QueryPairs,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = patch(&state, &pid_value, &params, &headers, &body).await;
    state.respond(result)
}

async fn patch(
    state: &EndpointState,
    pid_value: &str,
    params: &[(String, String)],
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, RestError> {
    let responder = state.negotiate_record(params, headers)?;
    let (identity, record) = state.resolve(pid_value).await?;

    let operations = JsonPatch::from_value(state.load_body(headers, body)?)?;

    let actor = state.actors.actor(headers);
    let context = PermissionContext::new(Operation::Update).with_record(&identity, &record);
    state.config.permissions.check(&context, &actor)?;
    check_if_match(headers, &record)?;

    let mut data = record.data.clone();
    operations.apply(&mut data)?;
    require_object(&data)?;
    state.resolver.stamp(&identity, &mut data)?;

    let updated = state
        .records
        .update(&record.id, data)
        .await
        .map_err(RestError::storage)?;
    state.reindex(&updated).await?;

    tracing::info!(identity = %identity, revision = updated.revision, "Patched record");
    state.render_record(responder, &identity, &updated, StatusCode::OK, Vec::new())
}

/// DELETE {item_route}
pub async fn delete_record(
    State(state): State<EndpointState>,
    Path(pid_value): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = delete(&state, &pid_value, &headers).await;
    state.respond(result)
}

async fn delete(
    state: &EndpointState,
    pid_value: &str,
    headers: &HeaderMap,
) -> Result<Response, RestError> {
    let (identity, record) = state.resolve(pid_value).await?;

    let actor = state.actors.actor(headers);
    let context = PermissionContext::new(Operation::Delete).with_record(&identity, &record);
    state.config.permissions.check(&context, &actor)?;
    check_if_match(headers, &record)?;

    state
        .records
        .delete(&record.id)
        .await
        .map_err(RestError::storage)?;
    state.resolver.delete(&identity).await?;
    state
        .index
        .remove(&state.config.search.index, &record.id)
        .await
        .map_err(RestError::storage)?;

    tracing::info!(identity = %identity, "Deleted record");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// =============================================================================
// List handlers
// =============================================================================

/// POST {list_route}
pub async fn create_record(
    State(state): State<EndpointState>,
    Query(params): QueryPairs,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = create(&state, &params, &headers, &body).await;
    state.respond(result)
}

async fn create(
    state: &EndpointState,
    params: &[(String, String)],
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, RestError> {
    let responder = state.negotiate_record(params, headers)?;
    let actor = state.actors.actor(headers);
    state
        .config
        .permissions
        .check(&PermissionContext::new(Operation::Create), &actor)?;

    let mut data = state.load_body(headers, body)?;
    require_object(&data)?;

    let object_id = Uuid::new_v4();
    let identity = state.resolver.mint(&mut data, object_id).await?;
    let record = state
        .records
        .create(object_id, data)
        .await
        .map_err(RestError::storage)?;
    state.reindex(&record).await?;

    tracing::info!(identity = %identity, object_id = %object_id, "Created record");
    let location = state
        .config
        .item_route
        .replace("{pid_value}", &identity.pid_value);
    state.render_record(
        responder,
        &identity,
        &record,
        StatusCode::CREATED,
        vec![(LOCATION.to_string(), location)],
    )
}

/// GET {list_route}
pub async fn search_records(
    State(state): State<EndpointState>,
    Query(params): QueryPairs,
    headers: HeaderMap,
) -> Response {
    let result = search(&state, &params, &headers).await;
    state.respond(result)
}

async fn search(
    state: &EndpointState,
    params: &[(String, String)],
    headers: &HeaderMap,
) -> Result<Response, RestError> {
    let config = &state.config;
    let request = SearchRequest::from_pairs(params, state.default_results_size, &state.format_arg)?;

    let (media_type, responder) = select(
        request.format.as_deref(),
        header(headers, ACCEPT.as_str()),
        &config.search_serializers_aliases,
        &config.search_serializers,
        &config.default_media_type,
    )?;
    tracing::debug!(prefix = %config.prefix, media_type, "Negotiated search format");

    let actor = state.actors.actor(headers);
    config
        .permissions
        .check(&PermissionContext::new(Operation::List), &actor)?;

    let prepared = config.search.prepare(&request)?;
    let result = state
        .index
        .search(&prepared.index, &prepared)
        .await
        .map_err(RestError::storage)?;

    let pagination = PaginationMeta::new(
        request.page,
        request.size,
        result.total,
        config.search.max_result_window,
    );
    let mut url_args = prepared.url_args.clone();
    if let Some(format) = &request.format {
        url_args.push((state.format_arg.clone(), format.clone()));
    }
    let mut links = Links::new();
    links.insert(
        "self".to_string(),
        page_url(&config.list_route, &url_args, pagination.page),
    );
    if pagination.has_prev {
        links.insert(
            "prev".to_string(),
            page_url(&config.list_route, &url_args, pagination.page - 1),
        );
    }
    if pagination.has_next {
        links.insert(
            "next".to_string(),
            page_url(&config.list_route, &url_args, pagination.page + 1),
        );
    }

    let mut context = SearchRenderContext::new(&config.pid_type);
    context.links = links;
    context.linker = Some(&state.linker);
    context.sort = prepared.resolved_sort.clone();

    Ok(responder
        .render_search(config.fetcher.as_ref(), &result, &context, StatusCode::OK, &[])?
        .into_response())
}

/// GET {list_route}_suggest
pub async fn suggest_records(
    State(state): State<EndpointState>,
    Query(params): QueryPairs,
    headers: HeaderMap,
) -> Response {
    let result = suggest(&state, &params, &headers).await;
    state.respond(result)
}

async fn suggest(
    state: &EndpointState,
    params: &[(String, String)],
    headers: &HeaderMap,
) -> Result<Response, RestError> {
    let config = &state.config;

    let actor = state.actors.actor(headers);
    config
        .permissions
        .check(&PermissionContext::new(Operation::List), &actor)?;

    let mut body = Map::new();
    for (name, def) in &config.suggesters {
        let Some(prefix) = param(params, name) else {
            continue;
        };
        let context = def
            .context
            .as_deref()
            .and_then(|field| param(params, field))
            .map(str::to_string);
        let request = SuggestRequest::new(def, prefix, context);
        let suggestions = state
            .index
            .suggest(&config.search.index, &request)
            .await
            .map_err(RestError::storage)?;
        body.insert(name.clone(), json!(suggestions));
    }

    if body.is_empty() {
        return Err(SearchError::InvalidParameter {
            name: "suggest".to_string(),
            value: "no completion requested".to_string(),
        }
        .into());
    }

    Ok(Json(Value::Object(body)).into_response())
}

/// GET {list_route}_options
pub async fn endpoint_options(State(state): State<EndpointState>) -> Json<Value> {
    let config = &state.config;
    let sort_fields: Vec<Value> = config
        .search
        .sorts
        .options()
        .map(|(name, option)| {
            json!({
                name: {
                    "title": option.title,
                    "default_order": option.default_order,
                }
            })
        })
        .collect();

    Json(json!({
        "sort_fields": sort_fields,
        "max_result_window": config.search.max_result_window,
        "default_media_type": config.default_media_type,
        "item_media_types": config.record_serializers.keys().collect::<Vec<_>>(),
        "search_media_types": config.search_serializers.keys().collect::<Vec<_>>(),
    }))
}
