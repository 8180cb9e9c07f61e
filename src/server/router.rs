//! Router assembly: health checks and endpoint routes

use axum::http::{Method, header};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::endpoint::EndpointConfig;
use crate::server::handlers::{EndpointState, endpoint_routes};
use crate::server::registry::EndpointRegistry;

/// Paths served by the built-in health check
pub const HEALTH_ROUTES: [&str; 2] = ["/health", "/healthz"];

/// Build health check routes
pub fn health_routes() -> Router {
    HEALTH_ROUTES
        .iter()
        .fold(Router::new(), |router, path| router.route(path, get(health_check)))
}

/// Health check endpoint handler
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "records-rest"
    }))
}

/// Merge health routes, endpoint routes and custom routes
///
/// `state_for` builds the handler state of each registered endpoint.
pub fn build_router(
    registry: &EndpointRegistry,
    state_for: impl Fn(&EndpointConfig) -> EndpointState,
    custom_routes: Vec<Router>,
    cors: bool,
) -> Router {
    let endpoints = registry.build_routes(|endpoint| endpoint_routes(state_for(endpoint)));

    let mut app = health_routes().merge(endpoints);
    for custom in custom_routes {
        app = app.merge(custom);
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .option_layer(cors.then(cors_layer)),
    )
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::IF_MATCH,
            header::IF_NONE_MATCH,
        ])
        .expose_headers([header::ETAG, header::LOCATION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum_test::TestServer;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_routes() {
        let server = TestServer::new(health_routes());

        for path in HEALTH_ROUTES {
            let response = server.get(path).await;
            response.assert_status_ok();
            let body: Value = response.json();
            assert_eq!(body["status"], "ok");
            assert_eq!(body["service"], "records-rest");
        }
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = health_routes().layer(cors_layer());

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/health")
            .header(header::ORIGIN, "https://example.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
