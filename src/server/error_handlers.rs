//! Error handlers keyed by status code or failure kind
//!
//! Lookup order at the dispatch boundary: endpoint handlers (kind, then
//! status code), global handlers (kind, then status code), then
//! [`DefaultErrorHandler`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::error::{ConfigError, ErrorBody, ErrorKind, IdentityError, RestError};

/// Renders an error into a structured body
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &RestError) -> ErrorBody;
}

/// `{status, message}`, hiding server-side details
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, error: &RestError) -> ErrorBody {
        error.to_body()
    }
}

/// Adds `removal_reason` (or `null`) to the body of a gone identity
pub struct RemovalReasonHandler;

impl ErrorHandler for RemovalReasonHandler {
    fn handle(&self, error: &RestError) -> ErrorBody {
        let body = error.to_body();
        match error {
            RestError::Identity(gone @ IdentityError::Gone { .. }) => body.with_field(
                "removal_reason",
                gone.removal_reason().cloned().unwrap_or(Value::Null),
            ),
            _ => body,
        }
    }
}

/// What an error handler is registered against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorHandlerKey {
    Status(StatusCode),
    Kind(ErrorKind),
}

impl FromStr for ErrorHandlerKey {
    type Err = ConfigError;

    /// `"410"` or a kind name such as `"identity_gone"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u16>() {
            return StatusCode::from_u16(code)
                .ok()
                .filter(|status| status.is_client_error() || status.is_server_error())
                .map(ErrorHandlerKey::Status)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "error_handlers".to_string(),
                    value: s.to_string(),
                    message: "expected a 4xx or 5xx status code".to_string(),
                });
        }
        s.parse().map(ErrorHandlerKey::Kind)
    }
}

/// A set of registered handlers
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    handlers: HashMap<ErrorHandlerKey, Arc<dyn ErrorHandler>>,
}

impl ErrorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ErrorHandlerKey, handler: Arc<dyn ErrorHandler>) {
        self.handlers.insert(key, handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler for `error`: kind first, then status code
    pub fn find(&self, error: &RestError) -> Option<&Arc<dyn ErrorHandler>> {
        self.handlers
            .get(&ErrorHandlerKey::Kind(error.kind()))
            .or_else(|| {
                self.handlers
                    .get(&ErrorHandlerKey::Status(error.status_code()))
            })
    }
}

/// Turn `error` into a response through the handler chain
pub fn render_error(error: RestError, endpoint: &ErrorHandlers, global: &ErrorHandlers) -> Response {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(error = %error, code = error.error_code(), "Request failed");
    } else {
        tracing::warn!(status = status.as_u16(), code = error.error_code(), "Request rejected: {}", error);
    }

    let body = match endpoint.find(&error).or_else(|| global.find(&error)) {
        Some(handler) => handler.handle(&error),
        None => DefaultErrorHandler.handle(&error),
    };
    body.into_response()
}
