//! Typed error handling for records-rest
//!
//! Every failure raised while serving a request is a [`RestError`]. Errors
//! travel unchanged up to the dispatch boundary, where the endpoint's error
//! handlers (then the global ones) turn them into a structured body of the
//! form `{status, message, ...}`.
//!
//! # Error Categories
//!
//! - [`IdentityError`]: persistent identifier resolution and minting
//! - [`PermissionError`]: permission gate denials
//! - [`NegotiationError`]: content negotiation failures
//! - [`SearchError`]: search request validation and query parsing
//! - [`ConfigError`]: invalid endpoint configuration (startup only)
//! - [`ValidationError`]: malformed request bodies
//! - [`StorageError`]: failures reported by external collaborators
//!
//! # Example
//!
//! ```rust,ignore
//! match resolver.fetch("42").await {
//!     Ok(resolved) => println!("object {}", resolved.object_id),
//!     Err(RestError::Identity(IdentityError::Gone { .. })) => println!("deleted"),
//!     Err(e) => eprintln!("other error: {}", e),
//! }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::core::identity::Identity;
use crate::core::permission::Operation;

/// The main error type of the crate
#[derive(Debug, Error)]
pub enum RestError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure kinds error handlers can be registered against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IdentityNotFound,
    IdentityGone,
    IdentityAlreadyExists,
    PermissionDenied,
    UnsupportedMediaType,
    ResultWindowExceeded,
    QueryParse,
    InvalidParameter,
    InvalidBody,
    PreconditionFailed,
    Configuration,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::IdentityNotFound => "identity_not_found",
            ErrorKind::IdentityGone => "identity_gone",
            ErrorKind::IdentityAlreadyExists => "identity_already_exists",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::UnsupportedMediaType => "unsupported_media_type",
            ErrorKind::ResultWindowExceeded => "result_window_exceeded",
            ErrorKind::QueryParse => "query_parse",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::InvalidBody => "invalid_body",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "identity_not_found" => ErrorKind::IdentityNotFound,
            "identity_gone" => ErrorKind::IdentityGone,
            "identity_already_exists" => ErrorKind::IdentityAlreadyExists,
            "permission_denied" => ErrorKind::PermissionDenied,
            "unsupported_media_type" => ErrorKind::UnsupportedMediaType,
            "result_window_exceeded" => ErrorKind::ResultWindowExceeded,
            "query_parse" => ErrorKind::QueryParse,
            "invalid_parameter" => ErrorKind::InvalidParameter,
            "invalid_body" => ErrorKind::InvalidBody,
            "precondition_failed" => ErrorKind::PreconditionFailed,
            "configuration" => ErrorKind::Configuration,
            "storage" => ErrorKind::Storage,
            "internal" => ErrorKind::Internal,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "error_handlers".to_string(),
                    value: other.to_string(),
                    message: "unknown error kind".to_string(),
                });
            }
        };
        Ok(kind)
    }
}

impl RestError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestError::Identity(e) => e.status_code(),
            RestError::Permission(e) => e.status_code(),
            RestError::Negotiation(e) => e.status_code(),
            RestError::Search(_) => StatusCode::BAD_REQUEST,
            RestError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::Validation(e) => e.status_code(),
            RestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the failure kind for error handler lookup
    pub fn kind(&self) -> ErrorKind {
        match self {
            RestError::Identity(IdentityError::NotFound { .. }) => ErrorKind::IdentityNotFound,
            RestError::Identity(IdentityError::Gone { .. }) => ErrorKind::IdentityGone,
            RestError::Identity(IdentityError::AlreadyExists { .. }) => {
                ErrorKind::IdentityAlreadyExists
            }
            RestError::Permission(_) => ErrorKind::PermissionDenied,
            RestError::Negotiation(_) => ErrorKind::UnsupportedMediaType,
            RestError::Search(SearchError::ResultWindowExceeded { .. }) => {
                ErrorKind::ResultWindowExceeded
            }
            RestError::Search(SearchError::QueryParse { .. }) => ErrorKind::QueryParse,
            RestError::Search(SearchError::InvalidParameter { .. }) => {
                ErrorKind::InvalidParameter
            }
            RestError::Validation(ValidationError::PreconditionFailed { .. }) => {
                ErrorKind::PreconditionFailed
            }
            RestError::Validation(_) => ErrorKind::InvalidBody,
            RestError::Config(_) => ErrorKind::Configuration,
            RestError::Storage(_) => ErrorKind::Storage,
            RestError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RestError::Identity(e) => e.error_code(),
            RestError::Permission(e) => e.error_code(),
            RestError::Negotiation(e) => e.error_code(),
            RestError::Search(e) => e.error_code(),
            RestError::Config(_) => "CONFIG_ERROR",
            RestError::Validation(e) => e.error_code(),
            RestError::Storage(_) => "STORAGE_ERROR",
            RestError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build the default structured body `{status, message}`
    ///
    /// Server-side failures never leak their internal message.
    pub fn to_body(&self) -> ErrorBody {
        let status = self.status_code();
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        ErrorBody::new(status, message)
    }

    /// Wrap a collaborator failure
    pub fn storage(err: anyhow::Error) -> Self {
        RestError::Storage(StorageError::Backend {
            message: format!("{:#}", err),
        })
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        self.to_body().into_response()
    }
}

/// Structured error body: `{status, message, ...extra}`
#[derive(Debug, Clone)]
pub struct ErrorBody {
    pub status: StatusCode,
    pub message: String,
    pub extra: Map<String, Value>,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Add an extra field to the body
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("status".to_string(), Value::from(self.status.as_u16()));
        body.insert("message".to_string(), Value::from(self.message.clone()));
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self.to_json())).into_response()
    }
}

// =============================================================================
// Identity Errors
// =============================================================================

/// Errors related to persistent identifiers
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity value does not resolve
    #[error("{pid_type} '{pid_value}' not found")]
    NotFound { pid_type: String, pid_value: String },

    /// The identity existed but its record was removed
    #[error("{identity} has been deleted")]
    Gone {
        identity: Identity,
        record: Option<Value>,
    },

    /// The minted identity is already registered
    #[error("{pid_type} '{pid_value}' already exists")]
    AlreadyExists { pid_type: String, pid_value: String },
}

impl IdentityError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IdentityError::NotFound { .. } => StatusCode::NOT_FOUND,
            IdentityError::Gone { .. } => StatusCode::GONE,
            IdentityError::AlreadyExists { .. } => StatusCode::CONFLICT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            IdentityError::NotFound { .. } => "IDENTITY_NOT_FOUND",
            IdentityError::Gone { .. } => "IDENTITY_GONE",
            IdentityError::AlreadyExists { .. } => "IDENTITY_ALREADY_EXISTS",
        }
    }

    /// Removal reason stored on a deleted record, if any
    pub fn removal_reason(&self) -> Option<&Value> {
        match self {
            IdentityError::Gone {
                record: Some(record),
                ..
            } => record.get("removal_reason"),
            _ => None,
        }
    }
}

// =============================================================================
// Permission Errors
// =============================================================================

/// Errors raised by the permission gate
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Anonymous actor was denied
    #[error("Authentication required to {operation} records")]
    Unauthorized { operation: Operation },

    /// Identified actor was denied
    #[error("Not allowed to {operation} records")]
    Forbidden { operation: Operation },
}

impl PermissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PermissionError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            PermissionError::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PermissionError::Unauthorized { .. } => "UNAUTHORIZED",
            PermissionError::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

// =============================================================================
// Negotiation Errors
// =============================================================================

/// Errors raised while selecting a serializer or loader
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// No serializer matches the client's preferences
    #[error("None of the requested media types are available: {requested}")]
    NotAcceptable { requested: String },

    /// The explicit format argument is not a known alias
    #[error("Unknown format '{format}'")]
    UnknownFormat { format: String },

    /// No loader accepts the request body's content type
    #[error("Unsupported media type '{content_type}'")]
    UnsupportedMediaType { content_type: String },
}

impl NegotiationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            NegotiationError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            NegotiationError::UnknownFormat { .. } => StatusCode::NOT_ACCEPTABLE,
            NegotiationError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            NegotiationError::NotAcceptable { .. } => "NOT_ACCEPTABLE",
            NegotiationError::UnknownFormat { .. } => "UNKNOWN_FORMAT",
            NegotiationError::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
        }
    }
}

// =============================================================================
// Search Errors
// =============================================================================

/// Errors raised by the search query pipeline
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Maximum number of {max} results have been reached")]
    ResultWindowExceeded { requested: usize, max: usize },

    #[error("The syntax of the search query is invalid: {message}")]
    QueryParse { query: String, message: String },

    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },
}

impl SearchError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SearchError::ResultWindowExceeded { .. } => "RESULT_WINDOW_EXCEEDED",
            SearchError::QueryParse { .. } => "QUERY_PARSE_ERROR",
            SearchError::InvalidParameter { .. } => "INVALID_PARAMETER",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to endpoint configuration, only raised at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config{}: {message}", file_suffix(.file))]
    ParseError {
        file: Option<String>,
        message: String,
    },

    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    #[error("No {kind} registered under the name '{name}'")]
    MissingPlugin { kind: &'static str, name: String },

    #[error("A {kind} named '{name}' is already registered")]
    DuplicatePlugin { kind: &'static str, name: String },

    #[error("Endpoint '{prefix}' is already registered")]
    DuplicateEndpoint { prefix: String },

    #[error("Route '{route}' of endpoint '{second}' collides with endpoint '{first}'")]
    RouteCollision {
        route: String,
        first: String,
        second: String,
    },

    #[error("Endpoints '{first}' and '{second}' are both marked as default for pid type '{pid_type}'")]
    AmbiguousDefault {
        pid_type: String,
        first: String,
        second: String,
    },

    #[error("Invalid sort option '{name}' for index '{index}': {message}")]
    InvalidSort {
        index: String,
        name: String,
        message: String,
    },

    #[error("Invalid facet '{key}' for index '{index}': {message}")]
    InvalidFacet {
        index: String,
        key: String,
        message: String,
    },
}

fn file_suffix(file: &Option<String>) -> String {
    file.as_ref()
        .map(|f| format!(" file '{}'", f))
        .unwrap_or_default()
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to request payloads
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },

    #[error("Invalid JSON patch: {message}")]
    InvalidPatch { message: String },

    #[error("Record revision {current} does not match the requested revision")]
    PreconditionFailed { current: u32 },
}

impl ValidationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidationError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ValidationError::InvalidPatch { .. } => StatusCode::BAD_REQUEST,
            ValidationError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::InvalidBody { .. } => "INVALID_BODY",
            ValidationError::InvalidPatch { .. } => "INVALID_PATCH",
            ValidationError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors reported by the identifier service, record store or index
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Record {id} is registered but missing from storage")]
    MissingRecord { id: uuid::Uuid },
}
