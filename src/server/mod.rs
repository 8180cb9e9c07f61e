//! Server module for building HTTP servers from endpoint configuration
//!
//! [`ServerBuilder`] resolves every configured endpoint against the
//! [`PluginRegistry`], checks routes and default prefixes in the
//! [`EndpointRegistry`], and mounts the handlers of each endpoint:
//! - Search and create on the list route
//! - Read, replace, patch and delete on the item route
//! - Optional suggest and options routes
//! - Health checks

pub mod builder;
pub mod endpoint;
pub mod error_handlers;
pub mod handlers;
pub mod plugins;
pub mod registry;
pub mod router;

pub use builder::ServerBuilder;
pub use endpoint::{DefaultPolicy, EndpointConfig, normalize_route};
pub use error_handlers::{
    DefaultErrorHandler, ErrorHandler, ErrorHandlerKey, ErrorHandlers, RemovalReasonHandler,
    render_error,
};
pub use handlers::EndpointState;
pub use plugins::PluginRegistry;
pub use registry::EndpointRegistry;
