//! # records-rest
//!
//! Configuration-driven REST endpoints over persistent-identifier-addressed
//! records.
//!
//! ## Features
//!
//! - **Endpoints from configuration**: list, item, suggest and options routes
//!   declared in YAML and resolved against a plugin registry
//! - **Persistent identifiers**: pluggable minters and fetchers, 404/410
//!   semantics for unknown and deleted identifiers
//! - **Permission gate**: per-operation permission factories with a
//!   deny-by-default write policy
//! - **Content negotiation**: format aliases, `Accept` q-values and body
//!   loaders chosen by `Content-Type`
//! - **Search pipeline**: query string parsing, facet filters, aggregations,
//!   post-filters, sort options and a bounded result window
//! - **Structured errors**: handlers registered by status code or error kind
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use records_rest::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     ServerBuilder::new()
//!         .with_config(RestConfig::default_config())
//!         .in_memory()
//!         .serve("127.0.0.1:5000")
//!         .await
//! }
//! ```

pub mod config;
pub mod core;
pub mod search;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        error::{
            ConfigError, ErrorBody, ErrorKind, IdentityError, NegotiationError, PermissionError,
            RestError, SearchError, StorageError, ValidationError,
        },
        identity::{Fetcher, FieldFetcher, Identity, IdentityResolver, Minter, RecidMinter, UuidMinter},
        links::{DefaultLinksFactory, Links, LinksFactory},
        permission::{
            AccessPolicy, Actor, ActorProvider, AllowAll, AllowIfResolvable,
            AnonymousActorProvider, DenyAll, HeaderActorProvider, Operation, Permission,
            PermissionContext, PermissionFactory, PolicyFactory,
        },
        record::Record,
        serializer::{JsonLoader, JsonSerializer, Loader, RecordSerializer, YamlSerializer},
        service::{IdentifierService, PidStatus, RecordStore, SearchIndex},
    };

    // === Search ===
    pub use crate::search::{
        PreparedSearch, Query, QueryParser, SearchResult, SortClause, SortDirection,
        SortResolver, SuggestRequest, Suggestion,
    };

    // === Storage ===
    pub use crate::storage::{InMemoryIdentifierService, InMemoryIndex, InMemoryRecordStore};

    // === Config ===
    pub use crate::config::{EndpointDefinition, RestConfig};

    // === Server ===
    pub use crate::server::{
        DefaultPolicy, EndpointRegistry, ErrorHandler, PluginRegistry, ServerBuilder,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;

    // === Axum ===
    pub use axum::Router;
}
