//! ServerBuilder: fluent assembly of REST endpoints into an axum router

use anyhow::{Result, anyhow};
use axum::Router;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::RestConfig;
use crate::core::error::ConfigError;
use crate::core::identity::IdentityResolver;
use crate::core::links::RecordLinker;
use crate::core::permission::{ActorProvider, AnonymousActorProvider};
use crate::core::service::{IdentifierService, RecordStore, SearchIndex};
use crate::server::endpoint::{DefaultPolicy, EndpointConfig, resolve_error_handlers};
use crate::server::handlers::EndpointState;
use crate::server::plugins::PluginRegistry;
use crate::server::registry::EndpointRegistry;
use crate::server::router::build_router;
use crate::storage::{InMemoryIdentifierService, InMemoryIndex, InMemoryRecordStore};

/// Builder for the REST application
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(RestConfig::default_config())
///     .in_memory()
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: RestConfig,
    plugins: PluginRegistry,
    defaults: DefaultPolicy,
    identifiers: Option<Arc<dyn IdentifierService>>,
    records: Option<Arc<dyn RecordStore>>,
    index: Option<Arc<dyn SearchIndex>>,
    actors: Arc<dyn ActorProvider>,
    error_handlers: IndexMap<String, String>,
    custom_routes: Vec<Router>,
    cors: bool,
}

impl ServerBuilder {
    /// Create a builder with no endpoints and the built-in plugins
    pub fn new() -> Self {
        Self {
            config: RestConfig::default(),
            plugins: PluginRegistry::with_builtins(),
            defaults: DefaultPolicy::default(),
            identifiers: None,
            records: None,
            index: None,
            actors: Arc::new(AnonymousActorProvider),
            error_handlers: IndexMap::new(),
            custom_routes: Vec::new(),
            cors: false,
        }
    }

    /// Merge a configuration into the builder's
    ///
    /// Global settings (result size, format argument, propagation) are taken
    /// from the last configuration added.
    pub fn with_config(mut self, config: RestConfig) -> Self {
        let propagate = config.facets_post_filters_propagate;
        let results_size = config.default_results_size;
        let format_arg = config.format_query_arg.clone();

        let mut merged = std::mem::take(&mut self.config).merge(config);
        merged.facets_post_filters_propagate = propagate;
        merged.default_results_size = results_size;
        merged.format_query_arg = format_arg;
        self.config = merged;
        self
    }

    /// Load and merge a YAML configuration file
    pub fn with_config_file(self, path: &str) -> Result<Self> {
        let config = RestConfig::from_yaml_file(path)?;
        Ok(self.with_config(config))
    }

    /// Replace the plugin registry
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Register additional plugins on the current registry
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .register_plugins(|plugins| {
    ///         plugins.register_sort_resolver("title", Arc::new(TitleResolver))
    ///     })?
    /// ```
    pub fn register_plugins(
        mut self,
        register: impl FnOnce(&mut PluginRegistry) -> std::result::Result<(), ConfigError>,
    ) -> Result<Self> {
        register(&mut self.plugins)?;
        Ok(self)
    }

    /// Replace the defaults applied to endpoints that leave settings out
    pub fn with_default_policy(mut self, defaults: DefaultPolicy) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the identifier service (required)
    pub fn with_identifier_service(mut self, service: impl IdentifierService + 'static) -> Self {
        self.identifiers = Some(Arc::new(service));
        self
    }

    /// Set the record store (required)
    pub fn with_record_store(mut self, store: impl RecordStore + 'static) -> Self {
        self.records = Some(Arc::new(store));
        self
    }

    /// Set the search index (required)
    pub fn with_search_index(mut self, index: impl SearchIndex + 'static) -> Self {
        self.index = Some(Arc::new(index));
        self
    }

    /// Use shared collaborator instances, e.g. to seed data before serving
    pub fn with_services(
        mut self,
        identifiers: Arc<dyn IdentifierService>,
        records: Arc<dyn RecordStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        self.identifiers = Some(identifiers);
        self.records = Some(records);
        self.index = Some(index);
        self
    }

    /// Use fresh in-memory collaborators
    pub fn in_memory(self) -> Self {
        self.with_identifier_service(InMemoryIdentifierService::new())
            .with_record_store(InMemoryRecordStore::new())
            .with_search_index(InMemoryIndex::new())
    }

    /// Set how the acting party is read from requests
    pub fn with_actor_provider(mut self, provider: impl ActorProvider + 'static) -> Self {
        self.actors = Arc::new(provider);
        self
    }

    /// Register a global error handler by name
    ///
    /// `key` is a status code (`"410"`) or an error kind (`"identity_gone"`).
    pub fn with_error_handler(mut self, key: impl Into<String>, handler: impl Into<String>) -> Self {
        self.error_handlers.insert(key.into(), handler.into());
        self
    }

    /// Add custom routes to the server
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Allow cross-origin requests from any origin
    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Resolve and register every configured endpoint
    pub fn build_registry(&self) -> Result<EndpointRegistry> {
        let mut registry = EndpointRegistry::new();
        for (prefix, definition) in &self.config.endpoints {
            let endpoint = EndpointConfig::from_definition(
                prefix,
                definition,
                &self.config,
                &self.plugins,
                &self.defaults,
            )?;
            registry.register(endpoint)?;
        }
        Ok(registry)
    }

    /// Build the final REST router
    ///
    /// Configuration errors surface here, before any request is served.
    pub fn build(self) -> Result<Router> {
        let identifiers = self.identifiers.clone().ok_or_else(|| {
            anyhow!("IdentifierService is required. Call .with_identifier_service()")
        })?;
        let records = self
            .records
            .clone()
            .ok_or_else(|| anyhow!("RecordStore is required. Call .with_record_store()"))?;
        let index = self
            .index
            .clone()
            .ok_or_else(|| anyhow!("SearchIndex is required. Call .with_search_index()"))?;

        let registry = self.build_registry()?;
        let urls = Arc::new(registry.url_map()?);

        let mut global_errors = self.defaults.error_handlers.clone();
        global_errors.extend(self.config.error_handlers.clone());
        global_errors.extend(self.error_handlers.clone());
        let global_errors = Arc::new(resolve_error_handlers(&global_errors, &self.plugins)?);

        let state_for = |endpoint: &EndpointConfig| EndpointState {
            config: Arc::new(endpoint.clone()),
            resolver: IdentityResolver::new(
                endpoint.pid_type.clone(),
                endpoint.minter.clone(),
                endpoint.fetcher.clone(),
                identifiers.clone(),
            ),
            records: records.clone(),
            index: index.clone(),
            actors: self.actors.clone(),
            linker: RecordLinker {
                urls: urls.clone(),
                factory: endpoint.links_factory.clone(),
            },
            global_errors: global_errors.clone(),
            default_results_size: self.config.default_results_size,
            format_arg: self.config.format_query_arg.clone(),
        };

        tracing::info!(endpoints = ?registry.prefixes(), "Building REST router");
        Ok(build_router(
            &registry,
            state_for,
            self.custom_routes.clone(),
            self.cors,
        ))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when the process receives Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
