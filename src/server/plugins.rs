//! Named plugin registry
//!
//! Endpoint definitions reference minters, fetchers, serializers, loaders,
//! permission factories, query parsers, sort resolvers, links factories and
//! error handlers by name. Registering a name twice or referencing an unknown
//! name is a configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::ConfigError;
use crate::core::identity::{FieldFetcher, Fetcher, Minter, RecidMinter, UuidMinter};
use crate::core::links::{DefaultLinksFactory, LinksFactory};
use crate::core::permission::{
    AccessPolicy, AllowAll, AllowIfResolvable, DenyAll, PermissionFactory, PolicyFactory,
};
use crate::core::serializer::{
    JsonLoader, JsonPatchLoader, JsonSerializer, Loader, RecordSerializer, YamlSerializer,
};
use crate::search::{QueryParser, QueryStringParser, SortResolver};
use crate::server::error_handlers::{DefaultErrorHandler, ErrorHandler, RemovalReasonHandler};

struct Named<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Named<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, name: impl Into<String>, plugin: Arc<T>) -> Result<(), ConfigError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ConfigError::DuplicatePlugin {
                kind: self.kind,
                name,
            });
        }
        self.entries.insert(name, plugin);
        Ok(())
    }

    fn put(&mut self, name: &str, plugin: Arc<T>) {
        self.entries.insert(name.to_string(), plugin);
    }

    fn get(&self, name: &str) -> Result<Arc<T>, ConfigError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingPlugin {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    fn find(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }
}

/// All plugins available to endpoint definitions
pub struct PluginRegistry {
    minters: Named<dyn Minter>,
    fetchers: Named<dyn Fetcher>,
    serializers: Named<dyn RecordSerializer>,
    loaders: Named<dyn Loader>,
    permission_factories: Named<dyn PermissionFactory>,
    query_parsers: Named<dyn QueryParser>,
    sort_resolvers: Named<dyn SortResolver>,
    links_factories: Named<dyn LinksFactory>,
    error_handlers: Named<dyn ErrorHandler>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            minters: Named::new("minter"),
            fetchers: Named::new("fetcher"),
            serializers: Named::new("serializer"),
            loaders: Named::new("loader"),
            permission_factories: Named::new("permission factory"),
            query_parsers: Named::new("query parser"),
            sort_resolvers: Named::new("sort resolver"),
            links_factories: Named::new("links factory"),
            error_handlers: Named::new("error handler"),
        }
    }

    /// Create a registry holding the built-in plugins
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.install_builtins();
        registry
    }

    fn install_builtins(&mut self) {
        self.minters.put("recid", Arc::new(RecidMinter::new()));
        self.minters.put("uuid", Arc::new(UuidMinter::new()));

        self.fetchers.put("recid", Arc::new(FieldFetcher::new("control_number")));
        self.fetchers.put("uuid", Arc::new(FieldFetcher::new("id")));

        self.serializers.put("json", Arc::new(JsonSerializer::new()));
        self.serializers.put("json_pretty", Arc::new(JsonSerializer::pretty()));
        self.serializers.put("yaml", Arc::new(YamlSerializer));

        self.loaders.put("json", Arc::new(JsonLoader));
        self.loaders.put("json_patch", Arc::new(JsonPatchLoader));

        self.permission_factories.put("allow_all", Arc::new(AllowAll));
        self.permission_factories.put("deny_all", Arc::new(DenyAll));
        self.permission_factories
            .put("allow_if_resolvable", Arc::new(AllowIfResolvable));

        self.query_parsers.put("or", Arc::new(QueryStringParser::or()));
        self.query_parsers.put("and", Arc::new(QueryStringParser::and()));

        self.links_factories.put("default", Arc::new(DefaultLinksFactory));

        self.error_handlers.put("default", Arc::new(DefaultErrorHandler));
        self.error_handlers.put("removal_reason", Arc::new(RemovalReasonHandler));
    }

    pub fn register_minter(
        &mut self,
        name: impl Into<String>,
        minter: Arc<dyn Minter>,
    ) -> Result<(), ConfigError> {
        self.minters.insert(name, minter)
    }

    pub fn register_fetcher(
        &mut self,
        name: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(), ConfigError> {
        self.fetchers.insert(name, fetcher)
    }

    pub fn register_serializer(
        &mut self,
        name: impl Into<String>,
        serializer: Arc<dyn RecordSerializer>,
    ) -> Result<(), ConfigError> {
        self.serializers.insert(name, serializer)
    }

    pub fn register_loader(
        &mut self,
        name: impl Into<String>,
        loader: Arc<dyn Loader>,
    ) -> Result<(), ConfigError> {
        self.loaders.insert(name, loader)
    }

    pub fn register_permission_factory(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn PermissionFactory>,
    ) -> Result<(), ConfigError> {
        self.permission_factories.insert(name, factory)
    }

    pub fn register_query_parser(
        &mut self,
        name: impl Into<String>,
        parser: Arc<dyn QueryParser>,
    ) -> Result<(), ConfigError> {
        self.query_parsers.insert(name, parser)
    }

    pub fn register_sort_resolver(
        &mut self,
        name: impl Into<String>,
        resolver: Arc<dyn SortResolver>,
    ) -> Result<(), ConfigError> {
        self.sort_resolvers.insert(name, resolver)
    }

    pub fn register_links_factory(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn LinksFactory>,
    ) -> Result<(), ConfigError> {
        self.links_factories.insert(name, factory)
    }

    pub fn register_error_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ErrorHandler>,
    ) -> Result<(), ConfigError> {
        self.error_handlers.insert(name, handler)
    }

    pub fn minter(&self, name: &str) -> Result<Arc<dyn Minter>, ConfigError> {
        self.minters.get(name)
    }

    pub fn fetcher(&self, name: &str) -> Result<Arc<dyn Fetcher>, ConfigError> {
        self.fetchers.get(name)
    }

    pub fn serializer(&self, name: &str) -> Result<Arc<dyn RecordSerializer>, ConfigError> {
        self.serializers.get(name)
    }

    pub fn loader(&self, name: &str) -> Result<Arc<dyn Loader>, ConfigError> {
        self.loaders.get(name)
    }

    /// Registered factory, or a policy name such as `authenticated` or
    /// `role:curator`
    pub fn permission_factory(&self, name: &str) -> Result<Arc<dyn PermissionFactory>, ConfigError> {
        if let Some(factory) = self.permission_factories.find(name) {
            return Ok(factory);
        }
        let policy = AccessPolicy::parse_policy(name)?;
        Ok(Arc::new(PolicyFactory(policy)))
    }

    pub fn query_parser(&self, name: &str) -> Result<Arc<dyn QueryParser>, ConfigError> {
        self.query_parsers.get(name)
    }

    pub fn sort_resolver(&self, name: &str) -> Option<Arc<dyn SortResolver>> {
        self.sort_resolvers.find(name)
    }

    pub fn links_factory(&self, name: &str) -> Result<Arc<dyn LinksFactory>, ConfigError> {
        self.links_factories.get(name)
    }

    pub fn error_handler(&self, name: &str) -> Result<Arc<dyn ErrorHandler>, ConfigError> {
        self.error_handlers.get(name)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
