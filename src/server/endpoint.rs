//! Resolved endpoint configuration
//!
//! [`EndpointConfig::from_definition`] turns a loosely typed
//! [`EndpointDefinition`] into plugin instances, failing on the first
//! inconsistency.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::config::{EndpointDefinition, RestConfig};
use crate::core::error::ConfigError;
use crate::core::identity::{Fetcher, Minter};
use crate::core::links::LinksFactory;
use crate::core::permission::{AllowIfResolvable, DenyAll, PermissionFactories, PermissionFactory};
use crate::core::serializer::{
    Loader, RecordResponder, SearchResponder, record_responsify, search_responsify,
};
use crate::search::{FacetConfig, SearchPipeline, SortRegistry, SuggesterDef};
use crate::server::error_handlers::{ErrorHandlerKey, ErrorHandlers};
use crate::server::plugins::PluginRegistry;

static ROUTE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[^:<>]+:)?([A-Za-z_][A-Za-z0-9_]*)>").expect("valid route parameter regex")
});

static BRACED_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid braced parameter regex"));

/// Rewrite `<converter(args):name>` parameters to `{name}`
pub fn normalize_route(route: &str) -> String {
    ROUTE_PARAM.replace_all(route, "{$1}").into_owned()
}

/// Route shape with parameter names erased, for collision checks
pub fn route_shape(route: &str) -> String {
    BRACED_PARAM.replace_all(route, "{}").into_owned()
}

fn route_params(route: &str) -> Vec<&str> {
    BRACED_PARAM
        .captures_iter(route)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Defaults applied where an endpoint leaves a setting out
#[derive(Clone)]
pub struct DefaultPolicy {
    pub permissions: PermissionFactories,
    /// Media type → loader name
    pub loaders: IndexMap<String, String>,
    /// Global error handlers below the configured ones
    pub error_handlers: IndexMap<String, String>,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            permissions: PermissionFactories {
                list: Arc::new(AllowIfResolvable),
                read: Arc::new(AllowIfResolvable),
                create: Arc::new(DenyAll),
                update: Arc::new(DenyAll),
                delete: Arc::new(DenyAll),
            },
            loaders: IndexMap::from([
                ("application/json".to_string(), "json".to_string()),
                (
                    "application/json-patch+json".to_string(),
                    "json_patch".to_string(),
                ),
            ]),
            error_handlers: IndexMap::from([(
                "410".to_string(),
                "removal_reason".to_string(),
            )]),
        }
    }
}

/// A fully resolved REST endpoint
#[derive(Clone)]
pub struct EndpointConfig {
    pub prefix: String,
    pub pid_type: String,
    pub minter: Arc<dyn Minter>,
    pub fetcher: Arc<dyn Fetcher>,

    /// Normalized collection route
    pub list_route: String,
    /// Normalized item route, always carrying `{pid_value}`
    pub item_route: String,

    pub default_media_type: String,
    pub record_serializers: IndexMap<String, RecordResponder>,
    pub search_serializers: IndexMap<String, SearchResponder>,
    pub record_serializers_aliases: IndexMap<String, String>,
    pub search_serializers_aliases: IndexMap<String, String>,
    pub loaders: IndexMap<String, Arc<dyn Loader>>,

    pub permissions: PermissionFactories,
    pub search: SearchPipeline,
    pub suggesters: IndexMap<String, SuggesterDef>,
    pub links_factory: Arc<dyn LinksFactory>,
    pub use_options_view: bool,
    pub default_endpoint_prefix: bool,
    pub error_handlers: ErrorHandlers,
}

impl EndpointConfig {
    pub fn from_definition(
        prefix: &str,
        definition: &EndpointDefinition,
        config: &RestConfig,
        plugins: &PluginRegistry,
        defaults: &DefaultPolicy,
    ) -> Result<Self, ConfigError> {
        let invalid = |field: &str, value: &str, message: &str| ConfigError::InvalidValue {
            field: format!("endpoints.{}.{}", prefix, field),
            value: value.to_string(),
            message: message.to_string(),
        };

        if definition.pid_type.trim().is_empty() {
            return Err(invalid("pid_type", &definition.pid_type, "must not be empty"));
        }

        let list_route = normalize_route(&definition.list_route);
        let item_route = normalize_route(&definition.item_route);
        if !list_route.starts_with('/') {
            return Err(invalid("list_route", &list_route, "must start with '/'"));
        }
        if !item_route.starts_with('/') {
            return Err(invalid("item_route", &item_route, "must start with '/'"));
        }
        if !route_params(&list_route).is_empty() {
            return Err(invalid("list_route", &list_route, "must not take parameters"));
        }
        if route_params(&item_route) != ["pid_value"] {
            return Err(invalid(
                "item_route",
                &item_route,
                "must take exactly one parameter named 'pid_value'",
            ));
        }
        if definition.max_result_window == 0 {
            return Err(invalid("max_result_window", "0", "must be positive"));
        }

        let record_serializers = definition
            .record_serializers
            .iter()
            .map(|(media_type, name)| {
                Ok((
                    media_type.clone(),
                    record_responsify(plugins.serializer(name)?, media_type.clone()),
                ))
            })
            .collect::<Result<IndexMap<_, _>, ConfigError>>()?;
        let search_serializers = definition
            .search_serializers
            .iter()
            .map(|(media_type, name)| {
                Ok((
                    media_type.clone(),
                    search_responsify(plugins.serializer(name)?, media_type.clone()),
                ))
            })
            .collect::<Result<IndexMap<_, _>, ConfigError>>()?;

        let default_media_type = &definition.default_media_type;
        if !record_serializers.contains_key(default_media_type)
            || !search_serializers.contains_key(default_media_type)
        {
            return Err(invalid(
                "default_media_type",
                default_media_type,
                "must be bound in both record and search serializers",
            ));
        }

        let loaders = definition
            .record_loaders
            .as_ref()
            .unwrap_or(&defaults.loaders)
            .iter()
            .map(|(media_type, name)| Ok((media_type.clone(), plugins.loader(name)?)))
            .collect::<Result<IndexMap<_, _>, ConfigError>>()?;

        let factory = |name: &Option<String>, fallback: &Arc<dyn PermissionFactory>| match name {
            Some(name) => plugins.permission_factory(name),
            None => Ok(Arc::clone(fallback)),
        };
        let permissions = PermissionFactories {
            list: factory(&definition.list_permission_factory, &defaults.permissions.list)?,
            read: factory(&definition.read_permission_factory, &defaults.permissions.read)?,
            create: factory(&definition.create_permission_factory, &defaults.permissions.create)?,
            update: factory(&definition.update_permission_factory, &defaults.permissions.update)?,
            delete: factory(&definition.delete_permission_factory, &defaults.permissions.delete)?,
        };

        let index = &definition.search_index;
        let sorts = SortRegistry::from_definition(
            index,
            &config.sort_options.get(index).cloned().unwrap_or_default(),
            &config.default_sort.get(index).cloned().unwrap_or_default(),
            |name| plugins.sort_resolver(name),
        )?;
        let facets = match config.facets.get(index) {
            Some(definition) => FacetConfig::from_definition(index, definition)?,
            None => FacetConfig::default(),
        };
        let search = SearchPipeline {
            index: index.clone(),
            parser: plugins.query_parser(&definition.search_query_parser)?,
            facets: Arc::new(facets),
            sorts: Arc::new(sorts),
            max_result_window: definition.max_result_window,
            propagate_post_filters: config.facets_post_filters_propagate,
        };

        Ok(Self {
            prefix: prefix.to_string(),
            pid_type: definition.pid_type.clone(),
            minter: plugins.minter(&definition.pid_minter)?,
            fetcher: plugins.fetcher(&definition.pid_fetcher)?,
            list_route,
            item_route,
            default_media_type: default_media_type.clone(),
            record_serializers,
            search_serializers,
            record_serializers_aliases: definition.record_serializers_aliases.clone(),
            search_serializers_aliases: definition.search_serializers_aliases.clone(),
            loaders,
            permissions,
            search,
            suggesters: definition.suggesters.clone(),
            links_factory: plugins.links_factory(&definition.links_factory)?,
            use_options_view: definition.use_options_view,
            default_endpoint_prefix: definition.default_endpoint_prefix,
            error_handlers: resolve_error_handlers(&definition.error_handlers, plugins)?,
        })
    }

    pub fn suggest_route(&self) -> String {
        format!("{}_suggest", self.list_route)
    }

    pub fn options_route(&self) -> String {
        format!("{}_options", self.list_route)
    }

    /// Every route this endpoint binds
    pub fn routes(&self) -> Vec<String> {
        let mut routes = vec![self.list_route.clone(), self.item_route.clone()];
        if !self.suggesters.is_empty() {
            routes.push(self.suggest_route());
        }
        if self.use_options_view {
            routes.push(self.options_route());
        }
        routes
    }
}

/// Resolve `key → handler name` pairs against the registry
pub fn resolve_error_handlers(
    raw: &IndexMap<String, String>,
    plugins: &PluginRegistry,
) -> Result<ErrorHandlers, ConfigError> {
    let mut handlers = ErrorHandlers::new();
    for (key, name) in raw {
        let key: ErrorHandlerKey = key.parse()?;
        handlers.insert(key, plugins.error_handler(name)?);
    }
    Ok(handlers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::permission::{Actor, Operation, PermissionContext};

    fn build(config: &RestConfig, prefix: &str) -> Result<EndpointConfig, ConfigError> {
        EndpointConfig::from_definition(
            prefix,
            &config.endpoints[prefix],
            config,
            &PluginRegistry::with_builtins(),
            &DefaultPolicy::default(),
        )
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(
            normalize_route("/records/<pid(recid):pid_value>"),
            "/records/{pid_value}"
        );
        assert_eq!(normalize_route("/records/<pid_value>"), "/records/{pid_value}");
        assert_eq!(normalize_route("/records/{pid_value}"), "/records/{pid_value}");
        assert_eq!(route_shape("/records/{pid_value}"), "/records/{}");
    }

    #[test]
    fn test_default_config_resolves() {
        let config = RestConfig::default_config();
        let endpoint = build(&config, "recid").unwrap();

        assert_eq!(endpoint.item_route, "/records/{pid_value}");
        assert_eq!(endpoint.search.max_result_window, 10_000);
        assert!(endpoint.loaders.contains_key("application/json-patch+json"));
        assert_eq!(endpoint.routes().len(), 2);

        let ctx = PermissionContext::new(Operation::Create);
        assert!(
            !endpoint
                .permissions
                .for_operation(Operation::Create)
                .create(&ctx)
                .allows(&Actor::Anonymous)
        );
    }

    #[test]
    fn test_named_permission_overrides_default() {
        let mut config = RestConfig::default_config();
        let endpoint = config.endpoints.get_mut("recid").unwrap();
        endpoint.create_permission_factory = Some("allow_all".to_string());

        let endpoint = build(&config, "recid").unwrap();
        let ctx = PermissionContext::new(Operation::Create);
        assert!(endpoint.permissions.create.create(&ctx).allows(&Actor::Anonymous));
    }

    #[test]
    fn test_item_route_requires_pid_value() {
        let mut config = RestConfig::default_config();
        config.endpoints.get_mut("recid").unwrap().item_route = "/records/{id}".to_string();
        assert!(matches!(
            build(&config, "recid"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unbound_default_media_type() {
        let mut config = RestConfig::default_config();
        config.endpoints.get_mut("recid").unwrap().default_media_type =
            "application/x-yaml".to_string();
        assert!(build(&config, "recid").is_err());
    }

    #[test]
    fn test_unknown_serializer_is_missing_plugin() {
        let mut config = RestConfig::default_config();
        config
            .endpoints
            .get_mut("recid")
            .unwrap()
            .record_serializers
            .insert("text/csv".to_string(), "csv".to_string());
        assert!(matches!(
            build(&config, "recid"),
            Err(ConfigError::MissingPlugin { kind: "serializer", .. })
        ));
    }

    #[test]
    fn test_invalid_default_sort_fails() {
        let mut config = RestConfig::default_config();
        config.default_sort.get_mut("records").unwrap().noquery = Some("oldest".to_string());
        assert!(matches!(
            build(&config, "recid"),
            Err(ConfigError::InvalidSort { .. })
        ));
    }

    #[test]
    fn test_optional_routes() {
        let mut config = RestConfig::default_config();
        let definition = config.endpoints.get_mut("recid").unwrap();
        definition.use_options_view = true;
        definition.suggesters.insert(
            "title".to_string(),
            SuggesterDef {
                field: "title".to_string(),
                size: 5,
                context: None,
            },
        );

        let endpoint = build(&config, "recid").unwrap();
        assert_eq!(
            endpoint.routes(),
            vec![
                "/records/".to_string(),
                "/records/{pid_value}".to_string(),
                "/records/_suggest".to_string(),
                "/records/_options".to_string(),
            ]
        );
    }
}
