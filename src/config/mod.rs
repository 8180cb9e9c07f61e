//! Configuration loading and management

use crate::core::error::ConfigError;
use crate::search::{DefaultSortDefinition, FacetDefinition, SortDirection, SortOptionDefinition};
use crate::search::SuggesterDef;
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Configuration of one REST endpoint
///
/// Plugins (minters, serializers, parsers, permission factories, ...) are
/// referenced by the name they were registered under in the
/// [`PluginRegistry`](crate::server::PluginRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDefinition {
    /// Persistent identifier type (e.g., "recid")
    pub pid_type: String,

    pub pid_minter: String,
    pub pid_fetcher: String,

    /// Collection route (e.g., "/records/")
    pub list_route: String,

    /// Item route, `/records/<pid(recid):pid_value>` or `/records/{pid_value}`
    pub item_route: String,

    #[serde(default = "default_media_type")]
    pub default_media_type: String,

    /// Media type → serializer name
    #[serde(default = "default_serializers")]
    pub record_serializers: IndexMap<String, String>,

    #[serde(default = "default_serializers")]
    pub search_serializers: IndexMap<String, String>,

    /// Format alias → media type
    #[serde(default)]
    pub record_serializers_aliases: IndexMap<String, String>,

    #[serde(default)]
    pub search_serializers_aliases: IndexMap<String, String>,

    /// Media type → loader name; the default policy's loaders when absent
    #[serde(default)]
    pub record_loaders: Option<IndexMap<String, String>>,

    /// Index searched by the list route
    pub search_index: String,

    #[serde(default = "default_query_parser")]
    pub search_query_parser: String,

    #[serde(default = "default_max_result_window")]
    pub max_result_window: usize,

    // Permission factory names; the default policy applies when absent
    #[serde(default)]
    pub list_permission_factory: Option<String>,
    #[serde(default)]
    pub read_permission_factory: Option<String>,
    #[serde(default)]
    pub create_permission_factory: Option<String>,
    #[serde(default)]
    pub update_permission_factory: Option<String>,
    #[serde(default)]
    pub delete_permission_factory: Option<String>,

    /// Suggester name → definition
    #[serde(default)]
    pub suggesters: IndexMap<String, SuggesterDef>,

    #[serde(default)]
    pub use_options_view: bool,

    /// Marks this endpoint as the URL target of its pid type
    #[serde(default)]
    pub default_endpoint_prefix: bool,

    #[serde(default = "default_links_factory")]
    pub links_factory: String,

    /// Status code or error kind → error handler name
    #[serde(default)]
    pub error_handlers: IndexMap<String, String>,
}

fn default_media_type() -> String {
    "application/json".to_string()
}

fn default_serializers() -> IndexMap<String, String> {
    IndexMap::from([("application/json".to_string(), "json".to_string())])
}

fn default_query_parser() -> String {
    "or".to_string()
}

fn default_max_result_window() -> usize {
    10_000
}

fn default_links_factory() -> String {
    "default".to_string()
}

fn default_results_size() -> usize {
    10
}

fn default_format_arg() -> String {
    "format".to_string()
}

/// Complete configuration of the REST layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Endpoint prefix → definition
    #[serde(default)]
    pub endpoints: IndexMap<String, EndpointDefinition>,

    /// Index → sort option name → definition
    #[serde(default)]
    pub sort_options: IndexMap<String, IndexMap<String, SortOptionDefinition>>,

    /// Index → `query`/`noquery` default option names
    #[serde(default)]
    pub default_sort: IndexMap<String, DefaultSortDefinition>,

    /// Index → facets
    #[serde(default)]
    pub facets: IndexMap<String, FacetDefinition>,

    /// Restrict each aggregation by the post-filters of the other facets
    #[serde(default)]
    pub facets_post_filters_propagate: bool,

    /// Page size when the request has none
    #[serde(default = "default_results_size")]
    pub default_results_size: usize,

    /// Query argument selecting the response format
    #[serde(default = "default_format_arg")]
    pub format_query_arg: String,

    /// Global error handlers: status code or error kind → handler name
    #[serde(default)]
    pub error_handlers: IndexMap<String, String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            endpoints: IndexMap::new(),
            sort_options: IndexMap::new(),
            default_sort: IndexMap::new(),
            facets: IndexMap::new(),
            facets_post_filters_propagate: false,
            default_results_size: default_results_size(),
            format_query_arg: default_format_arg(),
            error_handlers: IndexMap::new(),
        }
    }
}

impl RestConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.to_string()),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file: None,
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Merge another configuration into this one
    ///
    /// Endpoints, sort options and facets of `other` are added; a prefix
    /// present in both is kept from `other`.
    pub fn merge(mut self, other: RestConfig) -> Self {
        self.endpoints.extend(other.endpoints);
        self.sort_options.extend(other.sort_options);
        self.default_sort.extend(other.default_sort);
        self.facets.extend(other.facets);
        self.error_handlers.extend(other.error_handlers);
        self
    }

    /// The stock `recid` endpoint over the `records` index
    pub fn default_config() -> Self {
        let endpoint = EndpointDefinition {
            pid_type: "recid".to_string(),
            pid_minter: "recid".to_string(),
            pid_fetcher: "recid".to_string(),
            list_route: "/records/".to_string(),
            item_route: "/records/<pid(recid):pid_value>".to_string(),
            default_media_type: default_media_type(),
            record_serializers: default_serializers(),
            search_serializers: default_serializers(),
            record_serializers_aliases: IndexMap::from([(
                "json".to_string(),
                "application/json".to_string(),
            )]),
            search_serializers_aliases: IndexMap::from([(
                "json".to_string(),
                "application/json".to_string(),
            )]),
            record_loaders: None,
            search_index: "records".to_string(),
            search_query_parser: default_query_parser(),
            max_result_window: default_max_result_window(),
            list_permission_factory: None,
            read_permission_factory: None,
            create_permission_factory: None,
            update_permission_factory: None,
            delete_permission_factory: None,
            suggesters: IndexMap::new(),
            use_options_view: false,
            default_endpoint_prefix: true,
            links_factory: default_links_factory(),
            error_handlers: IndexMap::new(),
        };

        let sort_options = IndexMap::from([
            (
                "bestmatch".to_string(),
                SortOptionDefinition {
                    title: "Best match".to_string(),
                    fields: vec!["-_score".to_string()],
                    default_order: SortDirection::Desc,
                    order: 1,
                },
            ),
            (
                "mostrecent".to_string(),
                SortOptionDefinition {
                    title: "Most recent".to_string(),
                    fields: vec!["-_created".to_string()],
                    default_order: SortDirection::Asc,
                    order: 2,
                },
            ),
        ]);

        let facets = FacetDefinition {
            aggs: IndexMap::from([("type".to_string(), json!({"terms": {"field": "type"}}))]),
            filters: IndexMap::new(),
            post_filters: IndexMap::from([("type".to_string(), json!({"terms": "type"}))]),
        };

        Self {
            endpoints: IndexMap::from([("recid".to_string(), endpoint)]),
            sort_options: IndexMap::from([("records".to_string(), sort_options)]),
            default_sort: IndexMap::from([(
                "records".to_string(),
                DefaultSortDefinition {
                    query: Some("bestmatch".to_string()),
                    noquery: Some("mostrecent".to_string()),
                },
            )]),
            facets: IndexMap::from([("records".to_string(), facets)]),
            error_handlers: IndexMap::from([("410".to_string(), "removal_reason".to_string())]),
            ..Self::default()
        }
    }
}
