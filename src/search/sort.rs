//! Named sort options per index
//!
//! A request names an option (`sort=mostrecent`); a leading `-` reverses
//! every field of the option. Without a name, the registry falls back to its
//! `query` default when a query string is present and to its `noquery`
//! default otherwise. Unknown names produce an unsorted search.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    pub fn is_ascending(&self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

/// One field of the final sort order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Computes a sort clause from the effective direction
pub trait SortResolver: Send + Sync {
    fn resolve(&self, ascending: bool) -> SortClause;
}

/// A field of a sort option
#[derive(Clone)]
pub enum SortField {
    /// Plain field; `Desc` flips the option's direction (`-field` in config)
    Static {
        field: String,
        direction: SortDirection,
    },
    /// Field computed by a registered resolver (`@name` in config)
    Parameterized {
        name: String,
        resolver: Arc<dyn SortResolver>,
    },
}

impl SortField {
    /// Parse `field` or `-field`
    pub fn parse_static(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) => SortField::Static {
                field: field.to_string(),
                direction: SortDirection::Desc,
            },
            None => SortField::Static {
                field: raw.to_string(),
                direction: SortDirection::Asc,
            },
        }
    }

    pub fn clause(&self, ascending: bool) -> SortClause {
        match self {
            SortField::Static { field, direction } => {
                let ascending = ascending == direction.is_ascending();
                SortClause::new(field.clone(), SortDirection::from_ascending(ascending))
            }
            SortField::Parameterized { resolver, .. } => resolver.resolve(ascending),
        }
    }
}

impl fmt::Debug for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortField::Static { field, direction } => f
                .debug_struct("Static")
                .field("field", field)
                .field("direction", direction)
                .finish(),
            SortField::Parameterized { name, .. } => {
                f.debug_struct("Parameterized").field("name", name).finish()
            }
        }
    }
}

/// A selectable sort option
#[derive(Debug, Clone)]
pub struct SortOption {
    pub title: String,
    pub fields: Vec<SortField>,
    /// Advertised in the options view; direction comes from `-` prefixes
    pub default_order: SortDirection,
    /// Display position
    pub order: u32,
}

/// Sort option as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortOptionDefinition {
    pub title: String,
    pub fields: Vec<String>,
    #[serde(default = "default_order")]
    pub default_order: SortDirection,
    #[serde(default)]
    pub order: u32,
}

fn default_order() -> SortDirection {
    SortDirection::Asc
}

/// Default option names of an index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultSortDefinition {
    /// Used when the request has a query string
    #[serde(default)]
    pub query: Option<String>,
    /// Used for match-all searches
    #[serde(default)]
    pub noquery: Option<String>,
}

/// The sort applied to a search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSort {
    pub clauses: Vec<SortClause>,
    /// Option name as applied, including a leading `-`
    pub name: Option<String>,
}

/// Sort options of one index
#[derive(Debug, Clone, Default)]
pub struct SortRegistry {
    options: IndexMap<String, SortOption>,
    query_default: Option<String>,
    noquery_default: Option<String>,
}

impl SortRegistry {
    /// Validate the configured options of `index`
    ///
    /// `resolvers` looks up parameterized fields by name.
    pub fn from_definition(
        index: &str,
        options: &IndexMap<String, SortOptionDefinition>,
        defaults: &DefaultSortDefinition,
        resolvers: impl Fn(&str) -> Option<Arc<dyn SortResolver>>,
    ) -> Result<Self, ConfigError> {
        let invalid = |name: &str, message: String| ConfigError::InvalidSort {
            index: index.to_string(),
            name: name.to_string(),
            message,
        };

        let mut parsed = IndexMap::new();
        for (name, definition) in options {
            if definition.fields.is_empty() {
                return Err(invalid(name, "sort option has no fields".to_string()));
            }

            let mut fields = Vec::with_capacity(definition.fields.len());
            for raw in &definition.fields {
                let field = match raw.strip_prefix('@') {
                    Some(resolver) => SortField::Parameterized {
                        name: resolver.to_string(),
                        resolver: resolvers(resolver).ok_or_else(|| {
                            invalid(name, format!("unknown sort resolver '{}'", resolver))
                        })?,
                    },
                    None if raw.trim_start_matches('-').is_empty() => {
                        return Err(invalid(name, "empty sort field".to_string()));
                    }
                    None => SortField::parse_static(raw),
                };
                fields.push(field);
            }

            parsed.insert(
                name.clone(),
                SortOption {
                    title: definition.title.clone(),
                    fields,
                    default_order: definition.default_order,
                    order: definition.order,
                },
            );
        }

        for default in [&defaults.query, &defaults.noquery].into_iter().flatten() {
            if !parsed.contains_key(default.trim_start_matches('-')) {
                return Err(invalid(
                    default,
                    "default sort names a missing option".to_string(),
                ));
            }
        }

        parsed.sort_by(|_, a, _, b| a.order.cmp(&b.order));

        Ok(Self {
            options: parsed,
            query_default: defaults.query.clone(),
            noquery_default: defaults.noquery.clone(),
        })
    }

    /// Options in display order
    pub fn options(&self) -> impl Iterator<Item = (&str, &SortOption)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve the requested option name, or the default for the search kind
    pub fn resolve(&self, requested: Option<&str>, has_query: bool) -> ResolvedSort {
        let default = if has_query {
            self.query_default.as_deref()
        } else {
            self.noquery_default.as_deref()
        };
        let Some(name) = requested.or(default) else {
            return ResolvedSort::default();
        };

        let (key, reverse) = match name.strip_prefix('-') {
            Some(key) => (key, true),
            None => (name, false),
        };

        let Some(option) = self.options.get(key) else {
            tracing::debug!(sort = %name, "Ignoring unknown sort option");
            return ResolvedSort::default();
        };

        let ascending = !reverse;
        ResolvedSort {
            clauses: option.fields.iter().map(|f| f.clause(ascending)).collect(),
            name: Some(name.to_string()),
        }
    }
}
