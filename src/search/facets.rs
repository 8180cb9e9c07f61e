//! Facets: aggregations, filters and post-filters of an index
//!
//! `filters` restrict the main query, so they change both hits and
//! aggregation counts. `post_filters` are applied after aggregation and only
//! narrow the hits.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::core::error::{ConfigError, SearchError};
use crate::search::query::Query;

/// Builds a filter query from the values selected for one facet key
pub trait FacetFilter: Send + Sync {
    fn build(&self, values: &[String]) -> Result<Query, SearchError>;
}

/// Field equals any of the selected values
pub struct TermsFilter {
    field: String,
}

impl TermsFilter {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl FacetFilter for TermsFilter {
    fn build(&self, values: &[String]) -> Result<Query, SearchError> {
        Ok(Query::Terms {
            field: self.field.clone(),
            values: values.to_vec(),
        })
    }
}

/// Field lies in any of the selected `from--to` ranges (either side optional)
pub struct RangeFilter {
    field: String,
}

impl RangeFilter {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    fn range(&self, value: &str) -> Result<Query, SearchError> {
        let (from, to) = value
            .split_once("--")
            .ok_or_else(|| SearchError::InvalidParameter {
                name: self.field.clone(),
                value: value.to_string(),
            })?;
        let bound = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Query::Range {
            field: self.field.clone(),
            gte: bound(from),
            lte: bound(to),
        })
    }
}

impl FacetFilter for RangeFilter {
    fn build(&self, values: &[String]) -> Result<Query, SearchError> {
        let mut ranges = values
            .iter()
            .map(|v| self.range(v))
            .collect::<Result<Vec<_>, _>>()?;
        if ranges.len() == 1 {
            return Ok(ranges.remove(0));
        }
        Ok(Query::Any(ranges))
    }
}

/// Aggregation computed over the matching records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationDef {
    /// Count records per distinct field value
    Terms { field: String, size: usize },
}

impl AggregationDef {
    const DEFAULT_SIZE: usize = 10;

    /// Parse `{terms: {field: <name>, size: <n>}}`
    fn from_value(index: &str, key: &str, value: &Value) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidFacet {
            index: index.to_string(),
            key: key.to_string(),
            message: message.to_string(),
        };

        let (kind, body) = single_entry(value).ok_or_else(|| {
            invalid("aggregation must be a mapping with exactly one aggregation type")
        })?;

        match kind {
            "terms" => {
                let field = body
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("terms aggregation needs a 'field'"))?;
                let size = match body.get("size") {
                    None => Self::DEFAULT_SIZE,
                    Some(size) => size
                        .as_u64()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| invalid("aggregation size must be a positive integer"))?
                        as usize,
                };
                Ok(AggregationDef::Terms {
                    field: field.to_string(),
                    size,
                })
            }
            other => Err(invalid(&format!("unknown aggregation type '{}'", other))),
        }
    }
}

fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// Facet section of the configuration for one index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetDefinition {
    /// Facet key → `{terms: {field, size}}`
    #[serde(default)]
    pub aggs: IndexMap<String, Value>,

    /// Facet key → `{terms: <field>}` or `{range: <field>}`
    #[serde(default)]
    pub filters: IndexMap<String, Value>,

    #[serde(default)]
    pub post_filters: IndexMap<String, Value>,
}

/// Validated facets of one index
#[derive(Clone, Default)]
pub struct FacetConfig {
    pub aggs: IndexMap<String, AggregationDef>,
    pub filters: IndexMap<String, Arc<dyn FacetFilter>>,
    pub post_filters: IndexMap<String, Arc<dyn FacetFilter>>,
}

impl FacetConfig {
    /// Validate a facet definition
    ///
    /// Unknown aggregation or filter types are rejected.
    pub fn from_definition(index: &str, definition: &FacetDefinition) -> Result<Self, ConfigError> {
        let aggs = definition
            .aggs
            .iter()
            .map(|(key, value)| Ok((key.clone(), AggregationDef::from_value(index, key, value)?)))
            .collect::<Result<IndexMap<_, _>, ConfigError>>()?;

        Ok(Self {
            aggs,
            filters: parse_filters(index, &definition.filters)?,
            post_filters: parse_filters(index, &definition.post_filters)?,
        })
    }
}

fn parse_filters(
    index: &str,
    raw: &IndexMap<String, Value>,
) -> Result<IndexMap<String, Arc<dyn FacetFilter>>, ConfigError> {
    raw.iter()
        .map(|(key, value)| {
            let invalid = |message: String| ConfigError::InvalidFacet {
                index: index.to_string(),
                key: key.clone(),
                message,
            };
            let (kind, field) = single_entry(value)
                .and_then(|(kind, field)| Some((kind, field.as_str()?)))
                .ok_or_else(|| {
                    invalid("filter must be a mapping of filter type to field name".to_string())
                })?;
            let filter: Arc<dyn FacetFilter> = match kind {
                "terms" => Arc::new(TermsFilter::new(field)),
                "range" => Arc::new(RangeFilter::new(field)),
                other => return Err(invalid(format!("unknown filter type '{}'", other))),
            };
            Ok((key.clone(), filter))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(yaml: &str) -> FacetDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_terms_filter() {
        let query = TermsFilter::new("type")
            .build(&["book".to_string(), "article".to_string()])
            .unwrap();
        assert_eq!(
            query,
            Query::Terms {
                field: "type".to_string(),
                values: vec!["book".to_string(), "article".to_string()],
            }
        );
    }

    #[test]
    fn test_range_filter() {
        let filter = RangeFilter::new("year");
        assert_eq!(
            filter.build(&["2010--".to_string()]).unwrap(),
            Query::Range {
                field: "year".to_string(),
                gte: Some("2010".to_string()),
                lte: None,
            }
        );
        assert!(matches!(
            filter
                .build(&["1990--2000".to_string(), "--1950".to_string()])
                .unwrap(),
            Query::Any(ranges) if ranges.len() == 2
        ));
        assert!(filter.build(&["2010".to_string()]).is_err());
    }

    #[test]
    fn test_from_definition() {
        let facets = FacetConfig::from_definition(
            "records",
            &definition(
                r#"
aggs:
  type:
    terms:
      field: type
  year:
    terms: {field: year, size: 5}
filters:
  year: {range: year}
post_filters:
  type: {terms: type}
"#,
            ),
        )
        .unwrap();

        assert_eq!(
            facets.aggs["year"],
            AggregationDef::Terms {
                field: "year".to_string(),
                size: 5
            }
        );
        assert!(facets.filters.contains_key("year"));
        assert!(facets.post_filters.contains_key("type"));
    }

    #[test]
    fn test_unknown_types_are_configuration_errors() {
        let bad_agg = FacetDefinition {
            aggs: IndexMap::from([("x".to_string(), json!({"histogram": {"field": "x"}}))]),
            ..Default::default()
        };
        assert!(matches!(
            FacetConfig::from_definition("records", &bad_agg),
            Err(ConfigError::InvalidFacet { .. })
        ));

        let bad_filter = FacetDefinition {
            post_filters: IndexMap::from([("x".to_string(), json!({"geo": "x"}))]),
            ..Default::default()
        };
        assert!(FacetConfig::from_definition("records", &bad_filter).is_err());
    }
}
