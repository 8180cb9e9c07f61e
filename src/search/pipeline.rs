//! Search query assembly
//!
//! [`SearchPipeline::prepare`] turns a [`SearchRequest`] into a
//! [`PreparedSearch`] in fixed order: result window check, query parsing,
//! facet filters, aggregations, post-filters, sort.

use std::sync::Arc;

use crate::core::error::SearchError;
use crate::core::query::SearchRequest;
use crate::search::facets::{AggregationDef, FacetConfig};
use crate::search::parser::QueryParser;
use crate::search::query::Query;
use crate::search::sort::{SortClause, SortRegistry};

/// An aggregation to compute, optionally restricted by a filter
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub name: String,
    pub def: AggregationDef,
    /// Post-filters of the other facet keys, when propagation is on
    pub filter: Option<Query>,
}

/// A fully assembled search, ready for the index
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSearch {
    pub index: String,
    pub query: Query,
    /// Restricts hits only
    pub post_filter: Option<Query>,
    pub aggregations: Vec<AggregationRequest>,
    pub sort: Vec<SortClause>,
    /// Name of the applied sort option
    pub resolved_sort: Option<String>,
    pub from: usize,
    pub size: usize,
    /// Query arguments that reproduce this search, without paging
    pub url_args: Vec<(String, String)>,
}

/// Search configuration of one endpoint
#[derive(Clone)]
pub struct SearchPipeline {
    pub index: String,
    pub parser: Arc<dyn QueryParser>,
    pub facets: Arc<FacetConfig>,
    pub sorts: Arc<SortRegistry>,
    pub max_result_window: usize,
    pub propagate_post_filters: bool,
}

impl SearchPipeline {
    pub fn prepare(&self, request: &SearchRequest) -> Result<PreparedSearch, SearchError> {
        let requested = request.page.checked_mul(request.size);
        if requested.is_none_or(|n| n > self.max_result_window) {
            return Err(SearchError::ResultWindowExceeded {
                requested: requested.unwrap_or(usize::MAX),
                max: self.max_result_window,
            });
        }

        let text = request.query();
        let mut query = self.parser.parse(text)?;

        for (key, values) in &request.facets {
            if let Some(filter) = self.facets.filters.get(key) {
                query = query.and(filter.build(values)?);
            }
        }

        let mut post_filters = Vec::new();
        for (key, values) in &request.facets {
            if let Some(filter) = self.facets.post_filters.get(key) {
                post_filters.push((key.as_str(), filter.build(values)?));
            }
        }

        let aggregations = self
            .facets
            .aggs
            .iter()
            .map(|(name, def)| {
                let filter = if self.propagate_post_filters {
                    Query::all(
                        post_filters
                            .iter()
                            .filter(|(key, _)| *key != name.as_str())
                            .map(|(_, q)| q.clone()),
                    )
                } else {
                    None
                };
                AggregationRequest {
                    name: name.clone(),
                    def: def.clone(),
                    filter,
                }
            })
            .collect();

        let sort = self.sorts.resolve(request.sort.as_deref(), text.is_some());

        tracing::debug!(
            index = %self.index,
            sort = ?sort.name,
            page = request.page,
            size = request.size,
            "Prepared search"
        );

        let applied_sort = request.sort.as_ref().and(sort.name.as_deref());
        let url_args = url_args(request, applied_sort);

        Ok(PreparedSearch {
            index: self.index.clone(),
            query,
            post_filter: Query::all(post_filters.into_iter().map(|(_, q)| q)),
            aggregations,
            sort: sort.clauses,
            resolved_sort: sort.name,
            from: request.from(),
            size: request.size,
            url_args,
        })
    }
}

/// `sort` is echoed only when the requested option was applied
fn url_args(request: &SearchRequest, sort: Option<&str>) -> Vec<(String, String)> {
    let mut args = Vec::new();
    if let Some(q) = &request.q {
        args.push(("q".to_string(), q.clone()));
    }
    if let Some(sort) = sort {
        args.push(("sort".to_string(), sort.to_string()));
    }
    args.push(("size".to_string(), request.size.to_string()));
    for (key, values) in &request.facets {
        for value in values {
            args.push((key.clone(), value.clone()));
        }
    }
    args
}
