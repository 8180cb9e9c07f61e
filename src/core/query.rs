//! Search request parameters and pagination utilities

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::error::SearchError;

/// Parameters of a search request
///
/// Built from the raw query string so that facet keys, which are not known
/// in advance, can repeat.
///
/// # Example
/// ```text
/// GET /records?q=title:hello&sort=-mostrecent&page=2&size=20&type=book&type=article
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Free-text query
    pub q: Option<String>,

    /// Sort option name, optionally prefixed with `-`
    pub sort: Option<String>,

    /// Page number (starts at 1)
    pub page: usize,

    /// Number of hits per page
    pub size: usize,

    /// Explicit response format alias
    pub format: Option<String>,

    /// Facet selections: key → values, in request order
    pub facets: IndexMap<String, Vec<String>>,
}

impl SearchRequest {
    /// Empty request on the first page
    pub fn new(size: usize) -> Self {
        Self {
            q: None,
            sort: None,
            page: 1,
            size,
            format: None,
            facets: IndexMap::new(),
        }
    }

    /// Parse decoded query pairs
    ///
    /// `page` and `size` must be positive integers. Every key that is not a
    /// reserved parameter becomes a facet selection.
    pub fn from_pairs(
        pairs: &[(String, String)],
        default_size: usize,
        format_arg: &str,
    ) -> Result<Self, SearchError> {
        let mut request = Self::new(default_size);

        for (key, value) in pairs {
            match key.as_str() {
                "q" => request.q = Some(value.clone()),
                "sort" => request.sort = Some(value.clone()).filter(|s| !s.is_empty()),
                "page" => request.page = positive(key, value)?,
                "size" => request.size = positive(key, value)?,
                k if k == format_arg => request.format = Some(value.clone()),
                _ => request
                    .facets
                    .entry(key.clone())
                    .or_default()
                    .push(value.clone()),
            }
        }

        Ok(request)
    }

    /// Query string without surrounding whitespace, if any
    pub fn query(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Offset of the first hit
    pub fn from(&self) -> usize {
        (self.page - 1) * self.size
    }
}

fn positive(name: &str, value: &str) -> Result<usize, SearchError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| SearchError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub size: usize,

    /// Total number of hits
    pub total: usize,

    /// Total number of pages
    pub total_pages: usize,

    /// Whether there is a next page within the result window
    pub has_next: bool,

    /// Whether there is a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    /// Create pagination metadata, capping `has_next` at `max_result_window`
    pub fn new(page: usize, size: usize, total: usize, max_result_window: usize) -> Self {
        let size = size.max(1);
        let page = page.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(size) };
        let end = page * size;

        Self {
            page,
            size,
            total,
            total_pages,
            has_next: end < total && end + size <= max_result_window,
            has_prev: page > 1,
        }
    }
}
