//! Search results as returned by the index

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::record::Record;

/// A single matching record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f64,
    pub record: Record,
}

/// One bucket of a terms aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub doc_count: usize,
}

/// Result of one aggregation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub buckets: Vec<Bucket>,
}

impl AggregationResult {
    /// Count of the bucket named `key`, zero when absent
    pub fn count(&self, key: &str) -> usize {
        self.buckets
            .iter()
            .find(|b| b.key == key)
            .map(|b| b.doc_count)
            .unwrap_or(0)
    }
}

/// A page of hits with the total and the aggregations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// Number of records matching the query and post-filter
    pub total: usize,
    /// The requested page
    pub hits: Vec<SearchHit>,
    pub aggregations: IndexMap<String, AggregationResult>,
}
