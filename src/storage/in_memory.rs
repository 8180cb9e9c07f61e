//! In-memory collaborators for testing and development

use crate::core::identity::Identity;
use crate::core::record::Record;
use crate::core::service::{IdentifierService, PidStatus, RecordStore, SearchIndex};
use crate::search::{
    AggregationDef, AggregationResult, Bucket, Operator, PreparedSearch, Query, SearchHit,
    SearchResult, SortClause, SuggestRequest, Suggestion, Term,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Registration {
    object_id: Uuid,
    deleted: bool,
}

/// In-memory persistent identifier store
#[derive(Clone, Default)]
pub struct InMemoryIdentifierService {
    pids: Arc<RwLock<HashMap<(String, String), Registration>>>,
}

impl InMemoryIdentifierService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentifierService for InMemoryIdentifierService {
    async fn register(&self, identity: &Identity, object_id: Uuid) -> Result<bool> {
        let mut pids = self
            .pids
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let key = (identity.pid_type.clone(), identity.pid_value.clone());
        if pids.contains_key(&key) {
            return Ok(false);
        }
        pids.insert(
            key,
            Registration {
                object_id,
                deleted: false,
            },
        );
        Ok(true)
    }

    async fn resolve(&self, pid_type: &str, pid_value: &str) -> Result<PidStatus> {
        let pids = self
            .pids
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let status = match pids.get(&(pid_type.to_string(), pid_value.to_string())) {
            Some(Registration {
                object_id,
                deleted: false,
            }) => PidStatus::Registered {
                object_id: *object_id,
            },
            Some(Registration {
                object_id,
                deleted: true,
            }) => PidStatus::Deleted {
                object_id: *object_id,
            },
            None => PidStatus::Unknown,
        };
        Ok(status)
    }

    async fn mark_deleted(&self, identity: &Identity) -> Result<()> {
        let mut pids = self
            .pids
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let registration = pids
            .get_mut(&(identity.pid_type.clone(), identity.pid_value.clone()))
            .ok_or_else(|| anyhow!("Identifier {} is not registered", identity))?;
        registration.deleted = true;
        Ok(())
    }
}

/// In-memory record store keeping tombstones of deleted records
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<Uuid, Record>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, id: Uuid, data: Value) -> Result<Record> {
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if records.contains_key(&id) {
            return Err(anyhow!("Record {} already exists", id));
        }
        let record = Record::new(id, data);
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Record>> {
        let records = self
            .records
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(records.get(id).cloned())
    }

    async fn update(&self, id: &Uuid, data: Value) -> Result<Record> {
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let record = records
            .get_mut(id)
            .filter(|r| !r.deleted)
            .ok_or_else(|| anyhow!("Record {} not found", id))?;
        record.revise(data);
        Ok(record.clone())
    }

    async fn delete(&self, id: &Uuid) -> Result<Record> {
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let record = records
            .get_mut(id)
            .filter(|r| !r.deleted)
            .ok_or_else(|| anyhow!("Record {} not found", id))?;
        record.deleted = true;
        record.updated = Utc::now();
        Ok(record.clone())
    }
}

/// In-memory document index
///
/// Scores free-text queries by the number of matching terms. Good enough to
/// exercise filters, post-filters, aggregations, sorting and paging.
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    indices: Arc<RwLock<HashMap<String, IndexMap<Uuid, Record>>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `index`
    pub fn len(&self, index: &str) -> Result<usize> {
        let indices = self
            .indices
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(indices.get(index).map(IndexMap::len).unwrap_or(0))
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn index(&self, index: &str, record: &Record) -> Result<()> {
        let mut indices = self
            .indices
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        indices
            .entry(index.to_string())
            .or_default()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn remove(&self, index: &str, id: &Uuid) -> Result<()> {
        let mut indices = self
            .indices
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if let Some(docs) = indices.get_mut(index) {
            docs.shift_remove(id);
        }
        Ok(())
    }

    async fn search(&self, index: &str, search: &PreparedSearch) -> Result<SearchResult> {
        let indices = self
            .indices
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let Some(docs) = indices.get(index) else {
            return Ok(SearchResult::default());
        };

        let matching: Vec<(f64, &Record)> = docs
            .values()
            .filter_map(|record| score(&search.query, record).map(|s| (s, record)))
            .collect();

        let aggregations = search
            .aggregations
            .iter()
            .map(|agg| {
                let records = matching
                    .iter()
                    .map(|(_, r)| *r)
                    .filter(|r| agg.filter.as_ref().is_none_or(|f| score(f, r).is_some()));
                (agg.name.clone(), aggregate(&agg.def, records))
            })
            .collect();

        let mut hits: Vec<(f64, &Record)> = matching
            .into_iter()
            .filter(|(_, r)| {
                search
                    .post_filter
                    .as_ref()
                    .is_none_or(|f| score(f, r).is_some())
            })
            .collect();

        hits.sort_by(|a, b| compare(&search.sort, a, b));

        Ok(SearchResult {
            total: hits.len(),
            hits: hits
                .into_iter()
                .skip(search.from)
                .take(search.size)
                .map(|(score, record)| SearchHit {
                    score,
                    record: record.clone(),
                })
                .collect(),
            aggregations,
        })
    }

    async fn suggest(&self, index: &str, request: &SuggestRequest) -> Result<Vec<Suggestion>> {
        let indices = self
            .indices
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let Some(docs) = indices.get(index) else {
            return Ok(Vec::new());
        };

        let prefix = request.prefix.to_lowercase();
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for record in docs.values() {
            if let Some(context) = &request.context {
                if !field_values(record, &context.field).contains(&context.value) {
                    continue;
                }
            }
            let texts: BTreeSet<String> = field_values(record, &request.field)
                .into_iter()
                .filter(|v| v.to_lowercase().starts_with(&prefix))
                .collect();
            for text in texts {
                *counts.entry(text).or_default() += 1;
            }
        }

        let mut suggestions: Vec<Suggestion> = counts
            .into_iter()
            .map(|(text, doc_count)| Suggestion { text, doc_count })
            .collect();
        suggestions.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then(a.text.cmp(&b.text)));
        suggestions.truncate(request.size);
        Ok(suggestions)
    }
}

// =============================================================================
// Query evaluation
// =============================================================================

/// Scalar values at a dotted path; arrays are flattened
fn field_values(record: &Record, field: &str) -> Vec<String> {
    match field {
        "_id" => return vec![record.id.to_string()],
        "_created" => return vec![record.created.to_rfc3339()],
        "_updated" => return vec![record.updated.to_rfc3339()],
        _ => {}
    }

    let mut current = vec![&record.data];
    for segment in field.split('.') {
        current = current
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|i| i.get(segment))
                    .collect::<Vec<_>>(),
                other => other.get(segment).into_iter().collect::<Vec<_>>(),
            })
            .collect();
    }

    let mut out = Vec::new();
    for value in current {
        collect_scalars(value, &mut out);
    }
    out
}

fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|i| collect_scalars(i, out)),
        Value::Object(map) => map.values().for_each(|v| collect_scalars(v, out)),
        Value::Null => {}
    }
}

fn term_matches(term: &Term, record: &Record, operator: Operator) -> bool {
    let contains = |field: &Option<String>, needle: &str| {
        let needle = needle.to_lowercase();
        let haystack = match field {
            Some(field) => field_values(record, field),
            None => {
                let mut all = Vec::new();
                collect_scalars(&record.data, &mut all);
                all
            }
        };
        haystack.iter().any(|v| v.to_lowercase().contains(&needle))
    };

    match term {
        Term::Word { field, value } | Term::Phrase { field, value } => contains(field, value),
        Term::Group(terms) => match operator {
            Operator::Or => terms.iter().any(|t| term_matches(t, record, operator)),
            Operator::And => terms.iter().all(|t| term_matches(t, record, operator)),
        },
    }
}

fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Score of `record` under `query`, `None` when it does not match
fn score(query: &Query, record: &Record) -> Option<f64> {
    match query {
        Query::MatchAll => Some(1.0),
        Query::QueryString { terms, operator } => {
            let matched = terms
                .iter()
                .filter(|t| term_matches(t, record, *operator))
                .count();
            let ok = match operator {
                Operator::Or => matched > 0,
                Operator::And => matched == terms.len(),
            };
            ok.then_some(matched as f64)
        }
        Query::Terms { field, values } => field_values(record, field)
            .iter()
            .any(|v| values.contains(v))
            .then_some(0.0),
        Query::Range { field, gte, lte } => field_values(record, field)
            .iter()
            .any(|v| {
                gte.as_ref()
                    .is_none_or(|g| compare_values(v, g) != Ordering::Less)
                    && lte
                        .as_ref()
                        .is_none_or(|l| compare_values(v, l) != Ordering::Greater)
            })
            .then_some(0.0),
        Query::All(queries) => queries
            .iter()
            .map(|q| score(q, record))
            .sum::<Option<f64>>(),
        Query::Any(queries) => queries
            .iter()
            .filter_map(|q| score(q, record))
            .reduce(f64::max),
    }
}

fn aggregate<'a>(def: &AggregationDef, records: impl Iterator<Item = &'a Record>) -> AggregationResult {
    match def {
        AggregationDef::Terms { field, size } => {
            let mut counts: IndexMap<String, usize> = IndexMap::new();
            for record in records {
                let distinct: BTreeSet<String> = field_values(record, field).into_iter().collect();
                for key in distinct {
                    *counts.entry(key).or_default() += 1;
                }
            }
            let mut buckets: Vec<Bucket> = counts
                .into_iter()
                .map(|(key, doc_count)| Bucket { key, doc_count })
                .collect();
            buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then(a.key.cmp(&b.key)));
            buckets.truncate(*size);
            AggregationResult { buckets }
        }
    }
}

fn compare(sort: &[SortClause], a: &(f64, &Record), b: &(f64, &Record)) -> Ordering {
    for clause in sort {
        let ordering = if clause.field == "_score" {
            a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal)
        } else if matches!(clause.field.as_str(), "_created" | "_updated") {
            let key = |r: &Record| {
                if clause.field == "_created" {
                    r.created
                } else {
                    r.updated
                }
            };
            key(a.1).cmp(&key(b.1))
        } else {
            let first = |r: &Record| field_values(r, &clause.field).into_iter().next();
            match (first(a.1), first(b.1)) {
                (Some(x), Some(y)) => compare_values(&x, &y),
                // Missing values sort last in either direction
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        };
        let ordering = if clause.direction.is_ascending() {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
