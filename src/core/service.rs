//! Service traits for the external collaborators
//!
//! The REST layer never stores identifiers, records or index documents
//! itself. It talks to three services whose implementations are free to use
//! any backend; [`crate::storage`] ships in-memory versions.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::core::identity::Identity;
use crate::core::record::Record;
use crate::search::{PreparedSearch, SearchResult, SuggestRequest, Suggestion};

/// Registration state of a persistent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// Identifier points to a live object
    Registered { object_id: Uuid },
    /// Identifier existed but its object was removed
    Deleted { object_id: Uuid },
    /// Identifier was never registered
    Unknown,
}

/// Persistent identifier store
#[async_trait]
pub trait IdentifierService: Send + Sync {
    /// Register `identity` for `object_id`
    ///
    /// Returns `false` when the identity is already taken.
    async fn register(&self, identity: &Identity, object_id: Uuid) -> Result<bool>;

    /// Look up the registration state of an identifier
    async fn resolve(&self, pid_type: &str, pid_value: &str) -> Result<PidStatus>;

    /// Mark an identifier as deleted
    async fn mark_deleted(&self, identity: &Identity) -> Result<()>;
}

/// Record storage engine
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record under `id`
    async fn create(&self, id: Uuid, data: Value) -> Result<Record>;

    /// Get a record, including soft-deleted tombstones
    async fn get(&self, id: &Uuid) -> Result<Option<Record>>;

    /// Replace a record's payload
    async fn update(&self, id: &Uuid, data: Value) -> Result<Record>;

    /// Soft-delete a record, keeping its payload
    async fn delete(&self, id: &Uuid) -> Result<Record>;
}

/// Document index and search engine
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index (or re-index) a record
    async fn index(&self, index: &str, record: &Record) -> Result<()>;

    /// Remove a record from the index
    async fn remove(&self, index: &str, id: &Uuid) -> Result<()>;

    /// Execute a prepared search
    async fn search(&self, index: &str, search: &PreparedSearch) -> Result<SearchResult>;

    /// Run completion suggesters
    async fn suggest(&self, index: &str, request: &SuggestRequest) -> Result<Vec<Suggestion>>;
}
