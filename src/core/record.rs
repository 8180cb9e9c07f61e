//! Stored record representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A record as kept by the record store
///
/// Deleting a record keeps its payload as a tombstone so a later lookup can
/// still report why it was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub revision: u32,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    pub data: Value,
}

impl Record {
    /// Build the first revision of a record
    pub fn new(id: Uuid, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            revision: 1,
            created: now,
            updated: now,
            deleted: false,
            data,
        }
    }

    /// Replace the payload, bumping revision and update time
    pub fn revise(&mut self, data: Value) {
        self.data = data;
        self.revision += 1;
        self.updated = Utc::now();
    }

    /// Entity tag of the current revision
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.revision)
    }
}
