//! Persistent identifiers: minting new identities and resolving URL values
//!
//! A resource type owns a minter/fetcher pair. The minter assigns a fresh
//! identity to a record payload at creation time, the fetcher reads the
//! identity back out of a stored payload (used when rendering search hits).
//! [`IdentityResolver`] couples the pair with the external
//! [`IdentifierService`] that remembers which identity points to which record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::core::error::{IdentityError, RestError, ValidationError};
use crate::core::service::{IdentifierService, PidStatus};

/// A typed persistent identifier, e.g. `recid:42`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub pid_type: String,
    pub pid_value: String,
}

impl Identity {
    pub fn new(pid_type: impl Into<String>, pid_value: impl Into<String>) -> Self {
        Self {
            pid_type: pid_type.into(),
            pid_value: pid_value.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid_type, self.pid_value)
    }
}

/// Produces the identity of a newly created record
///
/// Implementations write the minted value into the payload so the record
/// carries its own identifier.
pub trait Minter: Send + Sync {
    fn mint(&self, pid_type: &str, record: &mut Value) -> Result<Identity, RestError>;

    /// Write an existing identity back into a replacement payload
    fn assign(&self, identity: &Identity, record: &mut Value) -> Result<(), RestError>;
}

/// Extracts the identity of a stored record
pub trait Fetcher: Send + Sync {
    fn fetch(&self, pid_type: &str, record: &Value) -> Option<Identity>;
}

/// Sequential integer minter writing into `control_number`
pub struct RecidMinter {
    field: String,
    next: AtomicU64,
}

impl RecidMinter {
    pub fn new() -> Self {
        Self::with_field("control_number")
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for RecidMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Minter for RecidMinter {
    fn mint(&self, pid_type: &str, record: &mut Value) -> Result<Identity, RestError> {
        let value = self.next.fetch_add(1, Ordering::SeqCst).to_string();
        write_field(record, &self.field, &value)?;
        Ok(Identity::new(pid_type, value))
    }

    fn assign(&self, identity: &Identity, record: &mut Value) -> Result<(), RestError> {
        write_field(record, &self.field, &identity.pid_value)
    }
}

/// Random UUID minter writing into `id`
pub struct UuidMinter {
    field: String,
}

impl UuidMinter {
    pub fn new() -> Self {
        Self {
            field: "id".to_string(),
        }
    }
}

impl Default for UuidMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Minter for UuidMinter {
    fn mint(&self, pid_type: &str, record: &mut Value) -> Result<Identity, RestError> {
        let value = Uuid::new_v4().to_string();
        write_field(record, &self.field, &value)?;
        Ok(Identity::new(pid_type, value))
    }

    fn assign(&self, identity: &Identity, record: &mut Value) -> Result<(), RestError> {
        write_field(record, &self.field, &identity.pid_value)
    }
}

fn write_field(record: &mut Value, field: &str, value: &str) -> Result<(), RestError> {
    let object = record.as_object_mut().ok_or_else(|| ValidationError::InvalidBody {
        message: "record must be a JSON object".to_string(),
    })?;
    object.insert(field.to_string(), Value::from(value));
    Ok(())
}

/// Reads an identity from a top-level field (string or number)
pub struct FieldFetcher {
    field: String,
}

impl FieldFetcher {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Fetcher for FieldFetcher {
    fn fetch(&self, pid_type: &str, record: &Value) -> Option<Identity> {
        let value = match record.get(&self.field)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Identity::new(pid_type, value))
    }
}

/// An identity resolved to the object it points to
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    pub object_id: Uuid,
}

/// Per-endpoint identity resolver
#[derive(Clone)]
pub struct IdentityResolver {
    pid_type: String,
    minter: Arc<dyn Minter>,
    fetcher: Arc<dyn Fetcher>,
    identifiers: Arc<dyn IdentifierService>,
}

impl IdentityResolver {
    pub fn new(
        pid_type: impl Into<String>,
        minter: Arc<dyn Minter>,
        fetcher: Arc<dyn Fetcher>,
        identifiers: Arc<dyn IdentifierService>,
    ) -> Self {
        Self {
            pid_type: pid_type.into(),
            minter,
            fetcher,
            identifiers,
        }
    }

    pub fn pid_type(&self) -> &str {
        &self.pid_type
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Mint an identity for `record` and register it against `object_id`
    pub async fn mint(&self, record: &mut Value, object_id: Uuid) -> Result<Identity, RestError> {
        let identity = self.minter.mint(&self.pid_type, record)?;

        let registered = self
            .identifiers
            .register(&identity, object_id)
            .await
            .map_err(RestError::storage)?;

        if !registered {
            return Err(IdentityError::AlreadyExists {
                pid_type: identity.pid_type,
                pid_value: identity.pid_value,
            }
            .into());
        }

        tracing::debug!(identity = %identity, object_id = %object_id, "Minted identity");
        Ok(identity)
    }

    /// Registration state of a URL value, without interpretation
    pub async fn lookup(&self, pid_value: &str) -> Result<(Identity, PidStatus), RestError> {
        let status = self
            .identifiers
            .resolve(&self.pid_type, pid_value)
            .await
            .map_err(RestError::storage)?;
        Ok((Identity::new(self.pid_type.clone(), pid_value), status))
    }

    /// Resolve a URL value to the object it identifies
    ///
    /// A deleted identity yields [`IdentityError::Gone`] without a record;
    /// callers holding the record store attach the tombstone.
    pub async fn fetch(&self, pid_value: &str) -> Result<ResolvedIdentity, RestError> {
        match self.lookup(pid_value).await? {
            (identity, PidStatus::Registered { object_id }) => Ok(ResolvedIdentity {
                identity,
                object_id,
            }),
            (identity, PidStatus::Deleted { .. }) => Err(IdentityError::Gone {
                identity,
                record: None,
            }
            .into()),
            (identity, PidStatus::Unknown) => Err(IdentityError::NotFound {
                pid_type: identity.pid_type,
                pid_value: identity.pid_value,
            }
            .into()),
        }
    }

    /// Keep `identity` in a payload that replaces the stored record
    pub fn stamp(&self, identity: &Identity, record: &mut Value) -> Result<(), RestError> {
        self.minter.assign(identity, record)
    }

    /// Mark a resolved identity as deleted
    pub async fn delete(&self, identity: &Identity) -> Result<(), RestError> {
        self.identifiers
            .mark_deleted(identity)
            .await
            .map_err(RestError::storage)
    }
}
