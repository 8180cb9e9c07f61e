//! Permission gate for record operations
//!
//! Every operation builds a [`Permission`] through the endpoint's
//! [`PermissionFactory`] for that operation and asks it whether the current
//! [`Actor`] may proceed. The check happens before any side effect.
//!
//! Built-in factories:
//! - [`AllowAll`] and [`DenyAll`]
//! - [`AllowIfResolvable`]: passes when there is no subject record (listing)
//!   or when the subject record resolved and is not deleted
//! - [`PolicyFactory`]: wraps an [`AccessPolicy`] over the actor

use axum::http::HeaderMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::{ConfigError, PermissionError};
use crate::core::identity::Identity;
use crate::core::record::Record;

/// The party performing a request
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    /// Authenticated user
    User { user_id: Uuid, roles: Vec<String> },

    /// Service-to-service communication
    Service { service_name: String },

    /// System administrator
    Admin { admin_id: Uuid },

    /// No authentication (public access)
    Anonymous,
}

impl Actor {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Actor::Anonymous)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Actor::Service { .. })
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            Actor::User { roles, .. } => roles.iter().any(|r| r == role),
            _ => false,
        }
    }
}

/// Record operations guarded by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// What a permission is being built for
#[derive(Debug, Clone, Copy)]
pub struct PermissionContext<'a> {
    pub operation: Operation,
    pub identity: Option<&'a Identity>,
    pub record: Option<&'a Record>,
    /// Incoming payload for create/update
    pub payload: Option<&'a Value>,
}

impl<'a> PermissionContext<'a> {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            identity: None,
            record: None,
            payload: None,
        }
    }

    pub fn with_record(mut self, identity: &'a Identity, record: &'a Record) -> Self {
        self.identity = Some(identity);
        self.record = Some(record);
        self
    }

    pub fn with_payload(mut self, payload: &'a Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A capability check bound to one request
pub trait Permission: Send {
    fn allows(&self, actor: &Actor) -> bool;
}

/// Builds permissions for an operation
pub trait PermissionFactory: Send + Sync {
    fn create(&self, context: &PermissionContext<'_>) -> Box<dyn Permission>;
}

struct Constant(bool);

impl Permission for Constant {
    fn allows(&self, _actor: &Actor) -> bool {
        self.0
    }
}

/// Allow every request
pub struct AllowAll;

impl PermissionFactory for AllowAll {
    fn create(&self, _context: &PermissionContext<'_>) -> Box<dyn Permission> {
        Box::new(Constant(true))
    }
}

/// Reject every request
pub struct DenyAll;

impl PermissionFactory for DenyAll {
    fn create(&self, _context: &PermissionContext<'_>) -> Box<dyn Permission> {
        Box::new(Constant(false))
    }
}

/// Allow when the subject record resolved and is live
pub struct AllowIfResolvable;

impl PermissionFactory for AllowIfResolvable {
    fn create(&self, context: &PermissionContext<'_>) -> Box<dyn Permission> {
        let resolvable = match (context.operation, context.record) {
            (Operation::List, _) => true,
            (_, Some(record)) => !record.deleted,
            (_, None) => false,
        };
        Box::new(Constant(resolvable))
    }
}

/// Access policy over the actor
#[derive(Debug, Clone)]
pub enum AccessPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated actor
    Authenticated,

    /// User must have one of these roles
    HasRole(Vec<String>),

    /// Service-to-service only
    ServiceOnly,

    /// Admin only
    AdminOnly,

    /// Combination of policies (AND)
    And(Vec<AccessPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AccessPolicy>),

    /// Custom policy function
    Custom(fn(&Actor) -> bool),
}

impl AccessPolicy {
    /// Check if an actor satisfies this policy
    pub fn check(&self, actor: &Actor) -> bool {
        match self {
            AccessPolicy::Public => true,

            AccessPolicy::Authenticated => !actor.is_anonymous(),

            // Admins pass every role check
            AccessPolicy::HasRole(required) => {
                actor.is_admin() || required.iter().any(|r| actor.has_role(r))
            }

            AccessPolicy::ServiceOnly => actor.is_service(),

            AccessPolicy::AdminOnly => actor.is_admin(),

            AccessPolicy::And(policies) => policies.iter().all(|p| p.check(actor)),

            AccessPolicy::Or(policies) => policies.iter().any(|p| p.check(actor)),

            AccessPolicy::Custom(f) => f(actor),
        }
    }

    /// Parse a policy name from configuration
    pub fn parse_policy(s: &str) -> Result<Self, ConfigError> {
        let policy = match s {
            "public" => AccessPolicy::Public,
            "authenticated" => AccessPolicy::Authenticated,
            "service_only" => AccessPolicy::ServiceOnly,
            "admin_only" => AccessPolicy::AdminOnly,
            s if s.starts_with("role:") => {
                let roles = s["role:".len()..]
                    .split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect::<Vec<_>>();
                if roles.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "permission_factory".to_string(),
                        value: s.to_string(),
                        message: "role policy needs at least one role".to_string(),
                    });
                }
                AccessPolicy::HasRole(roles)
            }
            other => {
                return Err(ConfigError::MissingPlugin {
                    kind: "permission factory",
                    name: other.to_string(),
                });
            }
        };
        Ok(policy)
    }
}

struct PolicyPermission(AccessPolicy);

impl Permission for PolicyPermission {
    fn allows(&self, actor: &Actor) -> bool {
        self.0.check(actor)
    }
}

/// Permission factory backed by an [`AccessPolicy`]
pub struct PolicyFactory(pub AccessPolicy);

impl PermissionFactory for PolicyFactory {
    fn create(&self, _context: &PermissionContext<'_>) -> Box<dyn Permission> {
        Box::new(PolicyPermission(self.0.clone()))
    }
}

/// One permission factory per operation
#[derive(Clone)]
pub struct PermissionFactories {
    pub list: Arc<dyn PermissionFactory>,
    pub read: Arc<dyn PermissionFactory>,
    pub create: Arc<dyn PermissionFactory>,
    pub update: Arc<dyn PermissionFactory>,
    pub delete: Arc<dyn PermissionFactory>,
}

impl PermissionFactories {
    pub fn for_operation(&self, operation: Operation) -> &Arc<dyn PermissionFactory> {
        match operation {
            Operation::List => &self.list,
            Operation::Read => &self.read,
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }

    /// Evaluate the gate for `context` and `actor`
    ///
    /// Denials map to 401 for anonymous actors and 403 otherwise.
    pub fn check(
        &self,
        context: &PermissionContext<'_>,
        actor: &Actor,
    ) -> Result<(), PermissionError> {
        let permission = self.for_operation(context.operation).create(context);
        if permission.allows(actor) {
            return Ok(());
        }

        tracing::debug!(operation = %context.operation, actor = ?actor, "Permission denied");
        let operation = context.operation;
        if actor.is_anonymous() {
            Err(PermissionError::Unauthorized { operation })
        } else {
            Err(PermissionError::Forbidden { operation })
        }
    }
}

/// Extracts the acting party from request headers
pub trait ActorProvider: Send + Sync {
    fn actor(&self, headers: &HeaderMap) -> Actor;
}

/// Treats every request as anonymous
pub struct AnonymousActorProvider;

impl ActorProvider for AnonymousActorProvider {
    fn actor(&self, _headers: &HeaderMap) -> Actor {
        Actor::Anonymous
    }
}

/// Trusts identity headers set by an upstream gateway
///
/// - `X-Service-Name: billing` → service actor
/// - `X-User-Id: <uuid>` with optional `X-User-Roles: a,b` → user actor;
///   the `admin` role yields an admin actor
pub struct HeaderActorProvider;

impl ActorProvider for HeaderActorProvider {
    fn actor(&self, headers: &HeaderMap) -> Actor {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        if let Some(service_name) = header("x-service-name") {
            return Actor::Service {
                service_name: service_name.to_string(),
            };
        }

        let Some(user_id) = header("x-user-id").and_then(|v| Uuid::parse_str(v).ok()) else {
            return Actor::Anonymous;
        };

        let roles: Vec<String> = header("x-user-roles")
            .map(|v| {
                v.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if roles.iter().any(|r| r == "admin") {
            Actor::Admin { admin_id: user_id }
        } else {
            Actor::User { user_id, roles }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn user(roles: &[&str]) -> Actor {
        Actor::User {
            user_id: Uuid::new_v4(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn defaults() -> PermissionFactories {
        PermissionFactories {
            list: Arc::new(AllowIfResolvable),
            read: Arc::new(AllowIfResolvable),
            create: Arc::new(DenyAll),
            update: Arc::new(DenyAll),
            delete: Arc::new(DenyAll),
        }
    }

    #[test]
    fn test_policy_check() {
        let editor = user(&["editor"]);
        assert!(AccessPolicy::Authenticated.check(&editor));
        assert!(AccessPolicy::HasRole(vec!["editor".into()]).check(&editor));
        assert!(!AccessPolicy::AdminOnly.check(&editor));

        assert!(AccessPolicy::Public.check(&Actor::Anonymous));
        assert!(!AccessPolicy::Authenticated.check(&Actor::Anonymous));
    }

    #[test]
    fn test_policy_and_or() {
        let viewer = user(&["viewer"]);
        let and = AccessPolicy::And(vec![
            AccessPolicy::Authenticated,
            AccessPolicy::HasRole(vec!["editor".into()]),
        ]);
        assert!(!and.check(&viewer));

        let or = AccessPolicy::Or(vec![AccessPolicy::ServiceOnly, AccessPolicy::AdminOnly]);
        assert!(or.check(&Actor::Admin {
            admin_id: Uuid::new_v4()
        }));
        assert!(!or.check(&viewer));
    }

    #[test]
    fn test_policy_custom() {
        fn never(_actor: &Actor) -> bool {
            false
        }
        assert!(!AccessPolicy::Custom(never).check(&Actor::Anonymous));
    }

    #[test]
    fn test_parse_policy() {
        assert!(matches!(
            AccessPolicy::parse_policy("authenticated").unwrap(),
            AccessPolicy::Authenticated
        ));
        match AccessPolicy::parse_policy("role:curator, editor").unwrap() {
            AccessPolicy::HasRole(roles) => assert_eq!(roles, vec!["curator", "editor"]),
            other => panic!("Expected HasRole, got {:?}", other),
        }
        assert!(AccessPolicy::parse_policy("role:").is_err());
        assert!(AccessPolicy::parse_policy("whatever").is_err());
    }

    #[test]
    fn test_default_read_requires_live_record() {
        let factories = defaults();
        let identity = Identity::new("recid", "1");
        let mut record = Record::new(Uuid::new_v4(), json!({}));

        let ctx = PermissionContext::new(Operation::Read).with_record(&identity, &record);
        assert!(factories.check(&ctx, &Actor::Anonymous).is_ok());

        record.deleted = true;
        let ctx = PermissionContext::new(Operation::Read).with_record(&identity, &record);
        assert!(factories.check(&ctx, &Actor::Anonymous).is_err());

        let ctx = PermissionContext::new(Operation::Read);
        assert!(factories.check(&ctx, &Actor::Anonymous).is_err());
    }

    #[test]
    fn test_default_list_allows() {
        let ctx = PermissionContext::new(Operation::List);
        assert!(defaults().check(&ctx, &Actor::Anonymous).is_ok());
    }

    #[test]
    fn test_deny_distinguishes_anonymous() {
        let factories = defaults();
        let ctx = PermissionContext::new(Operation::Create);

        let anonymous = factories.check(&ctx, &Actor::Anonymous).unwrap_err();
        assert!(matches!(anonymous, PermissionError::Unauthorized { .. }));

        let known = factories.check(&ctx, &user(&[])).unwrap_err();
        assert!(matches!(known, PermissionError::Forbidden { .. }));
    }

    #[test]
    fn test_header_actor_provider() {
        let provider = HeaderActorProvider;
        assert_eq!(provider.actor(&HeaderMap::new()), Actor::Anonymous);

        let user_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-user-id",
            HeaderValue::from_str(&user_id.to_string()).unwrap(),
        );
        headers.insert("x-user-roles", HeaderValue::from_static("editor, viewer"));
        assert_eq!(
            provider.actor(&headers),
            Actor::User {
                user_id,
                roles: vec!["editor".to_string(), "viewer".to_string()],
            }
        );

        headers.insert("x-user-roles", HeaderValue::from_static("admin"));
        assert_eq!(provider.actor(&headers), Actor::Admin { admin_id: user_id });

        headers.insert("x-service-name", HeaderValue::from_static("indexer"));
        assert!(provider.actor(&headers).is_service());
    }

    #[test]
    fn test_header_actor_provider_ignores_bad_uuid() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("not-a-uuid"));
        assert_eq!(HeaderActorProvider.actor(&headers), Actor::Anonymous);
    }

    #[test]
    fn test_anonymous_provider() {
        let mut headers = HeaderMap::new();
        headers.insert("x-service-name", HeaderValue::from_static("indexer"));
        assert_eq!(AnonymousActorProvider.actor(&headers), Actor::Anonymous);
    }
}
