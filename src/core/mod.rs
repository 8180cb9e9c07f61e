//! Core types and traits: identities, records, permissions, negotiation and
//! serialization

pub mod error;
pub mod identity;
pub mod links;
pub mod negotiation;
pub mod patch;
pub mod permission;
pub mod query;
pub mod record;
pub mod serializer;
pub mod service;

pub use error::{ErrorBody, ErrorKind, RestError};
pub use identity::{
    Fetcher, FieldFetcher, Identity, IdentityResolver, Minter, RecidMinter, UuidMinter,
};
pub use links::{DefaultLinksFactory, Links, LinksFactory, RecordLinker, UrlMap};
pub use permission::{
    AccessPolicy, Actor, ActorProvider, AllowAll, AllowIfResolvable, DenyAll, Operation,
    Permission, PermissionContext, PermissionFactories, PermissionFactory,
};
pub use query::SearchRequest;
pub use record::Record;
pub use serializer::{
    JsonLoader, JsonPatchLoader, JsonSerializer, Loader, RecordSerializer, YamlSerializer,
    record_responsify, search_responsify,
};
pub use service::{IdentifierService, PidStatus, RecordStore, SearchIndex};
