//! Hypermedia links attached to rendered records

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::identity::Identity;

/// Relation name → URL
pub type Links = IndexMap<String, String>;

/// Builds the links of a single record
pub trait LinksFactory: Send + Sync {
    fn record_links(&self, identity: &Identity, self_url: &str) -> Links;
}

/// Emits only the `self` link
pub struct DefaultLinksFactory;

impl LinksFactory for DefaultLinksFactory {
    fn record_links(&self, _identity: &Identity, self_url: &str) -> Links {
        Links::from([("self".to_string(), self_url.to_string())])
    }
}

/// Reverse URL generation for identities
///
/// Maps each pid type to the item route of its default endpoint.
#[derive(Debug, Clone, Default)]
pub struct UrlMap {
    item_routes: HashMap<String, String>,
}

impl UrlMap {
    pub fn new(item_routes: HashMap<String, String>) -> Self {
        Self { item_routes }
    }

    /// Item URL of `identity`, if its pid type has a default endpoint
    pub fn url_for(&self, identity: &Identity) -> Option<String> {
        self.item_routes
            .get(&identity.pid_type)
            .map(|route| route.replace("{pid_value}", &identity.pid_value))
    }
}

/// Links factory bound to the URL map
#[derive(Clone)]
pub struct RecordLinker {
    pub urls: Arc<UrlMap>,
    pub factory: Arc<dyn LinksFactory>,
}

impl RecordLinker {
    pub fn links(&self, identity: &Identity) -> Links {
        match self.urls.url_for(identity) {
            Some(url) => self.factory.record_links(identity, &url),
            None => Links::new(),
        }
    }
}
