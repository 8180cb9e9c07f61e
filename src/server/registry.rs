//! Endpoint registry: route bookkeeping and the default prefix map

use axum::Router;
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::core::error::ConfigError;
use crate::core::links::UrlMap;
use crate::server::endpoint::{EndpointConfig, route_shape};
use crate::server::router::HEALTH_ROUTES;

/// Registry for all REST endpoints of the application
///
/// Rejects duplicate prefixes and routes that overlap across endpoints
/// once parameter names are ignored. The health check paths are reserved
/// from the start.
pub struct EndpointRegistry {
    endpoints: IndexMap<String, EndpointConfig>,
    /// Route shape → owning prefix
    routes: HashMap<String, String>,
}

/// Owner recorded for routes the router serves itself
const RESERVED_OWNER: &str = "health";

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        let routes = HEALTH_ROUTES
            .iter()
            .map(|path| (route_shape(path), RESERVED_OWNER.to_string()))
            .collect();
        Self {
            endpoints: IndexMap::new(),
            routes,
        }
    }

    /// Register a resolved endpoint
    pub fn register(&mut self, endpoint: EndpointConfig) -> Result<(), ConfigError> {
        if self.endpoints.contains_key(&endpoint.prefix) {
            return Err(ConfigError::DuplicateEndpoint {
                prefix: endpoint.prefix.clone(),
            });
        }

        let routes = endpoint.routes();
        for route in &routes {
            if let Some(first) = self.routes.get(&route_shape(route)) {
                return Err(ConfigError::RouteCollision {
                    route: route.clone(),
                    first: first.clone(),
                    second: endpoint.prefix.clone(),
                });
            }
        }
        for route in &routes {
            self.routes.insert(route_shape(route), endpoint.prefix.clone());
        }

        tracing::info!(
            prefix = %endpoint.prefix,
            pid_type = %endpoint.pid_type,
            list_route = %endpoint.list_route,
            item_route = %endpoint.item_route,
            "Registered endpoint"
        );
        self.endpoints.insert(endpoint.prefix.clone(), endpoint);
        Ok(())
    }

    pub fn get(&self, prefix: &str) -> Option<&EndpointConfig> {
        self.endpoints.get(prefix)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.endpoints.values()
    }

    /// Registered prefixes in registration order
    pub fn prefixes(&self) -> Vec<&str> {
        self.endpoints.keys().map(|s| s.as_str()).collect()
    }

    /// The endpoint that generates URLs for each pid type
    ///
    /// An endpoint explicitly marked `default_endpoint_prefix` wins; two
    /// marked endpoints for one pid type are an error. Otherwise the
    /// endpoint whose prefix equals the pid type, else the first registered.
    pub fn default_prefixes(&self) -> Result<HashMap<String, String>, ConfigError> {
        let mut explicit: HashMap<&str, &str> = HashMap::new();
        for endpoint in self.endpoints.values() {
            if !endpoint.default_endpoint_prefix {
                continue;
            }
            if let Some(first) = explicit.insert(&endpoint.pid_type, &endpoint.prefix) {
                return Err(ConfigError::AmbiguousDefault {
                    pid_type: endpoint.pid_type.clone(),
                    first: first.to_string(),
                    second: endpoint.prefix.clone(),
                });
            }
        }

        let mut defaults = HashMap::new();
        for endpoint in self.endpoints.values() {
            let pid_type = endpoint.pid_type.as_str();
            let chosen = match explicit.get(pid_type) {
                Some(prefix) => prefix.to_string(),
                None => self
                    .endpoints
                    .values()
                    .find(|e| e.pid_type == pid_type && e.prefix == pid_type)
                    .or_else(|| self.endpoints.values().find(|e| e.pid_type == pid_type))
                    .map(|e| e.prefix.clone())
                    .unwrap_or_else(|| endpoint.prefix.clone()),
            };
            defaults.entry(pid_type.to_string()).or_insert(chosen);
        }
        Ok(defaults)
    }

    /// Reverse URL map built from the default prefixes
    pub fn url_map(&self) -> Result<UrlMap, ConfigError> {
        let item_routes = self
            .default_prefixes()?
            .into_iter()
            .filter_map(|(pid_type, prefix)| {
                self.endpoints
                    .get(&prefix)
                    .map(|e| (pid_type, e.item_route.clone()))
            })
            .collect();
        Ok(UrlMap::new(item_routes))
    }

    /// Build a router with all registered endpoint routes
    pub fn build_routes(&self, endpoint_router: impl Fn(&EndpointConfig) -> Router) -> Router {
        self.endpoints
            .values()
            .fold(Router::new(), |router, endpoint| {
                router.merge(endpoint_router(endpoint))
            })
    }
}
