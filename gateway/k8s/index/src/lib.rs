#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Kanali gateway resource index
//!
//! The gateway serves requests from in-memory copies of the cluster resources that describe it:
//!
//! - Each `ApiProxy` becomes a [`ProxyRoute`], matched against inbound requests by host and path.
//! - Each `MockTarget` holds canned responses for proxies that use a mock backend.
//! - Each cluster-scoped `ApiKey` holds sealed secrets; the gateway records their usage locally.
//! - Each `ApiKeyBinding` grants keys access to the proxies in its namespace.
//! - Each `Service` is tracked by name and labels for proxies that use a service backend.
//!
//! Every kind is held in its own [`Store`]. Watches deliver notifications to the stores through
//! `kubert`'s index traits; see [`sync`].

pub mod api_key;
pub mod api_key_binding;
pub mod api_proxy;
mod metrics;
pub mod mock_target;
mod service;
mod store;
pub mod sync;

#[cfg(test)]
mod tests;

pub use self::{
    metrics::{IndexMetrics, Instrumented},
    store::{Keyed, SharedStore, Store, StoreError},
    sync::FromResource,
};
use anyhow::{Context, Result};
use kanali_gateway_core::{
    ApiKey, ApiKeyBinding, ClusterService, Method, MockTarget, ProxyRoute,
};

/// Handles to every store the gateway reads from.
#[derive(Clone, Debug)]
pub struct Stores {
    pub routes: SharedStore<ProxyRoute>,
    pub mocks: SharedStore<MockTarget>,
    pub api_keys: SharedStore<ApiKey>,
    pub bindings: SharedStore<ApiKeyBinding>,
    pub services: SharedStore<ClusterService>,
}

// === impl Stores ===

impl Default for Stores {
    fn default() -> Self {
        Self {
            routes: Store::shared(),
            mocks: Store::shared(),
            api_keys: Store::shared(),
            bindings: Store::shared(),
            services: Store::shared(),
        }
    }
}

/// Parses an HTTP verb as declared in a resource. Verbs are case-insensitive.
fn method(verb: &str) -> Result<Method> {
    Method::from_bytes(verb.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {verb}"))
}
