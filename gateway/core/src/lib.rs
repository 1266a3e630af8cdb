#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Request-time resolution primitives for the Kanali gateway.
//!
//! Everything in this crate is independent of Kubernetes: resources arrive here already decoded
//! into domain types, and all matching is pure. The stores that hold these types are maintained
//! by `kanali-gateway-k8s-index`; the request pipeline that consults them lives in
//! `kanali-gateway-proxy`.

pub mod api_key;
pub mod backoff;
pub mod binding;
pub mod crypto;
mod error;
pub mod mock;
pub mod path;
pub mod ratelimit;
pub mod route;
pub mod service;

pub use self::{
    api_key::{ApiKey, Revision, RevisionStatus},
    backoff::Backoff,
    binding::{ApiKeyBinding, KeyBinding, Rate, RateUnit, Rule, SubpathRule},
    crypto::DecryptionKey,
    error::{AuthnFailure, BoxError, Error},
    mock::{MockRoute, MockTarget},
    ratelimit::{RateKey, RateLimiter},
    route::{Backend, LabelMatch, LabelValue, PluginRef, ProxyRoute, ServiceBackend, Source, Target},
    service::ClusterService,
};
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// Identifies a namespaced resource.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
