use crate::{path, ResourceId};
use http::{HeaderName, Uri};
use std::{cmp::Ordering, collections::BTreeMap, num::NonZeroU16, sync::Arc};

/// A decoded `ApiProxy`: maps an inbound host and path prefix onto a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyRoute {
    pub id: ResourceId,
    pub source: Source,
    pub target: Target,
    pub plugins: Vec<PluginRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    /// Lowercased. `None` matches any host.
    pub virtual_host: Option<String>,

    /// Normalized with [`path::normalize_prefix`]; the root prefix is empty.
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// Normalized prefix that replaces `source.path` on the way upstream.
    pub path: String,
    pub backend: Backend,
}

/// Exactly one way of producing a response for a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    Endpoint(Uri),
    Mock { target: String },
    Service(ServiceBackend),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceBackend {
    pub name: Option<String>,
    pub port: NonZeroU16,
    pub labels: Vec<LabelMatch>,
}

/// Requires a service label to equal a literal value or the value of a request header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMatch {
    pub label: String,
    pub value: LabelValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelValue {
    Literal(String),
    Header(HeaderName),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PluginRef {
    pub name: String,
    pub version: Option<String>,
    pub config: BTreeMap<String, String>,
}

// === impl ProxyRoute ===

impl ProxyRoute {
    /// Returns the length of the matched prefix if this route accepts the given host and path.
    pub fn matches(&self, host: Option<&str>, request_path: &str) -> Option<usize> {
        if let Some(vhost) = self.source.virtual_host.as_deref() {
            match host {
                Some(host) if host.eq_ignore_ascii_case(vhost) => {}
                _ => return None,
            }
        }
        path::strip_prefix(request_path, &self.source.path)?;
        Some(self.source.path.len())
    }

    /// Returns the portion of the request path below this route's source prefix.
    pub fn subpath<'p>(&self, request_path: &'p str) -> &'p str {
        match path::strip_prefix(request_path, &self.source.path) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }

    /// Rewrites a request path for the backend by replacing the source prefix with the target
    /// prefix.
    pub fn rewrite(&self, request_path: &str) -> String {
        let rest = path::strip_prefix(request_path, &self.source.path).unwrap_or(request_path);
        path::join(&self.target.path, rest)
    }

    /// Orders equally-specific routes: a route bound to a virtual host wins over a wildcard route,
    /// then routes are ordered by namespace and name.
    fn precedence(&self, other: &Self) -> Ordering {
        let wildcard = |r: &Self| r.source.virtual_host.is_none();
        wildcard(self)
            .cmp(&wildcard(other))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Selects the most specific route for a request.
///
/// The longest matching path prefix wins. Routes with equal prefixes are ordered by
/// `ProxyRoute::precedence`, so the outcome never depends on iteration order.
pub fn resolve<'r>(
    routes: impl IntoIterator<Item = &'r Arc<ProxyRoute>>,
    host: Option<&str>,
    request_path: &str,
) -> Option<Arc<ProxyRoute>> {
    let mut best: Option<(usize, &'r Arc<ProxyRoute>)> = None;
    for route in routes {
        let Some(len) = route.matches(host, request_path) else {
            continue;
        };
        best = match best {
            Some((best_len, current))
                if best_len > len
                    || (best_len == len && current.precedence(route) != Ordering::Greater) =>
            {
                Some((best_len, current))
            }
            _ => Some((len, route)),
        };
    }
    best.map(|(_, route)| route.clone())
}
