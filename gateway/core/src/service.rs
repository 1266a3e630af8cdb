use crate::{error::Error, LabelMatch, LabelValue, ResourceId, ServiceBackend};
use http::HeaderMap;
use std::{collections::BTreeMap, sync::Arc};

/// A Kubernetes `Service` as seen by the backend selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterService {
    pub id: ResourceId,
    pub labels: BTreeMap<String, String>,
}

// === impl ServiceBackend ===

impl ServiceBackend {
    /// Chooses the service that serves a request for a route in `namespace`.
    ///
    /// Candidates must live in the route's namespace, carry the configured name (if any), and
    /// satisfy every label rule. When several services qualify, the first by name is chosen.
    pub fn select<'s>(
        &self,
        namespace: &str,
        services: impl IntoIterator<Item = &'s Arc<ClusterService>>,
        headers: &HeaderMap,
    ) -> Result<Arc<ClusterService>, Error> {
        services
            .into_iter()
            .filter(|svc| svc.id.namespace == namespace)
            .filter(|svc| self.name.as_ref().map_or(true, |name| *name == svc.id.name))
            .filter(|svc| self.labels.iter().all(|rule| rule.matches(&svc.labels, headers)))
            .min_by(|a, b| a.id.name.cmp(&b.id.name))
            .cloned()
            .ok_or_else(|| match &self.name {
                Some(name) => Error::Selection(format!(
                    "no service {namespace}/{name} matches the request"
                )),
                None => Error::Selection(format!(
                    "no service in namespace {namespace} matches the request"
                )),
            })
    }

    /// The in-cluster authority of `svc` on this backend's port.
    pub fn authority(&self, svc: &ClusterService, cluster_domain: &str) -> String {
        format!(
            "{}.{}.svc.{}:{}",
            svc.id.name, svc.id.namespace, cluster_domain, self.port
        )
    }
}

// === impl LabelMatch ===

impl LabelMatch {
    pub fn matches(&self, labels: &BTreeMap<String, String>, headers: &HeaderMap) -> bool {
        let Some(label) = labels.get(&self.label) else {
            return false;
        };
        match &self.value {
            LabelValue::Literal(value) => value == label,
            LabelValue::Header(name) => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |v| v == label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue};
    use std::num::NonZeroU16;

    fn svc(ns: &str, name: &str, labels: &[(&str, &str)]) -> Arc<ClusterService> {
        Arc::new(ClusterService {
            id: ResourceId::new(ns, name),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    fn backend(name: Option<&str>, labels: Vec<LabelMatch>) -> ServiceBackend {
        ServiceBackend {
            name: name.map(str::to_string),
            port: NonZeroU16::new(8080).unwrap(),
            labels,
        }
    }

    #[test]
    fn selects_by_name_within_namespace() {
        let services = vec![
            svc("ns-0", "api", &[]),
            svc("ns-1", "api", &[]),
            svc("ns-0", "web", &[]),
        ];
        let backend = backend(Some("api"), vec![]);
        let selected = backend
            .select("ns-1", &services, &HeaderMap::new())
            .expect("must select");
        assert_eq!(selected.id, ResourceId::new("ns-1", "api"));
        assert_eq!(
            backend.authority(&selected, "cluster.local"),
            "api.ns-1.svc.cluster.local:8080"
        );
        assert!(matches!(
            backend.select("ns-2", &services, &HeaderMap::new()),
            Err(Error::Selection(_))
        ));
    }

    #[test]
    fn selects_by_labels_and_headers() {
        let services = vec![
            svc("ns-0", "b-canary", &[("app", "api"), ("release", "canary")]),
            svc("ns-0", "a-stable", &[("app", "api"), ("release", "stable")]),
            svc("ns-0", "c-stable", &[("app", "api"), ("release", "stable")]),
        ];
        let backend = backend(
            None,
            vec![
                LabelMatch {
                    label: "app".to_string(),
                    value: LabelValue::Literal("api".to_string()),
                },
                LabelMatch {
                    label: "release".to_string(),
                    value: LabelValue::Header(HeaderName::from_static("x-release")),
                },
            ],
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-release", HeaderValue::from_static("canary"));
        let selected = backend.select("ns-0", &services, &headers).unwrap();
        assert_eq!(selected.id.name, "b-canary");

        headers.insert("x-release", HeaderValue::from_static("stable"));
        let selected = backend.select("ns-0", &services, &headers).unwrap();
        assert_eq!(selected.id.name, "a-stable", "ties go to the first name");

        assert!(backend.select("ns-0", &services, &HeaderMap::new()).is_err());
    }
}
