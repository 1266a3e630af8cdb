use crate::{
    index,
    k8s::{
        ApiKey, ApiKeyBinding, ApiKeyBindingSpec, ApiKeySpec, ApiProxy, ApiProxySpec, MockTarget,
        MockTargetSpec, Resource, ResourceExt,
    },
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{body::Incoming, http, Request, Response};
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    DynamicObject,
};
use serde::de::DeserializeOwned;
use std::task::{Context, Poll};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Rejects gateway resources that the index would be unable to decode.
#[derive(Clone, Debug, Default)]
pub struct Admission(());

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

/// A watched resource whose spec must decode into an index entry.
trait Checked: Resource<DynamicType = ()> {
    type Spec: DeserializeOwned;

    fn check(namespace: &str, name: &str, spec: Self::Spec) -> Result<()>;
}

// === impl Admission ===

impl tower::Service<Request<Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            let rsp = Response::builder()
                .status(http::StatusCode::NOT_FOUND)
                .body(Body::default())
                .expect("not found response must be valid");
            return Box::pin(future::ok(rsp));
        }

        Box::pin(async move {
            let body = req.into_body().collect().await?.to_bytes();
            let bytes = serde_json::to_vec(&review(&body))?;
            Ok(Response::builder()
                .status(http::StatusCode::OK)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
                .expect("admission review response must be valid"))
        })
    }
}

/// Answers a serialized admission review.
fn review(body: &[u8]) -> Review {
    let review = match serde_json::from_slice::<Review>(body) {
        Ok(review) => review,
        Err(error) => {
            warn!(%error, "Failed to parse admission review");
            return AdmissionResponse::invalid(error).into_review();
        }
    };

    let req: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    let rsp = match req {
        Ok(req) => {
            debug!(uid = %req.uid, kind = %req.kind.kind, "Reviewing");
            admit(req)
        }
        Err(error) => {
            warn!(%error, "Admission review carries no request");
            AdmissionResponse::invalid(error)
        }
    };
    debug!(allowed = rsp.allowed, "Reviewed");
    rsp.into_review()
}

fn admit(req: AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    if is_kind::<ApiProxy>(&req) {
        admit_spec::<ApiProxy>(req)
    } else if is_kind::<MockTarget>(&req) {
        admit_spec::<MockTarget>(req)
    } else if is_kind::<ApiKey>(&req) {
        admit_spec::<ApiKey>(req)
    } else if is_kind::<ApiKeyBinding>(&req) {
        admit_spec::<ApiKeyBinding>(req)
    } else {
        AdmissionResponse::invalid(format_args!(
            "unsupported resource type: {}.{}.{}",
            req.kind.group, req.kind.version, req.kind.kind
        ))
    }
}

fn admit_spec<T: Checked>(req: AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let rsp = AdmissionResponse::from(&req);
    let kind = T::kind(&());

    let result = parse_spec::<T::Spec>(req).and_then(|(obj, spec)| {
        let namespace = obj.namespace().unwrap_or_default();
        T::check(&namespace, &obj.name_any(), spec)
    });
    match result {
        Ok(()) => rsp,
        Err(error) => {
            info!(error = %format_args!("{error:#}"), %kind, "Denied");
            rsp.deny(format!("{error:#}"))
        }
    }
}

fn is_kind<T: Resource<DynamicType = ()>>(req: &AdmissionRequest<DynamicObject>) -> bool {
    req.kind.group.eq_ignore_ascii_case(&T::group(&()))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&()))
}

fn parse_spec<T: DeserializeOwned>(
    req: AdmissionRequest<DynamicObject>,
) -> Result<(DynamicObject, T)> {
    let obj = req
        .object
        .ok_or_else(|| anyhow!("admission request has no object"))?;
    let spec = obj
        .data
        .get("spec")
        .cloned()
        .ok_or_else(|| anyhow!("{} has no spec", obj.name_any()))?;
    let spec = serde_json::from_value(spec)?;
    Ok((obj, spec))
}

impl Checked for ApiProxy {
    type Spec = ApiProxySpec;

    fn check(namespace: &str, name: &str, spec: ApiProxySpec) -> Result<()> {
        index::api_proxy::decode(namespace, name, spec)?;
        Ok(())
    }
}

impl Checked for MockTarget {
    type Spec = MockTargetSpec;

    fn check(namespace: &str, name: &str, spec: MockTargetSpec) -> Result<()> {
        index::mock_target::decode(namespace, name, spec)?;
        Ok(())
    }
}

impl Checked for ApiKey {
    type Spec = ApiKeySpec;

    // Keys are cluster-scoped.
    fn check(_: &str, name: &str, spec: ApiKeySpec) -> Result<()> {
        index::api_key::decode(name, spec)?;
        Ok(())
    }
}

impl Checked for ApiKeyBinding {
    type Spec = ApiKeyBindingSpec;

    fn check(namespace: &str, name: &str, spec: ApiKeyBindingSpec) -> Result<()> {
        index::api_key_binding::decode(namespace, name, spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit_json(kind: &str, resource: &str, spec: serde_json::Value) -> AdmissionResponse {
        let review = serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "00000000-0000-0000-0000-000000000000",
                "kind": { "group": "kanali.io", "version": "v2", "kind": kind },
                "resource": { "group": "kanali.io", "version": "v2", "resource": resource },
                "operation": "CREATE",
                "userInfo": {},
                "name": "res-0",
                "namespace": "ns-0",
                "dryRun": false,
                "object": {
                    "apiVersion": "kanali.io/v2",
                    "kind": kind,
                    "metadata": { "name": "res-0", "namespace": "ns-0" },
                    "spec": spec,
                },
            },
        });
        let body = serde_json::to_vec(&review).unwrap();
        super::review(&body).response.expect("reviews must be answered")
    }

    #[test]
    fn accepts_valid_proxies() {
        let rsp = admit_json(
            "ApiProxy",
            "apiproxies",
            serde_json::json!({
                "source": { "path": "/api" },
                "target": { "backend": { "endpoint": "https://upstream.example.com" } },
            }),
        );
        assert!(rsp.allowed);
    }

    #[test]
    fn rejects_ambiguous_backends() {
        let rsp = admit_json(
            "ApiProxy",
            "apiproxies",
            serde_json::json!({
                "source": { "path": "/api" },
                "target": {
                    "backend": {
                        "endpoint": "http://upstream.example.com",
                        "mock": { "mockTargetName": "mock-0" },
                    },
                },
            }),
        );
        assert!(!rsp.allowed);

        let rsp = admit_json(
            "ApiProxy",
            "apiproxies",
            serde_json::json!({
                "source": { "path": "/api" },
                "target": { "backend": {} },
            }),
        );
        assert!(!rsp.allowed);
    }

    #[test]
    fn rejects_empty_source_paths() {
        let rsp = admit_json(
            "ApiProxy",
            "apiproxies",
            serde_json::json!({
                "source": { "path": "" },
                "target": { "backend": { "endpoint": "http://upstream.example.com" } },
            }),
        );
        assert!(!rsp.allowed);
    }

    #[test]
    fn rejects_unknown_rate_units() {
        let rsp = admit_json(
            "ApiKeyBinding",
            "apikeybindings",
            serde_json::json!({
                "keys": [{
                    "name": "key-0",
                    "rate": { "amount": 2, "unit": "fortnight" },
                }],
            }),
        );
        assert!(!rsp.allowed);

        let rsp = admit_json(
            "ApiKeyBinding",
            "apikeybindings",
            serde_json::json!({
                "keys": [{
                    "name": "key-0",
                    "rate": { "amount": 2, "unit": "minute" },
                    "defaultRule": { "granular": { "verbs": ["GET"] } },
                }],
            }),
        );
        assert!(rsp.allowed);
    }

    #[test]
    fn rejects_malformed_revisions() {
        let rsp = admit_json(
            "ApiKey",
            "apikeys",
            serde_json::json!({
                "revisions": [{ "data": "not hex", "status": "Active" }],
            }),
        );
        assert!(!rsp.allowed);
    }

    #[test]
    fn rejects_invalid_mock_statuses() {
        let rsp = admit_json(
            "MockTarget",
            "mocktargets",
            serde_json::json!({
                "routes": [{ "path": "/ping", "status": 42, "methods": ["GET"] }],
            }),
        );
        assert!(!rsp.allowed);
    }

    #[test]
    fn rejects_unsupported_kinds() {
        let rsp = admit_json("Gadget", "gadgets", serde_json::json!({}));
        assert!(!rsp.allowed);
    }

    #[test]
    fn malformed_reviews_are_answered() {
        let rsp = review(b"{").response.expect("reviews must be answered");
        assert!(!rsp.allowed);
    }
}
