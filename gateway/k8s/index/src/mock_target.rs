use crate::sync::FromResource;
use anyhow::{Context, Result};
use base64::Engine;
use bytes::Bytes;
use kanali_gateway_core::{HeaderName, HeaderValue, MockRoute, MockTarget, ResourceId, StatusCode};
use kanali_gateway_k8s_api::{mock_target as api, MockTargetSpec, ResourceExt};

impl FromResource<kanali_gateway_k8s_api::MockTarget> for MockTarget {
    fn from_resource(mock: kanali_gateway_k8s_api::MockTarget) -> Result<Self> {
        let namespace = mock.namespace().unwrap_or_default();
        decode(&namespace, &mock.name_unchecked(), mock.spec)
    }
}

pub fn decode(namespace: &str, name: &str, spec: MockTargetSpec) -> Result<MockTarget> {
    let routes = spec
        .routes
        .into_iter()
        .enumerate()
        .map(|(i, route)| mock_route(route).with_context(|| format!("invalid route {i}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(MockTarget {
        id: ResourceId::new(namespace, name),
        routes,
    })
}

fn mock_route(route: api::Route) -> Result<MockRoute> {
    let status = StatusCode::from_u16(route.status)
        .with_context(|| format!("invalid status code: {}", route.status))?;

    let methods = route
        .methods
        .iter()
        .map(|m| crate::method(m))
        .collect::<Result<Vec<_>>>()?;

    let headers = route
        .headers
        .iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name: {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            Ok((name, value))
        })
        .collect::<Result<Vec<_>>>()?;

    let body = match route.body {
        Some(body) => Bytes::from(
            base64::engine::general_purpose::STANDARD
                .decode(body.as_bytes())
                .context("body must be base64-encoded")?,
        ),
        None => Bytes::new(),
    };

    Ok(MockRoute {
        path: route.path,
        methods,
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanali_gateway_core::Method;

    fn spec(value: serde_json::Value) -> MockTargetSpec {
        serde_json::from_value(value).expect("spec must deserialize")
    }

    #[test]
    fn decodes_routes() {
        let mock = decode(
            "ns-0",
            "mock-0",
            spec(serde_json::json!({
                "routes": [{
                    "path": "/ping",
                    "methods": ["get"],
                    "status": 200,
                    "headers": { "Content-Type": "text/plain" },
                    "body": "cG9uZw==",
                }],
            })),
        )
        .expect("must decode");

        let route = &mock.routes[0];
        assert_eq!(route.methods, [Method::GET]);
        assert_eq!(route.status, StatusCode::OK);
        assert_eq!(route.headers[0].0, HeaderName::from_static("content-type"));
        assert_eq!(route.body, Bytes::from_static(b"pong"));
    }

    #[test]
    fn rejects_invalid_routes() {
        for route in [
            serde_json::json!({ "path": "/", "status": 1000 }),
            serde_json::json!({ "path": "/", "status": 200, "methods": ["GE T"] }),
            serde_json::json!({ "path": "/", "status": 200, "body": "not base64!" }),
            serde_json::json!({ "path": "/", "status": 200, "headers": { "bad header": "x" } }),
        ] {
            let res = decode("ns-0", "mock-0", spec(serde_json::json!({ "routes": [route] })));
            assert!(res.is_err(), "{route}");
        }
    }
}
