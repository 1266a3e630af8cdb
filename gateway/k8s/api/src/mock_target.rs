use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canned responses that an `ApiProxy` in the same namespace may serve instead of forwarding.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kanali.io",
    version = "v2",
    kind = "MockTarget",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MockTargetSpec {
    pub routes: Vec<Route>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Base64-encoded response body.
    pub body: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes() {
        let spec = serde_json::from_value::<MockTargetSpec>(serde_json::json!({
            "routes": [
                { "path": "/ping", "methods": ["GET"], "status": 200, "body": "cG9uZw==" },
                { "path": "/health", "status": 204 },
            ],
        }))
        .expect("spec must deserialize");
        assert_eq!(spec.routes.len(), 2);
        assert_eq!(spec.routes[0].methods, ["GET"]);
        assert!(spec.routes[1].methods.is_empty());
        assert_eq!(spec.routes[1].body, None);
    }
}
