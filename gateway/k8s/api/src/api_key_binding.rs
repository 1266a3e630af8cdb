use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Grants API keys access to the `ApiProxy` resources in the binding's namespace.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kanali.io",
    version = "v2",
    kind = "ApiKeyBinding",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyBindingSpec {
    pub keys: Vec<Key>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub name: String,
    pub rate: Option<Rate>,
    pub default_rule: Option<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subpaths: Vec<Subpath>,
}

/// A request quota. A missing or zero amount means unlimited.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Rate {
    pub amount: Option<u32>,
    pub unit: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Rule {
    #[serde(default)]
    pub global: bool,
    pub granular: Option<Granular>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Granular {
    pub verbs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Subpath {
    pub path: String,
    pub rule: Option<Rule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes() {
        let spec = serde_json::from_value::<ApiKeyBindingSpec>(serde_json::json!({
            "keys": [{
                "name": "key-0",
                "rate": { "amount": 2, "unit": "minute" },
                "defaultRule": { "granular": { "verbs": ["GET"] } },
                "subpaths": [{ "path": "/admin", "rule": { "global": true } }],
            }],
        }))
        .expect("spec must deserialize");

        let key = &spec.keys[0];
        assert_eq!(key.rate.as_ref().and_then(|r| r.amount), Some(2));
        assert!(!key.default_rule.as_ref().expect("default rule").global);
        assert!(key.subpaths[0].rule.as_ref().expect("subpath rule").global);
    }
}
