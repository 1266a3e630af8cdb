use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A cluster-wide API key. Each revision holds the hex-encoded sealed secret.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "kanali.io", version = "v2", kind = "ApiKey")]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySpec {
    pub revisions: Vec<Revision>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub data: String,
    pub status: RevisionStatus,

    /// RFC 3339 timestamp. Empty when the revision has never been used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RevisionStatus {
    Active,
    Inactive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes() {
        let spec = serde_json::from_value::<ApiKeySpec>(serde_json::json!({
            "revisions": [
                { "data": "00ff", "status": "Active", "lastUsed": "2018-03-01T10:00:00Z" },
                { "data": "ff00", "status": "Inactive" },
            ],
        }))
        .expect("spec must deserialize");
        assert_eq!(spec.revisions[0].status, RevisionStatus::Active);
        assert_eq!(spec.revisions[1].last_used, None);
    }

    #[test]
    fn rejects_unknown_statuses() {
        assert!(serde_json::from_value::<ApiKeySpec>(serde_json::json!({
            "revisions": [{ "data": "00ff", "status": "Revoked" }],
        }))
        .is_err());
    }
}
