use crate::sync::FromResource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kanali_gateway_core::{ApiKey, Revision, RevisionStatus};
use kanali_gateway_k8s_api::{api_key as api, ApiKeySpec, ResourceExt};

impl FromResource<kanali_gateway_k8s_api::ApiKey> for ApiKey {
    fn from_resource(key: kanali_gateway_k8s_api::ApiKey) -> Result<Self> {
        decode(&key.name_unchecked(), key.spec)
    }

    /// The gateway records key usage locally; a cluster update must not roll it back.
    fn retain_from(&mut self, previous: &Self) {
        self.retain_usage(previous);
    }
}

pub fn decode(name: &str, spec: ApiKeySpec) -> Result<ApiKey> {
    let revisions = spec
        .revisions
        .into_iter()
        .enumerate()
        .map(|(i, rev)| revision(rev).with_context(|| format!("invalid revision {i}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(ApiKey {
        name: name.to_string(),
        revisions,
    })
}

fn revision(rev: api::Revision) -> Result<Revision> {
    let data = hex::decode(rev.data.trim()).context("data must be hex-encoded")?;
    let status = match rev.status {
        api::RevisionStatus::Active => RevisionStatus::Active,
        api::RevisionStatus::Inactive => RevisionStatus::Inactive,
    };
    let last_used = match rev.last_used.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(ts) => Some(
            DateTime::parse_from_rfc3339(ts)
                .with_context(|| format!("invalid lastUsed timestamp: {ts}"))?
                .with_timezone(&Utc),
        ),
    };
    Ok(Revision {
        data,
        status,
        last_used,
    })
}
