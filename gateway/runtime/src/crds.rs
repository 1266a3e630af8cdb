//! Registers the gateway's custom resources and waits for the API server to serve them.

use crate::k8s::{Api, CustomResourceDefinition, PostParams, ResourceExt};
use anyhow::Result;
use kanali_gateway_core::{backoff::RetryError, Backoff};
use std::future::Future;
use tracing::{debug, info};

#[async_trait::async_trait]
pub trait CrdClient: Send + Sync {
    /// Creates `crd`. Returns false if a definition with the same name already exists.
    async fn create(&self, crd: &CustomResourceDefinition) -> Result<bool>;

    async fn get(&self, name: &str) -> Result<CustomResourceDefinition>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("failed to create {name}: {error:#}")]
    Create { name: String, error: anyhow::Error },

    #[error("failed to fetch {name}: {error:#}")]
    Fetch { name: String, error: anyhow::Error },

    #[error("{name} conflicts with an existing resource name: {message}")]
    NamingConflict { name: String, message: String },

    #[error("{name} was not established after {attempts} attempts")]
    Timeout { name: String, attempts: u32 },

    #[error("shut down while waiting for {name}")]
    Shutdown { name: String },
}

enum Condition {
    Established,
    NamingConflict(String),
    Pending,
}

// === impl CrdClient ===

#[async_trait::async_trait]
impl CrdClient for Api<CustomResourceDefinition> {
    async fn create(&self, crd: &CustomResourceDefinition) -> Result<bool> {
        match Api::create(self, &PostParams::default(), crd).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(rsp)) if rsp.code == 409 => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn get(&self, name: &str) -> Result<CustomResourceDefinition> {
        Ok(Api::get(self, name).await?)
    }
}

/// Creates each definition that does not yet exist, then waits for all of them to be
/// established.
pub async fn register<C>(
    client: &C,
    crds: &[CustomResourceDefinition],
    backoff: &Backoff,
    shutdown: drain::Watch,
) -> Result<(), ReadinessError>
where
    C: CrdClient + ?Sized,
{
    for crd in crds {
        let name = crd.name_any();
        match client.create(crd).await {
            Ok(true) => info!(%name, "Created CustomResourceDefinition"),
            Ok(false) => debug!(%name, "CustomResourceDefinition already exists"),
            Err(error) => return Err(ReadinessError::Create { name, error }),
        }
    }

    for crd in crds {
        let name = crd.name_any();
        let shutdown = shutdown.clone().signaled();
        ensure_established(client, &name, backoff, shutdown).await?;
        info!(%name, "CustomResourceDefinition is established");
    }
    Ok(())
}

/// Polls the named definition until the API server reports it as established.
///
/// A definition whose names were rejected fails immediately. Polling stops early if `shutdown`
/// completes.
pub async fn ensure_established<C, S>(
    client: &C,
    name: &str,
    backoff: &Backoff,
    shutdown: S,
) -> Result<(), ReadinessError>
where
    C: CrdClient + ?Sized,
    S: Future,
{
    let established = backoff.retry(|attempt| async move {
        let crd = client
            .get(name)
            .await
            .map_err(|error| ReadinessError::Fetch {
                name: name.to_string(),
                error,
            })?;
        match condition(&crd) {
            Condition::Established => Ok(Some(())),
            Condition::NamingConflict(message) => Err(ReadinessError::NamingConflict {
                name: name.to_string(),
                message,
            }),
            Condition::Pending => {
                debug!(%name, attempt, "Waiting for CustomResourceDefinition");
                Ok(None)
            }
        }
    });

    tokio::select! {
        res = established => res.map_err(|error| match error {
            RetryError::Exhausted { attempts } => ReadinessError::Timeout {
                name: name.to_string(),
                attempts,
            },
            RetryError::Aborted(error) => error,
        }),
        _ = shutdown => Err(ReadinessError::Shutdown {
            name: name.to_string(),
        }),
    }
}

fn condition(crd: &CustomResourceDefinition) -> Condition {
    let conditions = crd
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_deref())
        .unwrap_or_default();

    let names_rejected = conditions
        .iter()
        .find(|c| c.type_ == "NamesAccepted" && c.status == "False");
    if let Some(c) = names_rejected {
        let message = c
            .message
            .clone()
            .or_else(|| c.reason.clone())
            .unwrap_or_default();
        return Condition::NamingConflict(message);
    }

    if conditions
        .iter()
        .any(|c| c.type_ == "Established" && c.status == "True")
    {
        return Condition::Established;
    }
    Condition::Pending
}
