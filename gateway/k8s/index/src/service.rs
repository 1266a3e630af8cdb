use crate::sync::FromResource;
use anyhow::Result;
use kanali_gateway_core::{ClusterService, ResourceId};
use kanali_gateway_k8s_api::{ResourceExt, Service};

impl FromResource<Service> for ClusterService {
    fn from_resource(svc: Service) -> Result<Self> {
        let namespace = svc.namespace().unwrap_or_default();
        Ok(ClusterService {
            id: ResourceId::new(namespace, svc.name_unchecked()),
            labels: svc.metadata.labels.unwrap_or_default(),
        })
    }
}
