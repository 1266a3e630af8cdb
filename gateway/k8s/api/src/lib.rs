#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod api_key;
pub mod api_key_binding;
pub mod api_proxy;
pub mod mock_target;

pub use self::{
    api_key::{ApiKey, ApiKeySpec},
    api_key_binding::{ApiKeyBinding, ApiKeyBindingSpec},
    api_proxy::{ApiProxy, ApiProxySpec},
    mock_target::{MockTarget, MockTargetSpec},
};
pub use k8s_openapi::{
    api::core::v1::Service,
    apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinition, CustomResourceDefinitionCondition,
    },
};
pub use kube::{
    api::{Api, ObjectMeta, PostParams, ResourceExt},
    Client, CustomResourceExt, Error, Resource,
};

/// The API group that all gateway resources belong to.
pub const GROUP: &str = "kanali.io";

/// Returns the definitions of every custom resource the gateway watches.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        ApiProxy::crd(),
        ApiKey::crd(),
        ApiKeyBinding::crd(),
        MockTarget::crd(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crds_are_named_by_plural_and_group() {
        let names = crds()
            .into_iter()
            .map(|crd| crd.name_any())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "apiproxies.kanali.io",
                "apikeys.kanali.io",
                "apikeybindings.kanali.io",
                "mocktargets.kanali.io",
            ]
        );
    }

    #[test]
    fn api_keys_are_cluster_scoped() {
        assert_eq!(ApiKey::crd().spec.scope, "Cluster");
        assert_eq!(ApiProxy::crd().spec.scope, "Namespaced");
    }
}
