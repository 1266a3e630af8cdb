//! Applies watch notifications to stores.
//!
//! Each notification is decoded into its domain type before it touches a store. Resources that
//! fail to decode are logged and dropped, leaving the store unchanged, so a single malformed
//! object never takes down the gateway.

use crate::store::{Keyed, Store};
use kanali_gateway_core::ResourceId;
use kube::ResourceExt;
use tracing::{debug, error, warn};

/// Decodes a watched resource into the value held by a store.
pub trait FromResource<R>: Keyed + Sized {
    fn from_resource(resource: R) -> anyhow::Result<Self>;

    /// Carries state that the gateway maintains locally over from the value being replaced.
    fn retain_from(&mut self, _previous: &Self) {}
}

impl<T: Keyed> Store<T> {
    fn apply_decoded<R>(&mut self, mut value: T)
    where
        T: FromResource<R>,
    {
        match self.get(&value.key()) {
            Some(previous) => {
                value.retain_from(&previous);
                self.update(&previous, value);
            }
            None => self.set(value),
        }
    }
}

impl<R, T> kubert::index::IndexNamespacedResource<R> for Store<T>
where
    R: ResourceExt<DynamicType = ()>,
    T: FromResource<R> + Keyed<Key = ResourceId>,
{
    fn apply(&mut self, resource: R) {
        let kind = R::kind(&());
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_unchecked();

        let value = match T::from_resource(resource) {
            Ok(value) => value,
            Err(error) => {
                error!(%namespace, %name, %kind, error = %format_args!("{error:#}"), "Dropping invalid resource");
                return;
            }
        };
        self.apply_decoded::<R>(value);
        debug!(%namespace, %name, %kind, "Applied");
    }

    fn delete(&mut self, namespace: String, name: String) {
        let kind = R::kind(&());
        match Store::delete(self, &ResourceId::new(&namespace, &name)) {
            Ok(_) => debug!(%namespace, %name, %kind, "Deleted"),
            Err(error) => warn!(%namespace, %name, %kind, %error, "Ignoring delete"),
        }
    }
}

impl<R, T> kubert::index::IndexClusterResource<R> for Store<T>
where
    R: ResourceExt<DynamicType = ()>,
    T: FromResource<R> + Keyed<Key = String>,
{
    fn apply(&mut self, resource: R) {
        let kind = R::kind(&());
        let name = resource.name_unchecked();

        let value = match T::from_resource(resource) {
            Ok(value) => value,
            Err(error) => {
                error!(%name, %kind, error = %format_args!("{error:#}"), "Dropping invalid resource");
                return;
            }
        };
        self.apply_decoded::<R>(value);
        debug!(%name, %kind, "Applied");
    }

    fn delete(&mut self, name: String) {
        let kind = R::kind(&());
        match Store::delete(self, &name) {
            Ok(_) => debug!(%name, %kind, "Deleted"),
            Err(error) => warn!(%name, %kind, %error, "Ignoring delete"),
        }
    }
}
