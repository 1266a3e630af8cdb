use crate::store::{Keyed, SharedStore};
use kube::ResourceExt;
use kubert::index::{IndexClusterResource, IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

/// A store that records index metrics as it is updated.
#[derive(Debug)]
pub struct Instrumented<T: Keyed> {
    inner: SharedStore<T>,
    metrics: IndexMetrics,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            index_size,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub fn instrument<T: Keyed>(&self, store: SharedStore<T>) -> Arc<RwLock<Instrumented<T>>> {
        Arc::new(RwLock::new(Instrumented {
            inner: store,
            metrics: self.clone(),
        }))
    }

    fn labels<R: ResourceExt<DynamicType = ()>>() -> IndexLabels {
        IndexLabels {
            kind: R::kind(&()).to_string(),
        }
    }
}

// === impl Instrumented ===

impl<T: Keyed> Instrumented<T> {
    fn record_size(&self, labels: &IndexLabels) {
        let size = self.inner.read().len();
        self.metrics
            .index_size
            .get_or_create(labels)
            .set(size as i64);
    }
}

impl<R, T> IndexNamespacedResource<R> for Instrumented<T>
where
    T: Keyed,
    crate::Store<T>: IndexNamespacedResource<R>,
    R: ResourceExt<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_applies.get_or_create(&labels).inc();
        IndexNamespacedResource::apply(&mut *self.inner.write(), resource);
        self.record_size(&labels);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_deletes.get_or_create(&labels).inc();
        IndexNamespacedResource::<R>::delete(&mut *self.inner.write(), namespace, name);
        self.record_size(&labels);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_resets.get_or_create(&labels).inc();
        IndexNamespacedResource::reset(&mut *self.inner.write(), resources, removed);
        self.record_size(&labels);
    }
}

impl<R, T> IndexClusterResource<R> for Instrumented<T>
where
    T: Keyed,
    crate::Store<T>: IndexClusterResource<R>,
    R: ResourceExt<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_applies.get_or_create(&labels).inc();
        IndexClusterResource::apply(&mut *self.inner.write(), resource);
        self.record_size(&labels);
    }

    fn delete(&mut self, name: String) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_deletes.get_or_create(&labels).inc();
        IndexClusterResource::<R>::delete(&mut *self.inner.write(), name);
        self.record_size(&labels);
    }
}
