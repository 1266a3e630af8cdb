use ahash::AHashMap as HashMap;
use kanali_gateway_core::{ApiKey, ResourceId};
use parking_lot::RwLock;
use std::{fmt, hash::Hash, sync::Arc};

/// A cache of decoded resources of a single kind.
///
/// Values are held behind `Arc`s: readers clone a snapshot and release the lock immediately, and
/// writers replace entries wholesale so that a reader never observes a partially applied update.
#[derive(Debug)]
pub struct Store<T: Keyed> {
    items: HashMap<T::Key, Arc<T>>,
}

pub type SharedStore<T> = Arc<RwLock<Store<T>>>;

/// Derives a store key from a value's identity.
pub trait Keyed {
    type Key: Clone + fmt::Debug + fmt::Display + Eq + Hash;

    fn key(&self) -> Self::Key;
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
}

// === impl Store ===

impl<T: Keyed> Default for Store<T> {
    fn default() -> Self {
        Self {
            items: HashMap::default(),
        }
    }
}

impl<T: Keyed> Store<T> {
    pub fn shared() -> SharedStore<T> {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn get(&self, key: &T::Key) -> Option<Arc<T>> {
        self.items.get(key).cloned()
    }

    /// Returns a snapshot of every value in the store, in no particular order.
    pub fn list(&self) -> Vec<Arc<T>> {
        self.items.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.values()
    }

    /// Inserts `value`, replacing any value with the same key.
    pub fn set(&mut self, value: T) {
        self.items.insert(value.key(), Arc::new(value));
    }

    /// Replaces `old` with `new`. If the two differ in identity, `old` is removed.
    pub fn update(&mut self, old: &T, new: T) {
        let old_key = old.key();
        let new_key = new.key();
        if old_key != new_key {
            self.items.remove(&old_key);
        }
        self.items.insert(new_key, Arc::new(new));
    }

    pub fn delete(&mut self, key: &T::Key) -> Result<Arc<T>, StoreError> {
        self.items
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Keyed<Key = ResourceId>> Store<T> {
    pub fn len_in(&self, namespace: &str) -> usize {
        self.items
            .keys()
            .filter(|id| id.namespace == namespace)
            .count()
    }

    pub fn iter_in<'s>(&'s self, namespace: &'s str) -> impl Iterator<Item = &'s Arc<T>> + 's {
        self.items
            .iter()
            .filter(move |(id, _)| id.namespace == namespace)
            .map(|(_, value)| value)
    }
}

impl Store<ApiKey> {
    /// Records that the revision of key `name` holding `data` was used at `at`.
    ///
    /// Revisions are identified by their data rather than by position, since the key may have
    /// been updated after `data` was read. The entry is replaced copy-on-write, so readers holding
    /// the previous snapshot are unaffected.
    pub fn touch(
        &mut self,
        name: &str,
        data: &[u8],
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let key = self
            .items
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if !key.revisions.iter().any(|rev| rev.data == data) {
            return Err(StoreError::NotFound(format!("revision of {name}")));
        }
        Arc::make_mut(key).touch(data, at);
        Ok(())
    }
}

// === impl Keyed ===

impl Keyed for ApiKey {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Keyed for kanali_gateway_core::ProxyRoute {
    type Key = ResourceId;

    fn key(&self) -> ResourceId {
        self.id.clone()
    }
}

impl Keyed for kanali_gateway_core::MockTarget {
    type Key = ResourceId;

    fn key(&self) -> ResourceId {
        self.id.clone()
    }
}

impl Keyed for kanali_gateway_core::ApiKeyBinding {
    type Key = ResourceId;

    fn key(&self) -> ResourceId {
        self.id.clone()
    }
}

impl Keyed for kanali_gateway_core::ClusterService {
    type Key = ResourceId;

    fn key(&self) -> ResourceId {
        self.id.clone()
    }
}
