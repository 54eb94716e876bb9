//! Keyed persistence for hand-off entities
//!
//! Roles exchange universe points, bucket views and digests through a keyed
//! store. Writes are atomic per entity; there is no cross-entity transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Get/put store keyed by an entity's natural id
pub trait KeyedStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    /// All keys in ascending order
    fn keys(&self) -> Vec<K>;

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> KeyedStore<K, V> for Arc<S>
where
    S: KeyedStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn put(&self, key: K, value: V) {
        (**self).put(key, value)
    }

    fn keys(&self) -> Vec<K> {
        (**self).keys()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// In-memory ordered store
#[derive(Debug)]
pub struct MemoryStore<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
}

impl<K: Ord, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryStore<K, V>
where
    K: Ord,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl<K, V> KeyedStore<K, V> for MemoryStore<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    fn keys(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
