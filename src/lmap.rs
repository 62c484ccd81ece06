use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A `HashMap` behind a reader/writer lock.
///
/// Every method takes the lock for the duration of a single call, so each one
/// is atomic with respect to the others. Compound check-then-act sequences go
/// through [`LMap::update`], which hands the closure the whole map under the
/// exclusive lock.
pub struct LMap<K, V> {
    store: RwLock<HashMap<K, V>>,
}

impl<K, V> LMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.store.read().get(key).cloned()
    }

    /// Unconditional upsert; returns the value that was replaced, if any.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.store.write().insert(key, value)
    }

    /// Removes `key` and returns whatever was stored under it.
    pub fn delete_get(&self, key: &K) -> Option<V> {
        self.store.write().remove(key)
    }

    /// Runs `f` with exclusive access to the underlying map.
    pub fn update<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut store = self.store.write();
        f(&mut store)
    }

    /// Compare-and-delete: removes `key` only if `pred` accepts the value
    /// currently stored for it. The lookup, the check and the removal happen
    /// under one exclusive acquisition, so no concurrent `set` can slip in
    /// between them.
    pub fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        self.update(|m| match m.get(key) {
            Some(current) if pred(current) => m.remove(key),
            _ => None,
        })
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.store.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.store.read().keys().cloned().collect()
    }
}

impl<K, V> LMap<K, V> {
    /// Empties the map, handing back everything it held.
    pub fn drain(&self) -> Vec<(K, V)> {
        self.store.write().drain().collect()
    }
}

impl<K, V> Default for LMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for LMap<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read();
        f.debug_struct("LMap")
            .field("len", &store.len())
            .field("keys", &store.keys().collect::<Vec<_>>())
            .finish()
    }
}
