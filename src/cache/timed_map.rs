use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace};

use super::config::TimedMapConfig;
use super::entry::Entry;
use crate::lmap::LMap;
use crate::utils::{check_refresh_interval, TimedMapError};

pub(crate) struct Inner<K, V> {
    pub(crate) map: LMap<K, Arc<Entry<V>>>,
    pub(crate) config: TimedMapConfig,
    runtime: Handle,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Removes `key` only if it still maps to this exact `entry`.
    ///
    /// Timers and refresh loops delete through here, so one that outlived its
    /// entry can never evict the entry that replaced it.
    pub(crate) fn delete_entry(&self, key: &K, entry: &Arc<Entry<V>>) -> bool {
        let removed = self
            .map
            .remove_if(key, |current| Arc::ptr_eq(current, entry))
            .is_some();
        if !removed {
            trace!(map = %self.config.name, key = ?key, "stale entry, nothing to delete");
        }
        removed
    }

    pub(crate) fn is_current(&self, key: &K, entry: &Arc<Entry<V>>) -> bool {
        self.map
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(&current, entry))
    }

    /// Attaches `task` to `entry`. If the entry was deleted or replaced before
    /// the handle got here, nobody else will cancel it, so stop it right away.
    pub(crate) fn bind_task(&self, key: &K, entry: &Arc<Entry<V>>, task: AbortHandle) {
        entry.bind_task(task);
        if !self.is_current(key, entry) {
            entry.cancel();
        }
    }
}

impl<K, V> Inner<K, V> {
    fn cancel_all(&self) -> usize {
        let drained = self.map.drain();
        for (_, entry) in &drained {
            entry.cancel();
        }
        drained.len()
    }
}

impl<K, V> Drop for Inner<K, V> {
    fn drop(&mut self) {
        let stopped = self.cancel_all();
        debug!(map = %self.config.name, stopped, "timed map dropped");
    }
}

/// A concurrent cache whose entries expire on their own.
///
/// Entries are inserted either with a fixed time-to-live ([`TimedMap::set`])
/// or with a value function that a background loop re-runs on a fixed
/// interval ([`TimedMap::set_update_fn`]). A refreshed entry can also be
/// evicted once nobody has read it for a while
/// ([`TimedMap::set_update_expire_fn`]).
///
/// Timers and refresh loops run on the tokio runtime the map was created in.
/// Cloning is cheap; all clones share the same entries. Dropping the last
/// clone stops every timer and refresh loop.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use timed_map::TimedMap;
///
/// #[tokio::main]
/// async fn main() {
///     let cache: TimedMap<String, String> = TimedMap::new();
///     cache.set("session".into(), "abc".into(), Duration::from_secs(30));
///     assert_eq!(cache.get(&"session".to_string()).as_deref(), Some("abc"));
/// }
/// ```
pub struct TimedMap<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TimedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for TimedMap<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedMap")
            .field("name", &self.inner.config.name)
            .field("entries", &self.inner.map)
            .finish()
    }
}

impl<K, V> TimedMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a map with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[track_caller]
    pub fn new() -> Self {
        Self::with_config(TimedMapConfig::default())
    }

    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime or with a config that
    /// fails [`TimedMapConfig::validate`].
    #[track_caller]
    pub fn with_config(config: TimedMapConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(map) => map,
            Err(e) => panic!("cannot create timed map: {}", e),
        }
    }

    pub fn try_with_config(config: TimedMapConfig) -> Result<Self, TimedMapError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| TimedMapError::NoRuntime)?;
        debug!(map = %config.name, "timed map created");
        Ok(Self {
            inner: Arc::new(Inner {
                map: LMap::new(),
                config,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &TimedMapConfig {
        &self.inner.config
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Inner<K, V> {
        &self.inner
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// A non-zero `ttl` schedules a one-shot timer that removes this entry
    /// once it elapses. A zero `ttl` keeps the entry until it is deleted.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = Arc::new(Entry::new(value));
        self.install(key.clone(), Arc::clone(&entry));
        if !ttl.is_zero() {
            let timer = self.spawn_expiry(key.clone(), &entry, ttl);
            self.inner.bind_task(&key, &entry, timer);
        }
    }

    /// Stores `value_fn()` under `key` and re-runs it every `refresh_interval`
    /// for as long as the entry lives.
    ///
    /// # Panics
    ///
    /// Panics if `refresh_interval` is below the configured minimum.
    #[track_caller]
    pub fn set_update_fn<F>(&self, key: K, value_fn: F, refresh_interval: Duration)
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        self.set_update_expire_fn(key, value_fn, refresh_interval, Duration::ZERO)
    }

    /// Like [`TimedMap::set_update_fn`], but the refresh loop also evicts the
    /// entry once it has not been read for longer than `idle_threshold`.
    /// A zero `idle_threshold` disables idle eviction.
    ///
    /// # Panics
    ///
    /// Panics if `refresh_interval` is below the configured minimum.
    #[track_caller]
    pub fn set_update_expire_fn<F>(
        &self,
        key: K,
        value_fn: F,
        refresh_interval: Duration,
        idle_threshold: Duration,
    ) where
        F: Fn() -> V + Send + Sync + 'static,
    {
        if let Err(e) =
            self.try_set_update_expire_fn(key, value_fn, refresh_interval, idle_threshold)
        {
            panic!("{}", e);
        }
    }

    pub fn try_set_update_fn<F>(
        &self,
        key: K,
        value_fn: F,
        refresh_interval: Duration,
    ) -> Result<(), TimedMapError>
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        self.try_set_update_expire_fn(key, value_fn, refresh_interval, Duration::ZERO)
    }

    /// Fallible form of [`TimedMap::set_update_expire_fn`]. On error nothing
    /// is stored and `value_fn` is never called.
    pub fn try_set_update_expire_fn<F>(
        &self,
        key: K,
        value_fn: F,
        refresh_interval: Duration,
        idle_threshold: Duration,
    ) -> Result<(), TimedMapError>
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        check_refresh_interval(refresh_interval, self.inner.config.min_refresh_interval)?;

        let entry = Arc::new(Entry::new(value_fn()));
        self.install(key.clone(), Arc::clone(&entry));

        debug!(
            map = %self.inner.config.name,
            key = ?key,
            ?refresh_interval,
            ?idle_threshold,
            "starting refresh loop"
        );
        let refresh = self.inner.runtime.spawn(refresh_loop(
            Arc::downgrade(&self.inner),
            key.clone(),
            Arc::downgrade(&entry),
            Arc::new(value_fn),
            refresh_interval,
            idle_threshold,
        ));
        self.inner.bind_task(&key, &entry, refresh.abort_handle());
        Ok(())
    }

    /// Returns a copy of the value for `key` and marks the entry as accessed.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.inner.map.get(key)?;
        Some(entry.read())
    }

    /// Like [`TimedMap::get`], but returns `V::default()` on a miss.
    pub fn get_or_default(&self, key: &K) -> V
    where
        V: Default,
    {
        self.get(key).unwrap_or_default()
    }

    /// Removes `key` and returns its value, stopping its timer or refresh loop.
    pub fn delete_get(&self, key: &K) -> Option<V> {
        let entry = self.inner.map.delete_get(key)?;
        entry.cancel();
        debug!(map = %self.inner.config.name, key = ?key, "deleted");
        Some(entry.peek())
    }

    /// Removes `key`, stopping its timer or refresh loop. Returns whether an
    /// entry was present.
    pub fn delete(&self, key: &K) -> bool {
        match self.inner.map.delete_get(key) {
            Some(entry) => {
                entry.cancel();
                debug!(map = %self.inner.config.name, key = ?key, "deleted");
                true
            }
            None => false,
        }
    }

    /// Presence check that does not count as an access.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.map.keys()
    }

    /// Removes every entry and stops all timers and refresh loops.
    pub fn clear(&self) {
        let removed = self.inner.cancel_all();
        info!(map = %self.inner.config.name, removed, "cleared");
    }

    fn install(&self, key: K, entry: Arc<Entry<V>>) {
        if let Some(previous) = self.inner.map.set(key, entry) {
            previous.cancel();
        }
    }

    fn spawn_expiry(&self, key: K, entry: &Arc<Entry<V>>, ttl: Duration) -> AbortHandle {
        let inner = Arc::downgrade(&self.inner);
        let entry = Arc::downgrade(entry);
        self.inner
            .runtime
            .spawn(async move {
                tokio::time::sleep(ttl).await;
                let (Some(inner), Some(entry)) = (inner.upgrade(), entry.upgrade()) else {
                    return;
                };
                if inner.delete_entry(&key, &entry) {
                    debug!(map = %inner.config.name, key = ?key, ?ttl, "ttl elapsed, evicted");
                }
            })
            .abort_handle()
    }
}

/// Background task bound to one entry: recompute its value every `every`
/// until the entry is replaced, deleted, or evicted for being idle.
async fn refresh_loop<K, V, F>(
    inner: Weak<Inner<K, V>>,
    key: K,
    entry: Weak<Entry<V>>,
    value_fn: Arc<F>,
    every: Duration,
    idle_threshold: Duration,
) where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn() -> V + Send + Sync + 'static,
{
    loop {
        tokio::time::sleep(every).await;

        let (Some(inner), Some(entry)) = (inner.upgrade(), entry.upgrade()) else {
            return;
        };
        if !inner.is_current(&key, &entry) {
            trace!(map = %inner.config.name, key = ?key, "entry replaced, refresh loop done");
            return;
        }

        // the value function may block; keep it off the runtime and outside the entry lock
        let f = Arc::clone(&value_fn);
        let value = match tokio::task::spawn_blocking(move || f()).await {
            Ok(value) => value,
            Err(e) => {
                // nothing refreshes or idle-checks the entry after this, so it goes too
                inner.delete_entry(&key, &entry);
                error!(map = %inner.config.name, key = ?key, error = %e, "value function failed, entry evicted");
                return;
            }
        };

        let mut current = entry.write();
        if entry.is_expired(idle_threshold) {
            if inner.delete_entry(&key, &entry) {
                debug!(map = %inner.config.name, key = ?key, ?idle_threshold, "idle, evicted");
            }
            return;
        }
        *current = value;
    }
}
