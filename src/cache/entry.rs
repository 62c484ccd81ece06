use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::utils::now_nanos;

/// One cached value plus its bookkeeping.
///
/// `value` and `last_access` are synchronized independently: the value sits
/// behind the entry's own RwLock, the access time is a plain atomic so the
/// read path never needs the write lock.
pub struct Entry<V> {
    value: RwLock<V>,
    last_access: AtomicI64,
    // expiry timer or refresh loop bound to this instance
    task: OnceLock<AbortHandle>,
}

impl<V> Entry<V> {
    pub fn new(value: V) -> Self {
        Self {
            value: RwLock::new(value),
            last_access: AtomicI64::new(now_nanos()),
            task: OnceLock::new(),
        }
    }

    /// Idle expiry check. A zero threshold disables it.
    pub fn is_expired(&self, idle_threshold: Duration) -> bool {
        if idle_threshold.is_zero() {
            return false;
        }
        let idle = now_nanos().saturating_sub(self.last_access());
        idle > 0 && idle as u128 > idle_threshold.as_nanos()
    }

    pub(crate) fn touch_at(&self, nanos: i64) {
        self.last_access.store(nanos, Ordering::Release);
    }

    pub(crate) fn last_access(&self) -> i64 {
        self.last_access.load(Ordering::Acquire)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, V> {
        self.value.write()
    }

    pub(crate) fn bind_task(&self, handle: AbortHandle) {
        if let Err(handle) = self.task.set(handle) {
            // an entry gets at most one task; never leave a second one running
            handle.abort();
        }
    }

    /// Stops the timer or refresh loop bound to this entry, if any.
    pub(crate) fn cancel(&self) {
        if let Some(task) = self.task.get() {
            task.abort();
        }
    }
}

impl<V: Clone> Entry<V> {
    /// Copies the value out under the read lock and records the access.
    pub(crate) fn read(&self) -> V {
        let now = now_nanos();
        let value = self.value.read();
        self.touch_at(now);
        value.clone()
    }

    /// Copies the value out without counting as an access.
    pub(crate) fn peek(&self) -> V {
        self.value.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_not_expired_when_disabled() {
        let entry = Entry::new(1u8);
        entry.touch_at(0);
        assert!(!entry.is_expired(Duration::ZERO));
    }

    #[test]
    fn test_entry_idle_expiry() {
        let entry = Entry::new("v");
        assert!(!entry.is_expired(Duration::from_secs(60)));

        let two_minutes_ago = now_nanos() - Duration::from_secs(120).as_nanos() as i64;
        entry.touch_at(two_minutes_ago);
        assert!(entry.is_expired(Duration::from_secs(60)));
        assert!(!entry.is_expired(Duration::from_secs(600)));
    }

    #[test]
    fn test_read_refreshes_last_access() {
        let entry = Entry::new(String::from("value"));
        entry.touch_at(0);
        assert!(entry.is_expired(Duration::from_secs(1)));

        assert_eq!(entry.read(), "value");
        assert!(entry.last_access() > 0);
        assert!(!entry.is_expired(Duration::from_secs(1)));
    }

    #[test]
    fn test_peek_leaves_last_access_alone() {
        let entry = Entry::new(7u32);
        entry.touch_at(42);
        assert_eq!(entry.peek(), 7);
        assert_eq!(entry.last_access(), 42);
    }

    #[test]
    fn test_write_replaces_value() {
        let entry = Entry::new(vec![1, 2]);
        *entry.write() = vec![3];
        assert_eq!(entry.peek(), vec![3]);
    }
}
