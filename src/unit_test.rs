use crate::cache::{Entry, TimedMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// CMD TO RUN TESTS W/ CLEAR DEBUG OUTPUT
// $ RUST_LOG=trace cargo test unit -- --nocapture --test-threads=1

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_entry_ignores_stale_handle() {
        init_logger();
        debug!("Starting test: test_delete_entry_ignores_stale_handle");

        let map: TimedMap<&str, u32> = TimedMap::new();
        map.set("k", 1, Duration::ZERO);
        let stale = map.inner().map.get(&"k").unwrap();

        map.set("k", 2, Duration::ZERO);
        assert!(!map.inner().is_current(&"k", &stale));
        assert!(!map.inner().delete_entry(&"k", &stale));
        assert_eq!(map.get(&"k"), Some(2));

        // a handle that was never stored is just as stale
        let foreign = Arc::new(Entry::new(2));
        assert!(!map.inner().delete_entry(&"k", &foreign));
        assert_eq!(map.get(&"k"), Some(2));

        debug!("Completed test: test_delete_entry_ignores_stale_handle");
    }

    #[tokio::test]
    async fn test_delete_entry_removes_current_handle() {
        init_logger();

        let map: TimedMap<String, String> = TimedMap::new();
        map.set("k".into(), "v".into(), Duration::ZERO);
        let current = map.inner().map.get(&"k".to_string()).unwrap();

        assert!(map.inner().is_current(&"k".to_string(), &current));
        assert!(map.inner().delete_entry(&"k".to_string(), &current));
        assert!(!map.contains_key(&"k".to_string()));

        // second attempt is a silent no-op
        assert!(!map.inner().delete_entry(&"k".to_string(), &current));
    }

    #[tokio::test]
    async fn test_get_touches_and_contains_key_does_not() {
        init_logger();

        let map: TimedMap<u8, u8> = TimedMap::new();
        map.set(1, 10, Duration::ZERO);
        let entry = map.inner().map.get(&1).unwrap();
        entry.touch_at(0);

        assert!(map.contains_key(&1));
        assert_eq!(entry.last_access(), 0);

        assert_eq!(map.get(&1), Some(10));
        assert!(entry.last_access() > 0);
    }

    #[tokio::test]
    async fn test_delete_get_does_not_count_as_access() {
        init_logger();

        let map: TimedMap<u8, u8> = TimedMap::new();
        map.set(1, 10, Duration::from_secs(60));
        let entry = map.inner().map.get(&1).unwrap();
        entry.touch_at(5);

        assert_eq!(map.delete_get(&1), Some(10));
        assert_eq!(entry.last_access(), 5);
        assert_eq!(map.delete_get(&1), None);
    }

    #[tokio::test]
    async fn test_task_bound_after_delete_is_aborted() {
        init_logger();

        let map: TimedMap<&str, u32> = TimedMap::new();
        map.set("k", 1, Duration::ZERO);
        let entry = map.inner().map.get(&"k").unwrap();
        assert!(map.delete(&"k"));

        // delete already ran, so only the bind itself can stop this task
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        map.inner().bind_task(&"k", &entry, task.abort_handle());

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("task was left running");
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_task_bound_to_current_entry_keeps_running() {
        init_logger();

        let map: TimedMap<&str, u32> = TimedMap::new();
        map.set("k", 1, Duration::ZERO);
        let entry = map.inner().map.get(&"k").unwrap();

        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        map.inner().bind_task(&"k", &entry, task.abort_handle());
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        assert!(map.delete(&"k"));
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
