use anyhow::{Context, Result};
use rand::Rng;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use timed_map::{TimedMap, TimedMapConfig};
use tokio::time::{sleep, Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

// $ RUST_LOG=timed_map=debug cargo run -- [config.json]

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TimedMapConfig::from_file(Path::new(&path))
            .with_context(|| format!("failed to load config from {}", path))?,
        None => TimedMapConfig::default().with_name("demo"),
    };
    info!("Using config: {:?}", config);

    let cache: TimedMap<String, u64> =
        TimedMap::try_with_config(config).context("failed to create timed map")?;

    // fixed ttl
    cache.set("session".into(), 42, Duration::from_millis(300));
    cache.set("pinned".into(), 7, Duration::ZERO);
    info!("session right after set: {:?}", cache.get(&"session".to_string()));

    // refreshed from a slow source
    let fetches = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&fetches);
    cache
        .try_set_update_fn(
            "ticker".into(),
            move || {
                let latency = rand::thread_rng().gen_range(1..20);
                std::thread::sleep(Duration::from_millis(latency));
                counter.fetch_add(1, Ordering::Relaxed) + 1
            },
            Duration::from_millis(100),
        )
        .context("failed to schedule ticker refresh")?;

    // refreshed, but dropped once nobody asks for it
    cache
        .try_set_update_expire_fn(
            "idle".into(),
            || rand::thread_rng().gen(),
            Duration::from_millis(50),
            Duration::from_millis(200),
        )
        .context("failed to schedule idle refresh")?;

    for round in 1..=5 {
        sleep(Duration::from_millis(150)).await;
        info!(
            "round {}: ticker={:?} session={:?} idle present={} entries={}",
            round,
            cache.get(&"ticker".to_string()),
            cache.get(&"session".to_string()),
            cache.contains_key(&"idle".to_string()),
            cache.len()
        );
    }

    info!("pinned value: {}", cache.get_or_default(&"pinned".to_string()));
    info!("deleted ticker: {:?}", cache.delete_get(&"ticker".to_string()));
    info!("value function ran {} times", fetches.load(Ordering::Relaxed));

    cache.clear();
    info!("remaining keys after clear: {:?}", cache.keys());
    Ok(())
}
