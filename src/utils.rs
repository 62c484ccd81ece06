use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Shortest refresh interval a refresh loop may be scheduled with.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

pub const DEFAULT_MAP_NAME: &str = "timed_map";

#[derive(Debug, thiserror::Error)]
pub enum TimedMapError {
    #[error("refresh interval {interval:?} is below the minimum of {minimum:?}")]
    RefreshIntervalTooShort { interval: Duration, minimum: Duration },
    #[error("timed map requires a running tokio runtime")]
    NoRuntime,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to read config: {0}")]
    ConfigIo(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Current wall-clock time as nanoseconds since the UNIX epoch.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

pub fn check_refresh_interval(interval: Duration, minimum: Duration) -> Result<(), TimedMapError> {
    if interval < minimum {
        return Err(TimedMapError::RefreshIntervalTooShort { interval, minimum });
    }
    Ok(())
}
