use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::{TimedMapError, DEFAULT_MAP_NAME, MIN_REFRESH_INTERVAL};

/// Construction-time settings for a [`TimedMap`](super::TimedMap).
///
/// In a config file durations are written as integer milliseconds:
///
/// ```json
/// { "name": "sessions", "min_refresh_interval": 50 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimedMapConfig {
    /// Label attached to every log record the map emits.
    pub name: String,
    /// Refresh intervals below this are rejected. Never lower than 1ms.
    #[serde(with = "duration_ms")]
    pub min_refresh_interval: Duration,
}

impl Default for TimedMapConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MAP_NAME.to_string(),
            min_refresh_interval: MIN_REFRESH_INTERVAL,
        }
    }
}

impl TimedMapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), TimedMapError> {
        if self.min_refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(TimedMapError::InvalidConfig(format!(
                "min_refresh_interval {:?} is below {:?}",
                self.min_refresh_interval, MIN_REFRESH_INTERVAL
            )));
        }
        if self.min_refresh_interval.subsec_nanos() % 1_000_000 != 0 {
            // config files carry whole milliseconds only
            return Err(TimedMapError::InvalidConfig(format!(
                "min_refresh_interval {:?} is not a whole number of milliseconds",
                self.min_refresh_interval
            )));
        }
        if self.name.trim().is_empty() {
            return Err(TimedMapError::InvalidConfig("name must not be empty".into()));
        }
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self, TimedMapError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, TimedMapError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
