use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1337;
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// How often the coordinator polls on its own; `None` disables it.
    pub sync_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let sync_interval_ms = lookup("SYNC_INTERVAL_MS")
            .and_then(|ms| ms.parse().ok())
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MS);

        Self {
            port,
            sync_interval: (sync_interval_ms > 0).then(|| Duration::from_millis(sync_interval_ms)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            sync_interval: Some(Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS)),
        }
    }
}
