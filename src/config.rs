use std::env;
use std::time::Duration;

use log::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Process settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Abandon a mining request after this long. `None` mines to completion.
    pub mining_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mining_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parsed(&lookup, "PORT").unwrap_or(defaults.port);
        let mining_timeout = parsed::<u64>(&lookup, "MINING_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            host,
            port,
            mining_timeout,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("CONFIG - ignoring invalid {key}={raw:?}");
            None
        }
    }
}
