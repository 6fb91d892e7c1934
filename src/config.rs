//! Translation layer configuration.
//! Loaded from a JSON file; every field has a default so partial files work.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gate::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Simultaneous backend fetches admitted by the gate (1..=10).
    pub max_concurrent: usize,
    /// How long a caller waits on someone else's in-flight fetch.
    pub wait_timeout_ms: u64,
    /// Budget for one backend call.
    pub fetch_timeout_ms: u64,
    /// Lifetime of a negative entry before the key may be retried.
    pub negative_ttl_ms: u64,
    pub preload_wave_size: usize,
    pub preload_wave_delay_ms: u64,
    /// Target language requested from the upstream source.
    pub language: String,
    /// TTL of rows in the persistent store.
    pub store_ttl_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_CONCURRENCY,
            wait_timeout_ms: 5_000,
            fetch_timeout_ms: 8_000,
            negative_ttl_ms: 5 * 60 * 1000,
            preload_wave_size: 3,
            preload_wave_delay_ms: 200,
            language: "zh".into(),
            store_ttl_secs: 7 * 24 * 3600,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl TranslationConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: TranslationConfig = serde_json::from_str(content)?;
        Ok(config.normalized())
    }

    /// Load the file, falling back to defaults when it is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load_from_file(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "translation config load failed, using defaults");
            Self::default()
        })
    }

    /// Clamp out-of-range values.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        self.preload_wave_size = self.preload_wave_size.max(1);
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_millis(self.negative_ttl_ms)
    }

    pub fn preload_wave_delay(&self) -> Duration {
        Duration::from_millis(self.preload_wave_delay_ms)
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = TranslationConfig::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(8));
        assert_eq!(config.negative_ttl(), Duration::from_secs(300));
        assert_eq!(config.preload_wave_delay(), Duration::from_millis(200));
        assert_eq!(config.language, "zh");
    }

    #[test]
    fn partial_file_keeps_defaults_and_clamps() {
        let config =
            TranslationConfig::from_json(r#"{"max_concurrent": 40, "preload_wave_size": 0}"#)
                .unwrap();
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.preload_wave_size, 1);
        assert_eq!(config.fetch_timeout_ms, 8_000);
    }

    #[test]
    fn missing_file_falls_back() {
        let config = TranslationConfig::load_or_default(Path::new("/nonexistent/translation.json"));
        assert_eq!(config, TranslationConfig::default());
        assert!(matches!(
            TranslationConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
