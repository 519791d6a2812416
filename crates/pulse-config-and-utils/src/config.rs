//! SDK configuration.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default collector base URL.
pub const DEFAULT_API_URL: &str = "https://collector.pulse.dev";

/// Default session inactivity timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 1800;

/// Default cap on persisted pending deliveries.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Default interval between drain passes.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Default lifetime of an error fingerprint in the dedup set (5 minutes).
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300;

const DEFAULT_ERROR_RATE_MAX_EVENTS: usize = 10;
const DEFAULT_ERROR_RATE_WINDOW_SECS: u64 = 60;

/// Sliding-window limit applied to error events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum accepted error events per window.
    pub max_events: usize,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_ERROR_RATE_MAX_EVENTS,
            window_secs: DEFAULT_ERROR_RATE_WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Window length as a Duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Main SDK configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project API key. Required.
    pub api_key: String,
    /// Collector base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Session inactivity timeout in seconds.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Whether the UI binding layer should report screen views automatically.
    #[serde(default = "default_true")]
    pub auto_track_screen_views: bool,
    /// Disable tracking when the device reports that tracking is not allowed.
    #[serde(default)]
    pub respect_ad_tracking: bool,
    /// Verbose SDK logging.
    #[serde(default)]
    pub enable_logging: bool,
    /// Maximum number of persisted pending deliveries.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Seconds between periodic drain passes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Error intake rate limit.
    #[serde(default)]
    pub error_rate_limit: RateLimitConfig,
    /// Seconds an error fingerprint suppresses identical errors.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Whether identical errors are deduplicated.
    #[serde(default = "default_true")]
    pub dedup_enabled: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

fn default_flush_interval_secs() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

fn default_dedup_window_secs() -> u64 {
    DEFAULT_DEDUP_WINDOW_SECS
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Create a config with the given API key and default values.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: default_api_url(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            auto_track_screen_views: true,
            respect_ad_tracking: false,
            enable_logging: false,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            error_rate_limit: RateLimitConfig::default(),
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            dedup_enabled: true,
        }
    }

    /// Load configuration from `<base>/config.json`, then apply environment
    /// overrides. A missing file yields a config with an empty API key, which
    /// only passes validation if `PULSE_API_KEY` is set.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::new(String::new())
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from environment-style variables.
    ///
    /// Unparsable numeric or boolean values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(api_key) = lookup("PULSE_API_KEY") {
            self.api_key = api_key;
        }
        if let Some(api_url) = lookup("PULSE_API_URL") {
            self.api_url = api_url;
        }
        if let Some(secs) = lookup("PULSE_FLUSH_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.flush_interval_secs = secs;
        }
        if let Some(enabled) = lookup("PULSE_ENABLE_LOGGING").and_then(|v| parse_bool(&v)) {
            self.enable_logging = enabled;
        }
    }

    /// Check the configuration before the SDK is started.
    pub fn validate(&self) -> CoreResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("api_key is required".to_string()));
        }
        self.api_url()?;
        if self.max_queue_size == 0 {
            return Err(CoreError::Config(
                "max_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval_secs == 0 {
            return Err(CoreError::Config(
                "flush_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the collector base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Session inactivity timeout.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Interval between periodic drain passes.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Lifetime of a dedup entry.
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_config_defaults() {
        let config = Config::new("pk_test");
        assert_eq!(config.api_key, "pk_test");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.session_timeout(), Duration::from_secs(1800));
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.flush_interval(), Duration::from_secs(30));
        assert_eq!(config.dedup_window(), Duration::from_secs(300));
        assert!(config.auto_track_screen_views);
        assert!(!config.respect_ad_tracking);
        assert!(!config.enable_logging);
        assert!(config.dedup_enabled);
    }

    #[test]
    fn test_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "api_key": "pk_file", "max_queue_size": 100 }"#).unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.api_key, "pk_file");
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.flush_interval_secs, DEFAULT_FLUSH_INTERVAL_SECS);
        assert_eq!(config.error_rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::new("pk_roundtrip");
        config.flush_interval_secs = 5;
        config.error_rate_limit.max_events = 3;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.api_key, "pk_roundtrip");
        assert_eq!(loaded.flush_interval_secs, 5);
        assert_eq!(loaded.error_rate_limit.max_events, 3);
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("PULSE_API_KEY", "pk_env"),
            ("PULSE_API_URL", "https://eu.collector.pulse.dev"),
            ("PULSE_FLUSH_INTERVAL_SECS", "12"),
            ("PULSE_ENABLE_LOGGING", "true"),
        ]);

        let mut config = Config::new("pk_default");
        config.apply_env_overrides(|name| vars.get(name).cloned());

        assert_eq!(config.api_key, "pk_env");
        assert_eq!(config.api_url, "https://eu.collector.pulse.dev");
        assert_eq!(config.flush_interval_secs, 12);
        assert!(config.enable_logging);
    }

    #[test]
    fn test_env_overrides_ignore_blank_and_garbage() {
        let vars = env(&[
            ("PULSE_API_KEY", "   "),
            ("PULSE_FLUSH_INTERVAL_SECS", "soon"),
            ("PULSE_ENABLE_LOGGING", "maybe"),
        ]);

        let mut config = Config::new("pk_default");
        config.apply_env_overrides(|name| vars.get(name).cloned());

        assert_eq!(config.api_key, "pk_default");
        assert_eq!(config.flush_interval_secs, DEFAULT_FLUSH_INTERVAL_SECS);
        assert!(!config.enable_logging);
    }

    #[test]
    fn test_validate() {
        assert!(Config::new("pk_ok").validate().is_ok());
        assert!(matches!(
            Config::new("  ").validate(),
            Err(CoreError::Config(_))
        ));

        let mut bad_url = Config::new("pk_ok");
        bad_url.api_url = "not a url".to_string();
        assert!(matches!(bad_url.validate(), Err(CoreError::InvalidUrl(_))));

        let mut zero_queue = Config::new("pk_ok");
        zero_queue.max_queue_size = 0;
        assert!(zero_queue.validate().is_err());

        let mut zero_interval = Config::new("pk_ok");
        zero_interval.flush_interval_secs = 0;
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_errors() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load_from_file(&paths.config_file());
        assert!(config.is_err());
    }
}
