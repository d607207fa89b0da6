//! Configuration for the Spyglasses client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default collector endpoint for visit events.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "https://www.spyglasses.io/api/collect";

/// Default patterns endpoint for dataset sync.
pub const DEFAULT_PATTERNS_ENDPOINT: &str = "https://www.spyglasses.io/api/patterns";

/// Header carrying the API key on both endpoints.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Default dataset TTL (24 hours).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 86_400;

/// Lowest accepted dataset TTL (5 minutes).
pub const MIN_CACHE_TTL_SECONDS: u64 = 300;

/// Highest accepted dataset TTL (7 days).
pub const MAX_CACHE_TTL_SECONDS: u64 = 604_800;

/// Settings for detection, sync and telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpyglassesConfig {
    /// API key for the patterns and collector endpoints. Without one the
    /// client stays passive: no detection, no sync, no telemetry.
    pub api_key: Option<String>,

    /// Log every pattern test during a scan
    pub debug_mode: bool,

    /// Refresh the dataset on a TTL schedule
    pub auto_sync: bool,

    /// Collector endpoint receiving visit events
    pub collector_endpoint: String,

    /// Patterns endpoint serving the dataset
    pub patterns_endpoint: String,

    /// Dataset TTL in seconds, clamped to [300, 604800] when read
    pub cache_ttl_seconds: u64,
}

impl Default for SpyglassesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            debug_mode: false,
            auto_sync: true,
            collector_endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            patterns_endpoint: DEFAULT_PATTERNS_ENDPOINT.to_string(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

impl SpyglassesConfig {
    /// Build a configuration from `SPYGLASSES_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("SPYGLASSES_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(value) = std::env::var("SPYGLASSES_DEBUG") {
            config.debug_mode = parse_bool(&value);
        }
        if let Ok(value) = std::env::var("SPYGLASSES_AUTO_SYNC") {
            config.auto_sync = parse_bool(&value);
        }
        if let Ok(endpoint) = std::env::var("SPYGLASSES_COLLECTOR_ENDPOINT") {
            if !endpoint.is_empty() {
                config.collector_endpoint = endpoint;
            }
        }
        if let Ok(endpoint) = std::env::var("SPYGLASSES_PATTERNS_ENDPOINT") {
            if !endpoint.is_empty() {
                config.patterns_endpoint = endpoint;
            }
        }
        if let Ok(value) = std::env::var("SPYGLASSES_CACHE_TTL") {
            if let Ok(secs) = value.parse() {
                config.cache_ttl_seconds = secs;
            }
        }

        config
    }

    /// Load a configuration file (JSON or YAML by extension).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    /// The API key, treating an empty string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// The dataset TTL clamped to the accepted range.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.cache_ttl_seconds
                .clamp(MIN_CACHE_TTL_SECONDS, MAX_CACHE_TTL_SECONDS),
        )
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
