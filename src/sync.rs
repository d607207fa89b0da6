//! Pattern dataset sync against the remote patterns endpoint.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{SpyglassesConfig, API_KEY_HEADER};
use crate::error::SyncError;
use crate::patterns::{AiReferrer, BotPattern, PatternDataset, PropertySettings, DEFAULT_VERSION};
use crate::repository::PatternRepository;

const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of a completed sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub patterns: usize,
    pub ai_referrers: usize,
    pub version: String,
}

/// Wire shape of the patterns endpoint response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatternsResponse {
    patterns: Vec<BotPattern>,
    #[serde(default)]
    ai_referrers: Vec<AiReferrer>,
    #[serde(default)]
    property_settings: Option<RemoteSettings>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteSettings {
    block_ai_model_trainers: bool,
    custom_blocks: HashSet<String>,
    custom_allows: HashSet<String>,
}

impl From<RemoteSettings> for PropertySettings {
    fn from(remote: RemoteSettings) -> Self {
        Self {
            block_ai_model_trainers: remote.block_ai_model_trainers,
            custom_blocks: remote.custom_blocks,
            custom_allows: remote.custom_allows,
        }
    }
}

/// Fetches pattern datasets and installs them into the repository.
///
/// At most one sync runs at a time. A failed sync leaves the previously
/// installed dataset untouched.
pub struct SyncCoordinator {
    config: SpyglassesConfig,
    repository: Arc<PatternRepository>,
    http: reqwest::Client,
    // Seconds since the epoch of the last successful sync, 0 for never.
    last_sync: AtomicU64,
    running: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        config: SpyglassesConfig,
        repository: Arc<PatternRepository>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            repository,
            http,
            last_sync: AtomicU64::new(0),
            running: Mutex::new(()),
        }
    }

    /// When the last successful sync finished, if any.
    pub fn last_sync(&self) -> Option<SystemTime> {
        match self.last_sync.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(UNIX_EPOCH + Duration::from_secs(secs)),
        }
    }

    /// Record a sync time, typically restored by the host from its own
    /// persistence across restarts.
    pub fn set_last_sync(&self, at: SystemTime) {
        let secs = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_sync.store(secs, Ordering::Relaxed);
    }

    /// Sync when auto-sync is enabled, an API key is configured and the
    /// cache TTL has elapsed since the last sync. Returns whether a sync
    /// actually ran.
    pub async fn sync_if_needed(&self, now: SystemTime) -> Result<bool, SyncError> {
        if !self.config.auto_sync {
            return Ok(false);
        }
        if self.config.api_key().is_none() {
            return Ok(false);
        }

        if let Some(last) = self.last_sync() {
            let age = now.duration_since(last).unwrap_or_default();
            if age < self.config.cache_ttl() {
                debug!(
                    age_seconds = age.as_secs(),
                    "Pattern dataset still fresh, skipping sync"
                );
                return Ok(false);
            }
        }

        self.sync().await?;
        Ok(true)
    }

    /// Fetch the dataset from the patterns endpoint and install it.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let Ok(_guard) = self.running.try_lock() else {
            return Err(SyncError::AlreadyRunning);
        };
        let api_key = self.config.api_key().ok_or(SyncError::MissingApiKey)?;

        debug!(endpoint = %self.config.patterns_endpoint, "Syncing pattern dataset");

        let response = self
            .http
            .get(&self.config.patterns_endpoint)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, api_key)
            .timeout(SYNC_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: PatternsResponse =
            serde_json::from_str(&body).map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        if parsed.patterns.is_empty() {
            return Err(SyncError::MalformedResponse(
                "empty patterns list".to_string(),
            ));
        }

        let dataset = PatternDataset {
            patterns: parsed.patterns,
            ai_referrers: parsed.ai_referrers,
            settings: parsed.property_settings.map(Into::into).unwrap_or_default(),
            version: parsed
                .version
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            synced_at: Utc::now(),
        };

        let report = SyncReport {
            patterns: dataset.patterns.len(),
            ai_referrers: dataset.ai_referrers.len(),
            version: dataset.version.clone(),
        };

        self.repository.replace(dataset).await;
        self.set_last_sync(SystemTime::now());

        info!(
            patterns = report.patterns,
            ai_referrers = report.ai_referrers,
            version = %report.version,
            "Pattern dataset updated"
        );

        Ok(report)
    }
}
