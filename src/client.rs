//! High-level client tying detection, sync and reporting together.

use anyhow::Context;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use crate::cache::{MemoryCache, PatternCache};
use crate::config::SpyglassesConfig;
use crate::detect::{DetectionEngine, DetectionResult};
use crate::error::SyncError;
use crate::repository::PatternRepository;
use crate::sync::{SyncCoordinator, SyncReport};
use crate::telemetry::{RequestContext, TelemetryReporter};

/// Entry point for hosts embedding detection.
///
/// Construction seeds the repository from the cache when a usable dataset
/// is stored there, otherwise the compiled-in catalog stays active until
/// the first sync.
pub struct SpyglassesClient {
    config: SpyglassesConfig,
    repository: Arc<PatternRepository>,
    engine: DetectionEngine,
    sync: SyncCoordinator,
    telemetry: TelemetryReporter,
}

impl SpyglassesClient {
    /// Create a client backed by an in-process cache.
    pub async fn new(config: SpyglassesConfig) -> anyhow::Result<Self> {
        Self::with_cache(config, Arc::new(MemoryCache::new())).await
    }

    /// Create a client backed by a host-supplied cache.
    pub async fn with_cache(
        config: SpyglassesConfig,
        cache: Arc<dyn PatternCache>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let repository = Arc::new(PatternRepository::new(cache, config.cache_ttl()));
        let restored = repository.restore_cached().await;

        let engine = DetectionEngine::new(repository.clone()).with_debug_mode(config.debug_mode);
        let sync = SyncCoordinator::new(config.clone(), repository.clone(), http.clone());
        let telemetry = TelemetryReporter::new(config.clone(), http);

        debug!(
            patterns = repository.current().dataset.patterns.len(),
            restored_from_cache = restored,
            has_api_key = config.api_key().is_some(),
            "Spyglasses client initialized"
        );

        Ok(Self {
            config,
            repository,
            engine,
            sync,
            telemetry,
        })
    }

    /// Classify a request from its user agent and referrer.
    ///
    /// Without an API key detection is disabled and every request passes
    /// through as ordinary traffic.
    pub fn detect(&self, user_agent: &str, referrer: &str) -> DetectionResult {
        if self.config.api_key().is_none() {
            return DetectionResult::None;
        }
        self.engine.detect(user_agent, referrer)
    }

    /// Queue a visit event for collector delivery. Never blocks.
    pub fn report(&self, result: &DetectionResult, ctx: &RequestContext) {
        self.telemetry.report(result, ctx);
    }

    /// Sync the pattern dataset when auto-sync is due. Returns whether a
    /// sync ran.
    pub async fn sync_if_needed(&self, now: SystemTime) -> Result<bool, SyncError> {
        self.sync.sync_if_needed(now).await
    }

    /// Force a pattern dataset sync.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        self.sync.sync().await
    }

    /// When the last successful sync finished, if any.
    pub fn last_sync(&self) -> Option<SystemTime> {
        self.sync.last_sync()
    }

    /// Restore a persisted sync time, so hosts keep the TTL across
    /// restarts.
    pub fn set_last_sync(&self, at: SystemTime) {
        self.sync.set_last_sync(at)
    }

    pub fn repository(&self) -> &PatternRepository {
        &self.repository
    }

    pub fn config(&self) -> &SpyglassesConfig {
        &self.config
    }
}
