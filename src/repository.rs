//! Pattern dataset storage with lock-free reads and atomic replacement.

use arc_swap::ArcSwap;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::PatternCache;
use crate::patterns::{BotPattern, PatternDataset, DATASET_CACHE_KEY};

/// An immutable dataset plus its compiled matchers.
///
/// Matchers are compiled once per dataset replacement. A pattern whose
/// regex fails to compile keeps its slot as `None` so the remaining
/// matchers stay aligned with the dataset order.
pub struct DatasetSnapshot {
    pub dataset: PatternDataset,
    matchers: Vec<Option<Regex>>,
}

impl DatasetSnapshot {
    fn compile(dataset: PatternDataset) -> Self {
        let matchers = dataset
            .patterns
            .iter()
            .map(|p| {
                match RegexBuilder::new(&p.pattern).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(error) => {
                        warn!(
                            pattern = %p.pattern,
                            %error,
                            "Skipping bot pattern that failed to compile"
                        );
                        None
                    }
                }
            })
            .collect();

        Self { dataset, matchers }
    }

    /// Iterate bot patterns with their compiled matchers, in dataset order,
    /// skipping patterns that failed to compile.
    pub fn bots(&self) -> impl Iterator<Item = (&BotPattern, &Regex)> {
        self.dataset
            .patterns
            .iter()
            .zip(self.matchers.iter())
            .filter_map(|(pattern, matcher)| matcher.as_ref().map(|re| (pattern, re)))
    }
}

/// Holds the active dataset and swaps in replacements atomically.
///
/// Readers grab the current snapshot without taking any lock, so a
/// replacement never delays detection. Replacements also write through to
/// the cache so a restart can skip the initial sync.
pub struct PatternRepository {
    snapshot: ArcSwap<DatasetSnapshot>,
    cache: Arc<dyn PatternCache>,
    cache_ttl: Duration,
}

impl PatternRepository {
    /// Create a repository seeded with the compiled-in bootstrap catalog.
    pub fn new(cache: Arc<dyn PatternCache>, cache_ttl: Duration) -> Self {
        let bootstrap = DatasetSnapshot::compile(PatternDataset::bootstrap());
        Self {
            snapshot: ArcSwap::from_pointee(bootstrap),
            cache,
            cache_ttl,
        }
    }

    /// The currently active snapshot.
    pub fn current(&self) -> Arc<DatasetSnapshot> {
        self.snapshot.load_full()
    }

    /// Replace the bootstrap dataset with a cached one, if a usable cached
    /// dataset exists. Returns whether a restore happened.
    pub async fn restore_cached(&self) -> bool {
        let Some(dataset) = self.load_cached().await else {
            return false;
        };

        debug!(
            patterns = dataset.patterns.len(),
            version = %dataset.version,
            "Restored pattern dataset from cache"
        );
        self.install(dataset);
        true
    }

    /// Read the dataset from the cache without installing it. Absent when
    /// the cache has no entry, the entry does not deserialize, or it
    /// carries no patterns.
    pub async fn load_cached(&self) -> Option<PatternDataset> {
        let bytes = self.cache.get(DATASET_CACHE_KEY).await?;

        let dataset: PatternDataset = match serde_json::from_slice(&bytes) {
            Ok(dataset) => dataset,
            Err(error) => {
                debug!(%error, "Ignoring unreadable cached pattern dataset");
                return None;
            }
        };

        if dataset.patterns.is_empty() {
            return None;
        }
        Some(dataset)
    }

    /// Install a new dataset and persist it to the cache.
    pub async fn replace(&self, dataset: PatternDataset) {
        let serialized = serde_json::to_vec(&dataset);
        self.install(dataset);

        match serialized {
            Ok(bytes) => {
                self.cache
                    .set(DATASET_CACHE_KEY, bytes, self.cache_ttl)
                    .await;
            }
            Err(error) => {
                warn!(%error, "Failed to serialize pattern dataset for caching");
            }
        }
    }

    fn install(&self, dataset: PatternDataset) {
        self.snapshot
            .store(Arc::new(DatasetSnapshot::compile(dataset)));
    }
}
