//! AI and bot traffic detection for web properties.
//!
//! Classifies requests as AI crawlers, AI assistants or human visitors
//! arriving from AI platforms, applies per-property blocking policy and
//! reports detected visits to a collector.
//!
//! # Features
//!
//! - User-agent matching against a synced pattern dataset
//! - Referrer classification for traffic arriving from AI platforms
//! - Allow/block rules with pattern, category, subcategory and type scopes
//! - Periodic dataset sync with cache-backed restarts
//! - Fire-and-forget visit reporting
//!
//! # Example
//!
//! ```ignore
//! use spyglasses::{SpyglassesClient, SpyglassesConfig};
//!
//! let client = SpyglassesClient::new(SpyglassesConfig::from_env()).await?;
//! client.sync_if_needed(std::time::SystemTime::now()).await?;
//!
//! let result = client.detect(user_agent, referrer);
//! if result.should_block() {
//!     return forbidden();
//! }
//! client.report(&result, &ctx);
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod detect;
pub mod error;
pub mod patterns;
pub mod policy;
pub mod repository;
pub mod sync;
pub mod telemetry;

pub use cache::{MemoryCache, PatternCache};
pub use client::SpyglassesClient;
pub use config::SpyglassesConfig;
pub use detect::{DetectionEngine, DetectionResult, SourceType};
pub use error::{SyncError, TelemetryError};
pub use patterns::{AiReferrer, BotPattern, PatternDataset, PropertySettings};
pub use repository::PatternRepository;
pub use sync::{SyncCoordinator, SyncReport};
pub use telemetry::{RequestContext, TelemetryReporter};
