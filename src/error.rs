//! Error types for pattern sync and visit reporting.

use thiserror::Error;

/// Failure modes of a pattern sync attempt.
///
/// None of these are fatal to detection: the previously installed dataset
/// stays active whenever a sync fails.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No API key is configured, so the patterns endpoint cannot be called.
    #[error("no API key configured")]
    MissingApiKey,

    /// The patterns endpoint answered with a non-success status.
    #[error("patterns endpoint returned HTTP {status}")]
    Http { status: u16 },

    /// The request failed before a response arrived.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not a usable dataset.
    #[error("malformed patterns response: {0}")]
    MalformedResponse(String),

    /// Another sync already holds the in-progress guard.
    #[error("a sync is already in progress")]
    AlreadyRunning,
}

/// Failure modes of delivering one visit event to the collector.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The collector answered with a non-success status.
    #[error("collector returned HTTP {status}")]
    Http { status: u16 },

    /// The request failed before a response arrived.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
