//! Visitor classification from user agent and referrer.

use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::patterns::{AiReferrer, BotPattern};
use crate::policy;
use crate::repository::PatternRepository;

/// Status to answer blocked visitors with.
pub const BLOCK_STATUS: u16 = 403;

/// Cache-Control for blocked responses, so intermediaries never cache the
/// refusal.
pub const BLOCK_CACHE_CONTROL: &str = "private, no-store, max-age=0";

const EXCLUDED_PATH_PREFIXES: &[&str] = &[
    "/admin", "/cron", "/batch", "/static", "/assets", "/media", "/files",
];

const EXCLUDED_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2",
    "ttf", "eot", "pdf", "zip", "tar", "gz", "xml", "txt", "json",
];

/// Coarse classification of a detection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    None,
    Bot,
    AiReferrer,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::None => "none",
            SourceType::Bot => "bot",
            SourceType::AiReferrer => "ai_referrer",
        }
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    /// Ordinary traffic.
    None,
    /// The user agent matched a bot pattern.
    Bot {
        /// Policy verdict for this pattern under the active settings
        should_block: bool,
        /// The pattern source text that matched
        matched_pattern: String,
        info: BotPattern,
    },
    /// The referrer hostname matched a known AI property.
    AiReferrer {
        /// The hostname fragment that matched
        matched_pattern: String,
        info: AiReferrer,
    },
}

impl DetectionResult {
    pub fn source_type(&self) -> SourceType {
        match self {
            DetectionResult::None => SourceType::None,
            DetectionResult::Bot { .. } => SourceType::Bot,
            DetectionResult::AiReferrer { .. } => SourceType::AiReferrer,
        }
    }

    /// Whether the visitor should receive a block response. Referrer
    /// matches are never blocked, they identify human traffic.
    pub fn should_block(&self) -> bool {
        matches!(
            self,
            DetectionResult::Bot {
                should_block: true,
                ..
            }
        )
    }

    pub fn matched_pattern(&self) -> Option<&str> {
        match self {
            DetectionResult::None => None,
            DetectionResult::Bot {
                matched_pattern, ..
            }
            | DetectionResult::AiReferrer {
                matched_pattern, ..
            } => Some(matched_pattern),
        }
    }
}

/// Classifies requests against the active pattern snapshot.
pub struct DetectionEngine {
    repository: Arc<PatternRepository>,
    debug_mode: bool,
}

impl DetectionEngine {
    pub fn new(repository: Arc<PatternRepository>) -> Self {
        Self {
            repository,
            debug_mode: false,
        }
    }

    /// Enable per-pattern trace output during scans.
    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    /// Classify a request from its user agent and referrer.
    ///
    /// Bot patterns are checked first, in dataset order, stopping at the
    /// first match. Only when no bot matched is the referrer compared
    /// against the known AI properties.
    pub fn detect(&self, user_agent: &str, referrer: &str) -> DetectionResult {
        let snapshot = self.repository.current();

        if !user_agent.is_empty() {
            for (pattern, matcher) in snapshot.bots() {
                if self.debug_mode {
                    debug!(pattern = %pattern.pattern, "Checking user agent against bot pattern");
                }
                if matcher.is_match(user_agent) {
                    let should_block =
                        policy::should_block(pattern, &snapshot.dataset.settings);
                    debug!(
                        pattern = %pattern.pattern,
                        agent_type = %pattern.agent_type,
                        should_block,
                        "User agent matched bot pattern"
                    );
                    return DetectionResult::Bot {
                        should_block,
                        matched_pattern: pattern.pattern.clone(),
                        info: pattern.clone(),
                    };
                }
            }
        }

        if !referrer.is_empty() {
            let host = extract_hostname(referrer);
            for source in &snapshot.dataset.ai_referrers {
                for needle in &source.patterns {
                    if self.debug_mode {
                        debug!(%host, needle = %needle, "Checking referrer hostname");
                    }
                    if !needle.is_empty() && host.contains(&needle.to_lowercase()) {
                        debug!(
                            referrer_id = %source.id,
                            matched = %needle,
                            "Referrer matched AI source"
                        );
                        return DetectionResult::AiReferrer {
                            matched_pattern: needle.clone(),
                            info: source.clone(),
                        };
                    }
                }
            }
        }

        DetectionResult::None
    }
}

/// Lowercased hostname of a referrer value.
///
/// Falls back to the whole value lowercased when it does not parse as a
/// URL, so bare hostnames still match.
pub fn extract_hostname(referrer: &str) -> String {
    match Url::parse(referrer) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_lowercase(),
            None => referrer.to_lowercase(),
        },
        Err(_) => referrer.to_lowercase(),
    }
}

/// Whether a request path is infrastructure or a static asset that should
/// skip detection entirely.
pub fn should_exclude_path(path: &str) -> bool {
    if EXCLUDED_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return true;
    }

    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if let Some((stem, extension)) = last_segment.rsplit_once('.') {
        if !stem.is_empty() {
            let extension = extension.to_ascii_lowercase();
            return EXCLUDED_EXTENSIONS.iter().any(|e| *e == extension);
        }
    }

    false
}

/// Vary header for responses whose body depended on detection, appending
/// `User-Agent` to any existing value.
pub fn vary_header_value(existing: Option<&str>) -> String {
    let mut parts: Vec<&str> = match existing {
        Some(value) => value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect(),
        None => Vec::new(),
    };

    if !parts
        .iter()
        .any(|part| part.eq_ignore_ascii_case("User-Agent"))
    {
        parts.push("User-Agent");
    }

    parts.join(", ")
}
