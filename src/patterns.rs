//! Pattern dataset types: bot patterns, AI referrers and policy settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Cache key under which the active dataset is persisted.
pub const DATASET_CACHE_KEY: &str = "spyglasses_patterns";

/// Dataset version reported when the remote omits one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// A bot definition matched against the User-Agent header.
///
/// Every field except `pattern` falls back to a neutral default when a
/// dataset omits it, so partially described agents still match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPattern {
    /// Regular expression tested case-insensitively against the user agent
    pub pattern: String,

    /// Agent type identifier (e.g. "gptbot")
    #[serde(rename = "type", default = "default_agent_type")]
    pub agent_type: String,

    /// Coarse classification (e.g. "AI Crawler")
    #[serde(default = "default_category")]
    pub category: String,

    /// Finer classification (e.g. "Model Training Crawlers")
    #[serde(default = "default_subcategory")]
    pub subcategory: String,

    /// Operating company, when known
    #[serde(default)]
    pub company: Option<String>,

    /// Whether the agent honors robots directives
    #[serde(default)]
    pub is_compliant: bool,

    /// Whether the agent collects data for model training
    #[serde(default)]
    pub is_ai_model_trainer: bool,

    /// Declared intent (e.g. "UserQuery", "DataCollection")
    #[serde(default = "default_intent")]
    pub intent: String,

    /// Documentation URL for the agent
    #[serde(default)]
    pub url: Option<String>,
}

fn default_agent_type() -> String {
    "unknown".to_string()
}

fn default_category() -> String {
    "Unknown".to_string()
}

fn default_subcategory() -> String {
    "Unclassified".to_string()
}

fn default_intent() -> String {
    "unknown".to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// A known AI assistant property identified by referrer hostname.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReferrer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub url: String,
    /// Hostname substrings checked against the referrer host, in order
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Per-property policy settings delivered with the dataset.
///
/// The block and allow sets hold scope strings of the form
/// `pattern:<p>`, `category:<c>`, `subcategory:<c>:<s>` or
/// `type:<c>:<s>:<t>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySettings {
    pub block_ai_model_trainers: bool,
    pub custom_blocks: HashSet<String>,
    pub custom_allows: HashSet<String>,
}

/// The complete versioned dataset, always replaced as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDataset {
    pub patterns: Vec<BotPattern>,
    #[serde(default)]
    pub ai_referrers: Vec<AiReferrer>,
    #[serde(default)]
    pub settings: PropertySettings,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub synced_at: DateTime<Utc>,
}

impl PatternDataset {
    /// The compiled-in catalog used until a cached or synced dataset takes
    /// over: the major AI assistants and model training crawlers, plus the
    /// AI properties whose outbound links show up as referrers.
    pub fn bootstrap() -> Self {
        let patterns = vec![
            BotPattern {
                pattern: "ChatGPT-User/[0-9]".to_string(),
                agent_type: "chatgpt-user".to_string(),
                category: "AI Agent".to_string(),
                subcategory: "AI Assistants".to_string(),
                company: Some("OpenAI".to_string()),
                is_compliant: true,
                is_ai_model_trainer: false,
                intent: "UserQuery".to_string(),
                url: Some("https://platform.openai.com/docs/bots".to_string()),
            },
            BotPattern {
                pattern: "Claude-User/[0-9]".to_string(),
                agent_type: "claude-user".to_string(),
                category: "AI Agent".to_string(),
                subcategory: "AI Assistants".to_string(),
                company: Some("Anthropic".to_string()),
                is_compliant: true,
                is_ai_model_trainer: false,
                intent: "UserQuery".to_string(),
                url: Some("https://support.anthropic.com/en/articles/8896518-does-anthropic-crawl-data-from-the-web-and-how-can-site-owners-block-the-crawler".to_string()),
            },
            BotPattern {
                pattern: "CCBot/[0-9]".to_string(),
                agent_type: "ccbot".to_string(),
                category: "AI Crawler".to_string(),
                subcategory: "Model Training Crawlers".to_string(),
                company: Some("Common Crawl".to_string()),
                is_compliant: true,
                is_ai_model_trainer: true,
                intent: "DataCollection".to_string(),
                url: Some("https://commoncrawl.org/ccbot".to_string()),
            },
            BotPattern {
                pattern: "GPTBot/[0-9]".to_string(),
                agent_type: "gptbot".to_string(),
                category: "AI Crawler".to_string(),
                subcategory: "Model Training Crawlers".to_string(),
                company: Some("OpenAI".to_string()),
                is_compliant: true,
                is_ai_model_trainer: true,
                intent: "DataCollection".to_string(),
                url: Some("https://platform.openai.com/docs/gptbot".to_string()),
            },
            BotPattern {
                pattern: "ClaudeBot/[0-9]".to_string(),
                agent_type: "claude-bot".to_string(),
                category: "AI Crawler".to_string(),
                subcategory: "Model Training Crawlers".to_string(),
                company: Some("Anthropic".to_string()),
                is_compliant: true,
                is_ai_model_trainer: true,
                intent: "DataCollection".to_string(),
                url: Some("https://support.anthropic.com/en/articles/8896518-does-anthropic-crawl-data-from-the-web-and-how-can-site-owners-block-the-crawler".to_string()),
            },
        ];

        let ai_referrers = vec![
            AiReferrer {
                id: "chatgpt".to_string(),
                name: "ChatGPT".to_string(),
                company: "OpenAI".to_string(),
                url: "https://chat.openai.com".to_string(),
                patterns: vec!["chat.openai.com".to_string(), "chatgpt.com".to_string()],
                description: "Traffic from ChatGPT users clicking on links".to_string(),
            },
            AiReferrer {
                id: "claude".to_string(),
                name: "Claude".to_string(),
                company: "Anthropic".to_string(),
                url: "https://claude.ai".to_string(),
                patterns: vec!["claude.ai".to_string()],
                description: "Traffic from Claude users clicking on links".to_string(),
            },
            AiReferrer {
                id: "perplexity".to_string(),
                name: "Perplexity".to_string(),
                company: "Perplexity AI".to_string(),
                url: "https://perplexity.ai".to_string(),
                patterns: vec!["perplexity.ai".to_string()],
                description: "Traffic from Perplexity users clicking on links".to_string(),
            },
        ];

        Self {
            patterns,
            ai_referrers,
            settings: PropertySettings::default(),
            version: default_version(),
            synced_at: Utc::now(),
        }
    }
}
