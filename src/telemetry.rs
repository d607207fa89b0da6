//! Visit event reporting to the collector endpoint.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::{SpyglassesConfig, API_KEY_HEADER};
use crate::detect::{DetectionResult, BLOCK_STATUS};
use crate::error::TelemetryError;

/// Upper bound on collector deliveries in flight at once. Further events
/// are dropped rather than queued.
const MAX_IN_FLIGHT: usize = 64;

const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(10);

const PLATFORM_TYPE: &str = "rust";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Headers carrying the original client address, checked in order.
const IP_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "x-client-ip",
];

/// Request details the host hands over for reporting.
///
/// Header names are expected in lowercase, the canonical form HTTP
/// libraries use.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: String,
    pub user_agent: String,
    pub ip_address: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub referrer: Option<String>,
    /// Final response status, when known. Defaults per the detection
    /// outcome otherwise.
    pub response_status: Option<u16>,
    pub response_time_ms: u64,
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            url: String::new(),
            user_agent: String::new(),
            ip_address: String::new(),
            method: "GET".to_string(),
            path: "/".to_string(),
            query: String::new(),
            referrer: None,
            response_status: None,
            response_time_ms: 0,
            headers: BTreeMap::new(),
        }
    }
}

/// Pick the client address from proxy headers, preferring the first
/// non-loopback address in the first header that carries one. Falls back
/// to the peer address.
pub fn client_ip_from_headers(
    headers: &BTreeMap<String, String>,
    peer_addr: Option<IpAddr>,
) -> String {
    for header in IP_HEADERS {
        let Some(value) = headers.get(*header) else {
            continue;
        };
        for candidate in value.split(',') {
            if let Ok(ip) = candidate.trim().parse::<IpAddr>() {
                if !ip.is_loopback() {
                    return ip.to_string();
                }
            }
        }
    }

    peer_addr.map(|ip| ip.to_string()).unwrap_or_default()
}

/// One visit event as the collector expects it on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct VisitEvent {
    pub url: String,
    pub user_agent: String,
    pub ip_address: String,
    pub request_method: String,
    pub request_path: String,
    pub request_query: String,
    /// Always empty, bodies are never reported.
    pub request_body: String,
    pub referrer: Option<String>,
    pub response_status: u16,
    pub response_time_ms: u64,
    pub headers: BTreeMap<String, String>,
    pub timestamp: String,
    pub platform_type: &'static str,
    pub metadata: EventMetadata,
}

/// Detection details attached to a visit event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventMetadata {
    Bot {
        was_blocked: bool,
        agent_type: String,
        agent_category: String,
        agent_subcategory: String,
        company: Option<String>,
        is_compliant: bool,
        intent: String,
        confidence: f64,
        detection_method: &'static str,
    },
    AiReferrer {
        was_blocked: bool,
        source_type: &'static str,
        referrer_id: String,
        referrer_name: String,
        company: String,
    },
}

/// Build the wire event for a detection outcome, or `None` for ordinary
/// traffic, which is never reported.
pub fn build_event(result: &DetectionResult, ctx: &RequestContext) -> Option<VisitEvent> {
    let metadata = match result {
        DetectionResult::None => return None,
        DetectionResult::Bot {
            should_block, info, ..
        } => EventMetadata::Bot {
            was_blocked: *should_block,
            agent_type: info.agent_type.clone(),
            agent_category: info.category.clone(),
            agent_subcategory: info.subcategory.clone(),
            company: info.company.clone(),
            is_compliant: info.is_compliant,
            intent: info.intent.clone(),
            confidence: 0.9,
            detection_method: "pattern_match",
        },
        DetectionResult::AiReferrer { info, .. } => EventMetadata::AiReferrer {
            was_blocked: false,
            source_type: "ai_referrer",
            referrer_id: info.id.clone(),
            referrer_name: info.name.clone(),
            company: info.company.clone(),
        },
    };

    let response_status = ctx.response_status.unwrap_or(if result.should_block() {
        BLOCK_STATUS
    } else {
        200
    });

    Some(VisitEvent {
        url: ctx.url.clone(),
        user_agent: ctx.user_agent.clone(),
        ip_address: ctx.ip_address.clone(),
        request_method: ctx.method.clone(),
        request_path: ctx.path.clone(),
        request_query: ctx.query.clone(),
        request_body: String::new(),
        referrer: ctx.referrer.clone(),
        response_status,
        response_time_ms: ctx.response_time_ms,
        headers: ctx.headers.clone(),
        timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        platform_type: PLATFORM_TYPE,
        metadata,
    })
}

/// Ships visit events to the collector without blocking detection.
pub struct TelemetryReporter {
    config: SpyglassesConfig,
    http: reqwest::Client,
    in_flight: Arc<Semaphore>,
}

impl TelemetryReporter {
    pub fn new(config: SpyglassesConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    /// Queue one visit event for delivery without waiting on the outcome.
    ///
    /// Delivery failures are logged and swallowed. When the in-flight cap
    /// is reached the event is dropped instead of queued. Must be called
    /// within a tokio runtime.
    pub fn report(&self, result: &DetectionResult, ctx: &RequestContext) {
        let Some(api_key) = self.config.api_key() else {
            return;
        };
        let Some(event) = build_event(result, ctx) else {
            return;
        };

        let Ok(permit) = self.in_flight.clone().try_acquire_owned() else {
            debug!("Dropping visit event, collector backlog full");
            return;
        };

        let http = self.http.clone();
        let endpoint = self.config.collector_endpoint.clone();
        let api_key = api_key.to_string();

        tokio::spawn(async move {
            let _permit = permit;
            match send_event(&http, &endpoint, &api_key, &event).await {
                Ok(()) => debug!("Visit event delivered"),
                Err(error) => debug!(%error, "Failed to deliver visit event"),
            }
        });
    }

    /// Deliver one visit event and wait for the outcome. Reports nothing
    /// and succeeds when no API key is configured or the result carries no
    /// event.
    pub async fn post_event(
        &self,
        result: &DetectionResult,
        ctx: &RequestContext,
    ) -> Result<(), TelemetryError> {
        let Some(api_key) = self.config.api_key() else {
            return Ok(());
        };
        let Some(event) = build_event(result, ctx) else {
            return Ok(());
        };

        send_event(&self.http, &self.config.collector_endpoint, api_key, &event).await
    }
}

async fn send_event(
    http: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    event: &VisitEvent,
) -> Result<(), TelemetryError> {
    let response = http
        .post(endpoint)
        .header(API_KEY_HEADER, api_key)
        .json(event)
        .timeout(COLLECTOR_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TelemetryError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{AiReferrer, BotPattern};

    fn bot_result(should_block: bool) -> DetectionResult {
        DetectionResult::Bot {
            should_block,
            matched_pattern: "GPTBot/[0-9]".to_string(),
            info: BotPattern {
                pattern: "GPTBot/[0-9]".to_string(),
                agent_type: "gptbot".to_string(),
                category: "AI Crawler".to_string(),
                subcategory: "Model Training Crawlers".to_string(),
                company: Some("OpenAI".to_string()),
                is_compliant: true,
                is_ai_model_trainer: true,
                intent: "DataCollection".to_string(),
                url: None,
            },
        }
    }

    fn referrer_result() -> DetectionResult {
        DetectionResult::AiReferrer {
            matched_pattern: "chat.openai.com".to_string(),
            info: AiReferrer {
                id: "chatgpt".to_string(),
                name: "ChatGPT".to_string(),
                company: "OpenAI".to_string(),
                url: "https://chat.openai.com".to_string(),
                patterns: vec!["chat.openai.com".to_string()],
                description: String::new(),
            },
        }
    }

    #[test]
    fn test_build_event_for_bot() {
        let ctx = RequestContext {
            url: "https://example.com/blog".to_string(),
            user_agent: "GPTBot/1.2".to_string(),
            ip_address: "203.0.113.7".to_string(),
            path: "/blog".to_string(),
            response_time_ms: 12,
            ..RequestContext::default()
        };

        let event = build_event(&bot_result(false), &ctx).expect("bot event");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["url"], "https://example.com/blog");
        assert_eq!(value["user_agent"], "GPTBot/1.2");
        assert_eq!(value["request_method"], "GET");
        assert_eq!(value["request_path"], "/blog");
        assert_eq!(value["request_body"], "");
        assert_eq!(value["referrer"], serde_json::Value::Null);
        assert_eq!(value["response_status"], 200);
        assert_eq!(value["platform_type"], "rust");

        assert_eq!(value["metadata"]["was_blocked"], false);
        assert_eq!(value["metadata"]["agent_type"], "gptbot");
        assert_eq!(value["metadata"]["agent_category"], "AI Crawler");
        assert_eq!(value["metadata"]["agent_subcategory"], "Model Training Crawlers");
        assert_eq!(value["metadata"]["company"], "OpenAI");
        assert_eq!(value["metadata"]["is_compliant"], true);
        assert_eq!(value["metadata"]["intent"], "DataCollection");
        assert_eq!(value["metadata"]["confidence"], 0.9);
        assert_eq!(value["metadata"]["detection_method"], "pattern_match");
        assert!(value["metadata"].get("source_type").is_none());
    }

    #[test]
    fn test_build_event_blocked_bot_defaults_to_403() {
        let event = build_event(&bot_result(true), &RequestContext::default()).unwrap();
        assert_eq!(event.response_status, 403);
    }

    #[test]
    fn test_build_event_keeps_explicit_status() {
        let ctx = RequestContext {
            response_status: Some(503),
            ..RequestContext::default()
        };
        let event = build_event(&bot_result(true), &ctx).unwrap();
        assert_eq!(event.response_status, 503);
    }

    #[test]
    fn test_build_event_for_ai_referrer() {
        let ctx = RequestContext {
            referrer: Some("https://chat.openai.com/c/abc".to_string()),
            ..RequestContext::default()
        };

        let event = build_event(&referrer_result(), &ctx).expect("referrer event");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["referrer"], "https://chat.openai.com/c/abc");
        assert_eq!(value["response_status"], 200);
        assert_eq!(value["metadata"]["was_blocked"], false);
        assert_eq!(value["metadata"]["source_type"], "ai_referrer");
        assert_eq!(value["metadata"]["referrer_id"], "chatgpt");
        assert_eq!(value["metadata"]["referrer_name"], "ChatGPT");
        assert_eq!(value["metadata"]["company"], "OpenAI");
        assert!(value["metadata"].get("agent_type").is_none());
    }

    #[test]
    fn test_build_event_skips_ordinary_traffic() {
        assert!(build_event(&DetectionResult::None, &RequestContext::default()).is_none());
    }

    #[test]
    fn test_timestamp_format() {
        let event = build_event(&bot_result(false), &RequestContext::default()).unwrap();
        let re = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap();
        assert!(re.is_match(&event.timestamp), "timestamp: {}", event.timestamp);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-forwarded-for".to_string(),
            "127.0.0.1, 203.0.113.7, 10.0.0.1".to_string(),
        );
        headers.insert("x-real-ip".to_string(), "198.51.100.2".to_string());

        let ip = client_ip_from_headers(&headers, Some("192.0.2.1".parse().unwrap()));
        assert_eq!(ip, "203.0.113.7");
    }

    #[test]
    fn test_client_ip_skips_unparseable_values() {
        let mut headers = BTreeMap::new();
        headers.insert("x-forwarded-for".to_string(), "unknown".to_string());
        headers.insert("x-real-ip".to_string(), "198.51.100.2".to_string());

        let ip = client_ip_from_headers(&headers, None);
        assert_eq!(ip, "198.51.100.2");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = BTreeMap::new();
        assert_eq!(
            client_ip_from_headers(&headers, Some("192.0.2.1".parse().unwrap())),
            "192.0.2.1"
        );
        assert_eq!(client_ip_from_headers(&headers, None), "");
    }
}
