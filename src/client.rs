//! OpenRouter HTTP API client.
//!
//! Sends chat completions (prompt + captured image) and reads key usage. Base URL precedence:
//! config `api_base_url`, then the `SNIP2EXCEL_API_BASE_URL` env var, then the public endpoint.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::prompt::ChatRequest;

/// Default API base URL when not set in config or env.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const BASE_URL_ENV: &str = "SNIP2EXCEL_API_BASE_URL";
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);
const USAGE_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_KEY_LEN: usize = 20;
const KEY_PREFIX: &str = "sk-";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("Could not reach {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("Invalid response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Response has no message content")]
    MissingContent,
}

/// Credit usage of the configured key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyUsage {
    #[serde(default)]
    pub usage: f64,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default = "default_free_tier")]
    pub is_free_tier: bool,
}

fn default_free_tier() -> bool {
    true
}

#[derive(Deserialize)]
struct KeyResponse {
    data: KeyUsage,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Resolves the API base URL from config, env, or the default.
pub fn resolve_base_url(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(BASE_URL_ENV).ok().filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Cheap local check before asking the server: trimmed, long enough, `sk-` prefix.
pub fn is_plausible_key(key: &str) -> bool {
    let key = key.trim();
    key.len() >= MIN_KEY_LEN && key.starts_with(KEY_PREFIX)
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(api_key: &str, base_url: String) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            base_url,
        })
    }

    /// POST /chat/completions. Returns `choices[0].message.content`.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        info!(model = %request.model, "Sending chat completion request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(COMPLETION_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;

        let body = read_success_body(resp, &url).await?;
        let content = parse_completion(&body)?;
        info!(len = content.len(), "Chat completion received");
        Ok(content)
    }

    /// GET /key. Usage and limit of the current key.
    pub async fn key_usage(&self) -> Result<KeyUsage, ApiError> {
        let url = format!("{}/key", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(USAGE_TIMEOUT)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;

        let body = read_success_body(resp, &url).await?;
        let usage = parse_key_usage(&body)?;
        debug!(usage = usage.usage, limit = ?usage.limit, "Key usage fetched");
        Ok(usage)
    }

    /// Plausibility check plus a round trip to the usage endpoint.
    pub async fn validate_key(&self) -> bool {
        if !is_plausible_key(&self.api_key) {
            debug!("API key rejected by local format check");
            return false;
        }
        match self.key_usage().await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "API key validation failed");
                false
            }
        }
    }
}

async fn read_success_body(resp: reqwest::Response, url: &str) -> Result<String, ApiError> {
    let status = resp.status();
    let body = resp.text().await.map_err(|source| ApiError::Request {
        url: url.to_string(),
        source,
    })?;
    if status.is_success() {
        return Ok(body);
    }
    warn!(%status, "API returned error status");
    Err(ApiError::Status {
        status,
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

pub(crate) fn parse_completion(body: &str) -> Result<String, ApiError> {
    let parsed: CompletionResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or(ApiError::MissingContent)
}

pub(crate) fn parse_key_usage(body: &str) -> Result<KeyUsage, ApiError> {
    let parsed: KeyResponse = serde_json::from_str(body)?;
    Ok(parsed.data)
}

/// How much of the credit limit is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLevel {
    Low,
    Medium,
    High,
}

/// Display-ready view of [`KeyUsage`].
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSummary {
    /// Percent of the limit used; `None` for keys without a limit.
    pub percent: Option<f64>,
    pub level: Option<UsageLevel>,
    pub label: String,
}

impl From<&KeyUsage> for UsageSummary {
    fn from(usage: &KeyUsage) -> Self {
        match usage.limit.filter(|limit| *limit > 0.0) {
            Some(limit) => {
                let percent = usage.usage / limit * 100.0;
                let level = if percent < 50.0 {
                    UsageLevel::Low
                } else if percent < 80.0 {
                    UsageLevel::Medium
                } else {
                    UsageLevel::High
                };
                Self {
                    percent: Some(percent),
                    level: Some(level),
                    label: format!("{:.2}/{:.0}$ used", usage.usage, limit),
                }
            }
            None => {
                let tier = if usage.is_free_tier { "Free" } else { "Unlimited" };
                Self {
                    percent: None,
                    level: None,
                    label: format!("{tier}: {:.2}$ used", usage.usage),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = r#"{"id":"x","choices":[{"message":{"role":"assistant","content":"a\tb"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "a\tb");
    }

    #[test]
    fn test_parse_completion_without_content() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(ApiError::MissingContent)
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(ApiError::MissingContent)
        ));
        assert!(matches!(parse_completion("<html>"), Err(ApiError::Json(_))));
    }

    #[test]
    fn test_parse_key_usage_defaults() {
        let usage = parse_key_usage(r#"{"data":{"usage":1.5,"limit":null}}"#).unwrap();
        assert_eq!(
            usage,
            KeyUsage {
                usage: 1.5,
                limit: None,
                is_free_tier: true
            }
        );
    }

    #[test]
    fn test_error_message_prefers_api_message() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Invalid credentials","code":401}}"#),
            "Invalid credentials"
        );
        assert_eq!(error_message(" Bad gateway \n"), "Bad gateway");
    }

    #[test]
    fn test_plausible_key() {
        assert!(is_plausible_key("  sk-or-v1-0123456789abcdef  "));
        assert!(!is_plausible_key("sk-short"));
        assert!(!is_plausible_key("pk-or-v1-0123456789abcdef"));
        assert!(!is_plausible_key(""));
    }

    #[test]
    fn test_resolve_base_url_prefers_config() {
        assert_eq!(
            resolve_base_url(Some("http://localhost:9000/api/")),
            "http://localhost:9000/api"
        );
    }

    #[test]
    fn test_usage_summary_levels() {
        let summary = UsageSummary::from(&KeyUsage {
            usage: 4.5,
            limit: Some(5.0),
            is_free_tier: false,
        });
        assert_eq!(summary.level, Some(UsageLevel::High));
        assert_eq!(summary.label, "4.50/5$ used");

        let summary = UsageSummary::from(&KeyUsage {
            usage: 2.0,
            limit: Some(8.0),
            is_free_tier: false,
        });
        assert_eq!(summary.level, Some(UsageLevel::Low));
        assert_eq!(summary.percent, Some(25.0));

        let summary = UsageSummary::from(&KeyUsage {
            usage: 6.0,
            limit: Some(10.0),
            is_free_tier: true,
        });
        assert_eq!(summary.level, Some(UsageLevel::Medium));
    }

    #[test]
    fn test_usage_summary_without_limit() {
        let free = UsageSummary::from(&KeyUsage {
            usage: 0.5,
            limit: None,
            is_free_tier: true,
        });
        assert_eq!(free.label, "Free: 0.50$ used");
        assert_eq!(free.percent, None);

        let paid = UsageSummary::from(&KeyUsage {
            usage: 2.0,
            limit: Some(0.0),
            is_free_tier: false,
        });
        assert_eq!(paid.label, "Unlimited: 2.00$ used");
    }
}
