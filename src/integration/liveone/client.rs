//! LiveOne push client.
//! Validates the push configuration and performs the `test` and `store`
//! POSTs against `<server>/api/push/fronius`.

use super::error::{ConfigError, Error, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Timeout for the startup self-test POST.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the per-minute store POST.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated push configuration from the `LIVEONE_*` environment trio.
#[derive(Debug, Clone, PartialEq)]
pub struct PushConfig {
    pub api_key: String,
    pub server: Url,
    pub enabled: bool,
}

impl PushConfig {
    /// Validates the raw environment values.
    ///
    /// Returns `None` when all three are unset (the client is silently
    /// absent). When at least one is set, all three must be valid; every
    /// violated rule is reported.
    pub fn from_values(
        api_key: Option<&str>,
        server: Option<&str>,
        enabled: Option<&str>,
    ) -> Option<std::result::Result<Self, Vec<ConfigError>>> {
        if api_key.is_none() && server.is_none() && enabled.is_none() {
            return None;
        }
        let mut issues = Vec::new();

        let api_key = match api_key {
            Some(key) if key.starts_with("fr_") => Some(key.to_string()),
            _ => {
                issues.push(ConfigError::InvalidApiKey);
                None
            }
        };
        let server = match server {
            Some(text)
                if {
                    let lower = text.to_ascii_lowercase();
                    lower.starts_with("http://") || lower.starts_with("https://")
                } =>
            {
                match Url::parse(text) {
                    Ok(url) => Some(url),
                    Err(_) => {
                        issues.push(ConfigError::InvalidServer);
                        None
                    }
                }
            }
            _ => {
                issues.push(ConfigError::InvalidServer);
                None
            }
        };
        let enabled = match enabled {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => {
                issues.push(ConfigError::InvalidEnabled);
                None
            }
        };

        match (api_key, server, enabled) {
            (Some(api_key), Some(server), Some(enabled)) => Some(Ok(PushConfig {
                api_key,
                server,
                enabled,
            })),
            _ => Some(Err(issues)),
        }
    }

    /// The effective ingestion endpoint.
    pub fn endpoint(&self) -> Url {
        let base = self.server.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/api/push/fronius")).expect("cannot build push endpoint URL")
    }
}

/// Wire shape of every push response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// How one `store` POST ended. The caller decides what each outcome does to
/// the client state.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// 2xx with `success: true`.
    Stored(PushResponse),
    /// 2xx but the server flagged `success: false`.
    Refused(PushResponse),
    /// 400 — malformed payload; keep going.
    BadRequest,
    /// 401 — bad api key; the client must latch off.
    Unauthorized,
    /// 404 — wrong endpoint; the client must latch off.
    NotFound,
    /// 409 — duplicate timestamp; keep going.
    Duplicate,
    /// Any other HTTP status; keep going.
    HttpError(u16),
}

pub struct Client {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl Client {
    /// Creates a new instance of `Client` from a validated configuration.
    pub fn new(http: reqwest::Client, config: &PushConfig) -> Self {
        Client {
            http,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
        }
    }

    /// Startup self-test: POST `{apiKey, action: "test"}`.
    pub async fn test(&self) -> Result<PushResponse> {
        let body = json!({"apiKey": self.api_key, "action": "test"});
        log::debug!("POST {} action=test", self.endpoint);
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .timeout(TEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let parsed = response.json::<PushResponse>().await?;
        Ok(parsed)
    }

    /// Stores one minutely report: POST `{…report, apiKey, action: "store"}`.
    pub async fn store(&self, report: &Value) -> Result<PushOutcome> {
        let mut body = report.clone();
        if let Some(map) = body.as_object_mut() {
            map.insert("apiKey".to_string(), json!(self.api_key));
            map.insert("action".to_string(), json!("store"));
        }
        log::debug!("POST {} action=store", self.endpoint);
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .timeout(STORE_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let parsed = response.json::<PushResponse>().await.unwrap_or_default();
            if parsed.success {
                return Ok(PushOutcome::Stored(parsed));
            }
            return Ok(PushOutcome::Refused(parsed));
        }
        Ok(match status {
            StatusCode::BAD_REQUEST => PushOutcome::BadRequest,
            StatusCode::UNAUTHORIZED => PushOutcome::Unauthorized,
            StatusCode::NOT_FOUND => PushOutcome::NotFound,
            StatusCode::CONFLICT => PushOutcome::Duplicate,
            other => PushOutcome::HttpError(other.as_u16()),
        })
    }
}
