use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::errors::RelayError;

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Local n8n instance, production webhook path.
pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/hookrelay";

fn default_webhook_url() -> String {
    DEFAULT_WEBHOOK_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    /// Extra headers sent with every request (e.g. an auth header for the workflow).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            timeout_secs: default_timeout_secs(),
            headers: BTreeMap::new(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .keys()
            .map(|k| (k.as_str(), "[REDACTED]"))
            .collect();
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .field("headers", &headers)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

fn default_reply_delay_min_ms() -> u64 {
    2000
}

fn default_reply_delay_max_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Lower bound of the randomized pause before a reply is sent.
    #[serde(default = "default_reply_delay_min_ms", rename = "replyDelayMinMs")]
    pub reply_delay_min_ms: u64,
    #[serde(default = "default_reply_delay_max_ms", rename = "replyDelayMaxMs")]
    pub reply_delay_max_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reply_delay_min_ms: default_reply_delay_min_ms(),
            reply_delay_max_ms: default_reply_delay_max_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicyKind {
    #[default]
    Fixed,
    Exponential,
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub policy: ReconnectPolicyKind,
    #[serde(default = "default_base_delay_secs", rename = "baseDelaySecs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs", rename = "maxDelaySecs")]
    pub max_delay_secs: u64,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    #[serde(default, rename = "maxAttempts")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicyKind::Fixed,
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn default_session_path() -> String {
    "~/.hookrelay/session".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: String,
    /// Wipe stored credentials on every start, forcing a fresh pairing.
    #[serde(default, rename = "resetOnStart")]
    pub reset_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            reset_on_start: false,
        }
    }
}

impl SessionConfig {
    pub fn session_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_body() -> String {
    "Bot is running".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body")]
    pub body: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            body: default_body(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RelayError> {
        self.validate_webhook()?;
        self.validate_relay()?;
        self.validate_reconnect()?;
        self.validate_liveness()?;
        Ok(())
    }

    fn validate_webhook(&self) -> Result<(), RelayError> {
        let w = &self.webhook;
        if w.url.trim().is_empty() {
            return Err(RelayError::Config(
                "webhook.url is required (or set HOOKRELAY_WEBHOOK_URL)".into(),
            ));
        }
        let parsed = url::Url::parse(&w.url)
            .map_err(|e| RelayError::Config(format!("webhook.url is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!(
                "webhook.url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(RelayError::Config("webhook.url has no host".into()));
        }
        if w.timeout_secs == 0 {
            return Err(RelayError::Config("webhook.timeoutSecs must be > 0".into()));
        }
        if w.timeout_secs > 300 {
            warn!(
                "webhook.timeoutSecs is very long ({}s), slow workflows will hold tasks open",
                w.timeout_secs
            );
        }
        for name in w.headers.keys() {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(RelayError::Config(format!(
                    "webhook.headers contains an invalid header name '{name}'"
                )));
            }
        }
        Ok(())
    }

    fn validate_relay(&self) -> Result<(), RelayError> {
        let r = &self.relay;
        if r.reply_delay_min_ms > r.reply_delay_max_ms {
            return Err(RelayError::Config(
                "relay.replyDelayMinMs must be <= relay.replyDelayMaxMs".into(),
            ));
        }
        Ok(())
    }

    fn validate_reconnect(&self) -> Result<(), RelayError> {
        let r = &self.reconnect;
        if r.policy == ReconnectPolicyKind::Exponential {
            if r.base_delay_secs == 0 {
                return Err(RelayError::Config(
                    "reconnect.baseDelaySecs must be > 0 for exponential backoff".into(),
                ));
            }
            if r.base_delay_secs > r.max_delay_secs {
                return Err(RelayError::Config(
                    "reconnect.baseDelaySecs must be <= reconnect.maxDelaySecs".into(),
                ));
            }
        }
        if r.max_attempts == Some(0) {
            return Err(RelayError::Config(
                "reconnect.maxAttempts must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    fn validate_liveness(&self) -> Result<(), RelayError> {
        let l = &self.liveness;
        if l.enabled && l.port == 0 {
            return Err(RelayError::Config("liveness.port must be > 0".into()));
        }
        Ok(())
    }
}
