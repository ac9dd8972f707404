//! Outbound client for the automation webhook.
//!
//! One POST per inbound message; the response body is decoded once into a
//! [`ReplySource`] with a fixed field precedence.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::WebhookConfig;
use crate::errors::{RelayError, RelayResult};
use crate::utils::http::{http_client, limited_body, limited_text};

/// Max accepted response body: 1 MB.
const MAX_RESPONSE_BYTES: usize = 1_048_576;

/// Max characters of an error body kept in `RelayError::Upstream`.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Payload POSTed to the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookRequest<'a> {
    pub from: &'a str,
    pub message: &'a str,
}

/// Where the reply text came from in the webhook response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Reply(String),
    Text(String),
    Output(String),
    /// The whole body was a plain string.
    RawString(String),
    None,
}

impl ReplySource {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Reply(s) | Self::Text(s) | Self::Output(s) | Self::RawString(s) => Some(s),
            Self::None => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reply(_) => "reply",
            Self::Text(_) => "text",
            Self::Output(_) => "output",
            Self::RawString(_) => "raw",
            Self::None => "none",
        }
    }
}

/// Decode a webhook response body.
///
/// Precedence: `reply`, then `text`, then `output` (first non-empty string
/// wins), then the body itself when it is a JSON string literal or not JSON
/// at all. Objects without a populated field, arrays, numbers and empty
/// bodies decode to [`ReplySource::None`].
pub fn decode_reply(body: &str) -> ReplySource {
    if body.trim().is_empty() {
        return ReplySource::None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            let field = |name: &str| match map.get(name) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            };
            if let Some(s) = field("reply") {
                ReplySource::Reply(s)
            } else if let Some(s) = field("text") {
                ReplySource::Text(s)
            } else if let Some(s) = field("output") {
                ReplySource::Output(s)
            } else {
                ReplySource::None
            }
        }
        Ok(Value::String(s)) if !s.is_empty() => ReplySource::RawString(s),
        Ok(_) => ReplySource::None,
        Err(_) => ReplySource::RawString(body.to_string()),
    }
}

pub struct WebhookClient {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> RelayResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RelayError::Config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                RelayError::Config(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            client: http_client(config.timeout())?,
            url: config.url.clone(),
            headers,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward one message and return the reply text, if the webhook produced one.
    pub async fn relay(&self, sender_id: &str, text: &str) -> RelayResult<Option<String>> {
        Ok(self.post(sender_id, text).await?.into_text())
    }

    /// Forward one message and return the decoded reply with its source field.
    pub async fn post(&self, sender_id: &str, text: &str) -> RelayResult<ReplySource> {
        let payload = WebhookRequest {
            from: sender_id,
            message: text,
        };

        debug!("POST {} from={} message_len={}", self.url, sender_id, text.len());
        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = limited_text(resp, MAX_RESPONSE_BYTES)
                .await
                .unwrap_or_default();
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let (bytes, truncated) = limited_body(resp, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| RelayError::Network(format!("failed to read response body: {e}")))?;
        if truncated {
            // A cut body cannot be decoded; never relay a fragment.
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                body: format!("response body exceeds {} bytes", MAX_RESPONSE_BYTES),
            });
        }
        let body = String::from_utf8_lossy(&bytes);
        info!("webhook response: {}", body);

        let reply = decode_reply(&body);
        debug!("webhook reply source: {}", reply.kind());
        Ok(reply)
    }
}
