use thiserror::Error;

/// Typed error hierarchy for hookrelay.
///
/// Use at module boundaries (webhook calls, session backend, config validation).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pairing required: {0}")]
    PairingRequired(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Webhook request failed: {0}")]
    Network(String),

    #[error("Webhook responded with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Webhook response has no reply, text or output field")]
    MalformedReply,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `RelayError`.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Whether the session supervisor should retry after this error.
    ///
    /// Webhook failures are terminal for the message that caused them and
    /// are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Session(_) | Self::Internal(_) => true,
            Self::Config(_)
            | Self::PairingRequired(_)
            | Self::Network(_)
            | Self::Upstream { .. }
            | Self::MalformedReply => false,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("timed out: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}
