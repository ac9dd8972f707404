//! Contract with the messaging-session library.
//!
//! The session library owns the connection, the credential files and the
//! wire protocol. The relay only consumes the events it emits and asks it to
//! send text, persist credentials, or wipe them.

pub mod jid;
pub mod pairing;
#[cfg(feature = "channel-whatsapp")]
pub mod whatsapp;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::info;

/// A message delivered by the session library. Consumed once, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation identifier the reply goes back to.
    pub sender_id: String,
    /// Plain text body.
    pub conversation: Option<String>,
    /// Text of an extended (quoted, link-preview) message.
    pub extended_text: Option<String>,
    /// False for stub/protocol records that carry no message payload.
    pub has_content: bool,
    pub from_me: bool,
    pub is_group: bool,
}

impl InboundMessage {
    /// First non-empty text: the plain body, then the extended text.
    pub fn text(&self) -> Option<&str> {
        self.conversation
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.extended_text.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The account unlinked this device. Credentials are no longer valid.
    LoggedOut,
    /// Any other cause, with the library's status code when it has one.
    Other(Option<u16>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub phase: Option<ConnectionPhase>,
    /// QR payload the operator must scan to link a new session.
    pub pairing_challenge: Option<String>,
    pub disconnect_reason: Option<DisconnectReason>,
}

impl ConnectionUpdate {
    pub fn open() -> Self {
        Self {
            phase: Some(ConnectionPhase::Open),
            ..Self::default()
        }
    }

    pub fn closed(reason: DisconnectReason) -> Self {
        Self {
            phase: Some(ConnectionPhase::Close),
            disconnect_reason: Some(reason),
            ..Self::default()
        }
    }

    pub fn pairing(challenge: impl Into<String>) -> Self {
        Self {
            pairing_challenge: Some(challenge.into()),
            ..Self::default()
        }
    }

    pub fn is_logged_out(&self) -> bool {
        self.disconnect_reason == Some(DisconnectReason::LoggedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CredentialsUpdated,
    ConnectionUpdate(ConnectionUpdate),
    /// Numeric pairing code, the alternative to scanning a QR code.
    PairingCode(String),
    /// Ordered batch of inbound records.
    MessagesReceived(Vec<InboundMessage>),
}

#[async_trait]
pub trait SessionClient: Send + Sync {
    fn name(&self) -> &str;

    /// Open a session, reusing persisted credentials when present.
    ///
    /// Events for this session arrive on the returned receiver until the
    /// connection closes.
    async fn connect(&self) -> Result<mpsc::Receiver<SessionEvent>>;

    /// Tear down the current session, if any, before a reconnect.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Save credentials after the library rotated them.
    async fn persist_credentials(&self) -> Result<()> {
        Ok(())
    }

    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;

    /// Delete stored credentials so the next `connect` starts a fresh pairing.
    async fn reset_credentials(&self) -> Result<()>;
}

/// Remove a session credential directory. Returns whether anything was deleted.
pub fn reset_session_dir(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(path)
        .with_context(|| format!("Failed to remove session directory {}", path.display()))?;
    info!("removed session credentials at {}", path.display());
    Ok(true)
}
