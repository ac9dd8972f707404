// Shared test helpers; not every test binary uses every item.
#![allow(unused)]

use async_trait::async_trait;
use hookrelay::config::{ReconnectPolicyKind, WebhookConfig};
use hookrelay::errors::RelayError;
use hookrelay::relay::{ReconnectPolicy, RelayController, RelayHandler, ReplyDelay};
use hookrelay::session::{
    ConnectionUpdate, DisconnectReason, InboundMessage, SessionClient, SessionEvent,
};
use hookrelay::webhook::WebhookClient;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Events emitted by one `connect` call.
pub struct Script {
    pub events: Vec<SessionEvent>,
    /// Keep the stream open after the events instead of ending it.
    pub keep_open: bool,
}

impl Script {
    pub fn ends(events: Vec<SessionEvent>) -> Self {
        Self {
            events,
            keep_open: false,
        }
    }

    pub fn stays_open(events: Vec<SessionEvent>) -> Self {
        Self {
            events,
            keep_open: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub text: String,
}

/// In-memory session: replays one script per `connect` and records sends.
///
/// `connect` fails with a retryable `RelayError::Session` once the scripts run out.
#[derive(Default)]
pub struct MockSession {
    pub scripts: std::sync::Mutex<VecDeque<Script>>,
    pub held: std::sync::Mutex<Vec<mpsc::Sender<SessionEvent>>>,
    pub sent: std::sync::Mutex<Vec<SentMessage>>,
    pub connects: AtomicUsize,
    pub persists: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub resets: AtomicUsize,
    pub fail_sends: bool,
    /// `connect` fails with `RelayError::PairingRequired`.
    pub pairing_required: bool,
}

impl MockSession {
    pub fn with_scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: std::sync::Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn persists(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionClient for MockSession {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> anyhow::Result<mpsc::Receiver<SessionEvent>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.pairing_required {
            return Err(RelayError::PairingRequired("no stored credentials".into()).into());
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RelayError::Session("no more scripted sessions".into()))?;

        let (tx, rx) = mpsc::channel(script.events.len().max(1));
        for event in script.events {
            tx.try_send(event)?;
        }
        if script.keep_open {
            self.held.lock().unwrap().push(tx);
        }
        Ok(rx)
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.held.lock().unwrap().clear();
        Ok(())
    }

    async fn persist_credentials(&self) -> anyhow::Result<()> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_text(&self, recipient: &str, text: &str) -> anyhow::Result<()> {
        if self.fail_sends {
            anyhow::bail!("send rejected");
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn reset_credentials(&self) -> anyhow::Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn direct_message(sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        sender_id: sender.to_string(),
        conversation: Some(text.to_string()),
        has_content: true,
        ..InboundMessage::default()
    }
}

pub fn open() -> SessionEvent {
    SessionEvent::ConnectionUpdate(ConnectionUpdate::open())
}

pub fn closed() -> SessionEvent {
    SessionEvent::ConnectionUpdate(ConnectionUpdate::closed(DisconnectReason::Other(Some(
        428,
    ))))
}

pub fn logged_out() -> SessionEvent {
    SessionEvent::ConnectionUpdate(ConnectionUpdate::closed(DisconnectReason::LoggedOut))
}

pub fn webhook_client(url: &str) -> Arc<WebhookClient> {
    let config = WebhookConfig {
        url: url.to_string(),
        ..WebhookConfig::default()
    };
    Arc::new(WebhookClient::new(&config).unwrap())
}

pub fn no_delay() -> ReplyDelay {
    ReplyDelay {
        min_ms: 0,
        max_ms: 0,
    }
}

/// Immediate fixed-delay reconnects.
pub fn instant_reconnect(max_attempts: Option<u32>) -> ReconnectPolicy {
    ReconnectPolicy {
        kind: ReconnectPolicyKind::Fixed,
        base_delay_secs: 0,
        max_delay_secs: 0,
        max_attempts,
    }
}

pub fn handler(session: &Arc<MockSession>, webhook_url: &str, delay: ReplyDelay) -> Arc<RelayHandler> {
    let session: Arc<dyn SessionClient> = session.clone();
    Arc::new(RelayHandler::new(session, webhook_client(webhook_url), delay))
}

pub fn controller(
    session: &Arc<MockSession>,
    webhook_url: &str,
    policy: ReconnectPolicy,
) -> RelayController {
    let dyn_session: Arc<dyn SessionClient> = session.clone();
    RelayController::new(dyn_session, handler(session, webhook_url, no_delay()), policy)
}

/// Poll until `cond` holds or two seconds pass.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    cond()
}
