use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::policy::ReplyDelay;
use crate::errors::RelayError;
use crate::session::jid::is_group_jid;
use crate::session::{InboundMessage, SessionClient};
use crate::webhook::WebhookClient;

/// Why an inbound message was dropped before reaching the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    NoContent,
    FromSelf,
    Group,
    EmptyText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Filtered(FilterReason),
    /// Reply delivered to the sender.
    Replied,
    /// Webhook answered without a usable reply.
    NoReply,
    /// Webhook call or reply delivery failed.
    Failed,
}

/// Apply the discard filters in order and return the text to forward.
pub fn filter_message(msg: &InboundMessage) -> Result<&str, FilterReason> {
    if !msg.has_content {
        return Err(FilterReason::NoContent);
    }
    if msg.from_me {
        return Err(FilterReason::FromSelf);
    }
    if msg.is_group || is_group_jid(&msg.sender_id) {
        return Err(FilterReason::Group);
    }
    msg.text().ok_or(FilterReason::EmptyText)
}

/// Forwards inbound messages to the webhook and sends back its reply.
pub struct RelayHandler {
    session: Arc<dyn SessionClient>,
    webhook: Arc<WebhookClient>,
    delay: ReplyDelay,
}

impl RelayHandler {
    pub fn new(
        session: Arc<dyn SessionClient>,
        webhook: Arc<WebhookClient>,
        delay: ReplyDelay,
    ) -> Self {
        Self {
            session,
            webhook,
            delay,
        }
    }

    /// Relay the first message of a batch on its own task.
    ///
    /// Returns `None` for an empty batch. The rest of the batch is ignored.
    pub fn dispatch(
        self: &Arc<Self>,
        batch: Vec<InboundMessage>,
    ) -> Option<JoinHandle<RelayOutcome>> {
        let msg = batch.into_iter().next()?;
        let handler = Arc::clone(self);
        Some(tokio::spawn(async move { handler.handle_message(msg).await }))
    }

    /// Filter, forward, wait, reply. Never returns an error: every failure is
    /// logged and ends processing of this message.
    pub async fn handle_message(&self, msg: InboundMessage) -> RelayOutcome {
        let text = match filter_message(&msg) {
            Ok(text) => text,
            Err(reason) => {
                debug!("dropping message from {}: {:?}", msg.sender_id, reason);
                return RelayOutcome::Filtered(reason);
            }
        };
        let sender = msg.sender_id.as_str();

        info!("📩 Message received from {}: {}", sender, text);

        let reply = match self.webhook.relay(sender, text).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!(
                    "⚠️ {} (from {}), no reply sent",
                    RelayError::MalformedReply,
                    sender
                );
                return RelayOutcome::NoReply;
            }
            Err(RelayError::Upstream { status, body }) => {
                error!("❌ webhook responded with error: {}", status);
                error!("❌ Response body: {}", body);
                return RelayOutcome::Failed;
            }
            Err(e) => {
                error!("❌ webhook request failed: {}", e);
                return RelayOutcome::Failed;
            }
        };

        let pause = self.delay.sample();
        debug!("waiting {:?} before replying to {}", pause, sender);
        tokio::time::sleep(pause).await;

        match self.session.send_text(sender, &reply).await {
            Ok(()) => {
                info!("📤 Reply sent to {}: {}", sender, reply);
                RelayOutcome::Replied
            }
            Err(e) => {
                error!("failed to send reply to {}: {:#}", sender, e);
                RelayOutcome::Failed
            }
        }
    }
}
