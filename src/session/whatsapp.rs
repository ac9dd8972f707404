//! WhatsApp Web session backed by `wa-rs`.
//!
//! Credentials live in an SQLite store inside the session directory and are
//! written by the library itself; `persist_credentials` has nothing to flush.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use wa_rs::bot::Bot;
use wa_rs::client::Client;
use wa_rs::proto_helpers::MessageExt;
use wa_rs::store::SqliteStore;
use wa_rs::types::events::Event;
use wa_rs::wa_rs_proto::whatsapp as wa;
use wa_rs_tokio_transport::TokioWebSocketTransportFactory;
use wa_rs_ureq_http::UreqHttpClient;

use super::jid::normalize_jid;
use super::{ConnectionUpdate, DisconnectReason, InboundMessage, SessionClient, SessionEvent};

const SESSION_DB: &str = "whatsapp.db";

/// Events buffered between the library callback and the relay.
const EVENT_BUFFER: usize = 256;

pub struct WhatsAppSession {
    session_path: PathBuf,
    client: Arc<Mutex<Option<Arc<Client>>>>,
    bot_task: Mutex<Option<AbortHandle>>,
}

impl WhatsAppSession {
    pub fn new(session_path: PathBuf) -> Self {
        Self {
            session_path,
            client: Arc::new(Mutex::new(None)),
            bot_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionClient for WhatsAppSession {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn connect(&self) -> Result<mpsc::Receiver<SessionEvent>> {
        self.disconnect().await?;

        crate::utils::ensure_dir(&self.session_path)?;
        let session_db = self.session_path.join(SESSION_DB);
        let session_db_str = session_db.to_string_lossy().to_string();
        debug!("WhatsApp session database path: {}", session_db_str);

        let backend = Arc::new(
            SqliteStore::new(&session_db_str)
                .await
                .with_context(|| format!("Failed to open session store {}", session_db_str))?,
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let event_tx = tx.clone();
        let client_storage = self.client.clone();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .on_event(move |event, client| {
                let event_tx = event_tx.clone();
                let client_storage = client_storage.clone();
                async move {
                    // Reconnects are driven by the relay controller.
                    client.enable_auto_reconnect.store(false, Ordering::Relaxed);
                    *client_storage.lock().await = Some(client.clone());

                    let Some(mapped) = map_event(&event) else {
                        debug!(
                            "WhatsApp event (not handled): {:?}",
                            std::mem::discriminant(&event)
                        );
                        return;
                    };
                    if event_tx.send(mapped).await.is_err() {
                        debug!("session event receiver dropped");
                    }
                }
            })
            .build()
            .await
            .context("Failed to build WhatsApp bot")?;

        let handle = bot
            .run()
            .await
            .map_err(|e| anyhow!("Failed to start WhatsApp bot: {}", e))?;
        *self.bot_task.lock().await = Some(handle.abort_handle());
        info!("WhatsApp session starting");

        // The library's run loop ending means the connection is gone for good.
        tokio::spawn(async move {
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                error!("WhatsApp bot handle error: {}", e);
            }
            let _ = tx
                .send(SessionEvent::ConnectionUpdate(ConnectionUpdate::closed(
                    DisconnectReason::Other(None),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        // The library's keepalive task holds its own client handle, so the
        // transport has to be closed explicitly before the run task goes.
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.disconnect().await;
        }
        if let Some(task) = self.bot_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    async fn persist_credentials(&self) -> Result<()> {
        debug!("WhatsApp credentials are persisted by the session store");
        Ok(())
    }

    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        let client = self
            .client
            .lock()
            .await
            .clone()
            .context("WhatsApp client not connected")?;

        let jid_str = normalize_jid(recipient);
        let jid = wa_rs::Jid::from_str(&jid_str)
            .map_err(|e| anyhow!("Invalid WhatsApp recipient '{}': {}", jid_str, e))?;
        let message = wa::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };

        match Box::pin(client.send_message(jid.clone(), message)).await {
            Ok(msg_id) => {
                debug!("WhatsApp message sent to {}: id={}", jid, msg_id);
                Ok(())
            }
            Err(e) => Err(anyhow!("WhatsApp send to {} failed: {}", jid, e)),
        }
    }

    async fn reset_credentials(&self) -> Result<()> {
        self.disconnect().await?;
        super::reset_session_dir(&self.session_path)?;
        Ok(())
    }
}

pub(crate) fn map_event(event: &Event) -> Option<SessionEvent> {
    match event {
        Event::Message(msg, info) => {
            let has_content = **msg != wa::Message::default();
            let base = msg.get_base_message();
            Some(SessionEvent::MessagesReceived(vec![InboundMessage {
                sender_id: info.source.chat.to_string(),
                conversation: base.conversation.clone(),
                extended_text: base
                    .extended_text_message
                    .as_ref()
                    .and_then(|ext| ext.text.clone()),
                has_content,
                from_me: info.source.is_from_me,
                is_group: info.source.is_group,
            }]))
        }
        Event::PairingQrCode { code, .. } => Some(SessionEvent::ConnectionUpdate(
            ConnectionUpdate::pairing(code.clone()),
        )),
        Event::PairingCode { code, .. } => Some(SessionEvent::PairingCode(code.clone())),
        Event::PairSuccess(_) => {
            info!("WhatsApp pairing successful");
            Some(SessionEvent::CredentialsUpdated)
        }
        Event::PairError(pair_error) => {
            error!("WhatsApp pairing failed: {:?}", pair_error);
            None
        }
        Event::Connected(_) => Some(SessionEvent::ConnectionUpdate(ConnectionUpdate::open())),
        Event::LoggedOut(_) => Some(SessionEvent::ConnectionUpdate(ConnectionUpdate::closed(
            DisconnectReason::LoggedOut,
        ))),
        Event::Disconnected(_) => {
            warn!("WhatsApp disconnected");
            Some(SessionEvent::ConnectionUpdate(ConnectionUpdate::closed(
                DisconnectReason::Other(None),
            )))
        }
        _ => None,
    }
}
