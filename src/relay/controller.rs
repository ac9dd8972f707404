use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::handler::RelayHandler;
use super::policy::{ConnectionState, ReconnectPolicy};
use crate::errors::{RelayError, RelayResult};
use crate::session::{ConnectionPhase, SessionClient, SessionEvent, pairing};

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The account unlinked this device; credentials must be reset.
    LoggedOut,
    /// The shutdown future completed.
    Shutdown,
}

/// How one connect..close cycle ended.
enum SessionEnd {
    Closed { connected: bool },
    LoggedOut,
    /// `connect` failed with an error retrying cannot fix.
    Fatal(RelayError),
}

/// Owns the session lifecycle and routes inbound batches to the handler.
///
/// A close that is not a logout schedules a reconnect according to the
/// [`ReconnectPolicy`]; a logout ends the run.
pub struct RelayController {
    session: Arc<dyn SessionClient>,
    handler: Arc<RelayHandler>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
}

impl RelayController {
    pub fn new(
        session: Arc<dyn SessionClient>,
        handler: Arc<RelayHandler>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Starting);
        Self {
            session,
            handler,
            policy,
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes (used by the health endpoint).
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!("connection state {} -> {}", current, state);
                *current = state;
                true
            }
        });
    }

    /// Run until logged out, the retry cap is hit, or `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RelayResult<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            () = shutdown => {
                info!("shutdown requested");
                if let Err(e) = self.session.disconnect().await {
                    warn!("session disconnect failed: {:#}", e);
                }
                Ok(RunOutcome::Shutdown)
            }
        }
    }

    /// Supervised connect loop.
    ///
    /// Returns `Ok(LoggedOut)` on logout and `Err(Session)` once the policy's
    /// attempt cap is exhausted. A connect failure that is not
    /// [`RelayError::is_retryable`] is returned as is. Otherwise it reconnects
    /// forever.
    pub async fn run(&self) -> RelayResult<RunOutcome> {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(ConnectionState::Starting);
            match self.run_session().await {
                SessionEnd::LoggedOut => {
                    self.set_state(ConnectionState::LoggedOut);
                    warn!(
                        "🚫 Logged out. Run `hookrelay reset` to delete the session and scan again."
                    );
                    return Ok(RunOutcome::LoggedOut);
                }
                SessionEnd::Closed { connected } => {
                    if connected {
                        attempt = 0;
                    }
                }
                SessionEnd::Fatal(err) => {
                    error!("{} session cannot start: {}", self.session.name(), err);
                    return Err(err);
                }
            }

            self.set_state(ConnectionState::Retrying);
            if self.policy.exhausted(attempt) {
                return Err(RelayError::Session(format!(
                    "giving up after {} reconnect attempts",
                    attempt
                )));
            }
            if let Err(e) = self.session.disconnect().await {
                warn!("session disconnect failed: {:#}", e);
            }

            let delay = self.policy.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!("🔄 Reconnecting in {:?} (attempt {})...", delay, attempt);
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_session(&self) -> SessionEnd {
        let mut events = match self.session.connect().await {
            Ok(rx) => rx,
            Err(e) => match e.downcast::<RelayError>() {
                Ok(err) if !err.is_retryable() => return SessionEnd::Fatal(err),
                Ok(err) => {
                    error!("failed to start {} session: {}", self.session.name(), err);
                    return SessionEnd::Closed { connected: false };
                }
                Err(e) => {
                    error!("failed to start {} session: {:#}", self.session.name(), e);
                    return SessionEnd::Closed { connected: false };
                }
            },
        };

        let mut connected = false;
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::CredentialsUpdated => {
                    if let Err(e) = self.session.persist_credentials().await {
                        error!("failed to persist session credentials: {:#}", e);
                    }
                }
                SessionEvent::PairingCode(code) => pairing::display_pairing_code(&code),
                SessionEvent::ConnectionUpdate(update) => {
                    if let Some(challenge) = update.pairing_challenge.as_deref() {
                        pairing::display_pairing_challenge(challenge);
                    }
                    match update.phase {
                        Some(ConnectionPhase::Open) => {
                            connected = true;
                            self.set_state(ConnectionState::Connected);
                            info!("✅ {} connected successfully", self.session.name());
                        }
                        Some(ConnectionPhase::Close) => {
                            warn!(
                                "❌ {} disconnected ({:?})",
                                self.session.name(),
                                update.disconnect_reason
                            );
                            if update.is_logged_out() {
                                return SessionEnd::LoggedOut;
                            }
                            return SessionEnd::Closed { connected };
                        }
                        Some(ConnectionPhase::Connecting) | None => {}
                    }
                }
                SessionEvent::MessagesReceived(batch) => {
                    self.handler.dispatch(batch);
                }
            }
        }

        warn!("{} session event stream ended", self.session.name());
        SessionEnd::Closed { connected }
    }
}
