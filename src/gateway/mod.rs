//! Liveness HTTP server.
//!
//! `GET /` returns a static text body so a hosting platform can tell the
//! process is up. `GET /api/health` adds the session connection state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;
use tracing::{error, info};

use crate::relay::ConnectionState;

#[derive(Clone)]
pub struct LivenessState {
    body: Arc<str>,
    connection: watch::Receiver<ConnectionState>,
}

impl LivenessState {
    pub fn new(body: &str, connection: watch::Receiver<ConnectionState>) -> Self {
        Self {
            body: Arc::from(body),
            connection,
        }
    }
}

fn build_router(state: LivenessState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// `GET /`: static liveness body.
async fn root_handler(State(state): State<LivenessState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.body.to_string(),
    )
}

/// `GET /api/health`: liveness plus session state.
async fn health_handler(State(state): State<LivenessState>) -> impl IntoResponse {
    let session = *state.connection.borrow();
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "session": session,
    }))
}

/// Bind and serve the liveness endpoint. Returns the join handle and the
/// bound address (useful when binding port 0).
pub async fn start(
    host: &str,
    port: u16,
    state: LivenessState,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind liveness endpoint on {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!("🌍 Web server running on {}", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("liveness server error: {}", e);
        }
    });

    Ok((handle, local_addr))
}
