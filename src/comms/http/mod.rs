//! HTTP channel (axum) for telephony webhooks and log inspection.
//!
//! ```text
//! GET  /api/health
//! POST /api/transcription   form: TranscriptionText, CallSid, From
//! POST /api/voice           raw audio; query: call_sid, from
//! GET  /api/logs
//! GET  /api/audio/{name}
//! ```
//!
//! The server shuts down gracefully when the comms token is cancelled.

mod api;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::runtime::{Component, ComponentFuture};
use super::state::CommsState;
use crate::error::AppError;
use crate::voice::stt::MAX_STT_INPUT_BYTES;

/// Router state. Cloned per request.
#[derive(Clone)]
pub(crate) struct AxumState {
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(channel_id: impl Into<String>, bind_addr: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), bind_addr: bind_addr.into(), state }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(serve(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

async fn serve(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let app = router_with_id(&channel_id, comms);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("http bind failed on {bind_addr}: {e}")))?;
    info!(%channel_id, %bind_addr, "http channel listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("http server error: {e}")))?;

    info!(%channel_id, "http channel shut down");
    Ok(())
}

/// The full route table over `comms`.
pub fn router(comms: Arc<CommsState>) -> Router {
    router_with_id("http0", comms)
}

fn router_with_id(channel_id: &str, comms: Arc<CommsState>) -> Router {
    let state = AxumState { channel_id: Arc::from(channel_id), comms };
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/transcription", post(api::transcription))
        .route(
            "/api/voice",
            post(api::voice).layer(DefaultBodyLimit::max(MAX_STT_INPUT_BYTES)),
        )
        .route("/api/logs", get(api::logs))
        .route("/api/audio/{name}", get(api::audio))
        .with_state(state)
}
