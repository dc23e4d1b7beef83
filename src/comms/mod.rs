//! Comms subsystem: the channels callers reach the agent through.
//!
//! Every channel shares one [`CommsState`], so a console session and the
//! HTTP webhooks talk to the same conversation and write the same log.

pub mod runtime;
pub mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-axum")]
pub mod http;

pub use state::{Agent, CommsState, SpokenReply};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn the configured channels. Returns immediately; await the handle to
/// wait for them to exit.
pub fn start(config: &Config, state: Arc<CommsState>, shutdown: CancellationToken) -> SubsystemHandle {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    if config.comms_pty_should_load() {
        info!("loading console channel");
        components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
    }

    #[cfg(feature = "channel-axum")]
    if config.comms_http_should_load() {
        info!(bind = %config.comms.http.bind, "loading http channel");
        components.push(Box::new(http::AxumChannel::new("http0", config.comms.http.bind.clone(), state.clone())));
    }

    if components.is_empty() {
        info!("no comms channels enabled");
    }
    drop(state);

    spawn_components(components, shutdown)
}
