//! Text-generation client.
//!
//! - [`Transport`] is the one HTTP call the executor repeats. `LlmProvider`
//!   implements it for the configured backend; tests implement it with stubs.
//! - [`executor::ResilientExecutor`] wraps a transport in the retry/backoff
//!   loop.
//! - [`extract`] turns the decoded body into reply text.

pub mod executor;
pub mod extract;
pub mod providers;

use std::future::Future;

use thiserror::Error;

pub use executor::{AttemptOutcome, Exchange, ExchangeError, ResilientExecutor, RetryPolicy};
pub use extract::{GenerationBody, extract_text};
pub use providers::LlmProvider;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("provider request failed: {0}")]
    Request(String),
}

/// A transport-level failure: no HTTP status was received (timeout, refused
/// connection, unreadable body).
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

// ── Transport ─────────────────────────────────────────────────────────────────

/// Status and body of one HTTP response, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// One `POST {"inputs": prompt}` to the text-generation endpoint.
///
/// Implementations do not retry and do not interpret the status; both are the
/// executor's job.
pub trait Transport: Send + Sync {
    fn post_inputs(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}
