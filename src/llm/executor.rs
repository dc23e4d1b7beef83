//! Resilient request executor: retry with exponential backoff.
//!
//! Each attempt is classified into an [`AttemptOutcome`]:
//!
//! ```text
//! 200 ──────────────► Success(body) ──► decode ──► Exchange::Decoded
//!                                          └─────► Exchange::Undecodable (not retried)
//! non-200 ─┐
//! transport error ──► RetryableFailure ──► sleep unit·factor^n ──► next attempt
//! ```
//!
//! After `max_retries` failures the executor returns
//! [`ExchangeError::RetriesExhausted`]. The whole sequence runs under an
//! optional deadline.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::extract::GenerationBody;
use super::{RawResponse, Transport, TransportError};

/// Longest slice of an error body copied into a log line.
const LOG_BODY_LIMIT: usize = 512;

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, not retries after the first.
    pub max_retries: u32,
    pub backoff_factor: f64,
    /// Delay after attempt `n` is `backoff_unit * backoff_factor^n`.
    pub backoff_unit: Duration,
    /// Upper bound on the whole retry sequence. `None` disables it.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            backoff_unit: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Sleep taken after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_unit.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Sum of every sleep a fully failing sequence takes.
    ///
    /// No sleep follows the final attempt, so a sequence of `max_retries`
    /// failures sleeps `max_retries - 1` times. A loop that sleeps after
    /// every failure, the last included, would wait an extra
    /// `delay_for(max_retries)` before reporting exhaustion.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_retries).map(|n| self.delay_for(n)).sum()
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Classification of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    /// `status` is `None` when the request never produced a response.
    RetryableFailure { status: Option<u16>, body: String },
}

impl AttemptOutcome {
    pub fn classify(result: Result<RawResponse, TransportError>) -> Self {
        match result {
            Ok(RawResponse { status: 200, body }) => AttemptOutcome::Success(body),
            Ok(RawResponse { status, body }) => {
                AttemptOutcome::RetryableFailure { status: Some(status), body }
            }
            Err(e) => AttemptOutcome::RetryableFailure { status: None, body: e.to_string() },
        }
    }
}

/// Result of a sequence that received a 200.
#[derive(Debug, Clone, PartialEq)]
pub enum Exchange {
    Decoded(GenerationBody),
    /// 200 with a body that is not JSON.
    Undecodable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("retry limit reached after {attempts} attempts (last status: {})", status_label(.last_status))]
    RetriesExhausted { attempts: u32, last_status: Option<u16> },
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

// ── Executor ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ResilientExecutor<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> ResilientExecutor<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the retry sequence for `prompt`.
    pub async fn execute(&self, prompt: &str) -> Result<Exchange, ExchangeError> {
        match self.policy.deadline {
            Some(limit) => tokio::time::timeout(limit, self.attempt_loop(prompt))
                .await
                .map_err(|_| {
                    error!(deadline_ms = limit.as_millis() as u64, "generation deadline exceeded");
                    ExchangeError::DeadlineExceeded(limit)
                })?,
            None => self.attempt_loop(prompt).await,
        }
    }

    async fn attempt_loop(&self, prompt: &str) -> Result<Exchange, ExchangeError> {
        let max_retries = self.policy.max_retries;
        let mut attempts = 0;
        let mut last_status = None;

        while attempts < max_retries {
            attempts += 1;
            debug!(attempt = attempts, max_retries, prompt_len = prompt.len(), "sending generation request");

            match AttemptOutcome::classify(self.transport.post_inputs(prompt).await) {
                AttemptOutcome::Success(body) => return Ok(decode(&body)),
                AttemptOutcome::RetryableFailure { status, body } => {
                    warn!(
                        attempt = attempts,
                        max_retries,
                        status = ?status,
                        body = %truncate(&body, LOG_BODY_LIMIT),
                        "generation request failed"
                    );
                    last_status = status;

                    if attempts < max_retries {
                        let delay = self.policy.delay_for(attempts);
                        info!(delay_ms = delay.as_millis() as u64, "retrying generation request");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(attempts, last_status = ?last_status, "generation retry limit reached");
        Err(ExchangeError::RetriesExhausted { attempts, last_status })
    }
}

fn decode(body: &str) -> Exchange {
    match GenerationBody::parse(body) {
        Ok(parsed) => Exchange::Decoded(parsed),
        Err(e) => {
            warn!(error = %e, body = %truncate(body, LOG_BODY_LIMIT), "could not decode generation response");
            Exchange::Undecodable
        }
    }
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_200_is_success() {
        let outcome = AttemptOutcome::classify(Ok(RawResponse::new(200, "{}")));
        assert_eq!(outcome, AttemptOutcome::Success("{}".into()));
    }

    #[test]
    fn classify_503_is_retryable() {
        let outcome = AttemptOutcome::classify(Ok(RawResponse::new(503, "loading")));
        assert_eq!(
            outcome,
            AttemptOutcome::RetryableFailure { status: Some(503), body: "loading".into() }
        );
    }

    #[test]
    fn classify_201_is_retryable() {
        // Only an exact 200 counts.
        let outcome = AttemptOutcome::classify(Ok(RawResponse::new(201, "")));
        assert!(matches!(outcome, AttemptOutcome::RetryableFailure { status: Some(201), .. }));
    }

    #[test]
    fn classify_transport_error_has_no_status() {
        let outcome = AttemptOutcome::classify(Err(TransportError("connection refused".into())));
        match outcome {
            AttemptOutcome::RetryableFailure { status, body } => {
                assert_eq!(status, None);
                assert!(body.contains("connection refused"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy {
            backoff_factor: 1.5,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2250));
    }

    #[test]
    fn total_backoff_skips_final_attempt() {
        let policy = RetryPolicy { max_retries: 3, ..RetryPolicy::default() };
        // 2^1 + 2^2
        assert_eq!(policy.total_backoff(), Duration::from_secs(6));
        let single = RetryPolicy { max_retries: 1, ..RetryPolicy::default() };
        assert_eq!(single.total_backoff(), Duration::ZERO);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[test]
    fn exhausted_error_names_last_status() {
        let e = ExchangeError::RetriesExhausted { attempts: 3, last_status: Some(503) };
        assert!(e.to_string().contains("3 attempts"));
        assert!(e.to_string().contains("503"));
        let e = ExchangeError::RetriesExhausted { attempts: 2, last_status: None };
        assert!(e.to_string().contains("none"));
    }
}
