//! Turn orchestrator, the only writer of a [`Conversation`].
//!
//! One exchange: render the history plus the new user turn, run the
//! executor, extract the reply, then commit the user turn and the assistant
//! turn together. Every exchange that runs to completion commits exactly two
//! turns, including failed ones (the assistant turn then holds the error
//! text). A caller that drops the future mid-flight commits nothing.
//!
//! Exchanges queue on a gate held for their whole duration, so concurrent
//! exchanges on one conversation never interleave their turns. The
//! conversation itself is locked only to copy the history and to commit, so
//! readers such as [`TurnOrchestrator::len`] answer while an exchange is
//! waiting on the network or backing off.

use std::fmt;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::conversation::{Conversation, Turn};
use crate::llm::extract::{FALLBACK_REPLY, extract_text};
use crate::llm::{Exchange, ExchangeError, ResilientExecutor, Transport};

/// Shown to the caller once every attempt has failed.
pub const RETRIES_EXHAUSTED_REPLY: &str = "API Error: Maximum retry limit reached.";
/// Shown to the caller when the overall deadline expires.
pub const DEADLINE_EXCEEDED_REPLY: &str = "API Error: request deadline exceeded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Text produced by the model.
    Generated,
    /// The model answered, but without usable text.
    Fallback,
    /// No answer; `text` describes the failure.
    Failed,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplyKind::Generated => "generated",
            ReplyKind::Fallback => "fallback",
            ReplyKind::Failed => "failed",
        })
    }
}

/// Outcome of one exchange. `text` is always displayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    pub fn generated(text: impl Into<String>) -> Self {
        Self { kind: ReplyKind::Generated, text: text.into() }
    }

    pub fn fallback(text: impl Into<String>) -> Self {
        Self { kind: ReplyKind::Fallback, text: text.into() }
    }

    pub fn failed(error: &ExchangeError) -> Self {
        let text = match error {
            ExchangeError::RetriesExhausted { .. } => RETRIES_EXHAUSTED_REPLY,
            ExchangeError::DeadlineExceeded(_) => DEADLINE_EXCEEDED_REPLY,
        };
        Self { kind: ReplyKind::Failed, text: text.to_string() }
    }

    pub fn is_generated(&self) -> bool {
        self.kind == ReplyKind::Generated
    }
}

pub struct TurnOrchestrator<T> {
    executor: ResilientExecutor<T>,
    exchange_gate: Mutex<()>,
    conversation: Mutex<Conversation>,
    fallback_reply: String,
}

impl<T: Transport> TurnOrchestrator<T> {
    pub fn new(executor: ResilientExecutor<T>, conversation: Conversation) -> Self {
        Self {
            executor,
            exchange_gate: Mutex::new(()),
            conversation: Mutex::new(conversation),
            fallback_reply: FALLBACK_REPLY.to_string(),
        }
    }

    pub fn with_fallback_reply(mut self, text: impl Into<String>) -> Self {
        self.fallback_reply = text.into();
        self
    }

    pub fn executor(&self) -> &ResilientExecutor<T> {
        &self.executor
    }

    /// Run one exchange for `user_input` and return the reply.
    ///
    /// Never fails: transport and HTTP failures come back as a
    /// [`ReplyKind::Failed`] reply, which is also what gets committed.
    pub async fn exchange(&self, user_input: &str) -> Reply {
        let _gate = self.exchange_gate.lock().await;

        let user_turn = Turn::user(user_input);
        let mut pending = self.conversation.lock().await.clone();
        pending.push(user_turn.clone());
        let prompt = pending.render();
        debug!(turns = pending.len(), prompt_len = prompt.len(), "awaiting generation");

        let reply = match self.executor.execute(&prompt).await {
            Ok(Exchange::Decoded(body)) => match extract_text(&body) {
                Some(text) => Reply::generated(text),
                None => {
                    warn!("generation response carried no generated_text");
                    Reply::fallback(&self.fallback_reply)
                }
            },
            Ok(Exchange::Undecodable) => Reply::fallback(&self.fallback_reply),
            Err(e) => {
                error!(error = %e, "exchange failed");
                Reply::failed(&e)
            }
        };

        let mut conversation = self.conversation.lock().await;
        conversation.push(user_turn);
        conversation.push(Turn::assistant(reply.text.clone()));
        info!(kind = %reply.kind, turns = conversation.len(), "exchange committed");

        reply
    }

    /// Copy of the committed conversation. An exchange in flight is not
    /// visible until both of its turns land.
    pub async fn snapshot(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.conversation.lock().await.len()
    }
}
