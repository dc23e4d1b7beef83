//! Console channel: read a line, run an exchange, print the reply.
//!
//! Blank lines are skipped. `exit` (any case) ends the session without
//! running an exchange and stops the whole agent. EOF only closes the
//! console, so other channels keep serving.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::runtime::{Component, ComponentFuture};
use super::state::CommsState;
use crate::error::AppError;
use crate::store::CallInfo;

pub const EXIT_COMMAND: &str = "exit";

/// Why a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Exit,
    Eof,
    Shutdown,
}

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            info!(channel_id = %self.channel_id, "console channel started");
            let stdin = BufReader::new(tokio::io::stdin());
            let stdout = tokio::io::stdout();
            let end = converse(&self.state, stdin, stdout, shutdown.clone()).await?;
            info!(channel_id = %self.channel_id, ?end, "console channel closed");
            if end == SessionEnd::Exit {
                shutdown.cancel();
            }
            Ok(())
        })
    }
}

/// Drive a console session over any line reader and writer.
pub async fn converse<R, W>(
    state: &CommsState,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<SessionEnd, AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let call = CallInfo::console();

    writer.write_all(b"Type a message and press Enter. 'exit' to quit.\n").await?;

    let end = loop {
        writer.write_all(b"> ").await?;
        writer.flush().await?;

        let line = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                writer.write_all(b"\n").await?;
                info!("console shutting down");
                break SessionEnd::Shutdown;
            }

            line = lines.next_line() => line,
        };

        let input = match line {
            Ok(Some(input)) => input,
            Ok(None) => {
                info!("console input closed");
                break SessionEnd::Eof;
            }
            Err(e) => {
                warn!(error = %e, "console read error");
                break SessionEnd::Eof;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case(EXIT_COMMAND) {
            debug!("exit requested");
            break SessionEnd::Exit;
        }

        let spoken = state.respond(input, &call, false).await;
        writer.write_all(format!("AI: {}\n", spoken.reply).as_bytes()).await?;
    };

    writer.flush().await?;
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::llm::{LlmProvider, ResilientExecutor, RetryPolicy};
    use crate::orchestrator::TurnOrchestrator;
    use crate::store::ConversationLog;

    fn state(dir: &std::path::Path) -> CommsState {
        let executor = ResilientExecutor::new(LlmProvider::Dummy(DummyProvider), RetryPolicy::default());
        CommsState::new(
            TurnOrchestrator::new(executor, Conversation::new()),
            ConversationLog::open(dir.join("log.json")).unwrap(),
            None,
            None,
            dir.join("audio"),
        )
    }

    async fn session(state: &CommsState, input: &'static str) -> (SessionEnd, String) {
        let mut out = Vec::new();
        let end = converse(state, input.as_bytes(), &mut out, CancellationToken::new()).await.unwrap();
        (end, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn replies_then_exits() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (end, out) = session(&state, "hello\n\n   \nEXIT\nnever sent\n").await;

        assert_eq!(end, SessionEnd::Exit);
        assert!(out.contains("AI: [echo] hello"));
        assert!(!out.contains("never sent"));
        assert_eq!(state.agent().len().await, 2);
        assert_eq!(state.log().read_all().await.len(), 2);
    }

    #[tokio::test]
    async fn exit_first_runs_no_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (end, _) = session(&state, "exit\n").await;
        assert_eq!(end, SessionEnd::Exit);
        assert_eq!(state.agent().len().await, 0);
        assert!(state.log().read_all().await.is_empty());
    }

    #[tokio::test]
    async fn eof_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (end, out) = session(&state, "one\ntwo").await;
        assert_eq!(end, SessionEnd::Eof);
        assert!(out.contains("AI: [echo] one"));
        assert!(out.contains("AI: [echo] two"));
        assert_eq!(state.agent().len().await, 4);
    }

    #[tokio::test]
    async fn cancelled_token_stops_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let token = CancellationToken::new();
        token.cancel();
        let mut out = Vec::new();
        let end = converse(&state, tokio::io::empty(), &mut out, token).await.unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
        assert_eq!(state.agent().len().await, 0);
    }
}
