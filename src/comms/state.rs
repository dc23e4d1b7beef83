//! Shared state handed to every channel as `Arc<CommsState>`.
//!
//! Channels only see [`CommsState::respond`] and a few read accessors; the
//! orchestrator, log and voice clients stay private.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::Role;
use crate::llm::LlmProvider;
use crate::orchestrator::{ReplyKind, TurnOrchestrator};
use crate::store::{CallInfo, ConversationLog, LogEntry};
use crate::voice::{SpeechAudio, SttClient, TtsClient, VoiceError};

/// The orchestrator as wired in the running agent.
pub type Agent = TurnOrchestrator<LlmProvider>;

/// URL prefix under which saved synthesis output is served.
pub const AUDIO_ROUTE: &str = "/api/audio";

/// What a channel hands back to its caller after one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpokenReply {
    pub reply: String,
    pub reply_kind: ReplyKind,
    pub audio_url: Option<String>,
}

pub struct CommsState {
    agent: Agent,
    log: ConversationLog,
    stt: Option<SttClient>,
    tts: Option<TtsClient>,
    audio_dir: PathBuf,
}

impl CommsState {
    pub fn new(
        agent: Agent,
        log: ConversationLog,
        stt: Option<SttClient>,
        tts: Option<TtsClient>,
        audio_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { agent, log, stt, tts, audio_dir: audio_dir.into() }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Run one exchange for `text`, optionally voice the reply, and record
    /// both sides in the conversation log.
    pub async fn respond(&self, text: &str, call: &CallInfo, speak: bool) -> SpokenReply {
        let reply = self.agent.exchange(text).await;

        let audio_url = if speak { self.speak(&reply.text).await } else { None };

        self.log
            .record_exchange(
                LogEntry::now(call, Role::User, text),
                LogEntry::now(call, Role::Assistant, &reply.text).with_audio_url(audio_url.clone()),
            )
            .await;

        info!(call_sid = %call.call_sid, kind = %reply.kind, voiced = audio_url.is_some(), "reply ready");

        SpokenReply { reply: reply.text, reply_kind: reply.kind, audio_url }
    }

    /// Transcribe caller audio. Fails with [`VoiceError::Disabled`] when no
    /// STT client is configured.
    pub async fn transcribe(&self, audio: Vec<u8>, content_type: &str) -> Result<String, VoiceError> {
        let stt = self.stt.as_ref().ok_or(VoiceError::Disabled("speech-to-text"))?;
        stt.transcribe(audio, content_type).await
    }

    /// Synthesise `text` and return a URL the caller can play, falling back
    /// to the configured fallback clip on any failure.
    async fn speak(&self, text: &str) -> Option<String> {
        let tts = self.tts.as_ref()?;
        match tts.synthesize(text).await {
            Ok(SpeechAudio::Url(url)) => Some(url),
            Ok(SpeechAudio::Bytes { content_type, data }) => match self.save_audio(&content_type, &data).await {
                Ok(name) => Some(format!("{AUDIO_ROUTE}/{name}")),
                Err(e) => {
                    warn!(error = %e, "cannot save synthesised audio");
                    tts.fallback_audio_url().map(str::to_string)
                }
            },
            Err(e) => {
                warn!(error = %e, "speech synthesis failed, using fallback audio");
                tts.fallback_audio_url().map(str::to_string)
            }
        }
    }

    async fn save_audio(&self, content_type: &str, data: &[u8]) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let name = format!("{}.{}", Uuid::new_v4(), extension_for(content_type));
        tokio::fs::write(self.audio_dir.join(&name), data).await?;
        debug!(%name, bytes = data.len(), "synthesised audio saved");
        Ok(name)
    }
}

fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/basic" | "audio/ulaw" => "ulaw",
        _ => "bin",
    }
}

/// Inverse of [`extension_for`], used when serving saved files.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("ulaw") => "audio/basic",
        _ => "application/octet-stream",
    }
}
