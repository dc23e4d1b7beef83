//! Speech collaborators.
//!
//! Both are thin HTTP passthroughs: [`stt::SttClient`] turns caller audio
//! into a transcript, [`tts::TtsClient`] turns a reply into playable audio.
//! Audio bytes are never inspected or re-encoded.

pub mod stt;
pub mod tts;

use thiserror::Error;

pub use stt::SttClient;
pub use tts::TtsClient;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("{0} is not enabled")]
    Disabled(&'static str),

    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("voice request failed: {0}")]
    Request(String),

    #[error("voice service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("cannot decode voice response: {0}")]
    Decode(String),

    #[error("input too large: {len} bytes (limit: {limit} bytes)")]
    TooLarge { len: usize, limit: usize },
}

/// Synthesised speech as the service returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechAudio {
    /// The service hosts the audio itself.
    Url(String),
    /// Raw audio; `content_type` is passed through from the response.
    Bytes { content_type: String, data: Vec<u8> },
}

/// Reject empty or whitespace-only API keys.
fn require_key(key: Option<String>, env: &'static str) -> Result<String, VoiceError> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or(VoiceError::MissingApiKey(env))
}
