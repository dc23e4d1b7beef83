//! Prerecorded speech-to-text over HTTP (Deepgram `/v1/listen`).

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, error};

use super::{VoiceError, require_key};
use crate::config::SttConfig;

pub const STT_API_KEY_ENV: &str = "DEEPGRAM_API_KEY";

/// Maximum audio input size (10 MiB).
pub const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SttClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: String,
}

impl SttClient {
    pub fn new(config: &SttConfig, api_key: Option<String>) -> Result<Self, VoiceError> {
        let api_key = require_key(api_key, STT_API_KEY_ENV)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| VoiceError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Transcribe `audio` whose MIME type is `content_type`.
    pub async fn transcribe(&self, audio: Vec<u8>, content_type: &str) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::TooLarge { len: audio.len(), limit: MAX_STT_INPUT_BYTES });
        }

        debug!(bytes = audio.len(), %content_type, model = %self.model, "sending transcription request");

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("model", self.model.as_str())])
            .header("Authorization", format!("Token {}", self.api_key))
            .header(CONTENT_TYPE, content_type)
            .body(audio)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "transcription request failed (transport)");
                VoiceError::Request(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Request(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            error!(%status, "transcription service returned HTTP error");
            return Err(VoiceError::Http { status: status.as_u16(), body });
        }

        let transcript = parse_transcript(&body)?;
        debug!(chars = transcript.len(), "transcription received");
        Ok(transcript)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
}

/// Read `results.channels[0].alternatives[0].transcript`.
fn parse_transcript(body: &str) -> Result<String, VoiceError> {
    let parsed: ListenResponse =
        serde_json::from_str(body).map_err(|e| VoiceError::Decode(e.to_string()))?;
    parsed
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript.trim().to_string())
        .ok_or_else(|| VoiceError::Decode("no transcript alternatives in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SttConfig {
        SttConfig {
            enabled: true,
            api_url: "http://127.0.0.1:9/v1/listen".into(),
            model: "nova".into(),
            timeout_seconds: 1,
        }
    }

    #[test]
    fn parses_first_alternative() {
        let body = r#"{"results":{"channels":[{"alternatives":[
            {"transcript":" hello there ","confidence":0.98},
            {"transcript":"hollow there"}
        ]}]}}"#;
        assert_eq!(parse_transcript(body).unwrap(), "hello there");
    }

    #[test]
    fn empty_channels_is_decode_error() {
        let err = parse_transcript(r#"{"results":{"channels":[]}}"#).unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn non_json_is_decode_error() {
        assert!(matches!(parse_transcript("oops"), Err(VoiceError::Decode(_))));
    }

    #[test]
    fn requires_api_key() {
        let err = SttClient::new(&config(), None).unwrap_err();
        assert!(err.to_string().contains(STT_API_KEY_ENV));
    }

    #[tokio::test]
    async fn oversized_audio_rejected_before_sending() {
        let client = SttClient::new(&config(), Some("k".into())).unwrap();
        let err = client
            .transcribe(vec![0u8; MAX_STT_INPUT_BYTES + 1], "audio/wav")
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::TooLarge { .. }));
    }
}
