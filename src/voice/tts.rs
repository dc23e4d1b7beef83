//! Text-to-speech over HTTP (ElevenLabs `/v1/text-to-speech/<voice>`).
//!
//! The service answers either with JSON carrying an `audio_url`, or with the
//! audio itself. Both come back as [`SpeechAudio`].

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{SpeechAudio, VoiceError, require_key};
use crate::config::TtsConfig;

pub const TTS_API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

/// Maximum text input size (64 KiB).
pub const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct TtsClient {
    client: Client,
    endpoint: String,
    voice_id: String,
    format: String,
    api_key: String,
    fallback_audio_url: Option<String>,
}

impl TtsClient {
    pub fn new(config: &TtsConfig, api_key: Option<String>) -> Result<Self, VoiceError> {
        let api_key = require_key(api_key, TTS_API_KEY_ENV)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| VoiceError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/{}", config.api_url.trim_end_matches('/'), config.voice_id),
            voice_id: config.voice_id.clone(),
            format: config.format.clone(),
            api_key,
            fallback_audio_url: config.fallback_audio_url.clone(),
        })
    }

    pub fn fallback_audio_url(&self) -> Option<&str> {
        self.fallback_audio_url.as_deref()
    }

    pub async fn synthesize(&self, text: &str) -> Result<SpeechAudio, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::TooLarge { len: text.len(), limit: MAX_TTS_INPUT_BYTES });
        }

        let payload = SynthesisRequest {
            text,
            voice_settings: VoiceSettings { voice: &self.voice_id, format: &self.format },
        };

        debug!(chars = text.len(), voice = %self.voice_id, "sending synthesis request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("xi-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "synthesis request failed (transport)");
                VoiceError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            error!(%status, "synthesis service returned HTTP error");
            return Err(VoiceError::Http { status: status.as_u16(), body });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Request(format!("failed to read response body: {e}")))?;

        interpret_response(&content_type, data.to_vec())
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice_settings: VoiceSettings<'a>,
}

#[derive(Debug, Serialize)]
struct VoiceSettings<'a> {
    voice: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct HostedAudio {
    audio_url: Option<String>,
}

fn interpret_response(content_type: &str, data: Vec<u8>) -> Result<SpeechAudio, VoiceError> {
    if content_type.starts_with("application/json") {
        let hosted: HostedAudio =
            serde_json::from_slice(&data).map_err(|e| VoiceError::Decode(e.to_string()))?;
        return hosted
            .audio_url
            .filter(|u| !u.is_empty())
            .map(SpeechAudio::Url)
            .ok_or_else(|| VoiceError::Decode("JSON response without audio_url".into()));
    }
    if data.is_empty() {
        return Err(VoiceError::Decode("empty audio response".into()));
    }
    Ok(SpeechAudio::Bytes { content_type: content_type.to_string(), data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TtsConfig {
        TtsConfig {
            enabled: true,
            api_url: "http://127.0.0.1:9/v1/text-to-speech/".into(),
            voice_id: "voice-1".into(),
            format: "mp3".into(),
            fallback_audio_url: Some("http://example.com/fallback.mp3".into()),
            timeout_seconds: 1,
        }
    }

    #[test]
    fn json_with_audio_url() {
        let audio = interpret_response(
            "application/json; charset=utf-8",
            br#"{"audio_url":"http://cdn/a.mp3"}"#.to_vec(),
        )
        .unwrap();
        assert_eq!(audio, SpeechAudio::Url("http://cdn/a.mp3".into()));
    }

    #[test]
    fn json_without_audio_url_is_decode_error() {
        let err = interpret_response("application/json", b"{}".to_vec()).unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn audio_bytes_pass_through() {
        let audio = interpret_response("audio/mpeg", vec![1, 2, 3]).unwrap();
        assert_eq!(
            audio,
            SpeechAudio::Bytes { content_type: "audio/mpeg".into(), data: vec![1, 2, 3] }
        );
    }

    #[test]
    fn request_body_shape() {
        let json = serde_json::to_value(SynthesisRequest {
            text: "hi",
            voice_settings: VoiceSettings { voice: "v", format: "mp3" },
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi", "voice_settings": { "voice": "v", "format": "mp3" } }));
    }

    #[test]
    fn endpoint_appends_voice_id() {
        let client = TtsClient::new(&config(), Some("k".into())).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:9/v1/text-to-speech/voice-1");
        assert_eq!(client.fallback_audio_url(), Some("http://example.com/fallback.mp3"));
    }

    #[test]
    fn requires_api_key() {
        assert!(matches!(
            TtsClient::new(&config(), Some(String::new())),
            Err(VoiceError::MissingApiKey(TTS_API_KEY_ENV))
        ));
    }
}
