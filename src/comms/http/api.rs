//! Handlers for `/api/*` routes.

use axum::Form;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::AxumState;
use crate::comms::state::content_type_for;
use crate::store::CallInfo;
use crate::voice::VoiceError;

#[derive(Debug, Deserialize)]
pub(super) struct TranscriptionForm {
    #[serde(rename = "TranscriptionText")]
    transcription_text: Option<String>,
    #[serde(rename = "CallSid")]
    call_sid: Option<String>,
    #[serde(rename = "From")]
    from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VoiceQuery {
    call_sid: Option<String>,
    from: Option<String>,
}

fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// Telephony transcripts arrive wrapped in quotes.
fn clean_transcript(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    let turns = state.comms.agent().len().await;
    Json(json!({ "status": "ok", "turns": turns })).into_response()
}

/// POST /api/transcription
pub(super) async fn transcription(State(state): State<AxumState>, Form(form): Form<TranscriptionForm>) -> Response {
    let text = clean_transcript(form.transcription_text.as_deref().unwrap_or_default());
    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "TranscriptionText is required")).into_response();
    }

    let call = CallInfo::new(form.call_sid.as_deref(), form.from.as_deref());
    debug!(channel_id = %state.channel_id, call_sid = %call.call_sid, "transcription received");

    let spoken = state.comms.respond(text, &call, true).await;
    Json(spoken).into_response()
}

/// POST /api/voice (raw audio body)
pub(super) async fn voice(
    State(state): State<AxumState>,
    Query(query): Query<VoiceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "audio body is empty")).into_response();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let transcript = match state.comms.transcribe(body.to_vec(), &content_type).await {
        Ok(t) => t,
        Err(e @ VoiceError::Disabled(_)) => {
            return (StatusCode::SERVICE_UNAVAILABLE, json_error("stt_disabled", e)).into_response();
        }
        Err(e @ VoiceError::TooLarge { .. }) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, json_error("too_large", e)).into_response();
        }
        Err(e) => {
            warn!(channel_id = %state.channel_id, error = %e, "transcription failed");
            return (StatusCode::BAD_GATEWAY, json_error("stt_failed", e)).into_response();
        }
    };

    let text = clean_transcript(&transcript);
    if text.is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, json_error("empty_transcript", "no speech recognised"))
            .into_response();
    }

    let call = CallInfo::new(query.call_sid.as_deref(), query.from.as_deref());
    let spoken = state.comms.respond(text, &call, true).await;
    Json(json!({
        "transcript": text,
        "reply": spoken.reply,
        "reply_kind": spoken.reply_kind,
        "audio_url": spoken.audio_url,
    }))
    .into_response()
}

/// GET /api/logs
pub(super) async fn logs(State(state): State<AxumState>) -> Response {
    Json(state.comms.log().read_all().await).into_response()
}

/// GET /api/audio/{name}
pub(super) async fn audio(State(state): State<AxumState>, Path(name): Path<String>) -> Response {
    if !is_safe_name(&name) {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "invalid audio name")).into_response();
    }
    match tokio::fs::read(state.comms.audio_dir().join(&name)).await {
        Ok(data) => (StatusCode::OK, [(header::CONTENT_TYPE, content_type_for(&name))], data).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, json_error("not_found", "no such audio file")).into_response()
        }
        Err(e) => {
            warn!(channel_id = %state.channel_id, %name, error = %e, "cannot read audio file");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("internal", e)).into_response()
        }
    }
}

/// Plain file names only: no separators, no leading dot.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
