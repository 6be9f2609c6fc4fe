//! `POST /api/transcribe` — shared-secret gated transcription with
//! per-segment progress fan-out.

use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use base64::Engine as _;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use murmur_core::{GroupKey, GroupKind, RelayEvent};
use murmur_transcribe::format_progress;

use crate::metrics as names;
use crate::server::AppState;
use crate::websocket::fanout;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request body for the transcription endpoint.
#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// Base64 audio, with or without a data-URL prefix.
    pub audio_base64: String,
    /// Seconds already consumed by earlier chunks of this recording.
    #[serde(default)]
    pub start_offset: f64,
    /// Session whose whisper group receives progress events.
    pub socket_session_id: String,
}

/// Success body: segment texts joined by single spaces.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    /// The assembled transcript.
    pub transcription: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(ErrorBody { detail: detail.into() })).into_response()
}

/// Strip a data-URL prefix from base64 audio; plain base64 passes
/// through untouched.
#[must_use]
pub fn normalize_base64(input: &str) -> &str {
    match input.find(";base64,") {
        Some(idx) => &input[idx + 8..],
        None => input,
    }
}

/// Handle one transcription request: authenticate, decode, transcribe,
/// fan progress out to the session's whisper group, answer with the
/// joined transcript.
#[instrument(skip_all)]
pub async fn transcribe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TranscribeRequest>,
) -> Response {
    counter!(names::TRANSCRIBE_REQUESTS_TOTAL).increment(1);

    let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(state.config.api_key.as_str()) {
        warn!("transcription request with missing or invalid api key");
        return error_response(StatusCode::FORBIDDEN, "Invalid API Key");
    }

    let group = match GroupKey::resolve(GroupKind::Whisper, &payload.socket_session_id) {
        Ok(group) => group,
        Err(error) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("invalid socket session: {error}"),
            );
        }
    };

    let encoded = normalize_base64(&payload.audio_base64);
    let audio = match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "decoded audio is empty"),
        Err(error) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid base64: {error}"));
        }
    };
    if audio.len() > state.config.max_audio_bytes {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "audio too large: {} bytes (limit {})",
                audio.len(),
                state.config.max_audio_bytes
            ),
        );
    }

    info!(group = group.as_str(), bytes = audio.len(), "transcription started");
    let started = Instant::now();
    let segments = match state.engine.transcribe(&audio).await {
        Ok(segments) => segments,
        Err(error) => {
            warn!(%error, "transcription engine failed");
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("transcription failed: {error}"),
            );
        }
    };
    histogram!(names::TRANSCRIBE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    let mut transcript = Vec::with_capacity(segments.len());
    for segment in &segments {
        let text = segment.text.trim();
        let line = format_progress(
            payload.start_offset + segment.start,
            payload.start_offset + segment.end,
            text,
        );
        let event = RelayEvent::log("whisper_api", "whisper", line);
        let _ = fanout::broadcast(&state.registry, group.as_str(), &event);
        transcript.push(text.to_string());
    }

    info!(
        group = group.as_str(),
        segments = segments.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "transcription complete"
    );
    (
        StatusCode::OK,
        Json(TranscribeResponse {
            transcription: transcript.join(" "),
        }),
    )
        .into_response()
}
