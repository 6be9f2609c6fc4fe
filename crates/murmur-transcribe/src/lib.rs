//! Transcription collaborator: the engine trait, timed segments, and
//! the progress line format pushed to listening sockets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod sidecar;

pub use sidecar::SidecarEngine;

/// One timed span of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start of the span, seconds from the beginning of the audio.
    pub start: f64,
    /// End of the span, seconds from the beginning of the audio.
    pub end: f64,
    /// Transcribed text for the span.
    pub text: String,
}

/// Errors from a transcription engine.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The engine could not be reached at all.
    #[error("transcriber request failed: {0}")]
    Request(String),

    /// The engine answered with a non-success status.
    #[error("transcriber returned {status}: {body}")]
    Upstream {
        /// HTTP status from the engine.
        status: u16,
        /// Response body, best effort.
        body: String,
    },

    /// The engine's response could not be decoded.
    #[error("transcriber response malformed: {0}")]
    Malformed(String),
}

/// Extension trait to cut `.map_err()` boilerplate when wrapping errors
/// into [`TranscriptionError`].
pub trait ResultExt<T> {
    /// Wrap the error as [`TranscriptionError::Request`] with `context` prefix.
    fn request(self, context: &str) -> Result<T, TranscriptionError>;
    /// Wrap the error as [`TranscriptionError::Malformed`] with `context` prefix.
    fn malformed(self, context: &str) -> Result<T, TranscriptionError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn request(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::Request(format!("{context}: {e}")))
    }
    fn malformed(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::Malformed(format!("{context}: {e}")))
    }
}

/// Produces timed text segments from raw audio bytes.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe `audio` into ordered segments.
    async fn transcribe(&self, audio: &[u8]) -> Result<Vec<Segment>, TranscriptionError>;
}

/// Progress line for one segment, offsets already applied.
#[must_use]
pub fn format_progress(start: f64, end: f64, text: &str) -> String {
    format!("{start:.2}s -> {end:.2}s: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn progress_line_uses_two_decimals() {
        assert_eq!(format_progress(0.0, 1.5, "hello"), "0.00s -> 1.50s: hello");
        assert_eq!(
            format_progress(11.5, 12.204, "world"),
            "11.50s -> 12.20s: world"
        );
    }

    #[test]
    fn segment_round_trips_through_json() {
        let segment = Segment {
            start: 0.0,
            end: 1.5,
            text: "hello".into(),
        };
        let json = serde_json::to_string(&segment).unwrap();
        let back: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, segment);
    }

    #[test]
    fn result_ext_request_context() {
        let err: Result<(), &str> = Err("connection refused");
        let mapped = err.request("send");
        assert_matches!(
            mapped,
            Err(TranscriptionError::Request(s)) if s == "send: connection refused"
        );
    }

    #[test]
    fn result_ext_malformed_context() {
        let err: Result<(), &str> = Err("missing field");
        let mapped = err.malformed("decode");
        assert_matches!(
            mapped,
            Err(TranscriptionError::Malformed(s)) if s == "decode: missing field"
        );
    }

    #[test]
    fn result_ext_ok_passthrough() {
        let ok: Result<i32, &str> = Ok(7);
        assert_eq!(ok.request("ctx").unwrap(), 7);
    }

    #[test]
    fn upstream_error_display() {
        let e = TranscriptionError::Upstream {
            status: 500,
            body: "model not loaded".into(),
        };
        assert!(e.to_string().contains("500"));
        assert!(e.to_string().contains("model not loaded"));
    }
}
