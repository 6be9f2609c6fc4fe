//! HTTP client for a local inference sidecar.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::{ResultExt, Segment, TranscriptionEngine, TranscriptionError};

/// Engine that ships audio to an inference sidecar over HTTP.
///
/// The sidecar exposes `POST /transcribe` taking a multipart `audio`
/// part and answering `{"segments": [{"start", "end", "text"}, ...]}`.
pub struct SidecarEngine {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    segments: Vec<Segment>,
}

impl SidecarEngine {
    /// Engine talking to the sidecar at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TranscriptionEngine for SidecarEngine {
    async fn transcribe(&self, audio: &[u8]) -> Result<Vec<Segment>, TranscriptionError> {
        let part = Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .request("build multipart part")?;
        let form = Form::new().part("audio", part);

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await
            .request("send to transcriber")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Upstream { status, body });
        }

        let parsed: SidecarResponse = response.json().await.malformed("decode response")?;
        Ok(parsed.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn happy_path_returns_segments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "segments": [
                    {"start": 0.0, "end": 1.5, "text": "hello"},
                    {"start": 1.5, "end": 2.2, "text": "world"},
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = SidecarEngine::new(server.uri());
        let segments = engine.transcribe(b"fake wav bytes").await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello");
        assert_eq!(segments[1].end, 2.2);
    }

    #[tokio::test]
    async fn upstream_failure_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let engine = SidecarEngine::new(server.uri());
        let err = engine.transcribe(b"bytes").await.unwrap_err();
        assert_matches!(
            err,
            TranscriptionError::Upstream { status: 500, body } if body == "model not loaded"
        );
    }

    #[tokio::test]
    async fn malformed_response_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let engine = SidecarEngine::new(server.uri());
        assert_matches!(
            engine.transcribe(b"bytes").await,
            Err(TranscriptionError::Malformed(_))
        );
    }

    #[tokio::test]
    async fn unreachable_sidecar_is_a_request_error() {
        // Port 1 refuses connections.
        let engine = SidecarEngine::new("http://127.0.0.1:1");
        assert_matches!(
            engine.transcribe(b"bytes").await,
            Err(TranscriptionError::Request(_))
        );
    }
}
