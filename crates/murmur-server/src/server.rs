//! The relay server: shared state, router, and the listen loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use murmur_broker::Broker;
use murmur_transcribe::TranscriptionEngine;

use crate::api::transcribe::transcribe_handler;
use crate::config::RelayConfig;
use crate::health::{health_check, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::GroupRegistry;
use crate::websocket::session::ws_handler;

/// Everything handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Immutable runtime configuration.
    pub config: Arc<RelayConfig>,
    /// Group membership.
    pub registry: Arc<GroupRegistry>,
    /// Cross-process pub/sub.
    pub broker: Arc<dyn Broker>,
    /// Transcription collaborator.
    pub engine: Arc<dyn TranscriptionEngine>,
    /// Shutdown coordination.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
}

/// The relay server. Owns the state; `listen` serves it.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Assemble a server from its collaborators.
    #[must_use]
    pub fn new(
        config: RelayConfig,
        broker: Arc<dyn Broker>,
        engine: Arc<dyn TranscriptionEngine>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            state: AppState {
                config: Arc::new(config),
                registry: Arc::new(GroupRegistry::new()),
                broker,
                engine,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                metrics,
                start_time: Instant::now(),
            },
        }
    }

    /// The group registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.state.registry
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Build the router with every route and layer attached.
    #[must_use]
    pub fn router(&self) -> Router {
        // Audio arrives base64-encoded inside a JSON body, so the raw
        // request is ~4/3 the decoded cap; leave slack for the envelope.
        let body_limit = self.state.config.max_audio_bytes / 3 * 4 + 64 * 1024;
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/{group_kind}", get(ws_handler))
            .route("/api/transcribe", post(transcribe_handler))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(cors_layer(&self.state.config))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve
    /// task's join handle.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });
        info!(addr = %local_addr, "relay listening");
        Ok((local_addr, handle))
    }
}

fn cors_layer(config: &RelayConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// `GET /` — service banner.
async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the murmur relay API" }))
}

/// `GET /health` — liveness with registry counts.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.group_count(),
    ))
}

/// `GET /metrics` — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine as _;
    use murmur_broker::MemoryBroker;
    use murmur_transcribe::{Segment, TranscriptionError};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct ScriptedEngine(Vec<Segment>);

    #[async_trait]
    impl TranscriptionEngine for ScriptedEngine {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Vec<Segment>, TranscriptionError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl TranscriptionEngine for FailingEngine {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Vec<Segment>, TranscriptionError> {
            Err(TranscriptionError::Request("connection refused".into()))
        }
    }

    fn make_server(engine: Arc<dyn TranscriptionEngine>) -> RelayServer {
        let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        RelayServer::new(
            RelayConfig::default(),
            Arc::new(MemoryBroker::new()),
            engine,
            metrics,
        )
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn transcribe_request(key: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/transcribe")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn root_returns_banner() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("murmur"));
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["groups"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn transcribe_without_key_is_forbidden() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let request = transcribe_request(
            None,
            json!({"audio_base64": "AAAA", "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Invalid API Key");
    }

    #[tokio::test]
    async fn transcribe_with_wrong_key_is_forbidden() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let request = transcribe_request(
            Some("wrong"),
            json!({"audio_base64": "AAAA", "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn transcribe_rejects_undecodable_audio() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": "!!!not base64!!!", "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transcribe_rejects_empty_audio() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": "", "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transcribe_rejects_empty_session_id() {
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": "AAAA", "socket_session_id": ""}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transcribe_engine_failure_is_502() {
        let server = make_server(Arc::new(FailingEngine));
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": "AAAA", "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn transcribe_joins_segments_with_spaces() {
        let server = make_server(Arc::new(ScriptedEngine(vec![
            Segment {
                start: 0.0,
                end: 1.5,
                text: " hello".into(),
            },
            Segment {
                start: 1.5,
                end: 2.2,
                text: " world".into(),
            },
        ])));
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": "AAAA", "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["transcription"], "hello world");
    }

    #[tokio::test]
    async fn multi_megabyte_audio_reaches_the_handler() {
        // Well past axum's stock 2 MB body limit but under the audio cap.
        let server = make_server(Arc::new(ScriptedEngine(vec![])));
        let audio = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 3 * 1024 * 1024]);
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": audio, "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversize_audio_is_rejected() {
        let server = {
            let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle();
            RelayServer::new(
                RelayConfig {
                    max_audio_bytes: 8,
                    ..RelayConfig::default()
                },
                Arc::new(MemoryBroker::new()),
                Arc::new(ScriptedEngine(vec![])),
                metrics,
            )
        };
        let oversized = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        let request = transcribe_request(
            Some("changeme"),
            json!({"audio_base64": oversized, "socket_session_id": "abc"}),
        );
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
