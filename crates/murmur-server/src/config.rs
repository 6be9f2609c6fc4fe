//! Relay configuration: compiled defaults plus environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the session treats an inbound text frame that is not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedFramePolicy {
    /// Log the frame and keep waiting for the next one.
    Skip,
    /// Treat it as a protocol error and close with 1002.
    Disconnect,
}

/// Configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind; 0 asks the OS for a free port.
    pub port: u16,
    /// Origins allowed to open websocket connections.
    pub allowed_origins: Vec<String>,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
    /// Per-connection outbound queue depth.
    pub outbound_capacity: usize,
    /// Malformed inbound frame handling.
    pub malformed_frame_policy: MalformedFramePolicy,
    /// Shared secret for the transcription endpoint.
    pub api_key: String,
    /// Redis URL for the pub/sub bridge.
    pub redis_url: String,
    /// Base URL of the transcription sidecar.
    pub transcriber_url: String,
    /// Maximum decoded audio size accepted by the endpoint.
    pub max_audio_bytes: usize,
    /// Seconds to wait for tasks during graceful shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://apps.nim23.com".to_string(),
            ],
            ping_interval_secs: 20,
            outbound_capacity: 64,
            malformed_frame_policy: MalformedFramePolicy::Skip,
            api_key: "changeme".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            transcriber_url: "http://127.0.0.1:8990".to_string(),
            max_audio_bytes: 50 * 1024 * 1024,
            shutdown_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by environment variables where present.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %port, "ignoring unparseable PORT"),
            }
        }
        if let Some(key) = lookup("API_KEY") {
            config.api_key = key;
        }
        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(url) = lookup("TRANSCRIBER_URL") {
            config.transcriber_url = url;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(secs) = lookup("PING_INTERVAL_SECS") {
            match secs.parse() {
                Ok(secs) => config.ping_interval_secs = secs,
                Err(_) => warn!(value = %secs, "ignoring unparseable PING_INTERVAL_SECS"),
            }
        }
        config
    }

    /// Keepalive ping interval.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Graceful shutdown deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Whether `origin` is on the allow-list. A missing Origin header is
    /// never allowed.
    #[must_use]
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        origin.is_some_and(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
    }
}
