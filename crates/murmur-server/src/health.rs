//! Liveness endpoint payload.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process answers.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live websocket connections.
    pub connections: usize,
    /// Non-empty groups in the registry.
    pub groups: usize,
}

/// Build the health snapshot.
#[must_use]
pub fn health_check(start_time: Instant, connections: usize, groups: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        groups,
    }
}
