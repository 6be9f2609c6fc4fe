//! Metric names and the Prometheus recorder.
//!
//! Names are centralized here so the `/metrics` surface stays stable;
//! handlers reference these constants instead of inline strings.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Websocket connections accepted (post-validation).
pub const WS_CONNECTIONS_TOTAL: &str = "murmur_ws_connections_total";
/// Websocket sessions ended, any reason.
pub const WS_DISCONNECTIONS_TOTAL: &str = "murmur_ws_disconnections_total";
/// Currently active websocket sessions.
pub const WS_CONNECTIONS_ACTIVE: &str = "murmur_ws_connections_active";
/// Session lifetime in seconds.
pub const WS_CONNECTION_DURATION_SECONDS: &str = "murmur_ws_connection_duration_seconds";
/// Connections rejected before joining a group, labeled by reason.
pub const WS_REJECTIONS_TOTAL: &str = "murmur_ws_rejections_total";

/// Frames delivered by group fan-out.
pub const BROADCAST_DELIVERED_TOTAL: &str = "murmur_broadcast_delivered_total";
/// Members pruned from groups on delivery failure.
pub const BROADCAST_PRUNED_TOTAL: &str = "murmur_broadcast_pruned_total";

/// Ready envelopes published to the bridge.
pub const BRIDGE_PUBLISH_TOTAL: &str = "murmur_bridge_publish_total";
/// Publishes the bridge refused.
pub const BRIDGE_PUBLISH_ERRORS_TOTAL: &str = "murmur_bridge_publish_errors_total";
/// Payloads forwarded from the bridge to sockets.
pub const BRIDGE_FORWARD_TOTAL: &str = "murmur_bridge_forward_total";

/// Transcription requests received, any outcome.
pub const TRANSCRIBE_REQUESTS_TOTAL: &str = "murmur_transcribe_requests_total";
/// Engine call latency in seconds.
pub const TRANSCRIBE_DURATION_SECONDS: &str = "murmur_transcribe_duration_seconds";

/// Install the process-global Prometheus recorder and return the render
/// handle. Call once at startup.
///
/// # Panics
///
/// Panics when a recorder is already installed.
#[must_use]
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Render the current metric snapshot in Prometheus text format.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}
