//! Best-effort fan-out of events to group members.

use std::sync::Arc;

use metrics::counter;
use murmur_core::RelayEvent;
use tracing::{debug, warn};

use super::registry::GroupRegistry;
use crate::metrics as names;

/// Outcome of one broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Members whose queue accepted the frame.
    pub delivered: usize,
    /// Members removed because their queue was full or closed.
    pub pruned: usize,
}

/// Deliver `event` to every current member of `group_key`.
///
/// The event is serialized once and shared. Zero members is a silent
/// no-op. A member that fails to accept the frame is pruned from the
/// registry; the remaining members are still attempted.
pub fn broadcast(registry: &GroupRegistry, group_key: &str, event: &RelayEvent) -> BroadcastReport {
    match serde_json::to_string(event) {
        Ok(json) => broadcast_text(registry, group_key, &Arc::new(json)),
        Err(e) => {
            warn!(group = group_key, error = %e, "failed to serialize event, nothing sent");
            BroadcastReport::default()
        }
    }
}

/// Deliver an already-serialized payload to every member of `group_key`.
pub fn broadcast_text(
    registry: &GroupRegistry,
    group_key: &str,
    payload: &Arc<String>,
) -> BroadcastReport {
    let members = registry.members(group_key);
    if members.is_empty() {
        return BroadcastReport::default();
    }

    let mut report = BroadcastReport::default();
    let mut stale = Vec::new();
    for member in &members {
        if member.send_text(Arc::clone(payload)) {
            report.delivered += 1;
        } else {
            stale.push(member.id);
        }
    }

    for id in stale {
        warn!(group = group_key, conn_id = %id, "pruning unresponsive group member");
        registry.leave(group_key, id);
        report.pruned += 1;
    }

    counter!(names::BROADCAST_DELIVERED_TOTAL).increment(report.delivered as u64);
    if report.pruned > 0 {
        counter!(names::BROADCAST_PRUNED_TOTAL).increment(report.pruned as u64);
    }
    debug!(
        group = group_key,
        delivered = report.delivered,
        pruned = report.pruned,
        "broadcast complete"
    );
    report
}
