//! Group membership registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::connection::ConnectionHandle;

/// Maps group keys to the set of live connections watching them.
///
/// The one shared-mutable structure in the relay; every membership
/// mutation goes through this lock. A group exists exactly while it has
/// members: entries appear on first join and vanish on last leave.
#[derive(Debug)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, HashMap<Uuid, Arc<ConnectionHandle>>>>,
    connections: AtomicUsize,
}

impl GroupRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            connections: AtomicUsize::new(0),
        }
    }

    /// Register `handle` under its group key. Idempotent per handle id.
    pub fn join(&self, handle: Arc<ConnectionHandle>) {
        let mut groups = self.groups.write();
        let members = groups.entry(handle.group.as_str().to_string()).or_default();
        if members.insert(handle.id, handle).is_none() {
            let _ = self.connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove `id` from `group_key`; drops the group entry when it
    /// empties. Unknown ids and keys are no-ops.
    pub fn leave(&self, group_key: &str, id: Uuid) {
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(group_key) {
            if members.remove(&id).is_some() {
                let _ = self.connections.fetch_sub(1, Ordering::Relaxed);
            }
            if members.is_empty() {
                let _ = groups.remove(group_key);
            }
        }
    }

    /// Snapshot of the current members; empty for an unknown key.
    #[must_use]
    pub fn members(&self, group_key: &str) -> Vec<Arc<ConnectionHandle>> {
        self.groups
            .read()
            .get(group_key)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `id` is currently a member of `group_key`.
    #[must_use]
    pub fn contains(&self, group_key: &str, id: Uuid) -> bool {
        self.groups
            .read()
            .get(group_key)
            .is_some_and(|members| members.contains_key(&id))
    }

    /// Total live connections across all groups.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Number of non-empty groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{GroupKey, GroupKind};
    use tokio::sync::mpsc;

    fn make_handle(session: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(4);
        let group = GroupKey::resolve(GroupKind::Whisper, session).unwrap();
        Arc::new(ConnectionHandle::new("127.0.0.1".to_string(), group, tx))
    }

    #[test]
    fn join_creates_the_group() {
        let registry = GroupRegistry::new();
        let handle = make_handle("abc");
        registry.join(handle.clone());
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.group_count(), 1);
        assert!(registry.contains("whisper_group_abc", handle.id));
    }

    #[test]
    fn join_is_idempotent_per_handle() {
        let registry = GroupRegistry::new();
        let handle = make_handle("abc");
        registry.join(handle.clone());
        registry.join(handle);
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.members("whisper_group_abc").len(), 1);
    }

    #[test]
    fn last_leave_removes_the_group() {
        let registry = GroupRegistry::new();
        let a = make_handle("abc");
        let b = make_handle("abc");
        registry.join(a.clone());
        registry.join(b.clone());
        assert_eq!(registry.group_count(), 1);

        registry.leave("whisper_group_abc", a.id);
        assert_eq!(registry.group_count(), 1);
        assert_eq!(registry.connection_count(), 1);

        registry.leave("whisper_group_abc", b.id);
        assert_eq!(registry.group_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn leave_unknown_id_or_key_is_a_no_op() {
        let registry = GroupRegistry::new();
        let handle = make_handle("abc");
        registry.join(handle);
        registry.leave("whisper_group_abc", Uuid::now_v7());
        registry.leave("whisper_group_missing", Uuid::now_v7());
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn members_of_unknown_group_is_empty() {
        let registry = GroupRegistry::new();
        assert!(registry.members("whisper_group_nope").is_empty());
    }

    #[test]
    fn groups_are_independent() {
        let registry = GroupRegistry::new();
        registry.join(make_handle("one"));
        registry.join(make_handle("two"));
        assert_eq!(registry.group_count(), 2);
        assert_eq!(registry.members("whisper_group_one").len(), 1);
        assert_eq!(registry.members("whisper_group_two").len(), 1);
    }
}
