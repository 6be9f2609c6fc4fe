//! Group kinds and the keys derived from them.
//!
//! A group key names one session-scoped notification group. The same
//! string is used as the registry key and as the pub/sub channel name,
//! so every process that derives it for the same `(kind, session_id)`
//! lands on the same channel.

use std::fmt;
use std::str::FromStr;

use crate::error::GroupKeyError;

/// Kind of notification group a socket can join.
///
/// The set of kinds is a closed allow-list; anything else on the wire
/// is rejected before the socket joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Transcription progress groups.
    Whisper,
}

impl GroupKind {
    /// Every kind accepted on the wire.
    pub const ALL: &'static [GroupKind] = &[GroupKind::Whisper];

    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GroupKind::Whisper => "whisper",
        }
    }
}

impl FromStr for GroupKind {
    type Err = GroupKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whisper" => Ok(GroupKind::Whisper),
            other => Err(GroupKeyError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry and channel identifier derived from a kind and a session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    kind: GroupKind,
    session_id: String,
    channel: String,
}

impl GroupKey {
    /// Derive the key for `kind` and `session_id`.
    ///
    /// Deterministic: the same inputs always produce the same key. An
    /// empty session id is a construction error, never a valid key.
    pub fn resolve(kind: GroupKind, session_id: &str) -> Result<Self, GroupKeyError> {
        if session_id.is_empty() {
            return Err(GroupKeyError::EmptySessionId);
        }
        Ok(Self {
            kind,
            session_id: session_id.to_string(),
            channel: format!("{}_group_{}", kind.as_str(), session_id),
        })
    }

    /// The kind this key was derived from.
    #[must_use]
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// The session id this key was derived from.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The rendered `{kind}_group_{session_id}` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel)
    }
}
