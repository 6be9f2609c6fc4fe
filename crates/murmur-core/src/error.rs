//! Error taxonomy shared across the relay.

use thiserror::Error;

/// Failure to derive a group key from client-supplied parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupKeyError {
    /// The requested kind is not on the allow-list.
    #[error("unknown group kind: {0}")]
    UnknownKind(String),

    /// The session id was empty.
    #[error("session id must be non-empty")]
    EmptySessionId,
}

/// Why a connection was turned away before joining a group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The group kind or session id did not resolve to a valid key.
    #[error("invalid group request: {0}")]
    InvalidGroup(#[from] GroupKeyError),

    /// The Origin header was missing or not on the allow-list.
    #[error("origin not allowed: {}", .0.as_deref().unwrap_or("<none>"))]
    ForbiddenOrigin(Option<String>),
}
