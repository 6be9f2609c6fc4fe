//! Shared vocabulary of the murmur relay: group kinds and keys, wire
//! frames, and the error taxonomy used across the workspace.

pub mod error;
pub mod frames;
pub mod group;

pub use error::{GroupKeyError, RelayError};
pub use frames::{InboundFrame, ReadyEnvelope, RelayEvent, WelcomeFrame, PING_FRAME};
pub use group::{GroupKey, GroupKind};
