//! murmur-server — the session-group WebSocket relay.
//!
//! Accepts browser websockets on `/ws/{group_kind}`, keys each one into
//! a session-scoped group, bridges the group over a pub/sub broker so
//! sibling processes see the same traffic, and fans server-produced
//! events out to every member. An authenticated HTTP endpoint feeds
//! transcription progress into the same groups.

pub mod api;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{MalformedFramePolicy, RelayConfig};
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
