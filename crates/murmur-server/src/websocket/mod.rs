//! WebSocket relay core: connection handles, the group registry,
//! fan-out, and the per-connection session lifecycle.

pub mod connection;
pub mod fanout;
pub mod keepalive;
pub mod listener;
pub mod registry;
pub mod session;

pub use connection::{ConnectionHandle, OutboundFrame};
pub use fanout::BroadcastReport;
pub use registry::GroupRegistry;
