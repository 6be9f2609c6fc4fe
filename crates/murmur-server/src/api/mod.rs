//! HTTP API handlers.

pub mod transcribe;
