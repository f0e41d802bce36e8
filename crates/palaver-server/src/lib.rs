//! # palaver-server
//!
//! Realtime chat broadcast server.
//!
//! The server wires the `palaver-core` registry and broadcaster to an
//! axum WebSocket gateway, a username registration endpoint, and the
//! ambient stack (config, metrics, tracing).

pub mod config;
pub mod directory;
pub mod handlers;
pub mod metrics;
