//! Signaling relay server — routes WebRTC session setup between browser peers.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay server operations.
pub mod error;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Identifier-keyed registry of live connections.
pub mod registry;
/// HTTP surface, listener loop and shared server state.
pub mod server;

pub use server::{app, run, run_with_shutdown, ServerState};
