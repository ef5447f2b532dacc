//! Wire types shared across the sigrelay signaling stack.
//!
//! This crate provides:
//! - JSON signaling messages and relay notifications ([`message`])
//! - Connection identifiers and protocol constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod message;
pub mod types;

pub use message::{MessageError, MessageKind, ServerMessage, SignalMessage};
pub use types::ConnectionId;
