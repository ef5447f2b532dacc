use thiserror::Error;

/// Errors that can occur while serving a relay connection.
#[derive(Error, Debug)]
pub enum RelayError {
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A wire message could not be encoded or decoded.
    #[error("message error: {0}")]
    Message(#[from] sigrelay_common::MessageError),
}
