//! Error types for the transport module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint is not a usable WebSocket URL.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// Connection attempt was refused or broke before opening.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt did not complete in time.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Channel closed before it opened.
    #[error("Channel closed before opening")]
    ClosedBeforeOpen,

    /// Event not legal in the current state.
    #[error("Invalid channel transition: {event} while {from}")]
    InvalidTransition { from: &'static str, event: &'static str },

    /// Send error.
    #[error("Send error: {0}")]
    Send(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
