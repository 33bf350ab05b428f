//! Error types reported to the operator.

use thiserror::Error;

use camstream_capture::CaptureError;
use camstream_ipc::{ErrorKind, ValidationError};
use camstream_transport::TransportError;

/// Errors returned by pipeline operations.
#[derive(Debug, Error)]
pub enum StreamerError {
    /// Camera could not be acquired.
    #[error("Camera unavailable: {0}")]
    DeviceAccess(CaptureError),

    /// Outbound connection could not be established.
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// Operation not valid in the current state.
    #[error("{0}")]
    Precondition(&'static str),

    /// Settings rejected.
    #[error("Invalid settings: {0}")]
    Validation(#[from] ValidationError),
}

impl StreamerError {
    /// Error class for IPC.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceAccess(_) => ErrorKind::DeviceAccess,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}

impl From<CaptureError> for StreamerError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::AlreadyStarted => Self::Precondition("Camera is already active"),
            other => Self::DeviceAccess(other),
        }
    }
}
