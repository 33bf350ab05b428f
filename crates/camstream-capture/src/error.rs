//! Error types for the capture module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The operator or the OS refused camera access.
    #[error("Permission denied for camera access")]
    PermissionDenied,

    /// No camera is attached.
    #[error("No capture device found")]
    NoDevice,

    /// The camera exists but could not be opened.
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The camera did not answer within the open timeout.
    #[error("Capture device did not open within {0:?}")]
    OpenTimeout(Duration),

    /// Capture already started.
    #[error("Capture already started")]
    AlreadyStarted,

    /// Frame conversion error.
    #[error("Frame conversion error: {0}")]
    FrameConversion(String),

    /// Device lost during capture.
    #[error("Capture device lost")]
    DeviceLost,

    /// Pump thread could not be spawned.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
