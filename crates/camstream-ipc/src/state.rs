//! Engine state machine types.

use serde::{Deserialize, Serialize};

use crate::settings::{Resolution, Settings};

/// The current state of the streaming engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum EngineState {
    /// No camera, no stream.
    #[default]
    Idle,

    /// Camera is live, nothing is being sent.
    Previewing {
        /// Requested resolution.
        resolution: Resolution,

        /// Actual feed width.
        width: u32,

        /// Actual feed height.
        height: u32,
    },

    /// Camera is live and frames are being sent.
    Streaming {
        /// Settings captured when the stream started.
        settings: Settings,

        /// Actual feed width.
        width: u32,

        /// Actual feed height.
        height: u32,
    },
}

impl EngineState {
    /// Returns true if the engine is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the camera is live.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Previewing { .. } | Self::Streaming { .. })
    }

    /// Returns true if frames are being sent.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Previewing { .. } => "Previewing",
            Self::Streaming { .. } => "Streaming",
        }
    }
}

/// Reason for stopping the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    /// Operator requested stop.
    UserRequested,

    /// The camera was released while streaming.
    CaptureStopped,

    /// The outbound connection never opened.
    ConnectionFailed { message: String },

    /// Engine is shutting down.
    Shutdown,
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Stream stopped by operator".to_string(),
            Self::CaptureStopped => "Camera stopped".to_string(),
            Self::ConnectionFailed { message } => format!("Connection failed: {message}"),
            Self::Shutdown => "Engine shutting down".to_string(),
        }
    }
}
