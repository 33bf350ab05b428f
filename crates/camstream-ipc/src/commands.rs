//! Commands sent from the operator to the engine.

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Commands that the operator can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Acquire the camera using the current resolution setting.
    StartCapture,

    /// Release the camera. Also stops any active stream.
    StopCapture,

    /// Open the outbound connection and start sending frames.
    StartStream,

    /// Stop sending frames and close the connection.
    StopStream,

    /// Replace the settings wholesale. Applied on the next start.
    UpdateSettings(Settings),

    /// Request the current settings.
    GetSettings,

    /// Request current engine state.
    GetState,

    /// Request the latest stats snapshot.
    GetStats,

    /// Shutdown the engine completely.
    Shutdown,
}
