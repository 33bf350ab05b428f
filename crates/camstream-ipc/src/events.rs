//! Events sent from the engine to the operator.

use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::state::{EngineState, StopReason};
use crate::types::{ChannelState, ErrorKind, StatsSnapshot};

/// Events that the engine can send to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Engine state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<EngineState>,

        /// Current state.
        current: Box<EngineState>,
    },

    /// The stream ended.
    StreamStopped {
        /// Why it ended.
        reason: StopReason,
    },

    /// The outbound channel moved to a new state.
    ChannelStateChanged(ChannelState),

    /// Updated delivery statistics.
    Stats(StatsSnapshot),

    /// Current settings.
    Settings(Settings),

    /// An operation failed.
    Error {
        /// Error class.
        kind: ErrorKind,

        /// Error message.
        message: String,
    },

    /// Newest camera frame seen since the last preview report.
    PreviewFrame {
        /// Frame sequence number within the capture session.
        sequence: u64,

        /// Frame width in pixels.
        width: u32,

        /// Frame height in pixels.
        height: u32,

        /// Capture time relative to session start, in milliseconds.
        offset_ms: u64,
    },

    /// A text message arrived from the remote endpoint.
    ServerMessage {
        /// Raw message text.
        text: String,
    },

    /// Engine is ready.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
