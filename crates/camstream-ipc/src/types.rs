//! Common types used across IPC messages.

use serde::{Deserialize, Serialize};

/// Delivery statistics published while streaming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Frames handed to the connection since the stream started.
    pub frames_sent: u64,

    /// Configured rate. Echoed from settings, not measured.
    pub fps: u32,

    /// Whether the outbound connection is open.
    pub is_connected: bool,

    /// Hand-off time of the most recent frame, in milliseconds.
    pub latency_ms: f64,

    /// Total ticks that produced no transmitted frame.
    pub dropped_frames: u64,

    /// Ticks with no feed data to sample.
    pub capture_drops: u64,

    /// Ticks whose encode yielded nothing.
    pub encode_drops: u64,

    /// Frames discarded because the channel was not open or busy.
    pub channel_drops: u64,

    /// Ticks skipped because the previous tick was still running.
    pub overlap_drops: u64,

    /// Payload bytes handed to the connection.
    pub bytes_sent: u64,
}

/// State of the outbound connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Created, not yet connecting.
    #[default]
    Idle,

    /// Connection attempt in progress.
    Connecting,

    /// Connected; sends are accepted.
    Open,

    /// Closed locally or by the remote side.
    Closed,

    /// Never reached Open.
    Failed { reason: String },
}

impl ChannelState {
    /// Check if sends are accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if a connection attempt is outstanding.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Check if the channel can no longer open.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed { .. })
    }

    /// Check if failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Failed { .. } => "Failed",
        }
    }

    /// Get status message for display.
    pub fn message(&self) -> String {
        match self {
            Self::Idle => "Idle".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Open => "Connected".to_string(),
            Self::Closed => "Disconnected".to_string(),
            Self::Failed { reason } => format!("Failed: {reason}"),
        }
    }
}

/// Error classes reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Camera permission denied or no device.
    DeviceAccess,

    /// Outbound connection could not be established.
    Connection,

    /// Operation not valid in the current state.
    Precondition,

    /// Configuration value out of range.
    Validation,
}
