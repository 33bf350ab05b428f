//! Core pipeline for camstream.
//!
//! This crate ties capture, encoding and transport together: a
//! [`StreamController`] owns the camera and the stream, a [`FrameScheduler`]
//! paces frames onto the channel, and an [`Engine`] drives both from IPC
//! commands.

mod controller;
mod error;
mod orchestrator;
mod scheduler;
mod settings;
mod stats;

pub use controller::{CaptureInfo, StreamController};
pub use error::StreamerError;
pub use orchestrator::{spawn_engine, Engine, EngineConfig, EngineHandle};
pub use scheduler::{FrameScheduler, StreamStarted};
pub use settings::SettingsStore;
pub use stats::{DropCause, StatsAggregator};

use std::time::Duration;

/// Result type for pipeline operations.
pub type StreamerResult<T> = Result<T, StreamerError>;

/// How often the ticker logs a summary line.
pub const TICK_SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// How often the engine checks that the camera is still delivering.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(500);
