//! Typed operator<->engine messages for camstream.
//!
//! This crate defines the message types exchanged between the operator
//! console and the streaming engine, plus the configuration and statistics
//! values both sides read.

mod commands;
mod events;
mod settings;
mod state;
mod types;

pub use commands::EngineCommand;
pub use events::EngineEvent;
pub use settings::{Resolution, Settings, ValidationError, MAX_RATE, MIN_RATE};
pub use state::{EngineState, StopReason};
pub use types::{ChannelState, ErrorKind, StatsSnapshot};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (operator → engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (engine → operator).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
///
/// The engine consumes commands from async code, so this side of the IPC
/// uses a tokio channel. Producers on plain threads use `blocking_send`.
pub fn command_channel() -> (
    tokio::sync::mpsc::Sender<EngineCommand>,
    tokio::sync::mpsc::Receiver<EngineCommand>,
) {
    tokio::sync::mpsc::channel(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
