//! Operator console line parsing.
//!
//! One command per line. Settings changes use `set key=value ...` and are
//! validated locally before the engine sees them.

use thiserror::Error;

use camstream_ipc::{EngineCommand, Resolution, Settings, ValidationError};

pub const HELP: &str = "\
commands:
  start-capture            acquire the camera
  stop-capture             release the camera (stops the stream too)
  start-stream             connect and start sending frames
  stop-stream              stop sending frames
  set key=value ...        change rate, quality, resolution or endpoint
  settings                 print the current settings
  status                   print the engine state
  stats                    print the latest delivery statistics
  help                     show this text
  quit                     release everything and exit";

/// A parsed console line.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    Engine(EngineCommand),
    Set(Vec<Assignment>),
    Help,
    Quit,
}

/// One `key=value` pair from a `set` line.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Rate(u32),
    Quality(f32),
    Resolution(Resolution),
    Endpoint(String),
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}', try 'help'")]
    UnknownCommand(String),

    #[error("'{0}' takes no arguments")]
    UnexpectedArgument(String),

    #[error("set needs at least one key=value")]
    EmptySet,

    #[error("expected key=value, got '{0}'")]
    MalformedAssignment(String),

    #[error("unknown setting '{0}'")]
    UnknownSetting(String),

    #[error("invalid {key} '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Parse a console line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let verb = verb.to_ascii_lowercase();

    if verb == "set" {
        let assignments = words.map(parse_assignment).collect::<Result<Vec<_>, _>>()?;
        if assignments.is_empty() {
            return Err(ConsoleError::EmptySet);
        }
        return Ok(Some(ConsoleCommand::Set(assignments)));
    }

    let command = match verb.as_str() {
        "start-capture" => ConsoleCommand::Engine(EngineCommand::StartCapture),
        "stop-capture" => ConsoleCommand::Engine(EngineCommand::StopCapture),
        "start-stream" | "start" => ConsoleCommand::Engine(EngineCommand::StartStream),
        "stop-stream" | "stop" => ConsoleCommand::Engine(EngineCommand::StopStream),
        "settings" => ConsoleCommand::Engine(EngineCommand::GetSettings),
        "status" | "state" => ConsoleCommand::Engine(EngineCommand::GetState),
        "stats" => ConsoleCommand::Engine(EngineCommand::GetStats),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => return Err(ConsoleError::UnknownCommand(verb)),
    };

    if words.next().is_some() {
        return Err(ConsoleError::UnexpectedArgument(verb));
    }

    Ok(Some(command))
}

fn parse_assignment(word: &str) -> Result<Assignment, ConsoleError> {
    let (key, value) = word
        .split_once('=')
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .ok_or_else(|| ConsoleError::MalformedAssignment(word.to_string()))?;

    let invalid = |key: &'static str| ConsoleError::InvalidValue {
        key,
        value: value.to_string(),
    };

    match key.to_ascii_lowercase().as_str() {
        "rate" | "fps" => value
            .parse()
            .map(Assignment::Rate)
            .map_err(|_| invalid("rate")),
        "quality" => value
            .parse()
            .map(Assignment::Quality)
            .map_err(|_| invalid("quality")),
        "resolution" | "res" => value
            .parse()
            .map(Assignment::Resolution)
            .map_err(|_| invalid("resolution")),
        "endpoint" | "url" => Ok(Assignment::Endpoint(value.to_string())),
        _ => Err(ConsoleError::UnknownSetting(key.to_string())),
    }
}

/// Apply assignments on top of `current`, rejecting the result if any field
/// leaves its accepted range.
pub fn apply(current: &Settings, assignments: &[Assignment]) -> Result<Settings, ConsoleError> {
    let mut next = current.clone();
    for assignment in assignments {
        match assignment {
            Assignment::Rate(rate) => next.rate = *rate,
            Assignment::Quality(quality) => next.quality = *quality,
            Assignment::Resolution(resolution) => next.resolution = *resolution,
            Assignment::Endpoint(endpoint) => next.endpoint.clone_from(endpoint),
        }
    }

    next.validate()?;
    Ok(next)
}
