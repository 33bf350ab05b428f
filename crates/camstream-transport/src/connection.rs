//! Connection state management.
//!
//! Every state change of a channel goes through [`transition`], so the legal
//! edges live in one place and can be tested without sockets.

use std::time::Duration;

use camstream_ipc::ChannelState;

use crate::error::TransportError;
use crate::{TransportResult, DEFAULT_CONNECT_TIMEOUT};

/// Something that happened to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Caller asked to connect.
    Connect,

    /// Link established.
    Opened,

    /// Closed locally or by the remote side.
    Closed,

    /// Connection attempt failed.
    Failed(String),

    /// A payload left through the link.
    MessageSent,
}

impl ChannelEvent {
    /// Returns a simple string representation of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Failed(_) => "failed",
            Self::MessageSent => "message_sent",
        }
    }
}

/// Compute the state that follows `event`.
///
/// Closing is legal from every state. A channel that already failed stays
/// failed so the reason is kept.
pub fn transition(state: &ChannelState, event: &ChannelEvent) -> TransportResult<ChannelState> {
    use ChannelState as S;

    let next = match (state, event) {
        (S::Idle, ChannelEvent::Connect) => S::Connecting,
        (S::Connecting, ChannelEvent::Opened) => S::Open,
        (S::Connecting, ChannelEvent::Failed(reason)) => S::Failed {
            reason: reason.clone(),
        },
        (S::Open, ChannelEvent::MessageSent) => S::Open,
        (S::Failed { reason }, ChannelEvent::Closed) => S::Failed {
            reason: reason.clone(),
        },
        (_, ChannelEvent::Closed) => S::Closed,
        _ => {
            return Err(TransportError::InvalidTransition {
                from: state.name(),
                event: event.name(),
            })
        }
    };

    Ok(next)
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upper bound on the connect attempt. `None` waits forever.
    pub connect_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl ChannelConfig {
    /// Configuration that never gives up on a pending connect.
    pub fn unbounded() -> Self {
        Self {
            connect_timeout: None,
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(reason: &str) -> ChannelState {
        ChannelState::Failed {
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_happy_path() {
        let state = transition(&ChannelState::Idle, &ChannelEvent::Connect).unwrap();
        assert_eq!(state, ChannelState::Connecting);

        let state = transition(&state, &ChannelEvent::Opened).unwrap();
        assert_eq!(state, ChannelState::Open);

        let state = transition(&state, &ChannelEvent::MessageSent).unwrap();
        assert_eq!(state, ChannelState::Open);

        let state = transition(&state, &ChannelEvent::Closed).unwrap();
        assert_eq!(state, ChannelState::Closed);
    }

    #[test]
    fn test_connect_failure() {
        let state = transition(
            &ChannelState::Connecting,
            &ChannelEvent::Failed("refused".into()),
        )
        .unwrap();
        assert_eq!(state, failed("refused"));
    }

    #[test]
    fn test_close_from_any_state() {
        for state in [
            ChannelState::Idle,
            ChannelState::Connecting,
            ChannelState::Open,
            ChannelState::Closed,
        ] {
            assert_eq!(
                transition(&state, &ChannelEvent::Closed).unwrap(),
                ChannelState::Closed
            );
        }

        assert_eq!(
            transition(&failed("x"), &ChannelEvent::Closed).unwrap(),
            failed("x")
        );
    }

    #[test]
    fn test_illegal_edges_rejected() {
        let illegal = [
            (ChannelState::Idle, ChannelEvent::Opened),
            (ChannelState::Idle, ChannelEvent::MessageSent),
            (ChannelState::Connecting, ChannelEvent::Connect),
            (ChannelState::Connecting, ChannelEvent::MessageSent),
            (ChannelState::Open, ChannelEvent::Connect),
            (ChannelState::Open, ChannelEvent::Opened),
            (ChannelState::Open, ChannelEvent::Failed("late".into())),
            (ChannelState::Closed, ChannelEvent::Connect),
            (ChannelState::Closed, ChannelEvent::Opened),
            (ChannelState::Closed, ChannelEvent::MessageSent),
            (failed("x"), ChannelEvent::Opened),
            (failed("x"), ChannelEvent::Connect),
        ];

        for (state, event) in illegal {
            assert!(
                matches!(
                    transition(&state, &event),
                    Err(TransportError::InvalidTransition { .. })
                ),
                "{:?} + {:?} should be rejected",
                state,
                event
            );
        }
    }

    #[test]
    fn test_default_config_is_bounded() {
        assert_eq!(
            ChannelConfig::default().connect_timeout,
            Some(DEFAULT_CONNECT_TIMEOUT)
        );
        assert_eq!(ChannelConfig::unbounded().connect_timeout, None);
    }
}
