//! Session lifecycle state machine
//!
//! ```text
//! Idle -> Starting -> AwaitingConnection -> Streaming -> Stopping -> Stopped
//!            \______________\_________________\____________\----> Errored
//! ```
//!
//! `Stopped` and `Errored` are terminal. Transitions are computed by the pure
//! [`SessionState::next`] so the monitor task only applies its result.

use serde::{Deserialize, Serialize};

use super::classify::LineClass;

/// Lifecycle state of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No engine process yet
    #[default]
    Idle,
    /// Engine spawned, no diagnostics seen
    Starting,
    /// Engine talking, endpoint not yet connected
    AwaitingConnection,
    /// Connected and pushing video
    Streaming,
    /// Termination requested, waiting for exit
    Stopping,
    /// Ended on request
    Stopped,
    /// Ended by failure
    Errored,
}

impl SessionState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }

    /// Whether a session in this state holds the exclusivity slot
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }

    /// State after `input`, or `None` when the input changes nothing
    pub fn next(self, input: SessionInput) -> Option<SessionState> {
        use SessionState::*;

        match (self, input) {
            (Stopped | Errored, _) => None,

            (Idle, SessionInput::Spawned) => Some(Starting),
            (Idle, SessionInput::SpawnFailed) => Some(Errored),

            // Teardown in progress; diagnostics no longer drive the state
            (Stopping, SessionInput::Line(_)) => None,
            (Stopping, SessionInput::Exited { .. }) => Some(Stopped),

            (Starting | AwaitingConnection | Streaming, SessionInput::Line(LineClass::Failure)) => {
                Some(Errored)
            }
            (Starting | AwaitingConnection, SessionInput::Line(LineClass::Connected)) => {
                Some(Streaming)
            }
            (Starting, SessionInput::Line(LineClass::Other)) => Some(AwaitingConnection),

            (Starting | AwaitingConnection | Streaming, SessionInput::StopRequested) => {
                Some(Stopping)
            }

            (Starting | AwaitingConnection | Streaming, SessionInput::Exited { stop_requested: true, .. }) => {
                Some(Stopped)
            }
            (Starting | AwaitingConnection | Streaming, SessionInput::Exited { .. }) => Some(Errored),

            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::AwaitingConnection => "awaiting connection",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Something that can move a session between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// Engine process created
    Spawned,
    /// Engine process could not be created
    SpawnFailed,
    /// A classified diagnostic line
    Line(LineClass),
    /// Operator asked for teardown
    StopRequested,
    /// Engine process exited
    Exited {
        exit_code: Option<i32>,
        stop_requested: bool,
    },
}
