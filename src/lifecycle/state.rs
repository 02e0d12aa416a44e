//! Server lifecycle state machine

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Running,
    /// Store connection released; waiting for the store to be ready again
    Reconnecting,
    ShuttingDown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Reconnecting => "reconnecting",
            LifecycleState::ShuttingDown => "shutting_down",
        }
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Reconnecting)
                | (Reconnecting, Running)
                | (Running, ShuttingDown)
                | (Reconnecting, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current lifecycle state, shared between the supervisor and the RPC tools
#[derive(Debug, Default)]
pub struct StateMachine {
    state: Mutex<LifecycleState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Move to `next`, returning the previous state
    ///
    /// Re-entering the current state is accepted as a no-op.
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        let mut state = self.state.lock();
        let previous = *state;
        if previous == next {
            return Ok(previous);
        }
        if !previous.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: previous,
                to: next,
            });
        }
        *state = next;
        info!(from = %previous, to = %next, "lifecycle transition");
        Ok(previous)
    }
}
