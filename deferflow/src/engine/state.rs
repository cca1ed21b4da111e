//! Invocation lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of one engine invocation.
///
/// `Idle -> Running -> (Draining | DrainingAsync) -> Settled`. No state is
/// revisited and draining always precedes settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, action not started.
    Idle,
    /// The action is running or its future is pending.
    Running,
    /// Draining cleanup after the action settled synchronously.
    Draining,
    /// Draining cleanup after the action's future settled.
    DrainingAsync,
    /// Outcome fixed and cleanup done.
    Settled {
        /// Whether the action succeeded.
        success: bool,
    },
}

impl ExecutionState {
    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Draining | Self::DrainingAsync)
                | (Self::Draining | Self::DrainingAsync, Self::Settled { .. })
        )
    }

    /// Returns true for the settled states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    /// Returns true while cleanup is being drained.
    #[must_use]
    pub fn is_draining(self) -> bool {
        matches!(self, Self::Draining | Self::DrainingAsync)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::DrainingAsync => write!(f, "draining_async"),
            Self::Settled { success: true } => write!(f, "settled(success)"),
            Self::Settled { success: false } => write!(f, "settled(failure)"),
        }
    }
}
