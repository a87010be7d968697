//! Run status and pipeline phase enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a run record.
///
/// A record starts as `Running` and moves exactly once to `Succeeded` or
/// `Failed`. Cancellation is reported as `Failed` with a recognisable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The pipeline is still driving the run.
    #[default]
    Running,
    /// The run finished and its artifacts are final.
    Succeeded,
    /// The run failed, was cancelled, or was interrupted.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Returns true if no further transition can happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// The pipeline phase reported in `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Job accepted, executor starting.
    Starting,
    /// Planning capability in flight.
    Planning,
    /// Generating planned artifacts.
    Generating,
    /// Writing the readme and terminal state.
    Finalizing,
    /// Terminal: succeeded.
    Completed,
    /// Terminal: failed or cancelled.
    Failed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Planning => write!(f, "planning"),
            Self::Generating => write!(f, "generating"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
