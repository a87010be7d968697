//! The durable record of one generation run.

use super::{JobId, RunStatus};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Failure reason recorded when a user cancels a running job.
pub const REASON_STOPPED_BY_USER: &str = "stopped by user";

/// Failure reason recorded when an executor notices its job was dropped from
/// the registry by a system reset.
pub const REASON_ABANDONED: &str = "abandoned by system reset";

/// Failure reason used when orphaned `running` records are reconciled.
pub const REASON_INTERRUPTED: &str = "interrupted";

/// Metadata and lifecycle state of one run.
///
/// Owned by the [`RunRecordStore`](crate::store::RunRecordStore); everything
/// else works with clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Identifier, immutable.
    pub id: JobId,
    /// Caller-supplied project name.
    pub name: String,
    /// Caller-supplied natural-language description.
    pub description: String,
    /// Model the run was requested with.
    pub model: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the record reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Relative paths of produced artifacts, in production order.
    #[serde(default)]
    pub artifact_paths: Vec<String>,
    /// Present only when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Directory holding the written artifacts.
    pub output_location: PathBuf,
}

impl RunRecord {
    /// Creates a new `running` record.
    #[must_use]
    pub fn new(
        id: JobId,
        name: impl Into<String>,
        description: impl Into<String>,
        model: impl Into<String>,
        output_location: PathBuf,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            model: model.into(),
            status: RunStatus::Running,
            created_at: crate::utils::now_utc(),
            completed_at: None,
            artifact_paths: Vec::new(),
            failure_reason: None,
            output_location,
        }
    }

    /// Returns true once the record has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the run failed because a user cancelled it.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.status == RunStatus::Failed
            && self.failure_reason.as_deref() == Some(REASON_STOPPED_BY_USER)
    }

    /// Wall-clock time between creation and the terminal transition.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }
}
