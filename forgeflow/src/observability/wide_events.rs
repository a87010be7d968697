//! One wide log line per finished run.

use crate::core::{RunRecord, RunStatus};
use crate::utils::format_iso;
use serde::Serialize;
use tracing::info;

/// Everything worth knowing about a finished run, in one flat payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Run id.
    pub job_id: String,
    /// Project name.
    pub name: String,
    /// Model used.
    pub model: String,
    /// Status at the time of the summary.
    pub status: RunStatus,
    /// Number of recorded artifacts.
    pub artifact_count: usize,
    /// Creation to terminal transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Present for failed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// True when the failure was a user cancellation.
    pub cancelled: bool,
    /// Output directory.
    pub output_location: String,
    /// Creation time.
    pub created_at: String,
    /// Terminal transition time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl RunSummary {
    /// Summarises a record.
    #[must_use]
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            job_id: record.id.to_string(),
            name: record.name.clone(),
            model: record.model.clone(),
            status: record.status,
            artifact_count: record.artifact_paths.len(),
            duration_ms: record.duration().map(|d| d.num_milliseconds()),
            failure_reason: record.failure_reason.clone(),
            cancelled: record.was_cancelled(),
            output_location: record.output_location.display().to_string(),
            created_at: format_iso(&record.created_at),
            completed_at: record.completed_at.as_ref().map(format_iso),
        }
    }

    /// Returns the summary as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Logs the wide summary of a terminal record.
pub fn emit_run_summary(record: &RunRecord) {
    let summary = RunSummary::from_record(record);
    info!(
        target: "forgeflow::runs",
        job_id = %summary.job_id,
        status = %summary.status,
        artifacts = summary.artifact_count,
        duration_ms = summary.duration_ms,
        cancelled = summary.cancelled,
        summary = %summary.to_json(),
        "Run finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, REASON_STOPPED_BY_USER};
    use std::path::PathBuf;

    #[test]
    fn test_summary_of_cancelled_run() {
        let mut record = RunRecord::new(JobId::new(), "n", "d", "m", PathBuf::from("output/n"));
        record.status = RunStatus::Failed;
        record.failure_reason = Some(REASON_STOPPED_BY_USER.to_string());
        record.artifact_paths = vec!["requirements.md".to_string()];
        record.completed_at = Some(record.created_at + chrono::Duration::milliseconds(1500));

        let summary = RunSummary::from_record(&record);
        assert!(summary.cancelled);
        assert_eq!(summary.duration_ms, Some(1500));
        assert_eq!(summary.artifact_count, 1);

        let json = summary.to_json();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failure_reason"], "stopped by user");
    }

    #[test]
    fn test_running_summary_omits_optional_fields() {
        let record = RunRecord::new(JobId::new(), "n", "d", "m", PathBuf::from("o"));
        let json = RunSummary::from_record(&record).to_json();
        assert!(json.get("duration_ms").is_none());
        assert!(json.get("failure_reason").is_none());
        assert!(json.get("completed_at").is_none());
        assert!(json["created_at"].as_str().unwrap().ends_with("+00:00"));
        emit_run_summary(&record);
    }
}
