//! Assertions over run records and event streams.

use crate::core::{JobId, ProgressEvent, RunRecord, RunStatus};

/// Asserts the record succeeded with exactly `paths`, in order.
pub fn assert_succeeded_with(record: &RunRecord, paths: &[&str]) {
    assert_eq!(
        record.status,
        RunStatus::Succeeded,
        "run {} did not succeed: {:?}",
        record.id,
        record.failure_reason
    );
    assert_eq!(record.artifact_paths, paths, "artifact paths of {}", record.id);
    assert!(record.completed_at.is_some());
    assert!(record.failure_reason.is_none());
}

/// Asserts the record failed with `reason`.
pub fn assert_failed_with(record: &RunRecord, reason: &str) {
    assert_eq!(record.status, RunStatus::Failed, "run {} did not fail", record.id);
    assert_eq!(record.failure_reason.as_deref(), Some(reason));
    assert!(record.completed_at.is_some());
}

/// Asserts sequence numbers strictly increase and no event is repeated.
pub fn assert_no_duplicates(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].sequence < pair[1].sequence,
            "sequence {} followed by {}",
            pair[0].sequence,
            pair[1].sequence
        );
    }
}

/// Asserts progress percentages for `job` never decrease.
pub fn assert_progress_monotonic(events: &[ProgressEvent], job: JobId) {
    let mut last = 0;
    for percent in events
        .iter()
        .filter(|e| e.job_id == job)
        .filter_map(ProgressEvent::percent)
    {
        assert!(percent >= last, "progress went from {last} to {percent}");
        last = percent;
    }
}

/// Returns how many events of `kind` belong to `job`.
#[must_use]
pub fn count_kind(events: &[ProgressEvent], job: JobId, kind: &str) -> usize {
    events
        .iter()
        .filter(|e| e.job_id == job && e.kind() == kind)
        .count()
}
