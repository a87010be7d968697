//! Progress events emitted while a job runs.

use super::{JobId, JobPhase};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// The kind-specific part of a progress event.
///
/// Serialised with an internal `kind` tag so transports see a flat object,
/// e.g. `{"kind": "progress", "percent": 40, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventPayload {
    /// Generation of an artifact began.
    ArtifactStarted {
        /// Relative artifact path.
        artifact: String,
    },
    /// An artifact was written and recorded.
    ArtifactFinished {
        /// Relative artifact path.
        artifact: String,
    },
    /// Overall progress moved.
    Progress {
        /// 0-100, non-decreasing within a job by convention.
        percent: u8,
        /// Human-readable note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Artifact about to be generated, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },
    /// The job entered a new phase.
    Status {
        /// The phase entered.
        phase: JobPhase,
        /// Human-readable note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Something failed. Per-artifact errors do not end the job.
    Error {
        /// Human-readable cause.
        message: String,
        /// Artifact concerned, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },
}

impl EventPayload {
    /// Returns the wire name of this payload's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactStarted { .. } => "artifact-started",
            Self::ArtifactFinished { .. } => "artifact-finished",
            Self::Progress { .. } => "progress",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }
}

/// An immutable progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The job this event belongs to.
    pub job_id: JobId,
    /// Bus-wide publication order, assigned by the event bus.
    #[serde(default)]
    pub sequence: u64,
    /// When the event was created.
    pub timestamp: Timestamp,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ProgressEvent {
    /// Creates an event for `job_id`. The sequence is filled in on publication.
    #[must_use]
    pub fn new(job_id: JobId, payload: EventPayload) -> Self {
        Self {
            job_id,
            sequence: 0,
            timestamp: crate::utils::now_utc(),
            payload,
        }
    }

    /// Creates an `artifact-started` event.
    #[must_use]
    pub fn artifact_started(job_id: JobId, artifact: impl Into<String>) -> Self {
        Self::new(
            job_id,
            EventPayload::ArtifactStarted {
                artifact: artifact.into(),
            },
        )
    }

    /// Creates an `artifact-finished` event.
    #[must_use]
    pub fn artifact_finished(job_id: JobId, artifact: impl Into<String>) -> Self {
        Self::new(
            job_id,
            EventPayload::ArtifactFinished {
                artifact: artifact.into(),
            },
        )
    }

    /// Creates a `progress` event. `percent` is clamped to 100.
    #[must_use]
    pub fn progress(job_id: JobId, percent: u8, message: Option<String>) -> Self {
        Self::new(
            job_id,
            EventPayload::Progress {
                percent: percent.min(100),
                message,
                artifact: None,
            },
        )
    }

    /// Creates a `progress` event tied to an artifact.
    #[must_use]
    pub fn artifact_progress(job_id: JobId, percent: u8, artifact: impl Into<String>) -> Self {
        let artifact = artifact.into();
        Self::new(
            job_id,
            EventPayload::Progress {
                percent: percent.min(100),
                message: Some(format!("Generating {artifact}")),
                artifact: Some(artifact),
            },
        )
    }

    /// Creates a `status` event.
    #[must_use]
    pub fn status(job_id: JobId, phase: JobPhase, message: impl Into<String>) -> Self {
        Self::new(
            job_id,
            EventPayload::Status {
                phase,
                message: Some(message.into()),
            },
        )
    }

    /// Creates an `error` event.
    #[must_use]
    pub fn error(job_id: JobId, message: impl Into<String>, artifact: Option<String>) -> Self {
        Self::new(
            job_id,
            EventPayload::Error {
                message: message.into(),
                artifact,
            },
        )
    }

    /// Returns the wire name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Returns the progress percentage, if this is a `progress` event.
    #[must_use]
    pub const fn percent(&self) -> Option<u8> {
        match self.payload {
            EventPayload::Progress { percent, .. } => Some(percent),
            _ => None,
        }
    }

    /// Returns the artifact this event concerns, if any.
    #[must_use]
    pub fn artifact(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ArtifactStarted { artifact }
            | EventPayload::ArtifactFinished { artifact } => Some(artifact),
            EventPayload::Progress { artifact, .. } | EventPayload::Error { artifact, .. } => {
                artifact.as_deref()
            }
            EventPayload::Status { .. } => None,
        }
    }

    /// Serialises the event for a transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let id = JobId::new();
        assert_eq!(ProgressEvent::artifact_started(id, "a.py").kind(), "artifact-started");
        assert_eq!(ProgressEvent::artifact_finished(id, "a.py").kind(), "artifact-finished");
        assert_eq!(ProgressEvent::progress(id, 5, None).kind(), "progress");
        assert_eq!(ProgressEvent::status(id, JobPhase::Starting, "go").kind(), "status");
        assert_eq!(ProgressEvent::error(id, "boom", None).kind(), "error");
    }

    #[test]
    fn test_percent_is_clamped() {
        let event = ProgressEvent::progress(JobId::new(), 250, None);
        assert_eq!(event.percent(), Some(100));
    }

    #[test]
    fn test_artifact_accessor() {
        let id = JobId::new();
        assert_eq!(ProgressEvent::artifact_progress(id, 40, "b.rs").artifact(), Some("b.rs"));
        assert_eq!(
            ProgressEvent::error(id, "x", Some("c.rs".to_string())).artifact(),
            Some("c.rs")
        );
        assert_eq!(ProgressEvent::status(id, JobPhase::Planning, "p").artifact(), None);
    }

    #[test]
    fn test_wire_format_is_flat() {
        let event = ProgressEvent::artifact_progress(JobId::new(), 40, "src/main.rs");
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["kind"], "progress");
        assert_eq!(value["percent"], 40);
        assert_eq!(value["artifact"], "src/main.rs");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_status_wire_format() {
        let event = ProgressEvent::status(JobId::new(), JobPhase::Completed, "done");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "status");
        assert_eq!(value["phase"], "completed");

        let back: ProgressEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
