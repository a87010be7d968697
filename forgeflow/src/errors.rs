//! Error types for the forgeflow orchestration core.
//!
//! Per-artifact failures and cancellations are values the executor handles
//! itself; only the store, registry and control surface return them to callers.

use crate::core::{JobId, RunStatus};
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ForgeflowError>;

/// The main error type for forgeflow operations.
#[derive(Debug, Error)]
pub enum ForgeflowError {
    /// No run record or job handle exists for the id.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The record already reached a terminal status.
    #[error("Job {id} is already terminal ({status})")]
    AlreadyTerminal {
        /// The job concerned.
        id: JobId,
        /// Its current terminal status.
        status: RunStatus,
    },

    /// The id is already registered as an in-flight job.
    #[error("Job already registered: {0}")]
    AlreadyRegistered(JobId),

    /// The caller supplied an unusable request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The planning or generation capability failed.
    #[error("{capability} failed: {message}")]
    ExternalCapability {
        /// Which capability failed (`planning`, `generation`, `finalization`).
        capability: &'static str,
        /// Rendered cause chain.
        message: String,
    },

    /// One artifact could not be generated or written. Recovered locally.
    #[error("Artifact {path} failed: {message}")]
    PartialArtifact {
        /// The artifact path.
        path: String,
        /// Rendered cause chain.
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The durable record collection could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ForgeflowError {
    /// Wraps a capability failure, keeping the full `anyhow` context chain.
    #[must_use]
    pub fn capability(capability: &'static str, error: &anyhow::Error) -> Self {
        Self::ExternalCapability {
            capability,
            message: format!("{error:#}"),
        }
    }

    /// Wraps a failure of a single artifact.
    #[must_use]
    pub fn artifact(path: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::PartialArtifact {
            path: path.into(),
            message: format!("{error:#}"),
        }
    }

    /// Returns true for errors that mean the record can no longer be updated.
    #[must_use]
    pub const fn is_record_gone(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyTerminal { .. })
    }

    /// Short machine-readable code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyTerminal { .. } => "already_terminal",
            Self::AlreadyRegistered(_) => "already_registered",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ExternalCapability { .. } => "external_capability_failure",
            Self::PartialArtifact { .. } => "partial_artifact_failure",
            Self::Config(_) => "config",
            Self::Persistence(_) => "persistence",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}
