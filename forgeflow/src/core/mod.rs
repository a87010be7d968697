//! Core domain model types for forgeflow.
//!
//! This module contains the value types shared by every component:
//! - Job identifiers
//! - Run status and pipeline phases
//! - Run records
//! - Progress events
//! - Planning output

mod event;
mod id;
mod plan;
mod record;
mod status;

pub use event::{EventPayload, ProgressEvent};
pub use id::JobId;
pub use plan::{is_readme_path, ArtifactSpec, Plan};
pub use record::{RunRecord, REASON_ABANDONED, REASON_INTERRUPTED, REASON_STOPPED_BY_USER};
pub use status::{JobPhase, RunStatus};
