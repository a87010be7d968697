//! Cooperative cancellation and in-flight job bookkeeping.
//!
//! This module provides:
//! - CancellationToken, the per-job cancellation flag
//! - JobRegistry, the set of running jobs
//! - RegistrationGuard, which unregisters a job on every exit path
//! - JobTaskGroup, which owns spawned job tasks

mod guard;
mod registry;
mod task_group;
mod token;

pub use guard::RegistrationGuard;
pub use registry::{Checkpoint, JobHandle, JobRegistry, RESET_REASON};
pub use task_group::JobTaskGroup;
pub use token::CancellationToken;
