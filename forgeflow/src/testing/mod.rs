//! Test support: scripted capabilities, a harness and assertions.
//!
//! Used by the crate's own tests and available to integrators that want to
//! exercise a [`GenerationService`](crate::service::GenerationService)
//! without a model server.

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_failed_with, assert_no_duplicates, assert_progress_monotonic, assert_succeeded_with,
    count_kind,
};
pub use fixtures::{eventually, within, TestHarness};
pub use mocks::{
    FailingPersistence, Gate, MemoryArtifactWriter, ScriptedGenerator, ScriptedPlanner,
};
