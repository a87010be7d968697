//! The generation pipeline.
//!
//! This module provides:
//! - Capability ports the executor drives (planning, generation, writing)
//! - The linear progress split
//! - The [`PipelineExecutor`] state machine
//! - Completion-backed planner and generator

mod agents;
mod capabilities;
mod executor;
mod progress;

pub use agents::{clean_code, parse_file_plan, CompletionGenerator, CompletionPlanner};
pub use capabilities::{
    resolve_relative, ArtifactWriter, FsArtifactWriter, GenerationRequest, Generator, Planner,
};
pub use executor::{JobContext, JobOutcome, PipelineExecutor, README_PATH, REQUIREMENTS_PATH};
pub use progress::ProgressBudget;
