//! # Forgeflow
//!
//! Orchestration core for LLM-driven project generation.
//!
//! A caller describes a project in natural language; forgeflow plans a set
//! of files, generates them one by one and reports progress to any number of
//! live observers:
//!
//! - **Run records**: durable status of every job, terminal exactly once
//! - **Cooperative cancellation**: per-job flags checked between stages
//! - **Event bus**: ordered fan-out with a replay buffer for late observers
//! - **Partial-failure tolerance**: one failed file never sinks the run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forgeflow::prelude::*;
//!
//! let config = ForgeflowConfig::from_env()?;
//! let service = GenerationService::open(config.clone(), Capabilities::ollama(&config)?).await?;
//!
//! let (_sub, mut events) = service.subscribe_channel();
//! let id = service.start_job("todo-app", "A minimal todo list web app", None).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.to_json()?);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, JobRegistry};
    pub use crate::config::ForgeflowConfig;
    pub use crate::core::{
        ArtifactSpec, EventPayload, JobId, JobPhase, Plan, ProgressEvent, RunRecord, RunStatus,
    };
    pub use crate::errors::{ForgeflowError, Result};
    pub use crate::events::{
        ChannelEventSink, EventBus, EventSink, LoggingEventSink, SubscriptionId,
    };
    pub use crate::llm::CompletionModel;
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{ArtifactWriter, Generator, JobOutcome, PipelineExecutor, Planner};
    pub use crate::service::{Capabilities, GenerationService};
    pub use crate::store::RunRecordStore;
}
