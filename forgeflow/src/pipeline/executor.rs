//! Drives one generation job from planning to its terminal record.

use super::{ArtifactWriter, GenerationRequest, Generator, Planner, ProgressBudget};
use crate::cancellation::{CancellationToken, Checkpoint, JobRegistry, RegistrationGuard};
use crate::core::{
    is_readme_path, JobId, JobPhase, Plan, ProgressEvent, RunRecord, REASON_ABANDONED,
    REASON_STOPPED_BY_USER,
};
use crate::errors::ForgeflowError;
use crate::events::EventBus;
use crate::observability::emit_run_summary;
use crate::store::RunRecordStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Path of the requirements artifact written after planning.
pub const REQUIREMENTS_PATH: &str = "requirements.md";

/// Path of the readme synthesised when the plan produced none.
pub const README_PATH: &str = "README.md";

/// What the executor knows about the job it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The job id, shared with its record.
    pub id: JobId,
    /// Caller-supplied project name.
    pub name: String,
    /// Caller-supplied project description.
    pub description: String,
    /// Model identifier passed to every capability call.
    pub model: String,
    /// Directory receiving the written artifacts.
    pub output_location: PathBuf,
    /// The job's cancellation flag, handed out by the registry.
    pub token: Arc<CancellationToken>,
}

impl JobContext {
    /// Builds a context from a freshly created record.
    #[must_use]
    pub fn from_record(record: &RunRecord, token: Arc<CancellationToken>) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            description: record.description.clone(),
            model: record.model.clone(),
            output_location: record.output_location.clone(),
            token,
        }
    }
}

/// How a job ended, as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The record was marked succeeded with these artifacts.
    Succeeded {
        /// Final artifact list, in production order.
        artifacts: Vec<String>,
    },
    /// The record was marked failed.
    Failed {
        /// The stored failure reason.
        reason: String,
    },
    /// An operator reset (or a delete) took the job away mid-run.
    Abandoned,
}

impl JobOutcome {
    /// Returns true for [`JobOutcome::Succeeded`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Why a run stopped before success.
#[derive(Debug)]
enum Stop {
    Cancelled(String),
    Abandoned,
    Failed(String),
}

impl From<ForgeflowError> for Stop {
    fn from(error: ForgeflowError) -> Self {
        if error.is_record_gone() {
            Self::Abandoned
        } else {
            Self::Failed(format!("record update failed: {error}"))
        }
    }
}

/// Runs jobs through planning, per-artifact generation and finalization.
///
/// Cancellation is cooperative: the registry is consulted before and after
/// planning and before every artifact. An in-flight capability call is never
/// interrupted.
pub struct PipelineExecutor {
    registry: Arc<JobRegistry>,
    store: Arc<RunRecordStore>,
    bus: Arc<EventBus>,
    planner: Arc<dyn Planner>,
    generator: Arc<dyn Generator>,
    writer: Arc<dyn ArtifactWriter>,
    budget: ProgressBudget,
}

impl PipelineExecutor {
    /// Creates an executor over shared services and capabilities.
    #[must_use]
    pub fn new(
        registry: Arc<JobRegistry>,
        store: Arc<RunRecordStore>,
        bus: Arc<EventBus>,
        planner: Arc<dyn Planner>,
        generator: Arc<dyn Generator>,
        writer: Arc<dyn ArtifactWriter>,
    ) -> Self {
        Self {
            registry,
            store,
            bus,
            planner,
            generator,
            writer,
            budget: ProgressBudget::default(),
        }
    }

    /// Replaces the progress split.
    #[must_use]
    pub const fn with_budget(mut self, budget: ProgressBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Returns the progress split in use.
    #[must_use]
    pub const fn budget(&self) -> ProgressBudget {
        self.budget
    }

    /// Runs a registered job to completion.
    ///
    /// The job is unregistered when this returns, whatever the outcome.
    pub async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let span = info_span!("generation_job", job_id = %ctx.id, name = %ctx.name);
        self.run(ctx).instrument(span).await
    }

    async fn run(&self, ctx: JobContext) -> JobOutcome {
        let _registration = RegistrationGuard::new(self.registry.clone(), ctx.id);
        info!(model = %ctx.model, "Job started");
        self.bus.publish(ProgressEvent::status(
            ctx.id,
            JobPhase::Starting,
            format!("Starting {}", ctx.name),
        ));

        match self.drive(&ctx).await {
            Ok(artifacts) => self.succeed(&ctx, artifacts).await,
            Err(stop) => self.fail(&ctx, stop).await,
        }
    }

    async fn drive(&self, ctx: &JobContext) -> Result<Vec<String>, Stop> {
        let mut produced: Vec<String> = Vec::new();

        self.checkpoint(ctx)?;
        self.bus.publish(ProgressEvent::status(
            ctx.id,
            JobPhase::Planning,
            "Planning project",
        ));
        let plan = self.plan(ctx).await?;
        self.checkpoint(ctx)?;

        self.produce(ctx, REQUIREMENTS_PATH, &plan.requirements, &mut produced)
            .await?;
        self.bus.publish(ProgressEvent::progress(
            ctx.id,
            self.budget.after_planning(),
            Some(format!("Planned {} files", plan.specs.len())),
        ));

        self.generate_all(ctx, &plan, &mut produced).await?;
        self.finalize(ctx, &plan, &mut produced).await?;
        Ok(produced)
    }

    async fn plan(&self, ctx: &JobContext) -> Result<Plan, Stop> {
        match self.planner.plan(&ctx.description, &ctx.model).await {
            Ok(plan) => {
                info!(files = plan.specs.len(), "Plan ready");
                Ok(plan)
            }
            Err(e) => {
                let error = ForgeflowError::capability("planning", &e);
                warn!(error = %error, code = error.code(), "Planning failed");
                Err(Stop::Failed(format!("planning failed: {e:#}")))
            }
        }
    }

    async fn generate_all(
        &self,
        ctx: &JobContext,
        plan: &Plan,
        produced: &mut Vec<String>,
    ) -> Result<(), Stop> {
        let total = plan.specs.len();
        for (index, spec) in plan.specs.iter().enumerate() {
            self.checkpoint(ctx)?;
            if index == 0 {
                self.bus.publish(ProgressEvent::status(
                    ctx.id,
                    JobPhase::Generating,
                    format!("Generating {total} files"),
                ));
            }
            if produced.iter().any(|p| p == &spec.path) {
                debug!(artifact = %spec.path, "Skipping duplicate artifact path");
                continue;
            }

            self.bus.publish(ProgressEvent::artifact_progress(
                ctx.id,
                self.budget.for_artifact(index, total),
                spec.path.clone(),
            ));
            self.bus
                .publish(ProgressEvent::artifact_started(ctx.id, spec.path.clone()));

            let request = GenerationRequest {
                description: &ctx.description,
                requirements: &plan.requirements,
                spec,
            };
            let content = match self.generator.generate(&request, &ctx.model).await {
                Ok(content) => content,
                Err(e) => {
                    self.report_partial(ctx, &spec.path, &e);
                    continue;
                }
            };
            self.produce(ctx, &spec.path, &content, produced).await?;
        }
        Ok(())
    }

    async fn finalize(
        &self,
        ctx: &JobContext,
        plan: &Plan,
        produced: &mut Vec<String>,
    ) -> Result<(), Stop> {
        self.bus.publish(ProgressEvent::status(
            ctx.id,
            JobPhase::Finalizing,
            "Finalizing project",
        ));
        self.bus.publish(ProgressEvent::progress(
            ctx.id,
            self.budget.finalizing(),
            Some("Finalizing".to_string()),
        ));

        if produced.iter().any(|p| is_readme_path(p)) {
            return Ok(());
        }

        let readme = synthesize_readme(ctx, plan, produced);
        self.ensure_owned(ctx)?;
        if let Err(e) = self
            .writer
            .write(&ctx.output_location, README_PATH, &readme)
            .await
        {
            let error = ForgeflowError::artifact(README_PATH, &e);
            warn!(error = %error, code = error.code(), "Could not write readme");
            return Err(Stop::Failed(format!("finalization failed: {e:#}")));
        }
        self.store.append_artifact(ctx.id, README_PATH).await?;
        produced.push(README_PATH.to_string());
        self.bus
            .publish(ProgressEvent::artifact_finished(ctx.id, README_PATH));
        Ok(())
    }

    /// Writes one artifact and records it. Write failures are tolerated.
    async fn produce(
        &self,
        ctx: &JobContext,
        path: &str,
        content: &str,
        produced: &mut Vec<String>,
    ) -> Result<(), Stop> {
        self.ensure_owned(ctx)?;
        if let Err(e) = self.writer.write(&ctx.output_location, path, content).await {
            self.report_partial(ctx, path, &e);
            return Ok(());
        }
        self.store.append_artifact(ctx.id, path).await?;
        produced.push(path.to_string());
        debug!(artifact = path, bytes = content.len(), "Artifact written");
        self.bus
            .publish(ProgressEvent::artifact_finished(ctx.id, path));
        Ok(())
    }

    fn report_partial(&self, ctx: &JobContext, path: &str, error: &anyhow::Error) {
        let error = ForgeflowError::artifact(path, error);
        warn!(error = %error, code = error.code(), "Artifact skipped");
        self.bus.publish(ProgressEvent::error(
            ctx.id,
            error.to_string(),
            Some(path.to_string()),
        ));
    }

    /// Refuses to touch the output directory of a run that was reset or deleted
    /// while a capability call was in flight.
    fn ensure_owned(&self, ctx: &JobContext) -> Result<(), Stop> {
        let owned = self.registry.contains(ctx.id)
            && self
                .store
                .get(ctx.id)
                .is_some_and(|record| !record.is_terminal());
        if owned {
            Ok(())
        } else {
            debug!("Run settled elsewhere, skipping write");
            Err(Stop::Abandoned)
        }
    }

    fn checkpoint(&self, ctx: &JobContext) -> Result<(), Stop> {
        match self.registry.checkpoint(ctx.id) {
            Checkpoint::Continue => Ok(()),
            Checkpoint::Cancelled => {
                let reason = ctx
                    .token
                    .reason()
                    .unwrap_or_else(|| REASON_STOPPED_BY_USER.to_string());
                debug!(reason = %reason, "Cancellation observed at checkpoint");
                Err(Stop::Cancelled(reason))
            }
            Checkpoint::Abandoned => {
                debug!("Job no longer registered, abandoning");
                Err(Stop::Abandoned)
            }
        }
    }

    async fn succeed(&self, ctx: &JobContext, artifacts: Vec<String>) -> JobOutcome {
        match self.store.mark_succeeded(ctx.id, artifacts.clone()).await {
            Ok(record) => emit_run_summary(&record),
            Err(e) if e.is_record_gone() => {
                debug!(error = %e, "Record already settled elsewhere");
                return JobOutcome::Abandoned;
            }
            Err(e) => {
                warn!(error = %e, "Could not record success");
                return self
                    .fail(ctx, Stop::Failed(format!("finalization failed: {e}")))
                    .await;
            }
        }

        self.bus.publish(ProgressEvent::progress(
            ctx.id,
            100,
            Some("Completed".to_string()),
        ));
        self.bus.publish(ProgressEvent::status(
            ctx.id,
            JobPhase::Completed,
            format!("Generated {} files", artifacts.len()),
        ));
        info!(artifacts = artifacts.len(), "Job succeeded");
        JobOutcome::Succeeded { artifacts }
    }

    async fn fail(&self, ctx: &JobContext, stop: Stop) -> JobOutcome {
        let (reason, abandoned) = match stop {
            Stop::Cancelled(reason) | Stop::Failed(reason) => (reason, false),
            Stop::Abandoned => (REASON_ABANDONED.to_string(), true),
        };

        match self.store.mark_failed(ctx.id, &reason).await {
            Ok(record) => emit_run_summary(&record),
            Err(e) if e.is_record_gone() => {
                debug!(error = %e, "Record already settled elsewhere");
            }
            Err(e) => warn!(error = %e, "Could not record failure"),
        }

        self.bus
            .publish(ProgressEvent::error(ctx.id, reason.clone(), None));
        self.bus
            .publish(ProgressEvent::status(ctx.id, JobPhase::Failed, reason.clone()));
        info!(reason = %reason, "Job failed");

        if abandoned {
            JobOutcome::Abandoned
        } else {
            JobOutcome::Failed { reason }
        }
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

fn synthesize_readme(ctx: &JobContext, plan: &Plan, produced: &[String]) -> String {
    let mut readme = format!(
        "# {}\n\n{}\n\nGenerated with model `{}`.\n\n## Files\n\n",
        ctx.name, ctx.description, ctx.model
    );
    for path in produced {
        let purpose = plan
            .specs
            .iter()
            .find(|s| &s.path == path)
            .map(|s| s.purpose.as_str())
            .filter(|p| !p.is_empty());
        match purpose {
            Some(purpose) => readme.push_str(&format!("- `{path}`: {purpose}\n")),
            None => readme.push_str(&format!("- `{path}`\n")),
        }
    }
    readme
}
