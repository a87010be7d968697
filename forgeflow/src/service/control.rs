//! The generation service: the operations callers use to drive jobs.

use crate::cancellation::{JobRegistry, JobTaskGroup};
use crate::config::ForgeflowConfig;
use crate::core::{JobId, ProgressEvent, RunRecord, REASON_STOPPED_BY_USER};
use crate::errors::{ForgeflowError, Result};
use crate::events::{ChannelEventSink, EventBus, EventSink, SubscriptionId};
use crate::llm::CompletionModel;
use crate::pipeline::{
    ArtifactWriter, CompletionGenerator, CompletionPlanner, FsArtifactWriter, Generator,
    JobContext, PipelineExecutor, Planner,
};
use crate::store::{JsonFilePersistence, RunRecordStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The external collaborators a service runs jobs with.
#[derive(Clone)]
pub struct Capabilities {
    /// Produces requirements and the file plan.
    pub planner: Arc<dyn Planner>,
    /// Produces each file.
    pub generator: Arc<dyn Generator>,
    /// Stores produced files.
    pub writer: Arc<dyn ArtifactWriter>,
}

impl Capabilities {
    /// Bundles explicit capabilities.
    #[must_use]
    pub fn new(
        planner: Arc<dyn Planner>,
        generator: Arc<dyn Generator>,
        writer: Arc<dyn ArtifactWriter>,
    ) -> Self {
        Self {
            planner,
            generator,
            writer,
        }
    }

    /// Completion-backed planning and generation, writing to the filesystem.
    #[must_use]
    pub fn from_model(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            planner: Arc::new(CompletionPlanner::new(model.clone())),
            generator: Arc::new(CompletionGenerator::new(model)),
            writer: Arc::new(FsArtifactWriter),
        }
    }

    /// Capabilities talking to the Ollama server named in `config`.
    #[cfg(feature = "ollama")]
    pub fn ollama(config: &ForgeflowConfig) -> Result<Self> {
        let client = crate::llm::OllamaClient::from_config(config)
            .map_err(|e| ForgeflowError::capability("completion", &e))?;
        Ok(Self::from_model(Arc::new(client)))
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Starts, cancels and resets generation jobs.
///
/// The registry, record store and event bus are owned here and shared with
/// the executor; nothing is global, so independent services can coexist in
/// one process.
pub struct GenerationService {
    config: ForgeflowConfig,
    registry: Arc<JobRegistry>,
    store: Arc<RunRecordStore>,
    bus: Arc<EventBus>,
    executor: Arc<PipelineExecutor>,
    tasks: JobTaskGroup,
}

impl GenerationService {
    /// Opens a service whose records persist to `config.records_path`.
    ///
    /// Records left `running` by a previous process are failed as interrupted.
    pub async fn open(config: ForgeflowConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;
        let persistence = Arc::new(JsonFilePersistence::new(&config.records_path));
        let store = RunRecordStore::open(&config.output_root, persistence).await?;
        let reconciled = store.reset_stuck_running().await?;
        if reconciled > 0 {
            warn!(reconciled, "Runs interrupted by a previous shutdown marked failed");
        }
        Self::with_store(config, Arc::new(store), capabilities)
    }

    /// Builds a service over an existing store.
    pub fn with_store(
        config: ForgeflowConfig,
        store: Arc<RunRecordStore>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(JobRegistry::new());
        let bus = Arc::new(EventBus::new(config.replay_capacity));
        let executor = PipelineExecutor::new(
            registry.clone(),
            store.clone(),
            bus.clone(),
            capabilities.planner,
            capabilities.generator,
            capabilities.writer,
        )
        .with_budget(config.progress_budget());

        Ok(Self {
            config,
            registry,
            store,
            bus,
            executor: Arc::new(executor),
            tasks: JobTaskGroup::new(),
        })
    }

    /// Accepts a job and launches it in the background.
    ///
    /// Returns as soon as the record exists and the job is registered; the
    /// outcome is only observable through the record and the event stream.
    pub async fn start_job(&self, name: &str, description: &str, model: Option<&str>) -> Result<JobId> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() {
            return Err(ForgeflowError::InvalidRequest("name must not be empty".to_string()));
        }
        if description.is_empty() {
            return Err(ForgeflowError::InvalidRequest(
                "description must not be empty".to_string(),
            ));
        }
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.config.default_model.as_str());

        let id = self.store.create(name, description, model).await?;
        let token = match self.registry.register(id) {
            Ok(token) => token,
            Err(e) => {
                if let Err(settle) = self.store.mark_failed(id, &e.to_string()).await {
                    warn!(
                        job_id = %id,
                        error = %settle,
                        code = settle.code(),
                        "Could not fail unlaunched job"
                    );
                }
                return Err(e);
            }
        };
        let record = self.store.get(id).ok_or(ForgeflowError::NotFound(id))?;
        let ctx = JobContext::from_record(&record, token);

        let executor = self.executor.clone();
        self.tasks.spawn(async move {
            executor.execute(ctx).await;
        });
        info!(job_id = %id, name, model, "Job accepted");
        Ok(id)
    }

    /// Requests cancellation of a job. Unknown or finished ids are ignored.
    pub fn cancel_job(&self, id: JobId) {
        if !self.registry.request_cancel(id, REASON_STOPPED_BY_USER) {
            info!(job_id = %id, "Cancel for a job that is not running, ignoring");
        }
    }

    /// Requests cancellation of every running job. Returns how many were flagged.
    pub fn cancel_all_jobs(&self) -> usize {
        self.registry.request_cancel_all(REASON_STOPPED_BY_USER)
    }

    /// Clears the registry and the replay buffer, then fails every `running` record.
    ///
    /// Returns how many records were reconciled. Tasks stuck inside a
    /// capability call keep running until that call returns; their later
    /// writes are rejected because the record is already terminal.
    pub async fn reset_system(&self) -> Result<usize> {
        let dropped = self.registry.reset_all();
        self.bus.clear();
        let reconciled = self.store.reset_stuck_running().await?;
        warn!(dropped, reconciled, "System reset");
        Ok(reconciled)
    }

    /// Attaches an observer, replaying recent events to it first.
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        self.bus.attach(sink)
    }

    /// Detaches an observer. Idempotent.
    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.bus.detach(id)
    }

    /// Attaches a bounded channel observer and returns its receiving end.
    ///
    /// A receiver that falls `observer_queue_capacity` events behind is dropped.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::Receiver<ProgressEvent>) {
        let (sink, rx) = ChannelEventSink::channel(self.config.observer_queue_capacity);
        (self.bus.attach(Arc::new(sink)), rx)
    }

    /// Returns a run record.
    pub fn get_run(&self, id: JobId) -> Option<RunRecord> {
        self.store.get(id)
    }

    /// Returns all run records, newest first.
    pub fn list_runs(&self) -> Vec<RunRecord> {
        self.store.list()
    }

    /// Deletes a run and its output, cancelling it first if it is still running.
    ///
    /// A running job is also unregistered, so its executor abandons the run
    /// before writing anything else into the removed directory.
    pub async fn delete_run(&self, id: JobId) -> Result<RunRecord> {
        if self.registry.request_cancel(id, REASON_STOPPED_BY_USER) {
            self.registry.unregister(id);
        }
        self.store.delete(id).await
    }

    /// Returns the ids of registered jobs.
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.registry.active_ids()
    }

    /// Waits for every launched job task to finish.
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }

    /// Returns the configuration in use.
    pub const fn config(&self) -> &ForgeflowConfig {
        &self.config
    }

    /// Returns the shared event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Returns the shared record store.
    pub fn store(&self) -> &Arc<RunRecordStore> {
        &self.store
    }

    /// Returns the shared job registry.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for GenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationService")
            .field("active_jobs", &self.registry.len())
            .field("records", &self.store.len())
            .field("observers", &self.bus.observer_count())
            .finish()
    }
}
