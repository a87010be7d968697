//! A wired-up service for tests.

use super::{MemoryArtifactWriter, ScriptedGenerator, ScriptedPlanner};
use crate::config::ForgeflowConfig;
use crate::core::{JobId, ProgressEvent, RunRecord};
use crate::events::CollectingEventSink;
use crate::pipeline::{ArtifactWriter, Generator, Planner};
use crate::service::{Capabilities, GenerationService};
use crate::store::RunRecordStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A service over in-memory storage with an observer attached from the start.
pub struct TestHarness {
    /// The service under test.
    pub service: GenerationService,
    /// Observer attached before any job ran.
    pub events: Arc<CollectingEventSink>,
    /// Writer receiving every artifact.
    pub writer: Arc<MemoryArtifactWriter>,
}

impl TestHarness {
    /// Builds a harness with the given planner and generator.
    #[must_use]
    pub fn new(planner: ScriptedPlanner, generator: ScriptedGenerator) -> Self {
        Self::with_parts(
            Arc::new(planner),
            Arc::new(generator),
            Arc::new(MemoryArtifactWriter::new()),
            ForgeflowConfig::default(),
        )
    }

    /// Builds a harness planning `paths` with a generator that always succeeds.
    #[must_use]
    pub fn with_paths(paths: &[&str]) -> Self {
        Self::new(ScriptedPlanner::with_paths(paths), ScriptedGenerator::new())
    }

    /// Builds a harness from explicit parts.
    #[must_use]
    pub fn with_parts(
        planner: Arc<dyn Planner>,
        generator: Arc<dyn Generator>,
        writer: Arc<MemoryArtifactWriter>,
        config: ForgeflowConfig,
    ) -> Self {
        let store = Arc::new(RunRecordStore::in_memory(config.output_root.clone()));
        let capabilities = Capabilities::new(
            planner,
            generator,
            writer.clone() as Arc<dyn ArtifactWriter>,
        );
        let service = match GenerationService::with_store(config, store, capabilities) {
            Ok(service) => service,
            Err(e) => panic!("invalid harness configuration: {e}"),
        };
        let events = Arc::new(CollectingEventSink::new());
        service.attach(events.clone());
        Self {
            service,
            events,
            writer,
        }
    }

    /// Starts a job with stock inputs.
    pub async fn start(&self, name: &str) -> JobId {
        match self
            .service
            .start_job(name, &format!("description of {name}"), None)
            .await
        {
            Ok(id) => id,
            Err(e) => panic!("start_job failed: {e}"),
        }
    }

    /// Starts a job and waits for every job to finish.
    pub async fn run(&self, name: &str) -> RunRecord {
        let id = self.start(name).await;
        self.service.wait_idle().await;
        self.record(id)
    }

    /// Returns the record for `id`, panicking if it is missing.
    #[must_use]
    pub fn record(&self, id: JobId) -> RunRecord {
        match self.service.get_run(id) {
            Some(record) => record,
            None => panic!("no record for {id}"),
        }
    }

    /// Returns the events observed for `id`, in delivery order.
    #[must_use]
    pub fn events_for(&self, id: JobId) -> Vec<ProgressEvent> {
        self.events.events_for(id)
    }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub async fn eventually<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Runs `future` with a timeout, panicking if it does not finish.
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(timeout, future).await {
        Ok(value) => value,
        Err(_) => panic!("future did not finish within {timeout:?}"),
    }
}
