//! Scripted capabilities for driving the executor in tests.

use crate::core::{ArtifactSpec, Plan, RunRecord};
use crate::errors::{ForgeflowError, Result};
use crate::pipeline::{ArtifactWriter, GenerationRequest, Generator, Planner};
use crate::store::RecordPersistence;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A latch that holds capability calls until opened.
#[derive(Debug, Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Opens the gate, releasing current and future waiters.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close while waiting.
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// A planner returning a fixed plan, or failing.
#[derive(Debug)]
pub struct ScriptedPlanner {
    plan: Plan,
    error: Option<String>,
    delay: Option<Duration>,
    gate: Option<Gate>,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    /// Creates a planner returning `plan`.
    #[must_use]
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            error: None,
            delay: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a planner with the given artifact paths and a stock requirements text.
    #[must_use]
    pub fn with_paths(paths: &[&str]) -> Self {
        let specs = paths
            .iter()
            .map(|p| ArtifactSpec::new(*p, format!("purpose of {p}")))
            .collect();
        Self::new(Plan::new("# Requirements\n\n- it works", specs))
    }

    /// Creates a planner that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let mut planner = Self::new(Plan::default());
        planner.error = Some(message.into());
        planner
    }

    /// Sleeps before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Waits for `gate` before answering.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns how many times `plan` was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _description: &str, _model: &str) -> anyhow::Result<Plan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.error {
            Some(message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(self.plan.clone()),
        }
    }
}

/// A generator producing deterministic content, failing on chosen paths.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    failing: HashSet<String>,
    delay: Option<Duration>,
    gate: Option<Gate>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Creates a generator that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every call for `path`.
    #[must_use]
    pub fn failing_on(mut self, path: impl Into<String>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Sleeps before each answer.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Waits for `gate` before each answer.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns the paths requested so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the content produced for `path`.
    #[must_use]
    pub fn content_for(path: &str) -> String {
        format!("// generated {path}\n")
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>, _model: &str) -> anyhow::Result<String> {
        let path = request.spec.path.clone();
        self.calls.lock().push(path.clone());
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&path) {
            anyhow::bail!("scripted failure for {path}");
        }
        Ok(Self::content_for(&path))
    }
}

/// Keeps written artifacts in memory, keyed by full path.
#[derive(Debug, Default)]
pub struct MemoryArtifactWriter {
    files: Mutex<HashMap<PathBuf, String>>,
    failing: HashSet<String>,
}

impl MemoryArtifactWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every write of `relative_path`.
    #[must_use]
    pub fn failing_on(mut self, relative_path: impl Into<String>) -> Self {
        self.failing.insert(relative_path.into());
        self
    }

    /// Returns the content written at `relative_path` below `output_location`.
    #[must_use]
    pub fn read(&self, output_location: &Path, relative_path: &str) -> Option<String> {
        self.files
            .lock()
            .get(&output_location.join(relative_path))
            .cloned()
    }

    /// Returns the number of files written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

#[async_trait]
impl ArtifactWriter for MemoryArtifactWriter {
    async fn write(
        &self,
        output_location: &Path,
        relative_path: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        if self.failing.contains(relative_path) {
            anyhow::bail!("scripted write failure for {relative_path}");
        }
        let full = crate::pipeline::resolve_relative(output_location, relative_path)?;
        self.files.lock().insert(full, content.to_string());
        Ok(())
    }
}


/// A persistence backend that loads nothing and rejects every save.
#[derive(Debug, Default)]
pub struct FailingPersistence;

#[async_trait]
impl RecordPersistence for FailingPersistence {
    async fn load(&self) -> Result<Vec<RunRecord>> {
        Ok(Vec::new())
    }

    async fn save(&self, _records: &[RunRecord]) -> Result<()> {
        Err(ForgeflowError::Persistence("disk full".to_string()))
    }
}
