//! The run record store.

use super::{InMemoryPersistence, RecordPersistence};
use crate::core::{JobId, RunRecord, RunStatus, REASON_INTERRUPTED};
use crate::errors::{ForgeflowError, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable mapping from job id to run record.
///
/// Records live in a sharded map: a mutation holds the shard lock of its id
/// for the whole read-modify-write, so updates to one record never
/// interleave, while different ids proceed in parallel. After each mutation
/// the whole collection is written through the persistence backend under an
/// async lock; the snapshot is taken inside that lock, so the last write to
/// land always carries the newest state.
pub struct RunRecordStore {
    records: DashMap<JobId, RunRecord>,
    persistence: Arc<dyn RecordPersistence>,
    flush_lock: tokio::sync::Mutex<()>,
    output_root: PathBuf,
}

impl RunRecordStore {
    /// Opens a store, loading whatever the backend already holds.
    pub async fn open(
        output_root: impl Into<PathBuf>,
        persistence: Arc<dyn RecordPersistence>,
    ) -> Result<Self> {
        let loaded = persistence.load().await?;
        let records = DashMap::with_capacity(loaded.len());
        for record in loaded {
            records.insert(record.id, record);
        }
        info!(records = records.len(), "Run record store opened");
        Ok(Self {
            records,
            persistence,
            flush_lock: tokio::sync::Mutex::new(()),
            output_root: output_root.into(),
        })
    }

    /// Creates an empty store backed by memory only.
    #[must_use]
    pub fn in_memory(output_root: impl Into<PathBuf>) -> Self {
        Self {
            records: DashMap::new(),
            persistence: Arc::new(InMemoryPersistence::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            output_root: output_root.into(),
        }
    }

    /// Returns the directory under which run output directories are allocated.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Creates a `running` record and returns its id.
    ///
    /// If the record cannot be persisted it is dropped again, so a failed
    /// create leaves nothing behind.
    pub async fn create(&self, name: &str, description: &str, model: &str) -> Result<JobId> {
        let id = JobId::new();
        let output_location = self
            .output_root
            .join(crate::utils::output_dir_name(name, &id));
        let record = RunRecord::new(id, name, description, model, output_location);
        self.records.insert(id, record);
        if let Err(e) = self.flush().await {
            self.records.remove(&id);
            warn!(
                job_id = %id,
                error = %e,
                code = e.code(),
                "Run record not persisted, dropped"
            );
            return Err(e);
        }
        debug!(job_id = %id, "Run record created");
        Ok(id)
    }

    /// Appends a produced artifact path.
    pub async fn append_artifact(&self, id: JobId, path: &str) -> Result<()> {
        self.mutate(id, |record| {
            ensure_running(record)?;
            record.artifact_paths.push(path.to_string());
            Ok(())
        })?;
        self.flush().await
    }

    /// Marks a run succeeded with its final artifact list.
    pub async fn mark_succeeded(&self, id: JobId, artifact_paths: Vec<String>) -> Result<RunRecord> {
        let record = self.mutate(id, |record| {
            ensure_running(record)?;
            record.status = RunStatus::Succeeded;
            record.artifact_paths = artifact_paths;
            record.completed_at = Some(crate::utils::now_utc());
            Ok(())
        })?;
        info!(job_id = %id, artifacts = record.artifact_paths.len(), "Run succeeded");
        self.flush().await?;
        Ok(record)
    }

    /// Marks a run failed with a reason.
    pub async fn mark_failed(&self, id: JobId, reason: &str) -> Result<RunRecord> {
        let record = self.mutate(id, |record| {
            ensure_running(record)?;
            fail(record, reason);
            Ok(())
        })?;
        info!(job_id = %id, reason, "Run failed");
        self.flush().await?;
        Ok(record)
    }

    /// Returns a copy of a record.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<RunRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// Returns every record, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<RunRecord> {
        let mut records = self.ordered();
        records.reverse();
        records
    }

    /// Deletes a record and, best-effort, its output directory.
    pub async fn delete(&self, id: JobId) -> Result<RunRecord> {
        let (_, record) = self
            .records
            .remove(&id)
            .ok_or(ForgeflowError::NotFound(id))?;
        self.flush().await?;

        match tokio::fs::remove_dir_all(&record.output_location).await {
            Ok(()) => debug!(job_id = %id, "Output directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                job_id = %id,
                path = %record.output_location.display(),
                error = %e,
                "Could not remove output directory"
            ),
        }
        info!(job_id = %id, "Run record deleted");
        Ok(record)
    }

    /// Fails every record still `running` with the standard interrupted reason.
    ///
    /// Returns how many records changed.
    pub async fn reset_stuck_running(&self) -> Result<usize> {
        let mut count = 0;
        for mut entry in self.records.iter_mut() {
            if entry.status == RunStatus::Running {
                fail(entry.value_mut(), REASON_INTERRUPTED);
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "Reconciled interrupted runs");
            self.flush().await?;
        }
        Ok(count)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn mutate<F>(&self, id: JobId, f: F) -> Result<RunRecord>
    where
        F: FnOnce(&mut RunRecord) -> Result<()>,
    {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or(ForgeflowError::NotFound(id))?;
        f(entry.value_mut())?;
        Ok(entry.clone())
    }

    fn ordered(&self) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.ordered();
        self.persistence.save(&snapshot).await
    }
}

fn ensure_running(record: &RunRecord) -> Result<()> {
    if record.is_terminal() {
        return Err(ForgeflowError::AlreadyTerminal {
            id: record.id,
            status: record.status,
        });
    }
    Ok(())
}

fn fail(record: &mut RunRecord, reason: &str) {
    record.status = RunStatus::Failed;
    record.failure_reason = Some(reason.to_string());
    record.completed_at = Some(crate::utils::now_utc());
}

impl std::fmt::Debug for RunRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRecordStore")
            .field("records", &self.records.len())
            .field("output_root", &self.output_root)
            .finish()
    }
}
