//! Durable backends for the run record collection.

use crate::core::RunRecord;
use crate::errors::{ForgeflowError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Storage backend for the run record collection.
///
/// The collection is persisted whole, as one ordered list; the store
/// serialises calls to [`save`](Self::save).
#[async_trait]
pub trait RecordPersistence: Send + Sync {
    /// Loads every stored record.
    async fn load(&self) -> Result<Vec<RunRecord>>;

    /// Replaces the stored collection with `records`.
    async fn save(&self, records: &[RunRecord]) -> Result<()>;
}

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    snapshot: Mutex<Vec<RunRecord>>,
    saves: AtomicUsize,
}

impl InMemoryPersistence {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-seeded with records, as if left by a previous process.
    #[must_use]
    pub fn with_records(records: Vec<RunRecord>) -> Self {
        Self {
            snapshot: Mutex::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    /// Returns the last saved snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RunRecord> {
        self.snapshot.lock().clone()
    }

    /// Returns how many times the collection was saved.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordPersistence for InMemoryPersistence {
    async fn load(&self) -> Result<Vec<RunRecord>> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, records: &[RunRecord]) -> Result<()> {
        *self.snapshot.lock() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Stores the collection as a pretty-printed JSON array.
///
/// Saves go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous collection intact.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Creates a backend writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the target file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "runs.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RecordPersistence for JsonFilePersistence {
    async fn load(&self) -> Result<Vec<RunRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ForgeflowError::Persistence(format!(
                    "corrupt record file {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &[RunRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(records)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), records = records.len(), "Run records saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, RunStatus};
    use pretty_assertions::assert_eq;

    fn record(name: &str) -> RunRecord {
        RunRecord::new(JobId::new(), name, "desc", "model", PathBuf::from("out").join(name))
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let backend = InMemoryPersistence::new();
        assert!(backend.load().await.unwrap().is_empty());

        let records = vec![record("a"), record("b")];
        backend.save(&records).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), records);
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test]
    async fn test_json_file_missing_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFilePersistence::new(dir.path().join("runs.json"));
        assert!(backend.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_file_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.json");
        let backend = JsonFilePersistence::new(&path);

        let mut failed = record("failed");
        failed.status = RunStatus::Failed;
        failed.failure_reason = Some("planning failed: boom".to_string());
        let records = vec![record("ok"), failed];

        backend.save(&records).await.unwrap();
        assert!(path.exists());
        assert!(!backend.temp_path().exists());

        let reopened = JsonFilePersistence::new(&path);
        assert_eq!(reopened.load().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_json_file_corrupt_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = JsonFilePersistence::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ForgeflowError::Persistence(_)));
    }
}
