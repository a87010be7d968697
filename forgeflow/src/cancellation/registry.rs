//! Registry of in-flight jobs and their cancellation flags.

use super::CancellationToken;
use crate::core::JobId;
use crate::errors::{ForgeflowError, Result};
use crate::utils::Timestamp;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Reason attached to tokens dropped by [`JobRegistry::reset_all`].
pub const RESET_REASON: &str = "system reset";

/// Registry-owned state of one in-flight job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// The job's id.
    pub id: JobId,
    /// The job's cancellation flag.
    pub token: Arc<CancellationToken>,
    /// When the job was registered.
    pub registered_at: Timestamp,
}

impl JobHandle {
    /// Returns true if cancellation was requested for this job.
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// What an executor should do at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Keep going.
    Continue,
    /// A user asked the job to stop.
    Cancelled,
    /// The job is no longer registered; an operator reset abandoned it.
    Abandoned,
}

/// Tracks the set of running jobs.
///
/// Each job maps to a handle whose token is the job's cancellation flag.
/// Sharded locking serialises operations on one id while distinct ids
/// proceed concurrently.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobHandle>,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job and returns its cancellation token.
    pub fn register(&self, id: JobId) -> Result<Arc<CancellationToken>> {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => Err(ForgeflowError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                let token = Arc::new(CancellationToken::new());
                slot.insert(JobHandle {
                    id,
                    token: token.clone(),
                    registered_at: crate::utils::now_utc(),
                });
                debug!(job_id = %id, "Job registered");
                Ok(token)
            }
        }
    }

    /// Flags a job for cancellation. Returns whether the job was found.
    pub fn request_cancel(&self, id: JobId, reason: &str) -> bool {
        self.jobs.get(&id).map_or(false, |handle| {
            if handle.token.cancel(reason) {
                info!(job_id = %id, reason, "Cancellation requested");
            }
            true
        })
    }

    /// Flags every registered job. Returns how many were affected.
    pub fn request_cancel_all(&self, reason: &str) -> usize {
        let mut count = 0;
        for handle in self.jobs.iter() {
            handle.token.cancel(reason);
            count += 1;
        }
        info!(count, "Cancellation requested for all jobs");
        count
    }

    /// Returns true if the job is registered and flagged.
    ///
    /// Unknown ids are never "cancel pending".
    #[must_use]
    pub fn is_cancel_requested(&self, id: JobId) -> bool {
        self.jobs
            .get(&id)
            .map_or(false, |handle| handle.cancel_requested())
    }

    /// Decides how an executor proceeds at a checkpoint.
    #[must_use]
    pub fn checkpoint(&self, id: JobId) -> Checkpoint {
        match self.jobs.get(&id) {
            None => Checkpoint::Abandoned,
            Some(handle) if handle.cancel_requested() => Checkpoint::Cancelled,
            Some(_) => Checkpoint::Continue,
        }
    }

    /// Removes a job. Idempotent.
    pub fn unregister(&self, id: JobId) -> bool {
        let removed = self.jobs.remove(&id).is_some();
        if removed {
            debug!(job_id = %id, "Job unregistered");
        }
        removed
    }

    /// Drops every registered job, cancelling their tokens. Returns how many were dropped.
    pub fn reset_all(&self) -> usize {
        let ids: Vec<JobId> = self.jobs.iter().map(|h| *h.key()).collect();
        let mut count = 0;
        for id in ids {
            if let Some((_, handle)) = self.jobs.remove(&id) {
                handle.token.cancel(RESET_REASON);
                count += 1;
            }
        }
        info!(count, "Job registry reset");
        count
    }

    /// Returns true if the job is registered.
    #[must_use]
    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Returns a copy of a job's handle.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<JobHandle> {
        self.jobs.get(&id).map(|h| h.clone())
    }

    /// Returns the ids of all registered jobs.
    #[must_use]
    pub fn active_ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|h| *h.key()).collect()
    }

    /// Returns the number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_fails() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        registry.register(id).unwrap();
        assert!(matches!(
            registry.register(id),
            Err(ForgeflowError::AlreadyRegistered(dup)) if dup == id
        ));
    }

    #[test]
    fn test_request_cancel() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        let token = registry.register(id).unwrap();

        assert!(!registry.is_cancel_requested(id));
        assert_eq!(registry.checkpoint(id), Checkpoint::Continue);

        assert!(registry.request_cancel(id, "stopped by user"));
        assert!(token.is_cancelled());
        assert!(registry.is_cancel_requested(id));
        assert_eq!(registry.checkpoint(id), Checkpoint::Cancelled);

        // Second request has the same effect as the first.
        assert!(registry.request_cancel(id, "again"));
        assert_eq!(token.reason().as_deref(), Some("stopped by user"));
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        assert!(!registry.request_cancel(id, "x"));
        assert!(!registry.is_cancel_requested(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let registry = JobRegistry::new();
        let tokens: Vec<_> = (0..3)
            .map(|_| registry.register(JobId::new()).unwrap())
            .collect();
        assert_eq!(registry.request_cancel_all("shutdown"), 3);
        assert!(tokens.iter().all(|t| t.is_cancelled()));
    }

    #[test]
    fn test_unregister_idempotent() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        registry.register(id).unwrap();
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_reset_all_abandons_jobs() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        let token = registry.register(id).unwrap();
        registry.register(JobId::new()).unwrap();

        assert_eq!(registry.reset_all(), 2);
        assert!(registry.is_empty());
        assert!(!registry.is_cancel_requested(id));
        assert_eq!(registry.checkpoint(id), Checkpoint::Abandoned);
        assert_eq!(token.reason().as_deref(), Some(RESET_REASON));
    }

    #[test]
    fn test_active_ids() {
        let registry = JobRegistry::new();
        let a = JobId::new();
        let b = JobId::new();
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        let mut ids = registry.active_ids();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
        assert!(registry.get(a).is_some());
    }
}
