//! Drop guard that removes a job from the registry.

use super::JobRegistry;
use crate::core::JobId;
use std::sync::Arc;

/// Unregisters a job when dropped.
///
/// The executor holds one for the whole run, so the job leaves the registry
/// on success, failure, cancellation and panic alike.
pub struct RegistrationGuard {
    registry: Arc<JobRegistry>,
    id: JobId,
}

impl RegistrationGuard {
    /// Creates a new guard for `id`.
    #[must_use]
    pub const fn new(registry: Arc<JobRegistry>, id: JobId) -> Self {
        Self { registry, id }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

impl std::fmt::Debug for RegistrationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("id", &self.id)
            .finish()
    }
}
