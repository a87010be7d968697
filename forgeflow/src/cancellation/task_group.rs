//! Tracking of spawned job tasks.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::warn;

/// Owns the background tasks of launched jobs.
///
/// Launching stays fire-and-forget for callers; the group only exists so a
/// host can wait for in-flight jobs on shutdown. Waiting never takes the
/// tasks away from the group, so a caller that gives up on
/// [`wait_idle`](Self::wait_idle) leaves every job running. Dropping the
/// group aborts whatever is still running.
#[derive(Default)]
pub struct JobTaskGroup {
    tasks: Mutex<JoinSet<()>>,
    live: Arc<LiveCount>,
}

#[derive(Default)]
struct LiveCount {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the live count when a task ends, however it ends.
struct LiveSlot(Arc<LiveCount>);

impl Drop for LiveSlot {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl JobTaskGroup {
    /// Creates a new task group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a task in the group.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.live.count.fetch_add(1, Ordering::SeqCst);
        let slot = LiveSlot(self.live.clone());
        let mut tasks = self.tasks.lock();
        reap(&mut tasks);
        tasks.spawn(async move {
            let _slot = slot;
            task.await;
        });
    }

    /// Waits until every spawned task, including ones spawned while waiting, has finished.
    ///
    /// Cancel-safe: dropping the returned future leaves the tasks untouched.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.live.idle.notified();
            if self.live.count.load(Ordering::SeqCst) == 0 {
                reap(&mut self.tasks.lock());
                return;
            }
            idle.await;
        }
    }

    /// Returns the number of tasks still running.
    #[must_use]
    pub fn task_count(&self) -> usize {
        reap(&mut self.tasks.lock());
        self.live.count.load(Ordering::SeqCst)
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while let Some(finished) = tasks.try_join_next() {
        if let Err(e) = finished {
            if e.is_panic() {
                warn!("Job task panicked: {}", e);
            } else {
                warn!("Job task aborted: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for JobTaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTaskGroup")
            .field("task_count", &self.live.count.load(Ordering::SeqCst))
            .finish()
    }
}
