use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Process-wide shutdown: one cancellation token observed by every
/// long-running task, and a tracker the entry point waits on until all of
/// them have finished.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to a task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a tracked task. `name` is used in logs.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            task.await;
            tracing::debug!(task = name, "Task finished");
        });
    }

    /// Number of tracked tasks still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Signal every task to stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait until every spawned task has finished. No new tasks may be
    /// spawned afterwards.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
