//! Counted completion tracking for running sources.
//!
//! Every started source holds a [`ShutdownGuard`]. The guard is taken from the
//! coordinator before the source task is spawned and released when the task
//! drops it, whatever the exit path (normal return, error, cancellation or
//! panic). [`ShutdownCoordinator::wait`] resolves once no guard is left.

use std::sync::Arc;
use tokio::sync::watch;

/// Tracks how many sources are still holding resources
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    active: Arc<watch::Sender<usize>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Count one more running source and hand out its guard
    pub fn register(&self) -> ShutdownGuard {
        self.active.send_modify(|count| *count += 1);
        ShutdownGuard {
            active: self.active.clone(),
        }
    }

    /// Number of guards not yet released
    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until every guard has been released
    pub async fn wait(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that a source is running; dropping it signals completion
#[derive(Debug)]
#[must_use = "dropping the guard immediately marks the source as finished"]
pub struct ShutdownGuard {
    active: Arc<watch::Sender<usize>>,
}

impl ShutdownGuard {
    /// Register an extra unit of work against the same coordinator
    pub fn fork(&self) -> ShutdownGuard {
        self.active.send_modify(|count| *count += 1);
        ShutdownGuard {
            active: self.active.clone(),
        }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count -= 1);
    }
}
