//! Detached background work that outlives the response it was scheduled from.

use std::future::Future;
use thiserror::Error;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    #[error("background task queue is closed")]
    Closed,
}

/// Capability to submit fire-and-forget tasks.
///
/// Submitted work is never awaited by the caller. It keeps running after the
/// response is sent, and [`Detached::drain`] waits for all of it at shutdown.
#[derive(Clone, Default)]
pub struct Detached {
    tracker: TaskTracker,
}

impl Detached {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F) -> Result<(), SpawnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(SpawnError::Closed);
        }
        self.tracker.spawn(task);
        Ok(())
    }

    /// Stop accepting work and wait for everything already submitted.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}
