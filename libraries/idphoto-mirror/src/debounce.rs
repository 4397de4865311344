//! Cancellable delayed task: every `schedule` call restarts the quiet period

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Single pending timer that fires once events stop arriving
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any pending task with `task`, run after the full delay
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        }));
    }

    /// Cancel the pending task; returns whether one was still waiting
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
