use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A single-shot task that runs once after a delay.
///
/// Scheduling while a run is already armed is a no-op, so callers can re-arm
/// on every event without stacking timers. The task disarms itself as soon as
/// its delay elapses, before the body runs, so work arriving while the body is
/// still executing can arm the next run.
#[derive(Default)]
pub struct DeferredTask {
    armed: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the task. Returns `false` when a run was already pending.
    pub fn schedule<F, Fut>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.armed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let armed = self.armed.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            armed.store(false, Ordering::SeqCst);
            task().await;
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        true
    }

    /// Disarm without running. Returns whether a pending run was cancelled.
    ///
    /// A body that has already started is left to finish.
    pub fn cancel(&self) -> bool {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return false;
        }

        if let Ok(mut slot) = self.handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        if self.armed.load(Ordering::SeqCst) {
            if let Ok(slot) = self.handle.get_mut() {
                if let Some(handle) = slot.take() {
                    handle.abort();
                }
            }
        }
    }
}
