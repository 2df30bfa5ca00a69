//! Runs blocking stage bodies off the controller task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::manager::{ManagerError, ManagerResult};

/// Single-slot pool of blocking work.
///
/// Each unit runs on tokio's blocking thread pool. When it returns, its
/// output is turned into an event and sent to the controller channel. At
/// most one unit is in flight.
pub struct WorkerPool<E> {
    events: UnboundedSender<E>,
    busy: Arc<AtomicBool>,
    on_lost: fn(String) -> E,
}

impl<E: Send + 'static> WorkerPool<E> {
    /// Create a pool that delivers completions on `events`.
    ///
    /// `on_lost` builds the event sent instead when a unit panics.
    pub fn new(events: UnboundedSender<E>, on_lost: fn(String) -> E) -> Self {
        Self {
            events,
            busy: Arc::new(AtomicBool::new(false)),
            on_lost,
        }
    }

    /// Whether a unit is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run `work` on a blocking thread and deliver `on_complete(output)`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::WorkerBusy` while another unit is running.
    pub fn run<T, W, C>(&self, work: W, on_complete: C) -> ManagerResult<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) -> E + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ManagerError::WorkerBusy);
        }

        let busy = Arc::clone(&self.busy);
        let events = self.events.clone();
        let on_lost = self.on_lost;
        let handle = tokio::task::spawn_blocking(work);

        tokio::spawn(async move {
            let event = match handle.await {
                Ok(output) => on_complete(output),
                Err(e) => on_lost(e.to_string()),
            };
            // Free the slot first so the controller can submit the next unit
            busy.store(false, Ordering::Release);
            if events.send(event).is_err() {
                debug!("Controller gone, dropping completion");
            }
        });

        Ok(())
    }
}
