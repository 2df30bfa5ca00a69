//! Status stream from the pipeline to the front-end.
//!
//! Worker threads may emit status directly; everything else reaches the
//! controller through completion events.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Human-readable status line.
    Text(String),
    /// Progress of the current stage, 0 to 100.
    Percent(u8),
}

/// Percent for `done` out of `total`, clamped to 100.
///
/// An unknown total (0) reports 0.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}

/// Sends status events, keeping percent non-decreasing within a stage.
///
/// Clones share the percent watermark, so a worker thread and the
/// controller report against the same stage.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: Option<UnboundedSender<StatusEvent>>,
    watermark: Arc<AtomicU8>,
}

impl StatusReporter {
    /// Create a reporter together with the receiving end.
    pub fn channel() -> (Self, UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Create a reporter sending on `tx`.
    pub fn new(tx: UnboundedSender<StatusEvent>) -> Self {
        Self {
            tx: Some(tx),
            watermark: Arc::new(AtomicU8::new(0)),
        }
    }

    /// A reporter that drops everything.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            watermark: Arc::new(AtomicU8::new(0)),
        }
    }

    fn send(&self, event: StatusEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }

    /// Emit a status line.
    pub fn text(&self, text: impl Into<String>) {
        self.send(StatusEvent::Text(text.into()));
    }

    /// Start a new stage: percent drops back to 0.
    pub fn reset(&self) {
        self.watermark.store(0, Ordering::SeqCst);
        self.send(StatusEvent::Percent(0));
    }

    /// Report stage progress; values below the current one are ignored.
    pub fn percent(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.watermark.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.send(StatusEvent::Percent(percent));
        }
    }

    /// Report `done` out of `total`.
    pub fn progress(&self, done: u64, total: u64) {
        if total > 0 {
            self.percent(percent_of(done, total));
        }
    }

    /// Current stage percent.
    pub fn current(&self) -> u8 {
        self.watermark.load(Ordering::SeqCst)
    }
}
