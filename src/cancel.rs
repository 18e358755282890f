//! Cooperative cancellation.
//!
//! A [`CancelSignal`] is shared between whoever may stop a job (the service,
//! a Ctrl+C handler) and the job itself. The job only checks it at page
//! boundaries, so a request already in flight always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a cancel signal.
pub type SharedCancel = Arc<CancelSignal>;

/// One-shot cancellation flag with async notification.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create a new, unset signal.
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared signal wrapped in [`Arc`].
    pub fn shared() -> SharedCancel {
        Arc::new(Self::new())
    }

    /// Request cancellation. Waiters are woken once; later calls are no-ops.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested. Returns immediately if already set.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
