//! Cooperative shutdown controller.
//!
//! `main.rs` combines this with OS signals. Check workers use it to report a
//! fatal local failure, which terminates the whole process.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::Notify;

/// Cooperative shutdown signal used for process exit.
#[derive(Clone, Debug, Default)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    fatal: Mutex<Option<String>>,
    notify: Notify,
}

impl ShutdownController {
    /// Returns true if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Relaxed)
    }

    /// Request shutdown and wake all waiters.
    pub fn request_shutdown(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Record a fatal failure and request shutdown.
    ///
    /// Only the first reason is kept.
    pub fn fatal(&self, reason: impl Into<String>) {
        if let Ok(mut fatal) = self.inner.fatal.lock() {
            fatal.get_or_insert_with(|| reason.into());
        }
        self.request_shutdown();
    }

    /// The fatal failure that triggered shutdown, if any.
    pub fn fatal_reason(&self) -> Option<String> {
        self.inner.fatal.lock().ok().and_then(|f| f.clone())
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}
