//! Cooperative cancellation flag shared between a task and whoever may cancel it.

use tokio::sync::watch;

/// A one-way cancellation flag.
///
/// Backed by a `tokio::sync::watch` channel so that a task suspended between fold
/// steps can be woken as soon as cancellation is requested, while the flag itself
/// can still be polled synchronously at each checkpoint. Clones share the flag.
#[derive(Clone)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationHandle {
    /// Create a new (not-yet-cancelled) handle.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Request cancellation.
    ///
    /// Only ever moves the flag from `false` to `true`. Returns `true` if this call
    /// performed the transition, `false` if cancellation had already been requested.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested. Returns immediately if it already was.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Both halves live in `self`, so the sender cannot be dropped while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
