use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Handle for canceling in-flight work (batch slot acquisition, benchmark
/// loops). Cloned handles observe the same signal.
#[derive(Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
    /// Set once the guarded work finished normally; cancel becomes a no-op.
    completed: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the guarded work as completed normally.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation, unless the work already completed.
    pub fn cancel(&self) {
        if !self.is_completed() {
            let _ = self.sender.send(true);
        }
    }

    pub fn is_canceled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when cancellation is signaled. For use in `select!`.
    pub async fn canceled(&self) {
        let mut rx = self.receiver.clone();
        if rx.wait_for(|canceled| *canceled).await.is_err() {
            // Sender gone without a cancel signal; never resolve.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signals() {
        let handle = CancelHandle::new();
        assert!(!handle.is_canceled());
        handle.cancel();
        assert!(handle.is_canceled());
    }

    #[test]
    fn test_cancel_after_complete_is_noop() {
        let handle = CancelHandle::new();
        handle.mark_completed();
        handle.cancel();
        assert!(!handle.is_canceled());
    }

    #[tokio::test]
    async fn test_canceled_future_resolves() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.canceled().await });
        handle.cancel();
        task.await.unwrap();
    }
}
