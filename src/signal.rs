//! One-shot completion signals.

use std::sync::Arc;
use tokio::sync::watch;

/// A fire-once synchronization point.
///
/// Clones share the same underlying signal. Firing is idempotent: only the
/// first call to [`fire`](Self::fire) has an effect. Waiting on a signal that
/// has already fired returns immediately.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CompletionSignal {
    /// Create a new, unfired signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.
    ///
    /// Returns `true` if this call fired it, `false` if it had already fired.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Check whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fires_once() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let signal = CompletionSignal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .expect("fired signal should not block");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_fire_from_clone() {
        let signal = CompletionSignal::new();
        let remote = signal.clone();

        let waiter = tokio::spawn(async move { signal.wait().await });
        tokio::task::yield_now().await;
        remote.fire();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
