//! Caller-side cancellation.
//!
//! A `Canceller` fires once; every `CancelSignal` cloned from the same pair
//! observes it for the rest of the client's life, like a cancelled context.

use std::future;
use std::sync::Arc;

use tokio::sync::watch;

/// Creates a linked canceller/signal pair.
pub fn cancellation() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (
        Canceller { tx: Arc::new(tx) },
        CancelSignal { rx: Some(rx) },
    )
}

/// Fires the cancellation.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Cancels every in-flight and future exchange observing the signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a `Canceller`.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        CancelSignal { rx: None }
    }

    /// Returns true once cancellation fired.
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves when cancellation fires; pends forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return future::pending().await;
        };
        let mut rx = rx.clone();
        let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !fired {
            // Canceller dropped without firing.
            future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_fires_after_cancel() {
        let (canceller, signal) = cancellation();
        assert!(!signal.is_cancelled());
        canceller.cancel();
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("signal should resolve");
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let signal = CancelSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn dropped_canceller_does_not_fire() {
        let (canceller, signal) = cancellation();
        drop(canceller);
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
