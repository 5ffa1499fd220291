//! Drain trigger shared between the signal coordinator and the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// One-shot "stop accepting, begin graceful close" trigger.
///
/// Clones share the same trigger. Firing it more than once is harmless;
/// only the first call reports `true`.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    fired: Arc<AtomicBool>,
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new, untriggered shutdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the trigger. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether the trigger has fired.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future-producing handle for the serving task.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.clone(),
        }
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Resolves once the trigger fires (immediately if it already has).
    pub async fn recv(self) {
        self.token.cancelled_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_reports_first_call_only() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.clone().trigger());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn subscriber_observes_trigger() {
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();

        let waiter = tokio::spawn(signal.recv());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("subscriber should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn late_subscriber_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.subscribe().recv())
            .await
            .expect("already-fired trigger should resolve");
    }
}
