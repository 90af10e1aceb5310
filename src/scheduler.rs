//! Delayed response emission.
//!
//! The delay runs on the tokio timer, so a slow route never holds a runtime
//! worker. Cancellation follows the future: when the connection goes away the
//! handler future is dropped mid-sleep and the emit closure is never called.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Injects artificial latency before a response is produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseScheduler;

impl ResponseScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Wait `delay`, then call `emit` exactly once and return its output.
    ///
    /// A zero delay still yields once to the runtime before emitting. If the
    /// returned future is dropped before the delay elapses, `emit` does not
    /// run.
    pub fn schedule<T, F>(&self, delay: Duration, emit: F) -> impl Future<Output = T>
    where
        F: FnOnce() -> T,
    {
        async move {
            let mut guard = PendingEmission { delay, armed: true };

            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            guard.armed = false;
            emit()
        }
    }
}

/// Logs emissions abandoned before their delay elapsed.
struct PendingEmission {
    delay: Duration,
    armed: bool,
}

impl Drop for PendingEmission {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                delay_ms = self.delay.as_millis() as u64,
                "Delayed response canceled before emission"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_emits_after_delay() {
        let scheduler = ResponseScheduler::new();
        let start = Instant::now();

        let value = scheduler
            .schedule(Duration::from_millis(50), || "done")
            .await;

        assert_eq!(value, "done");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_zero_delay_emits_immediately() {
        let scheduler = ResponseScheduler::new();
        let start = Instant::now();

        let value = scheduler.schedule(Duration::ZERO, || 7).await;

        assert_eq!(value, 7);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_emit_called_exactly_once() {
        let scheduler = ResponseScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        scheduler
            .schedule(Duration::from_millis(5), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_future_never_emits() {
        let scheduler = ResponseScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let pending = scheduler.schedule(Duration::from_millis(200), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let result = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delay_does_not_block_other_tasks() {
        let scheduler = ResponseScheduler::new();
        let slow = tokio::spawn(async move {
            scheduler.schedule(Duration::from_millis(200), || ()).await
        });

        let start = Instant::now();
        let fast = ResponseScheduler::new()
            .schedule(Duration::ZERO, || start.elapsed())
            .await;

        assert!(fast < Duration::from_millis(100));
        slow.await.unwrap();
    }
}
