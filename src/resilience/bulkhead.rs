//! Concurrency isolation.
//!
//! A bulkhead caps how many operations run at once. Callers beyond
//! the limit wait in a bounded FIFO queue; once that queue is full,
//! further callers are rejected outright. A finishing operation hands
//! its slot directly to the oldest waiter, so waiters cannot be
//! starved by new arrivals.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::telemetry::RuntimeTelemetry;
use crate::types::{BoxError, ResilienceError};

struct BulkheadInner {
    running: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

pub struct Bulkhead {
    name: String,
    max_concurrent: usize,
    max_queue_length: usize,
    inner: Mutex<BulkheadInner>,
    telemetry: Option<Arc<RuntimeTelemetry>>,
}

/// Counters snapshot for a bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadStats {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue_length: usize,
}

impl Bulkhead {
    /// Limits are clamped to at least one running slot.
    pub fn new(name: impl Into<String>, max_concurrent: usize, max_queue_length: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrent: max_concurrent.max(1),
            max_queue_length,
            inner: Mutex::new(BulkheadInner {
                running: 0,
                waiters: VecDeque::new(),
            }),
            telemetry: None,
        }
    }

    /// Count rejections in the runtime's metrics.
    pub fn with_telemetry(mut self, telemetry: Arc<RuntimeTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> BulkheadStats {
        let inner = self.inner.lock().unwrap();
        BulkheadStats {
            running: inner.running,
            queued: inner.waiters.len(),
            max_concurrent: self.max_concurrent,
            max_queue_length: self.max_queue_length,
        }
    }

    /// Acquire a slot, waiting in the queue if necessary. Fails with
    /// `BulkheadFull` when the queue is at capacity.
    pub async fn acquire(&self) -> Result<(), ResilienceError> {
        let receiver = {
            let mut inner = self.inner.lock().unwrap();
            if inner.running < self.max_concurrent {
                inner.running += 1;
                return Ok(());
            }
            if inner.waiters.len() >= self.max_queue_length {
                warn!(bulkhead = %self.name, "queue full, rejecting");
                if let Some(telemetry) = &self.telemetry {
                    telemetry.bulkhead_rejected(&self.name);
                }
                return Err(ResilienceError::BulkheadFull {
                    name: self.name.clone(),
                });
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            debug!(bulkhead = %self.name, queued = inner.waiters.len(), "waiting for slot");
            rx
        };

        // The releasing side transfers its slot with the signal, so
        // `running` is not incremented again here.
        match receiver.await {
            Ok(()) => Ok(()),
            // Sender dropped without signalling: bulkhead torn down.
            Err(_) => Err(ResilienceError::BulkheadFull {
                name: self.name.clone(),
            }),
        }
    }

    /// Release a slot, handing it to the oldest live waiter if any.
    pub fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        while let Some(waiter) = inner.waiters.pop_front() {
            // Slot moves to the waiter; `running` stays unchanged.
            if waiter.send(()).is_ok() {
                return;
            }
            // Waiter cancelled while queued, try the next one.
        }
        inner.running = inner.running.saturating_sub(1);
    }

    /// Run `operation` inside the bulkhead. The slot is released when
    /// the guard drops, so a cancelled or panicking operation cannot
    /// leak it.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.acquire().await?;
        let _guard = SlotGuard { bulkhead: self };
        operation()
            .await
            .map_err(|source| ResilienceError::Operation {
                name: self.name.clone(),
                source,
            })
    }
}

/// Releases the held slot on drop, whether the operation finished,
/// panicked, or its future was dropped mid-await.
struct SlotGuard<'a> {
    bulkhead: &'a Bulkhead,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.bulkhead.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_up_to_the_concurrency_limit() {
        let bulkhead = Bulkhead::new("test", 2, 4);
        bulkhead.acquire().await.unwrap();
        bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.stats().running, 2);

        bulkhead.release();
        bulkhead.release();
        assert_eq!(bulkhead.stats().running, 0);
    }

    #[tokio::test]
    async fn rejects_when_queue_is_full() {
        use crate::config::TelemetryConfig;

        let telemetry = Arc::new(RuntimeTelemetry::new(TelemetryConfig::default()));
        let bulkhead = Arc::new(
            Bulkhead::new("test", 1, 1).with_telemetry(Arc::clone(&telemetry)),
        );
        bulkhead.acquire().await.unwrap();

        // Parks one waiter in the queue.
        let waiting = Arc::clone(&bulkhead);
        let waiter = tokio::spawn(async move { waiting.acquire().await });
        while bulkhead.stats().queued == 0 {
            tokio::task::yield_now().await;
        }

        // Queue is now full, the next caller is rejected.
        let result = bulkhead.acquire().await;
        assert!(matches!(result, Err(ResilienceError::BulkheadFull { .. })));
        assert_eq!(telemetry.counter("bulkhead.rejected"), 1);

        bulkhead.release();
        waiter.await.unwrap().unwrap();
        assert_eq!(bulkhead.stats().running, 1);
    }

    #[tokio::test]
    async fn release_hands_slot_to_oldest_waiter() {
        let bulkhead = Arc::new(Bulkhead::new("test", 1, 4));
        let order = Arc::new(Mutex::new(Vec::new()));

        bulkhead.acquire().await.unwrap();
        let mut handles = Vec::new();
        for n in 0..3usize {
            let worker = Arc::clone(&bulkhead);
            let log = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                worker.acquire().await.unwrap();
                log.lock().unwrap().push(n);
                worker.release();
            }));
            while bulkhead.stats().queued != n + 1 {
                tokio::task::yield_now().await;
            }
        }

        bulkhead.release();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn release_skips_cancelled_waiters() {
        let bulkhead = Arc::new(Bulkhead::new("test", 1, 4));
        bulkhead.acquire().await.unwrap();

        // Queue a waiter and cancel it before the slot frees up.
        let cancelled = Arc::clone(&bulkhead);
        let handle = tokio::spawn(async move { cancelled.acquire().await });
        while bulkhead.stats().queued == 0 {
            tokio::task::yield_now().await;
        }
        handle.abort();
        let _ = handle.await;

        // The dead waiter must not swallow the released slot.
        bulkhead.release();
        assert_eq!(bulkhead.stats().running, 0);
        bulkhead.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn execute_wraps_operation_errors() {
        let bulkhead = Bulkhead::new("db", 2, 2);
        let result: Result<(), _> = bulkhead
            .execute(|| async { Err::<(), BoxError>("query failed".into()) })
            .await;

        match result {
            Err(ResilienceError::Operation { name, .. }) => assert_eq!(name, "db"),
            other => panic!("expected Operation error, got {other:?}"),
        }
        // Slot was released despite the failure.
        assert_eq!(bulkhead.stats().running, 0);
    }

    #[tokio::test]
    async fn cancelled_execute_returns_its_slot() {
        let bulkhead = Arc::new(Bulkhead::new("test", 1, 4));

        // Park an execute in its operation, then drop the whole task.
        let worker = Arc::clone(&bulkhead);
        let handle = tokio::spawn(async move {
            worker
                .execute(|| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                })
                .await
        });
        while bulkhead.stats().running == 0 {
            tokio::task::yield_now().await;
        }
        handle.abort();
        let _ = handle.await;

        assert_eq!(bulkhead.stats().running, 0);
        bulkhead.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_executions_never_exceed_limit() {
        let bulkhead = Arc::new(Bulkhead::new("test", 2, 10));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let bulkhead = Arc::clone(&bulkhead);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                bulkhead
                    .execute(|| async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
