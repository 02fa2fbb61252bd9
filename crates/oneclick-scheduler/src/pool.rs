use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tracing::debug;

/// Snapshot of pool occupancy, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Claimed jobs waiting for a worker slot.
    pub queued: usize,
    pub in_flight: usize,
    pub max_concurrency: usize,
}

struct Inner {
    slots: Semaphore,
    max_concurrency: usize,
    max_queue: usize,
    /// Tasks spawned and not yet finished, queued or running.
    outstanding: watch::Sender<usize>,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

/// Bounded executor pool: `max_concurrency` tasks run at once, up to
/// `max_queue` more wait for a slot.
///
/// The pool never refuses work itself; callers size their batches with
/// [`WorkerPool::capacity`] so that nothing already claimed is dropped.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

/// Decrements the counters when a task ends, panicking or not.
struct TaskGuard {
    inner: Arc<Inner>,
    running: bool,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.running {
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, max_queue: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                slots: Semaphore::new(max_concurrency),
                max_concurrency,
                max_queue,
                outstanding,
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// How many more tasks fit before the backlog ceiling.
    pub fn capacity(&self) -> usize {
        let limit = self.inner.max_concurrency + self.inner.max_queue;
        limit.saturating_sub(*self.inner.outstanding.borrow())
    }

    pub fn stats(&self) -> PoolStats {
        let outstanding = *self.inner.outstanding.borrow();
        let in_flight = self.inner.in_flight.load(Ordering::SeqCst);
        PoolStats {
            queued: outstanding.saturating_sub(in_flight),
            in_flight,
            max_concurrency: self.inner.max_concurrency,
        }
    }

    /// Queue `task`; it starts as soon as a slot frees up.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.outstanding.send_modify(|n| *n += 1);
        let mut guard = TaskGuard {
            inner: self.inner.clone(),
            running: false,
        };

        tokio::spawn(async move {
            // The semaphore is never closed, so acquire only fails if the
            // pool is gone, in which case there is nobody left to report to.
            let Ok(_permit) = guard.inner.slots.acquire().await else {
                return;
            };
            guard.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            guard.running = true;
            task.await;
        });
    }

    /// Stop accepting new work. Already spawned tasks keep running.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(outstanding = *self.inner.outstanding.borrow(), "worker pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolve once every spawned task has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
