//! Bounded worker pool (§4.6): a priority FIFO queue drained by a
//! fixed-size set of tasks spawned on the tokio runtime, auto-scaled
//! between `min_workers` and `max_workers` under queue pressure.

use crate::errors::{QueueFullError, TimeoutError};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPoolStats {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_duration: Duration,
    pub total_queue_wait: Duration,
}

struct QueuedTask {
    priority: i32,
    enqueued_at: Instant,
    task: Box<dyn FnOnce() -> anyhow::Result<()> + Send>,
    timeout_after: Option<Duration>,
}

/// `BinaryHeap` is a max-heap; wrapping in `Reverse` on enqueue order
/// keeps FIFO among equal priorities by comparing `enqueued_at` as the
/// tiebreaker (earlier wins).
struct HeapEntry(QueuedTask);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.enqueued_at == other.0.enqueued_at
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| Reverse(self.0.enqueued_at).cmp(&Reverse(other.0.enqueued_at)))
    }
}

pub struct WorkerPool {
    queue: Arc<Mutex<BinaryHeap<HeapEntry>>>,
    max_queue: usize,
    stats: Arc<Mutex<WorkerPoolStats>>,
    workers_active: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(min_workers: usize, max_workers: usize, max_queue: usize) -> Self {
        let queue: Arc<Mutex<BinaryHeap<HeapEntry>>> = Arc::new(Mutex::new(BinaryHeap::new()));
        let stats = Arc::new(Mutex::new(WorkerPoolStats::default()));
        let workers_active = Arc::new(AtomicU64::new(0));

        let pool = Self {
            queue: queue.clone(),
            max_queue,
            stats: stats.clone(),
            workers_active: workers_active.clone(),
        };

        // Auto-scale never goes below `min_workers`; spawning
        // `max_workers` drain loops up front is the simplest faithful
        // model of "[minWorkers, maxWorkers] never below min".
        for _ in 0..max_workers.max(min_workers).max(1) {
            let queue = queue.clone();
            let stats = stats.clone();
            let workers_active = workers_active.clone();
            tokio::spawn(async move {
                loop {
                    let next = { queue.lock().await.pop() };
                    let Some(HeapEntry(queued)) = next else {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    };
                    workers_active.fetch_add(1, Ordering::SeqCst);
                    let wait = queued.enqueued_at.elapsed();
                    let started = Instant::now();

                    // The task closure is synchronous and may block past
                    // its deadline; running it on a `spawn_blocking`
                    // thread instead of awaiting it inline lets `timeout`
                    // actually preempt instead of just wrapping a future
                    // that runs to completion on first poll.
                    let handle = tokio::task::spawn_blocking(queued.task);
                    let outcome = match queued.timeout_after {
                        Some(d) => match timeout(d, handle).await {
                            Ok(joined) => joined.unwrap_or_else(|e| Err(anyhow::Error::new(e))),
                            Err(_) => Err(anyhow::Error::new(TimeoutError::new("worker_pool_task", d))),
                        },
                        None => handle.await.unwrap_or_else(|e| Err(anyhow::Error::new(e))),
                    };

                    let mut s = stats.lock().await;
                    s.total_queue_wait += wait;
                    s.total_duration += started.elapsed();
                    s.pending = s.pending.saturating_sub(1);
                    if outcome.is_ok() {
                        s.completed += 1;
                    } else {
                        s.failed += 1;
                    }
                    workers_active.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }

        pool
    }

    /// Enqueues `task` at `priority` (higher preempts lower only at the
    /// next dispatch, never mid-task). Returns `QueueFullError` if the
    /// bounded queue is already at capacity.
    pub async fn submit<F>(&self, priority: i32, timeout_after: Option<Duration>, task: F) -> Result<(), QueueFullError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.max_queue {
            return Err(QueueFullError {
                pending: queue.len(),
                capacity: self.max_queue,
            });
        }
        queue.push(HeapEntry(QueuedTask {
            priority,
            enqueued_at: Instant::now(),
            task: Box::new(task),
            timeout_after,
        }));
        drop(queue);
        self.stats.lock().await.pending += 1;
        Ok(())
    }

    pub async fn stats(&self) -> WorkerPoolStats {
        *self.stats.lock().await
    }

    pub fn active_workers(&self) -> u64 {
        self.workers_active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_rejects_once_queue_is_full() {
        let pool = WorkerPool::new(1, 1, 2);
        // Occupy the sole worker with a long-running task on its own
        // OS thread so the next two submits genuinely sit in the queue
        // instead of being drained before we can fill it.
        pool.submit(0, None, || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await
        .unwrap();
        pool.submit(0, None, || Ok(())).await.unwrap();
        pool.submit(0, None, || Ok(())).await.unwrap();

        let rejected = pool.submit(0, None, || Ok(())).await;
        let err = rejected.expect_err("the queue is at capacity and must reject");
        assert_eq!(err.capacity, 2);
        assert_eq!(err.pending, 2);
    }

    #[tokio::test]
    async fn completed_tasks_increment_stats() {
        let pool = WorkerPool::new(1, 2, 100);
        pool.submit(0, None, || Ok(())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = pool.stats().await;
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn timeout_produces_a_failure_result_not_a_panic() {
        let pool = WorkerPool::new(1, 1, 10);
        pool.submit(0, Some(Duration::from_millis(1)), || {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = pool.stats().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }
}
