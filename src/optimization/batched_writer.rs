//! Batched writer (§4.6): accumulates items up to `max_batch_size` or
//! `max_wait`, whichever comes first, then flushes under
//! retry-with-exponential-backoff. Priority order is preserved within a
//! flushed batch.

use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct BatchedWriter<T> {
    buffer: Mutex<Vec<(i32, T)>>,
    max_batch_size: usize,
    max_wait: Duration,
    max_retries: u32,
    retry_delay: Duration,
    batch_opened_at: Mutex<Option<Instant>>,
}

impl<T: Clone + Send + 'static> BatchedWriter<T> {
    pub fn new(max_batch_size: usize, max_wait: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            max_batch_size: max_batch_size.max(1),
            max_wait,
            max_retries,
            retry_delay,
            batch_opened_at: Mutex::new(None),
        }
    }

    /// Adds `item` at `priority`; returns a ready batch (sorted
    /// highest-priority-first, ties preserving arrival order) if this
    /// push crossed `max_batch_size` or the oldest pending item has
    /// been waiting longer than `max_wait`.
    pub async fn push(&self, priority: i32, item: T) -> Option<Vec<T>> {
        let mut buffer = self.buffer.lock().await;
        let mut opened = self.batch_opened_at.lock().await;
        if opened.is_none() {
            *opened = Some(Instant::now());
        }
        buffer.push((priority, item));

        let size_triggered = buffer.len() >= self.max_batch_size;
        let wait_triggered = opened.map(|t| t.elapsed() >= self.max_wait).unwrap_or(false);

        if size_triggered || wait_triggered {
            *opened = None;
            let mut drained: Vec<(i32, T)> = buffer.drain(..).collect();
            drained.sort_by(|a, b| b.0.cmp(&a.0));
            Some(drained.into_iter().map(|(_, item)| item).collect())
        } else {
            None
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Flushes `batch` through `sink`, retrying on failure with
    /// exponential backoff (`retry_delay * 2^attempt`, plus up to 30%
    /// jitter so concurrent writers don't retry in lockstep) up to
    /// `max_retries` times.
    pub async fn flush_with_retry<F, Fut>(&self, batch: Vec<T>, sink: F) -> anyhow::Result<()>
    where
        F: Fn(Vec<T>) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let mut attempt = 0u32;
        loop {
            match sink(batch.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.retry_delay * 2u32.pow(attempt.min(16));
                    let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..0.3));
                    tokio::time::sleep(backoff + jitter).await;
                    tracing::warn!(attempt, error = %e, "batched writer flush failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flushes_on_size_threshold() {
        let writer = BatchedWriter::new(3, Duration::from_secs(60), 0, Duration::from_millis(1));
        assert!(writer.push(0, 1).await.is_none());
        assert!(writer.push(0, 2).await.is_none());
        let batch = writer.push(0, 3).await;
        assert_eq!(batch, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn flushes_on_wait_threshold() {
        let writer = BatchedWriter::new(100, Duration::from_millis(5), 0, Duration::from_millis(1));
        assert!(writer.push(0, "a").await.is_none());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let batch = writer.push(0, "b").await;
        assert!(batch.is_some());
    }

    #[tokio::test]
    async fn higher_priority_items_sort_first_within_a_batch() {
        let writer = BatchedWriter::new(2, Duration::from_secs(60), 0, Duration::from_millis(1));
        writer.push(1, "low").await;
        let batch = writer.push(5, "high").await.unwrap();
        assert_eq!(batch, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let writer = BatchedWriter::new(1, Duration::from_secs(60), 3, Duration::from_millis(1));
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result = writer
            .flush_with_retry(vec![1, 2], move |_batch| {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if n < 2 {
                        anyhow::bail!("transient failure");
                    }
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
