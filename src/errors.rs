//! Cross-cutting typed failures shared by the worker pool, the lexical
//! index manager, and the hybrid retriever.
//!
//! Most errors in this crate are domain-specific `thiserror` enums living
//! next to the code that raises them (see `graph::store`, `ledger`,
//! `path_utils`-equivalent validation in `validation`). The handful of
//! failure shapes that recur across unrelated components — timeout,
//! cancellation, bounded-queue overflow — live here so callers can match
//! on one type regardless of which component produced it.

use std::time::Duration;
use thiserror::Error;

/// A uniform timeout failure. Produced whenever §5's "every long-running
/// external operation takes an explicit timeout" rule fires.
#[derive(Debug, Clone, Error)]
#[error("operation {operation} timed out after {elapsed:?}")]
pub struct TimeoutError {
    pub operation: &'static str,
    pub elapsed: Duration,
}

impl TimeoutError {
    pub fn new(operation: &'static str, elapsed: Duration) -> Self {
        Self { operation, elapsed }
    }
}

/// A uniform cancellation failure. Raised when a caller's
/// `CancellationToken` fires at a suspension point.
#[derive(Debug, Clone, Error)]
#[error("operation {operation} was cancelled")]
pub struct CancelledError {
    pub operation: &'static str,
}

/// Raised by the bounded worker pool when `maxQueueSize` is exceeded.
/// Per §5 this is a hard error, never a silently dropped task.
#[derive(Debug, Clone, Error)]
#[error("queue is full: {pending} pending tasks >= capacity {capacity}")]
pub struct QueueFullError {
    pub pending: usize,
    pub capacity: usize,
}

/// A cooperative cancellation signal threaded through retrieval fanout
/// and long-running worker tasks. Cloning shares the same underlying
/// flag; `cancel()` from any clone is observed by all others.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Returns `Err` if cancelled, for use at suspension points with `?`.
    pub fn check(&self, operation: &'static str) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError { operation })
        } else {
            Ok(())
        }
    }
}
