// Centralized observability infrastructure.
// Structured logging, operation context, and process-local metrics
// shared by every component in the pipeline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the default (non-verbose, non-quiet) level.
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity. Safe to call more
/// than once per process (tests routinely do); a second initialization
/// attempt is swallowed rather than propagated.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("codegraph_engine=debug,info")
    } else {
        EnvFilter::new("codegraph_engine=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("codegraph-engine observability initialized");
            }
            Ok(())
        }
        Err(_) => Ok(()), // already initialized; fine in tests
    }
}

/// Vocabulary of things worth logging structurally, as opposed to free
/// text. Each variant carries the identifiers relevant to that step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    Parse { file_id: String },
    Extract { file_id: String, entity_count: usize },
    GraphWrite { file_id: String, inserted: usize, deleted: usize },
    GraphQuery { relation: String, result_count: usize },
    VectorSearch { k: usize, result_count: usize },
    LedgerAppend { event_type: String, sequence: u64 },
    RetrievalFanout { query_id: Uuid, sources: usize },
}

/// Categories of process-local metrics recorded via [`record_metric`].
#[derive(Debug, Clone)]
pub enum MetricType {
    Counter { name: &'static str, value: u64 },
    Gauge { name: &'static str, value: f64 },
    Histogram { name: &'static str, value: f64, unit: &'static str },
    Timer { name: &'static str, duration: Duration },
}

/// Record a metric. In this crate metrics are logged at `debug` rather
/// than exported to a time-series backend — the host process owns that
/// integration (out of scope, per §1).
pub fn record_metric(metric: MetricType) {
    tracing::debug!(?metric, "metric recorded");
}

/// Per-operation tracing context: a trace id, a span id, a start time,
/// and a small attribute bag for structured error logging.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub operation: String,
    pub started_at: Instant,
    attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            operation: operation.into(),
            started_at: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Log an operation's outcome. Successes log at `info`; failures log at
/// `error` with the context's attribute bag attached and bump the
/// global error counter that feeds process health checks.
pub fn log_operation<T>(ctx: &OperationContext, op: &Operation, result: &anyhow::Result<T>) {
    match result {
        Ok(_) => {
            info!(
                trace_id = %ctx.trace_id,
                operation = %ctx.operation,
                elapsed_ms = ctx.elapsed().as_millis() as u64,
                ?op,
                "operation completed"
            );
        }
        Err(e) => {
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
            error!(
                trace_id = %ctx.trace_id,
                operation = %ctx.operation,
                attributes = ?ctx.attributes,
                error = %e,
                "operation failed"
            );
        }
    }
}

/// Total number of operations logged via [`log_operation`] this process.
pub fn operation_count() -> u64 {
    OPERATION_COUNTER.load(Ordering::Relaxed)
}

/// Total number of failed operations logged via [`log_operation`].
pub fn error_count() -> u64 {
    ERROR_COUNTER.load(Ordering::Relaxed)
}

/// Run a future under a fresh trace id, logging entry/exit at `debug`.
pub async fn with_trace_id<F, T>(operation: &str, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let trace_id = Uuid::new_v4();
    tracing::debug!(%trace_id, %operation, "entering");
    let result = fut.await;
    tracing::debug!(%trace_id, %operation, "exiting");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_context_tracks_attributes() {
        let mut ctx = OperationContext::new("test.op");
        ctx.add_attribute("key", "value");
        assert_eq!(ctx.attributes.len(), 1);
    }

    #[test]
    fn log_operation_counts_errors() {
        let ctx = OperationContext::new("test.fail");
        let before = error_count();
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("boom"));
        log_operation(&ctx, &Operation::GraphQuery { relation: "x".into(), result_count: 0 }, &result);
        assert_eq!(error_count(), before + 1);
    }
}
