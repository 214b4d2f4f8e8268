//! codegraph-engine: an agent-facing code knowledge engine.
//!
//! Source files are extracted into a language-neutral entity graph
//! (`extractor`, `parsing`) backed by a transactional graph store with
//! vector search (`graph`), kept current by an incremental updater
//! (`incremental_updater`) and written through an optimization
//! substrate of caches, heat tracking, and bounded concurrency
//! (`optimization`). A hybrid retriever (`hybrid_retriever`) fans a
//! query out across lexical (`lexical_index_manager`), vector, and
//! graph sources and fuses the results. Every mutation is recorded in
//! an append-only change ledger (`ledger`), and a small pattern
//! registry (`pattern_registry`) detects recurring design patterns
//! across the graph.

pub mod config;
pub mod errors;
pub mod extractor;
pub mod graph;
pub mod graph_writer;
pub mod hybrid_retriever;
pub mod incremental_updater;
pub mod ledger;
pub mod lexical_index_manager;
pub mod observability;
pub mod optimization;
pub mod parsing;
pub mod pattern_registry;
pub mod types;

pub use config::{EngineConfig, EngineConfigBuilder, StorageEngineKind};
pub use errors::{CancellationToken, CancelledError, QueueFullError, TimeoutError};
pub use graph::{GraphQuery, GraphStore, InMemoryGraphStore, QueryRows, WriteBatch};
pub use hybrid_retriever::{HybridRetriever, Intent, RetrievalResponse};
pub use incremental_updater::{FileChangeSet, IncrementalUpdater, ProgressEvent};
pub use ledger::{ChangeLedger, LedgerEntry, LedgerQuery, NewLedgerEntry, SubscriptionFilter};
pub use lexical_index_manager::LexicalIndexManager;
pub use pattern_registry::{DetectedPattern, DetectionContext, DetectionOptions, PatternRegistry};

use anyhow::Result;
use std::sync::Arc;

/// Wires together the components a caller typically needs at once:
/// the graph store, the change ledger, and the lexical index
/// subprocess manager, all constructed from one [`EngineConfig`].
pub struct Engine {
    pub config: EngineConfig,
    pub store: Arc<InMemoryGraphStore>,
    pub ledger: Arc<ChangeLedger>,
    pub lexical: Arc<LexicalIndexManager>,
}

impl Engine {
    /// Opens the graph store and change ledger under `config`'s state
    /// directory, running pending migrations. Does not start the
    /// lexical index subprocess — call `lexical.start()` explicitly,
    /// since that spawns an external process and binds a port.
    pub async fn open(config: EngineConfig, run_migrations: bool) -> Result<Self> {
        std::fs::create_dir_all(config.state_dir())?;

        let mut store = graph::open(config.storage_engine, &config.data_dir())?;
        store.initialize(run_migrations).await?;

        let ledger_path = config.state_dir().join("ledger.log");
        let ledger = ChangeLedger::open(
            Some(&ledger_path),
            config.ledger.session_timeout,
            config.ledger.max_session_duration,
            config.ledger.retention_days,
        )?;

        let lexical = LexicalIndexManager::new(
            config.lexical_index.port,
            config.lexical_dir(),
            config.lexical_index.binary_dir.clone(),
            config.lexical_index.health_poll_timeout,
            config.lexical_index.reindex_min_interval,
        );

        Ok(Self {
            config,
            store: Arc::new(store),
            ledger: Arc::new(ledger),
            lexical: Arc::new(lexical),
        })
    }

    /// Graceful shutdown (§5): stops the lexical index subprocess.
    /// The graph store and ledger need no explicit close — the store
    /// holds no external handles and the ledger's log file is flushed
    /// on every append.
    pub async fn shutdown(&self) -> Result<()> {
        self.lexical.stop().await
    }
}
