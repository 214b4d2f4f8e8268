//! Change Ledger (C9): an append-only, strictly-ordered event log with
//! filtered subscriptions, time/type-bounded queries, and
//! session-boundary compaction.

use crate::types::{EntityId, FileId};
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationChange {
    pub entity_id: EntityId,
    pub previous: Option<String>,
    pub current: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceAdjustment {
    pub entity_id: EntityId,
    pub delta: f64,
}

/// The raw, per-event record (§4.9). `metadata`, `details`, and
/// `mcp_context` are open-ended JSON since their shape varies by
/// `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub event_type: String,
    pub source: String,
    pub impacted_files: Vec<FileId>,
    pub impacted_entities: Vec<EntityId>,
    pub classification_changes: Vec<ClassificationChange>,
    pub graph_diff_summary: Option<String>,
    pub confidence_adjustments: Vec<ConfidenceAdjustment>,
    pub user_interaction: Option<Value>,
    pub mcp_context: Option<Value>,
    pub metadata: Value,
    pub summary: String,
    pub details: Option<Value>,
    pub error: Option<String>,
    pub correlation_id: Option<String>,
    pub parent_event_id: Option<String>,
    pub session_id: Option<String>,
}

/// What a caller supplies; `id`, `timestamp`, and `sequence` are
/// assigned by the ledger at append time.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub event_type: String,
    pub source: String,
    pub impacted_files: Vec<FileId>,
    pub impacted_entities: Vec<EntityId>,
    pub classification_changes: Vec<ClassificationChange>,
    pub graph_diff_summary: Option<String>,
    pub confidence_adjustments: Vec<ConfidenceAdjustment>,
    pub user_interaction: Option<Value>,
    pub mcp_context: Option<Value>,
    pub metadata: Value,
    pub summary: String,
    pub details: Option<Value>,
    pub error: Option<String>,
    pub correlation_id: Option<String>,
    pub parent_event_id: Option<String>,
    pub session_id: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            impacted_files: Vec::new(),
            impacted_entities: Vec::new(),
            classification_changes: Vec::new(),
            graph_diff_summary: None,
            confidence_adjustments: Vec::new(),
            user_interaction: None,
            mcp_context: None,
            metadata: Value::Null,
            summary: summary.into(),
            details: None,
            error: None,
            correlation_id: None,
            parent_event_id: None,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub event_types: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub entity_ids: Option<Vec<EntityId>>,
    pub file_paths: Option<Vec<FileId>>,
    pub correlation_id: Option<String>,
}

impl SubscriptionFilter {
    fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == &entry.event_type) {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.iter().any(|s| s == &entry.source) {
                return false;
            }
        }
        if let Some(entity_ids) = &self.entity_ids {
            if !entity_ids.iter().any(|e| entry.impacted_entities.contains(e)) {
                return false;
            }
        }
        if let Some(file_paths) = &self.file_paths {
            if !file_paths.iter().any(|f| entry.impacted_files.contains(f)) {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if entry.correlation_id.as_deref() != Some(correlation_id.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub event_types: Option<Vec<String>>,
    pub text_search: Option<String>,
    pub limit: usize,
    pub newest_first: bool,
}

/// A condensed session summary produced by compaction (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactedLedgerEntry {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub entry_count: usize,
    pub impacted_files: Vec<FileId>,
    pub impacted_entities: Vec<EntityId>,
    pub event_type_counts: Vec<(String, usize)>,
    pub content_hash: String,
}

const LOG_MAGIC: u32 = 0x4C45444C; // 'LEDL'

fn append_frame(file: &mut std::fs::File, payload: &[u8]) -> Result<()> {
    file.write_all(&LOG_MAGIC.to_le_bytes())?;
    file.write_all(&(payload.len() as u32).to_le_bytes())?;
    file.write_all(payload)?;
    file.flush()?;
    Ok(())
}

/// Append-only, strictly-ordered event log (C9). Persists entries as
/// length-prefixed JSON frames so an unbounded, variable-shaped record
/// can be replayed idempotently by `sequence`, adapting the
/// magic-number/length-prefix framing used for fixed-width binary
/// delta logs elsewhere in the corpus to this log's JSON payloads.
pub struct ChangeLedger {
    entries: RwLock<VecDeque<LedgerEntry>>,
    next_sequence: AtomicU64,
    log_path: Option<PathBuf>,
    log_file: Option<RwLock<std::fs::File>>,
    subscribers: broadcast::Sender<LedgerEntry>,
    session_timeout: chrono::Duration,
    max_session_duration: chrono::Duration,
    retention_days: i64,
}

impl ChangeLedger {
    /// Opens (or creates) the ledger backed by `log_path`, replaying
    /// existing frames to recover `sequence` from `max(sequence)+1`.
    pub fn open(
        log_path: Option<&Path>,
        session_timeout: std::time::Duration,
        max_session_duration: std::time::Duration,
        retention_days: u32,
    ) -> Result<Self> {
        let (tx, _rx) = broadcast::channel(1024);
        let mut entries = VecDeque::new();
        let mut max_sequence = 0u64;
        let mut log_file = None;

        if let Some(path) = log_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            if path.exists() {
                let replayed = replay_log(path)?;
                for entry in &replayed {
                    max_sequence = max_sequence.max(entry.sequence);
                }
                entries.extend(replayed);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(path)
                .with_context(|| format!("opening change ledger log at {}", path.display()))?;
            log_file = Some(RwLock::new(file));
        }

        Ok(Self {
            entries: RwLock::new(entries),
            next_sequence: AtomicU64::new(max_sequence + 1),
            log_path: log_path.map(|p| p.to_path_buf()),
            log_file,
            subscribers: tx,
            session_timeout: chrono::Duration::from_std(session_timeout).unwrap_or(chrono::Duration::minutes(30)),
            max_session_duration: chrono::Duration::from_std(max_session_duration).unwrap_or(chrono::Duration::hours(8)),
            retention_days: retention_days as i64,
        })
    }

    pub fn in_memory() -> Self {
        Self::open(None, std::time::Duration::from_secs(1800), std::time::Duration::from_secs(28800), 90)
            .expect("in-memory ledger construction cannot fail")
    }

    /// O(1) amortized: assigns `sequence`, persists (if backed by a
    /// log file), then notifies subscribers. Notification never blocks
    /// on a slow subscriber — `broadcast` drops the oldest buffered
    /// message for lagging receivers instead of stalling the writer.
    pub async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let committed = self.assign(entry);
        self.persist(&committed).await?;
        self.entries.write().await.push_back(committed.clone());
        let _ = self.subscribers.send(committed.clone());
        Ok(committed)
    }

    /// Atomic: either every entry in `batch` is committed in order, or
    /// (on a persistence failure) none of the in-memory state changes.
    pub async fn append_batch(&self, batch: Vec<NewLedgerEntry>) -> Result<Vec<LedgerEntry>> {
        let committed: Vec<LedgerEntry> = batch.into_iter().map(|e| self.assign(e)).collect();
        for entry in &committed {
            self.persist(entry).await?;
        }
        let mut guard = self.entries.write().await;
        for entry in &committed {
            guard.push_back(entry.clone());
        }
        drop(guard);
        for entry in &committed {
            let _ = self.subscribers.send(entry.clone());
        }
        Ok(committed)
    }

    fn assign(&self, entry: NewLedgerEntry) -> LedgerEntry {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            sequence,
            event_type: entry.event_type,
            source: entry.source,
            impacted_files: entry.impacted_files,
            impacted_entities: entry.impacted_entities,
            classification_changes: entry.classification_changes,
            graph_diff_summary: entry.graph_diff_summary,
            confidence_adjustments: entry.confidence_adjustments,
            user_interaction: entry.user_interaction,
            mcp_context: entry.mcp_context,
            metadata: entry.metadata,
            summary: entry.summary,
            details: entry.details,
            error: entry.error,
            correlation_id: entry.correlation_id,
            parent_event_id: entry.parent_event_id,
            session_id: entry.session_id,
        }
    }

    async fn persist(&self, entry: &LedgerEntry) -> Result<()> {
        let Some(log_file) = &self.log_file else {
            return Ok(());
        };
        let payload = serde_json::to_vec(entry)?;
        let mut file = log_file.write().await;
        append_frame(&mut file, &payload)
    }

    /// Returns a receiver yielding post-commit entries matching
    /// `filter`, in sequence order. Backpressure is the caller's
    /// concern: a receiver that falls behind the channel capacity
    /// silently misses the oldest unread entries rather than stalling
    /// `append`.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> FilteredSubscription {
        FilteredSubscription {
            inner: self.subscribers.subscribe(),
            filter,
        }
    }

    pub async fn query(&self, q: LedgerQuery) -> Vec<LedgerEntry> {
        let entries = self.entries.read().await;
        let mut matched: Vec<LedgerEntry> = entries
            .iter()
            .filter(|e| q.since.map(|s| e.timestamp >= s).unwrap_or(true))
            .filter(|e| q.until.map(|u| e.timestamp <= u).unwrap_or(true))
            .filter(|e| q.event_types.as_ref().map(|types| types.contains(&e.event_type)).unwrap_or(true))
            .filter(|e| {
                q.text_search
                    .as_ref()
                    .map(|needle| e.summary.contains(needle.as_str()))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if q.newest_first {
            matched.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        } else {
            matched.sort_by(|a, b| a.sequence.cmp(&b.sequence));
        }
        let limit = if q.limit == 0 { matched.len() } else { q.limit };
        matched.truncate(limit);
        matched
    }

    /// Groups entries into sessions by the session-boundary rule: a
    /// new session starts when the gap since the previous entry
    /// exceeds `session_timeout`, or the running session span exceeds
    /// `max_session_duration`.
    pub async fn compact(&self) -> Vec<CompactedLedgerEntry> {
        let entries = self.entries.read().await;
        let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
        sorted.sort_by_key(|e| e.sequence);

        let mut sessions: Vec<Vec<&LedgerEntry>> = Vec::new();
        for entry in sorted {
            let starts_new_session = match sessions.last() {
                None => true,
                Some(current) => {
                    let previous = current.last().expect("session groups are never empty");
                    let gap = entry.timestamp - previous.timestamp;
                    let span = entry.timestamp - current.first().unwrap().timestamp;
                    gap > self.session_timeout || span > self.max_session_duration
                }
            };
            if starts_new_session {
                sessions.push(vec![entry]);
            } else {
                sessions.last_mut().unwrap().push(entry);
            }
        }

        sessions.into_iter().map(|session| compact_session(&session)).collect()
    }

    /// Prunes raw entries older than `retention_days`, leaving their
    /// compacted summaries (if already compacted) untouched.
    pub async fn prune_expired(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        before - entries.len()
    }

    /// Canonical newline-delimited JSON export, in `sequence` order.
    pub async fn export_ndjson(&self) -> Result<String> {
        let entries = self.entries.read().await;
        let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
        sorted.sort_by_key(|e| e.sequence);
        let mut out = String::new();
        for entry in sorted {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Bulk-imports entries from a prior `export_ndjson`, preserving
    /// `sequence`. Rejected unless the ledger is empty or `restore` is
    /// set, since re-importing into a live ledger would otherwise
    /// collide with freshly assigned sequences.
    pub async fn import_ndjson(&self, data: &str, restore: bool) -> Result<usize> {
        let mut guard = self.entries.write().await;
        ensure!(restore || guard.is_empty(), "refusing to import into a populated ledger outside restore mode");
        let mut imported = 0usize;
        let mut max_sequence = 0u64;
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(line).context("parsing ledger export line")?;
            max_sequence = max_sequence.max(entry.sequence);
            guard.push_back(entry);
            imported += 1;
        }
        drop(guard);
        self.next_sequence.fetch_max(max_sequence + 1, Ordering::SeqCst);
        Ok(imported)
    }

    pub fn path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

fn compact_session(session: &[&LedgerEntry]) -> CompactedLedgerEntry {
    let mut impacted_files: Vec<FileId> = session.iter().flat_map(|e| e.impacted_files.clone()).collect();
    impacted_files.sort();
    impacted_files.dedup();
    let mut impacted_entities: Vec<EntityId> = session.iter().flat_map(|e| e.impacted_entities.clone()).collect();
    impacted_entities.sort();
    impacted_entities.dedup();

    let mut counts: Vec<(String, usize)> = Vec::new();
    for entry in session {
        if let Some(slot) = counts.iter_mut().find(|(t, _)| t == &entry.event_type) {
            slot.1 += 1;
        } else {
            counts.push((entry.event_type.clone(), 1));
        }
    }

    let session_id = session
        .first()
        .and_then(|e| e.session_id.clone())
        .unwrap_or_else(|| session.first().unwrap().id.clone());

    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    for file in &impacted_files {
        hasher.update(file.as_str().as_bytes());
    }
    for entity in &impacted_entities {
        hasher.update(entity.as_str().as_bytes());
    }
    for (event_type, count) in &counts {
        hasher.update(event_type.as_bytes());
        hasher.update(count.to_le_bytes());
    }
    let content_hash = hex::encode(hasher.finalize());

    CompactedLedgerEntry {
        session_id,
        started_at: session.first().unwrap().timestamp,
        ended_at: session.last().unwrap().timestamp,
        entry_count: session.len(),
        impacted_files,
        impacted_entities,
        event_type_counts: counts,
        content_hash,
    }
}

fn replay_log(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    loop {
        let mut magic_buf = [0u8; 4];
        match std::io::Read::read_exact(&mut reader, &mut magic_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let magic = u32::from_le_bytes(magic_buf);
        ensure!(magic == LOG_MAGIC, "corrupt change ledger log: bad frame magic");
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        let entry: LedgerEntry = serde_json::from_slice(&payload)?;
        entries.push(entry);
    }
    Ok(entries)
}

pub struct FilteredSubscription {
    inner: broadcast::Receiver<LedgerEntry>,
    filter: SubscriptionFilter,
}

impl FilteredSubscription {
    pub async fn recv(&mut self) -> Option<LedgerEntry> {
        loop {
            match self.inner.recv().await {
                Ok(entry) if self.filter.matches(&entry) => return Some(entry),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_is_strictly_increasing() {
        let ledger = ChangeLedger::in_memory();
        let a = ledger.append(NewLedgerEntry::new("index:file:added", "test", "a")).await.unwrap();
        let b = ledger.append(NewLedgerEntry::new("index:file:added", "test", "b")).await.unwrap();
        assert!(b.sequence > a.sequence);
    }

    #[tokio::test]
    async fn append_batch_preserves_order() {
        let ledger = ChangeLedger::in_memory();
        let batch = vec![
            NewLedgerEntry::new("index:file:added", "test", "a"),
            NewLedgerEntry::new("index:file:added", "test", "b"),
            NewLedgerEntry::new("index:file:added", "test", "c"),
        ];
        let committed = ledger.append_batch(batch).await.unwrap();
        assert!(committed[0].sequence < committed[1].sequence);
        assert!(committed[1].sequence < committed[2].sequence);
    }

    #[tokio::test]
    async fn subscription_filters_by_event_type() {
        let ledger = ChangeLedger::in_memory();
        let mut sub = ledger.subscribe(SubscriptionFilter {
            event_types: Some(vec!["index:file:modified".to_string()]),
            ..Default::default()
        });

        ledger.append(NewLedgerEntry::new("index:file:added", "test", "add")).await.unwrap();
        ledger.append(NewLedgerEntry::new("index:file:modified", "test", "m1")).await.unwrap();
        ledger.append(NewLedgerEntry::new("index:file:deleted", "test", "del")).await.unwrap();
        ledger.append(NewLedgerEntry::new("index:file:modified", "test", "m2")).await.unwrap();

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.summary, "m1");
        assert_eq!(second.summary, "m2");
    }

    #[tokio::test]
    async fn query_bounds_results_to_limit() {
        let ledger = ChangeLedger::in_memory();
        for i in 0..5 {
            ledger.append(NewLedgerEntry::new("x", "test", format!("e{i}"))).await.unwrap();
        }
        let results = ledger
            .query(LedgerQuery {
                limit: 2,
                ..Default::default()
            })
            .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn compaction_splits_sessions_on_timeout_gap() {
        let ledger = ChangeLedger::open(None, std::time::Duration::from_millis(1), std::time::Duration::from_secs(3600), 90).unwrap();
        ledger.append(NewLedgerEntry::new("x", "test", "first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        ledger.append(NewLedgerEntry::new("x", "test", "second")).await.unwrap();

        let sessions = ledger.compact().await;
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn export_then_import_reproduces_entries_in_order() {
        let ledger = ChangeLedger::in_memory();
        ledger.append(NewLedgerEntry::new("x", "test", "a")).await.unwrap();
        ledger.append(NewLedgerEntry::new("x", "test", "b")).await.unwrap();
        let exported = ledger.export_ndjson().await.unwrap();

        let restored = ChangeLedger::in_memory();
        let count = restored.import_ndjson(&exported, false).await.unwrap();
        assert_eq!(count, 2);
        let results = restored.query(LedgerQuery::default()).await;
        assert_eq!(results[0].summary, "a");
        assert_eq!(results[1].summary, "b");
    }

    #[tokio::test]
    async fn import_is_rejected_into_a_populated_ledger_outside_restore_mode() {
        let ledger = ChangeLedger::in_memory();
        ledger.append(NewLedgerEntry::new("x", "test", "a")).await.unwrap();
        let exported = ledger.export_ndjson().await.unwrap();
        assert!(ledger.import_ndjson(&exported, false).await.is_err());
    }

    #[tokio::test]
    async fn restart_recovers_sequence_from_persisted_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("ledger.log");

        let first = ChangeLedger::open(Some(&log_path), std::time::Duration::from_secs(1800), std::time::Duration::from_secs(28800), 90).unwrap();
        first.append(NewLedgerEntry::new("x", "test", "a")).await.unwrap();
        first.append(NewLedgerEntry::new("x", "test", "b")).await.unwrap();
        drop(first);

        let reopened = ChangeLedger::open(Some(&log_path), std::time::Duration::from_secs(1800), std::time::Duration::from_secs(28800), 90).unwrap();
        let next = reopened.append(NewLedgerEntry::new("x", "test", "c")).await.unwrap();
        assert_eq!(next.sequence, 3);
    }
}
