// The Graph Store contract (C1, §4.1): a small, uniform surface over an
// ordered, transactional, datalog-style relational/graph database with
// vector similarity search and schema migrations.

use super::migrations;
use super::query::{GraphQuery, QueryRows};
use super::schema::*;
use super::vector_index::{VectorHit, VectorIndex};
use crate::config::StorageEngineKind;
use crate::types::{EntityId, FileId, GhostId};
use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A grouped set of row insert/upsert operations and relation-scoped
/// deletes, committed together or not at all (§4.1 `write_batch`).
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    pub files: Vec<FileRow>,
    pub functions: Vec<FunctionRow>,
    pub classes: Vec<ClassRow>,
    pub interfaces: Vec<InterfaceRow>,
    pub type_aliases: Vec<TypeAliasRow>,
    pub variables: Vec<VariableRow>,
    pub ghost_nodes: Vec<GhostNodeRow>,
    pub contains: Vec<ContainsEdge>,
    pub calls: Vec<CallsEdge>,
    pub imports: Vec<ImportsEdge>,
    pub references_external: Vec<ReferencesExternalEdge>,
    pub typed_inheritance: Vec<TypedInheritanceEdge>,
    pub embeddings: Vec<EmbeddingRow>,
    pub justifications: Vec<JustificationRow>,
    /// Entity ids (any non-edge relation) to remove before the inserts
    /// above are applied, keyed by the owning file.
    pub delete_file: Option<FileId>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.interfaces.is_empty()
            && self.type_aliases.is_empty()
            && self.variables.is_empty()
            && self.ghost_nodes.is_empty()
            && self.contains.is_empty()
            && self.calls.is_empty()
            && self.imports.is_empty()
            && self.references_external.is_empty()
            && self.typed_inheritance.is_empty()
            && self.embeddings.is_empty()
            && self.justifications.is_empty()
            && self.delete_file.is_none()
    }
}

/// The uniform surface every storage engine exposes (§4.1).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn initialize(&mut self, run_migrations: bool) -> Result<()>;
    /// Returns the count of rows removed by `batch.delete_file`, if set.
    async fn write_batch(&self, batch: WriteBatch) -> Result<usize>;
    async fn query(&self, script: GraphQuery) -> Result<QueryRows>;
    async fn execute(&self, script: GraphQuery) -> Result<()>;
    async fn vector_search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;
    /// Full scans for the pattern registry (C10), which reasons over
    /// the whole graph rather than a single file or entity.
    async fn all_classes(&self) -> Result<Vec<ClassRow>>;
    async fn all_functions(&self) -> Result<Vec<FunctionRow>>;
    /// Pass 2 of call resolution (§4.3): upgrades `CallsEdge` rows in
    /// place, matched by `(caller_id, callee_text, call_site_line)`,
    /// to a resolved `callee_id`/`resolution`. Rows with no match are
    /// left untouched.
    async fn upgrade_calls(&self, resolved: Vec<CallsEdge>) -> Result<usize>;
    fn has_schema(&self) -> bool;
    fn schema_version(&self) -> u32;
}

/// In-memory engine: the default and the engine used by tests. Tables
/// are `DashMap`s so reads never block behind other readers; all writes
/// serialize through `commit_lock`, giving §5's "writers serialize,
/// readers observe a snapshot at most as stale as the latest commit".
pub struct InMemoryGraphStore {
    pub(crate) files: DashMap<FileId, FileRow>,
    pub(crate) functions: DashMap<EntityId, FunctionRow>,
    pub(crate) classes: DashMap<EntityId, ClassRow>,
    pub(crate) interfaces: DashMap<EntityId, InterfaceRow>,
    pub(crate) type_aliases: DashMap<EntityId, TypeAliasRow>,
    pub(crate) variables: DashMap<EntityId, VariableRow>,
    pub(crate) ghost_nodes: DashMap<GhostId, GhostNodeRow>,
    pub(crate) contains: DashMap<EntityId, ContainsEdge>,
    /// Keyed by a synthetic row id since multiple `CALLS` edges can
    /// share a caller.
    pub(crate) calls: DashMap<u64, CallsEdge>,
    pub(crate) imports: DashMap<(FileId, FileId), ImportsEdge>,
    pub(crate) references_external: DashMap<(EntityId, GhostId), ReferencesExternalEdge>,
    pub(crate) typed_inheritance: DashMap<u64, TypedInheritanceEdge>,
    pub(crate) embeddings: DashMap<EntityId, Vec<f32>>,
    pub(crate) justifications: DashMap<EntityId, JustificationRow>,
    pub(crate) vector_index: Mutex<VectorIndex>,
    pub(crate) next_row_id: std::sync::atomic::AtomicU64,
    pub(crate) applied_migrations: DashMap<u32, String>,
    schema_version: AtomicU32,
    commit_lock: tokio::sync::Mutex<()>,
    engine_kind: StorageEngineKind,
}

impl InMemoryGraphStore {
    pub fn new(engine_kind: StorageEngineKind) -> Self {
        Self {
            files: DashMap::new(),
            functions: DashMap::new(),
            classes: DashMap::new(),
            interfaces: DashMap::new(),
            type_aliases: DashMap::new(),
            variables: DashMap::new(),
            ghost_nodes: DashMap::new(),
            contains: DashMap::new(),
            calls: DashMap::new(),
            imports: DashMap::new(),
            references_external: DashMap::new(),
            typed_inheritance: DashMap::new(),
            embeddings: DashMap::new(),
            justifications: DashMap::new(),
            vector_index: Mutex::new(VectorIndex::new()),
            next_row_id: std::sync::atomic::AtomicU64::new(1),
            applied_migrations: DashMap::new(),
            schema_version: AtomicU32::new(0),
            commit_lock: tokio::sync::Mutex::new(()),
            engine_kind,
        }
    }

    pub(crate) fn record_migration(&self, version: u32, name: &str) {
        self.applied_migrations.insert(version, name.to_string());
        self.schema_version.store(version, Ordering::SeqCst);
    }

    fn next_id(&self) -> u64 {
        self.next_row_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Delete every row owned by `file_id`: entities, outgoing/incoming
    /// edges, then (last) the File row itself. Returns the count of rows
    /// removed, for the ledger and for `write_file`'s `deleted_count`.
    /// Safe to call on a file with no entities — it is then a no-op past
    /// removing the (possibly absent) File row.
    pub fn delete_file_rows(&self, file_id: &FileId) -> usize {
        let mut deleted = 0usize;
        let owned_entities: Vec<EntityId> = self
            .functions
            .iter()
            .filter(|e| &e.file_id == file_id)
            .map(|e| e.id.clone())
            .chain(self.classes.iter().filter(|e| &e.file_id == file_id).map(|e| e.id.clone()))
            .chain(self.interfaces.iter().filter(|e| &e.file_id == file_id).map(|e| e.id.clone()))
            .chain(self.type_aliases.iter().filter(|e| &e.file_id == file_id).map(|e| e.id.clone()))
            .chain(self.variables.iter().filter(|e| &e.file_id == file_id).map(|e| e.id.clone()))
            .collect();

        for id in &owned_entities {
            if self.functions.remove(id).is_some() {
                deleted += 1;
            }
            if self.classes.remove(id).is_some() {
                deleted += 1;
            }
            if self.interfaces.remove(id).is_some() {
                deleted += 1;
            }
            if self.type_aliases.remove(id).is_some() {
                deleted += 1;
            }
            if self.variables.remove(id).is_some() {
                deleted += 1;
            }
            if self.contains.remove(id).is_some() {
                deleted += 1;
            }
            self.embeddings.remove(id);
            self.vector_index.lock().remove(id);
            self.justifications.remove(id);
        }

        let owned: std::collections::HashSet<EntityId> = owned_entities.into_iter().collect();
        self.calls.retain(|_, edge| {
            let drop = owned.contains(&edge.caller_id)
                || edge.callee_id.as_ref().is_some_and(|c| owned.contains(c));
            if drop {
                deleted += 1;
            }
            !drop
        });
        self.typed_inheritance.retain(|_, edge| {
            let drop = owned.contains(&edge.from_id);
            if drop {
                deleted += 1;
            }
            !drop
        });
        self.references_external.retain(|(eid, _), _| {
            let drop = owned.contains(eid);
            if drop {
                deleted += 1;
            }
            !drop
        });
        self.imports.retain(|(from, to), _| {
            let drop = from == file_id || to == file_id;
            if drop {
                deleted += 1;
            }
            !drop
        });

        if self.files.remove(file_id).is_some() {
            deleted += 1;
        }
        deleted
    }

    fn apply_batch_unlocked(&self, batch: WriteBatch) -> Result<usize> {
        let mut deleted = 0usize;
        if let Some(file_id) = &batch.delete_file {
            deleted += self.delete_file_rows(file_id);
        }

        for row in batch.files {
            self.files.insert(row.id.clone(), row);
        }
        for row in batch.functions {
            self.functions.insert(row.id.clone(), row);
        }
        for row in batch.classes {
            self.classes.insert(row.id.clone(), row);
        }
        for row in batch.interfaces {
            self.interfaces.insert(row.id.clone(), row);
        }
        for row in batch.type_aliases {
            self.type_aliases.insert(row.id.clone(), row);
        }
        for row in batch.variables {
            self.variables.insert(row.id.clone(), row);
        }
        // Invariant 4: ghost nodes exist before any edge referencing them.
        for row in batch.ghost_nodes {
            self.ghost_nodes.insert(row.id.clone(), row);
        }
        for edge in batch.contains {
            self.contains.insert(edge.entity_id.clone(), edge);
        }
        for edge in batch.calls {
            self.calls.insert(self.next_id(), edge);
        }
        for edge in batch.imports {
            self.imports.insert((edge.from_file.clone(), edge.to_file.clone()), edge);
        }
        for edge in batch.references_external {
            if !self.ghost_nodes.contains_key(&edge.ghost_id) {
                bail!(
                    "REFERENCES_EXTERNAL edge for {} points at unknown ghost {}",
                    edge.entity_id,
                    edge.ghost_id
                );
            }
            self.references_external
                .insert((edge.entity_id.clone(), edge.ghost_id.clone()), edge);
        }
        for edge in batch.typed_inheritance {
            self.typed_inheritance.insert(self.next_id(), edge);
        }
        for row in batch.embeddings {
            self.vector_index.lock().upsert(row.entity_id.clone(), row.vector.clone());
            self.embeddings.insert(row.entity_id, row.vector);
        }
        for row in batch.justifications {
            self.justifications.insert(row.entity_id.clone(), row);
        }
        Ok(deleted)
    }

    /// Run `f` under the single commit lock, auto-committing the staged
    /// batch on `Ok` and discarding it on `Err`. Nested transactions are
    /// not supported (§4.1) — the lock is held for the whole closure.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(TxHandle<'_>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let _guard = self.commit_lock.lock().await;
        let staged = Arc::new(Mutex::new(WriteBatch::default()));
        let tx = TxHandle {
            store: self,
            staged: staged.clone(),
        };
        let result = f(tx).await;
        match result {
            Ok(value) => {
                let batch = std::mem::take(&mut *staged.lock());
                self.apply_batch_unlocked(batch)?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}

/// A transaction-scoped handle. Reads observe the committed snapshot
/// (not this transaction's own pending writes) — the simplification is
/// deliberate: the store has no nested-transaction visibility rules to
/// honor (§4.1 explicitly forbids nesting), so read-your-own-writes
/// within one transaction is out of scope.
pub struct TxHandle<'a> {
    store: &'a InMemoryGraphStore,
    staged: Arc<Mutex<WriteBatch>>,
}

impl<'a> TxHandle<'a> {
    pub fn stage(&self, batch: WriteBatch) {
        let mut staged = self.staged.lock();
        merge_batch(&mut staged, batch);
    }

    pub async fn query(&self, script: GraphQuery) -> Result<QueryRows> {
        super::query::execute(self.store, script)
    }
}

fn merge_batch(into: &mut WriteBatch, mut from: WriteBatch) {
    into.files.append(&mut from.files);
    into.functions.append(&mut from.functions);
    into.classes.append(&mut from.classes);
    into.interfaces.append(&mut from.interfaces);
    into.type_aliases.append(&mut from.type_aliases);
    into.variables.append(&mut from.variables);
    into.ghost_nodes.append(&mut from.ghost_nodes);
    into.contains.append(&mut from.contains);
    into.calls.append(&mut from.calls);
    into.imports.append(&mut from.imports);
    into.references_external.append(&mut from.references_external);
    into.typed_inheritance.append(&mut from.typed_inheritance);
    into.embeddings.append(&mut from.embeddings);
    into.justifications.append(&mut from.justifications);
    if from.delete_file.is_some() {
        into.delete_file = from.delete_file;
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn initialize(&mut self, run_migrations: bool) -> Result<()> {
        let current = self.schema_version.load(Ordering::SeqCst);
        let new_version = migrations::run_pending(self, current, run_migrations).await?;
        self.schema_version.store(new_version, Ordering::SeqCst);
        Ok(())
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<usize> {
        let _guard = self.commit_lock.lock().await;
        self.apply_batch_unlocked(batch)
    }

    async fn query(&self, script: GraphQuery) -> Result<QueryRows> {
        super::query::execute(self, script)
    }

    async fn execute(&self, script: GraphQuery) -> Result<()> {
        super::query::execute(self, script).map(|_| ())
    }

    async fn vector_search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        Ok(self.vector_index.lock().search(vector, k))
    }

    async fn all_classes(&self) -> Result<Vec<ClassRow>> {
        Ok(self.classes.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn all_functions(&self) -> Result<Vec<FunctionRow>> {
        Ok(self.functions.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn upgrade_calls(&self, resolved: Vec<CallsEdge>) -> Result<usize> {
        let _guard = self.commit_lock.lock().await;
        let mut upgraded = 0usize;
        for new_edge in resolved {
            let mut target_row_id = None;
            for entry in self.calls.iter() {
                let existing = entry.value();
                if existing.caller_id == new_edge.caller_id
                    && existing.callee_text == new_edge.callee_text
                    && existing.call_site_line == new_edge.call_site_line
                {
                    target_row_id = Some(*entry.key());
                    break;
                }
            }
            if let Some(row_id) = target_row_id {
                self.calls.insert(row_id, new_edge);
                upgraded += 1;
            }
        }
        Ok(upgraded)
    }

    fn has_schema(&self) -> bool {
        self.schema_version.load(Ordering::SeqCst) > 0
    }

    fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::SeqCst)
    }
}

/// Construct a store for the configured engine kind. `EmbeddedKv` and
/// `EmbeddedSql` are named by the config surface (§6) but not backed by
/// a concrete implementation in this crate; see DESIGN.md for the
/// rationale. Opening one of those fails fast rather than silently
/// falling back to memory.
pub fn open(engine_kind: StorageEngineKind, _path: &Path) -> Result<InMemoryGraphStore> {
    match engine_kind {
        StorageEngineKind::InMemory => Ok(InMemoryGraphStore::new(engine_kind)),
        StorageEngineKind::EmbeddedKv | StorageEngineKind::EmbeddedSql => {
            bail!("engine kind {engine_kind:?} has no backing implementation in this build")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentHash, ValidatedPath};

    fn sample_file(name: &str) -> FileRow {
        let path = ValidatedPath::new(name).unwrap();
        FileRow {
            id: FileId::from_relative_path(&path),
            relative_path: path.as_str().to_string(),
            basename: name.to_string(),
            ext: "ts".into(),
            content_hash: ContentHash::of(name.as_bytes()),
            size: 10,
            last_modified: 0,
            language: "typescript".into(),
            framework: None,
            parse_error: false,
        }
    }

    #[tokio::test]
    async fn initialize_runs_migrations_to_current_version() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();
        assert!(store.has_schema());
        assert_eq!(store.schema_version(), migrations::CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn readonly_initialize_fails_on_version_mismatch() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        let err = store.initialize(false).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn write_batch_is_atomic_and_deleting_a_file_removes_its_rows() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();

        let file = sample_file("a.ts");
        let mut batch = WriteBatch::default();
        batch.files.push(file.clone());
        store.write_batch(batch).await.unwrap();
        assert!(store.files.contains_key(&file.id));

        let mut delete_batch = WriteBatch::default();
        delete_batch.delete_file = Some(file.id.clone());
        let deleted = store.apply_batch_unlocked(delete_batch).unwrap();
        assert_eq!(deleted, 1);
        assert!(!store.files.contains_key(&file.id));
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();
        let file = sample_file("a.ts");

        let result: Result<()> = store
            .transaction(|tx| {
                let file = file.clone();
                async move {
                    let mut batch = WriteBatch::default();
                    batch.files.push(file);
                    tx.stage(batch);
                    bail!("simulated failure")
                }
            })
            .await;

        assert!(result.is_err());
        assert!(store.files.is_empty());
    }

    #[tokio::test]
    async fn transaction_commits_on_success() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();
        let file = sample_file("a.ts");
        let file_id = file.id.clone();

        store
            .transaction(|tx| {
                let file = file.clone();
                async move {
                    let mut batch = WriteBatch::default();
                    batch.files.push(file);
                    tx.stage(batch);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert!(store.files.contains_key(&file_id));
    }

    #[tokio::test]
    async fn vector_search_returns_nearest_first() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();
        let mut batch = WriteBatch::default();
        batch.embeddings.push(EmbeddingRow {
            entity_id: EntityId::new("near".into()),
            vector: vec![0.0, 0.0],
        });
        batch.embeddings.push(EmbeddingRow {
            entity_id: EntityId::new("far".into()),
            vector: vec![9.0, 9.0],
        });
        store.write_batch(batch).await.unwrap();

        let hits = store.vector_search(&[0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].id.as_str(), "near");
    }

    #[tokio::test]
    async fn references_external_requires_ghost_node_first() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();

        let mut bad_batch = WriteBatch::default();
        bad_batch.references_external.push(ReferencesExternalEdge {
            entity_id: EntityId::new("e".into()),
            ghost_id: GhostId::new("react", "useState"),
            usage_count: 1,
        });
        assert!(store.write_batch(bad_batch).await.is_err());

        let mut good_batch = WriteBatch::default();
        good_batch.ghost_nodes.push(GhostNodeRow {
            id: GhostId::new("react", "useState"),
            name: "useState".into(),
            package_name: "react".into(),
            entity_type: "function".into(),
            signature: None,
            is_external: true,
        });
        good_batch.references_external.push(ReferencesExternalEdge {
            entity_id: EntityId::new("e".into()),
            ghost_id: GhostId::new("react", "useState"),
            usage_count: 1,
        });
        store.write_batch(good_batch).await.unwrap();
    }
}
