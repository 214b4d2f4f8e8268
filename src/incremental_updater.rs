//! Incremental Updater (C5): applies a `FileChangeSet` against the
//! graph store — content-hash dedup, parse + extract + write per file,
//! a cross-file call-resolution fixup pass, and progress events.

use crate::extractor::{calls::ResolutionContext, EntityExtractor, ExtractionResult};
use crate::graph::schema::FileRow;
use crate::graph::store::GraphStore;
use crate::graph_writer::{self, FileWriteResult, WriteOutcome};
use crate::parsing::Parser;
use crate::types::{ContentHash, FileId, ValidatedPath};
use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct FileChangeSet {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl FileChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Start { total: usize },
    Progress { processed: usize, total: usize, current_file: String },
    FileDone { relative_path: String },
    FileError { relative_path: String, error: String },
    Complete { processed: usize, failed: usize },
}

pub struct IncrementalUpdater<S: GraphStore, P: Parser> {
    store: S,
    parser: P,
    extractor: EntityExtractor,
    project_root: PathBuf,
}

impl<S: GraphStore, P: Parser> IncrementalUpdater<S, P> {
    pub fn new(store: S, parser: P, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            store,
            parser,
            extractor: EntityExtractor::new(project_root.clone()),
            project_root,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies `changes`, emitting progress events via `on_event`.
    /// Idempotent: an empty change set is a no-op, and re-applying the
    /// same change set twice yields identical graph contents since IDs
    /// are content-derived.
    pub async fn apply(
        &self,
        changes: FileChangeSet,
        mut on_event: impl FnMut(ProgressEvent),
    ) -> Result<Vec<FileWriteResult>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let total = changes.added.len() + changes.modified.len() + changes.deleted.len();
        on_event(ProgressEvent::Start { total });

        let mut results = Vec::new();
        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut any_writes = false;

        for path in &changes.deleted {
            let relative = self.relative_path(path);
            if let Ok(file_id) = self.file_id_for(path) {
                let mut batch = crate::graph::store::WriteBatch::default();
                batch.delete_file = Some(file_id);
                let _ = self.store.write_batch(batch).await;
            }
            processed += 1;
            on_event(ProgressEvent::Progress { processed, total, current_file: relative.clone() });
            on_event(ProgressEvent::FileDone { relative_path: relative });
        }

        for path in changes.added.iter().chain(changes.modified.iter()) {
            let relative = self.relative_path(path);
            on_event(ProgressEvent::Progress {
                processed,
                total,
                current_file: relative.clone(),
            });

            match self.extract_if_changed(path).await {
                Ok(Some(extraction)) => {
                    any_writes = true;
                    let write_result = graph_writer::write_file(&self.store, extraction).await;
                    match &write_result.outcome {
                        WriteOutcome::Written { .. } => on_event(ProgressEvent::FileDone {
                            relative_path: relative.clone(),
                        }),
                        WriteOutcome::Failed { error } => {
                            failed += 1;
                            on_event(ProgressEvent::FileError {
                                relative_path: relative.clone(),
                                error: error.clone(),
                            });
                        }
                    }
                    results.push(write_result);
                }
                Ok(None) => {
                    // Content hash unchanged — skip re-extraction entirely.
                    on_event(ProgressEvent::FileDone { relative_path: relative.clone() });
                }
                Err(e) => {
                    failed += 1;
                    on_event(ProgressEvent::FileError {
                        relative_path: relative.clone(),
                        error: e.to_string(),
                    });
                }
            }
            processed += 1;
        }

        if any_writes || !changes.deleted.is_empty() {
            self.fixup_unresolved_calls().await?;
        }

        on_event(ProgressEvent::Complete { processed, failed });
        Ok(results)
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    fn file_id_for(&self, path: &Path) -> Result<FileId> {
        let relative = self.relative_path(path);
        let validated = ValidatedPath::new(relative)?;
        Ok(FileId::from_relative_path(&validated))
    }

    /// Reads and hashes the file; returns `None` if the stored content
    /// hash already matches (a true no-op re-index), otherwise parses
    /// and extracts.
    async fn extract_if_changed(&self, path: &Path) -> Result<Option<ExtractionResult>> {
        let content = tokio::fs::read_to_string(path).await?;
        let hash = ContentHash::of(content.as_bytes());
        let relative = self.relative_path(path);
        let validated = ValidatedPath::new(&relative)?;
        let file_id = FileId::from_relative_path(&validated);

        let existing = self
            .store
            .query(crate::graph::query::GraphQuery::FileByPath(relative.clone()))
            .await?;
        if let Some(existing_file) = existing.files.first() {
            if existing_file.content_hash == hash {
                return Ok(None);
            }
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let language = crate::parsing::language_for_extension(ext).unwrap_or("unknown");
        let uce = self.parser.parse(&relative, &content, language);

        let file_row = FileRow {
            id: file_id,
            relative_path: relative.clone(),
            basename: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            ext: ext.to_string(),
            content_hash: hash,
            size: content.len() as u64,
            last_modified: 0,
            language: language.to_string(),
            framework: None,
            parse_error: matches!(&uce, crate::parsing::UceNode::File { parse_error: true, .. }),
        };

        Ok(Some(self.extractor.extract(file_row, &uce)))
    }

    /// Pass 2 (§4.3): re-resolves every currently-unresolved `CallsEdge`
    /// in the store (not just the ones touched by this batch — a call
    /// left unresolved because its target file hadn't been indexed yet
    /// becomes resolvable once that file lands) against a same-file,
    /// imported-symbol, and cross-file-export scope built from the
    /// store's current contents, then upgrades the matching rows.
    async fn fixup_unresolved_calls(&self) -> Result<()> {
        let unresolved_rows = self.store.query(crate::graph::query::GraphQuery::UnresolvedCalls).await?.calls;
        if unresolved_rows.is_empty() {
            return Ok(());
        }

        let ctx = self.build_resolution_context(&unresolved_rows).await?;
        let mut calls = unresolved_rows;
        crate::extractor::calls::resolve_batch(&mut calls, &ctx);
        self.store.upgrade_calls(calls).await?;
        Ok(())
    }

    async fn build_resolution_context(&self, unresolved: &[crate::graph::schema::CallsEdge]) -> Result<ResolutionContext> {
        use crate::graph::query::GraphQuery;
        use std::collections::HashMap;

        let functions = self.store.all_functions().await?;

        // Per-file name -> id, and per-function id -> owning file string.
        let mut functions_by_file: HashMap<String, HashMap<String, crate::types::EntityId>> = HashMap::new();
        let mut file_of_function: HashMap<crate::types::EntityId, String> = HashMap::new();
        for function in &functions {
            functions_by_file
                .entry(function.file_id.as_str().to_string())
                .or_default()
                .insert(function.name.clone(), function.id.clone());
            file_of_function.insert(function.id.clone(), function.file_id.as_str().to_string());
        }

        let callers: std::collections::HashSet<crate::types::EntityId> =
            unresolved.iter().map(|edge| edge.caller_id.clone()).collect();

        let mut ctx = ResolutionContext::default();
        for caller_id in callers {
            // A top-level call site's caller_id is the file's own id
            // (see extractor::mod's CallSite handling); otherwise the
            // caller is a function row and owns a file_id of its own.
            let caller_file = file_of_function
                .get(&caller_id)
                .cloned()
                .unwrap_or_else(|| caller_id.as_str().to_string());

            if let Some(scope) = functions_by_file.get(&caller_file) {
                ctx.same_file_functions.insert(caller_id.clone(), scope.clone());
            }

            let imported = self
                .store
                .query(GraphQuery::ImportedBy(FileId::from_raw(caller_file)))
                .await?
                .imports;
            let mut imported_scope = HashMap::new();
            for edge in imported {
                if let Some(exports) = functions_by_file.get(edge.to_file.as_str()) {
                    for (name, id) in exports {
                        imported_scope.insert(name.clone(), id.clone());
                    }
                }
            }
            if !imported_scope.is_empty() {
                ctx.imported_symbols.insert(caller_id, imported_scope);
            }
        }

        for function in &functions {
            if function.is_exported {
                ctx.exported_symbols.entry(function.name.clone()).or_default().push(function.id.clone());
            }
        }

        Ok(ctx)
    }
}
