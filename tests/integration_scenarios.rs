//! End-to-end scenarios spanning extraction, incremental update, the
//! change ledger, and hybrid retrieval.

use codegraph_engine::graph::query::GraphQuery;
use codegraph_engine::graph::schema::{CallsEdge, EmbeddingRow, JustificationRow};
use codegraph_engine::graph::store::{GraphStore, InMemoryGraphStore, WriteBatch};
use codegraph_engine::{
    CancellationToken, ChangeLedger, FileChangeSet, HybridRetriever, Intent, IncrementalUpdater,
    LexicalIndexManager, NewLedgerEntry, StorageEngineKind, SubscriptionFilter,
};
use codegraph_engine::parsing::{Location, Parser, UceImportSpecifier, UceNode};
use codegraph_engine::types::{CallResolution, EntityId, FileId, GhostId, ValidatedPath, ValidatedSearchQuery};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn loc(line: u32) -> Location {
    Location { start_line: line, end_line: line, start_col: 0, end_col: 1 }
}

fn function_node(name: &str, signature: &str, line: u32) -> UceNode {
    UceNode::Function {
        name: name.to_string(),
        location: loc(line),
        signature: signature.to_string(),
        return_type: None,
        is_exported: true,
        is_async: false,
        is_static: false,
        param_count: 0,
        doc_comment: None,
        body_text: String::new(),
    }
}

fn call_node(callee_text: &str, line: u32) -> UceNode {
    UceNode::CallSite { caller_location: loc(line), callee_text: callee_text.to_string() }
}

fn import_node(source: &str) -> UceNode {
    import_node_with_symbols(source, &["x"])
}

fn import_node_with_symbols(source: &str, symbols: &[&str]) -> UceNode {
    UceNode::Import {
        source: source.to_string(),
        specifiers: symbols
            .iter()
            .map(|s| UceImportSpecifier { imported_name: s.to_string(), local_name: s.to_string() })
            .collect(),
        side_effect: false,
        type_only: false,
    }
}

fn file_node(path: &str, children: Vec<UceNode>) -> UceNode {
    UceNode::File { relative_path: path.to_string(), language: "typescript".into(), parse_error: false, children }
}

/// A parser whose trees are set up by the test rather than produced
/// from real source text — these scenarios exercise the extractor and
/// incremental updater, not a language grammar. Shared via `Arc` so
/// the test can keep mutating trees after the tree is handed to the
/// updater.
struct ScriptedParser {
    trees: Mutex<HashMap<String, UceNode>>,
}

impl ScriptedParser {
    fn new() -> Arc<Self> {
        Arc::new(Self { trees: Mutex::new(HashMap::new()) })
    }
}

trait ScriptedParserExt {
    fn set(&self, path: &str, tree: UceNode);
}

impl ScriptedParserExt for Arc<ScriptedParser> {
    fn set(&self, path: &str, tree: UceNode) {
        self.trees.lock().unwrap().insert(path.to_string(), tree);
    }
}

impl Parser for Arc<ScriptedParser> {
    fn parse(&self, relative_path: &str, _content: &str, _language: &str) -> UceNode {
        self.trees
            .lock()
            .unwrap()
            .get(relative_path)
            .cloned()
            .unwrap_or_else(|| file_node(relative_path, vec![]))
    }
}

fn write_project_file(root: &std::path::Path, relative: &str, content: &str) -> PathBuf {
    let full = root.join(relative);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full, content).unwrap();
    full
}

fn file_id_of(relative: &str) -> FileId {
    FileId::from_relative_path(&ValidatedPath::new(relative).unwrap())
}

/// Scenario 1 (§8): changing an exported function's signature changes
/// its content-derived id, and re-indexing the file as "modified"
/// leaves exactly one row behind rather than accumulating both.
#[tokio::test]
async fn modifying_a_function_signature_changes_its_entity_id() {
    let project = tempfile::tempdir().unwrap();
    let path = write_project_file(project.path(), "src/a.ts", "v1");

    let parser = ScriptedParser::new();
    parser.set("src/a.ts", file_node("src/a.ts", vec![function_node("run", "fn run()", 1)]));

    let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
    store.initialize(true).await.unwrap();
    let updater = IncrementalUpdater::new(store, parser.clone(), project.path());

    updater
        .apply(FileChangeSet { added: vec![path.clone()], modified: vec![], deleted: vec![] }, |_| {})
        .await
        .unwrap();

    let file_id = file_id_of("src/a.ts");
    let before = updater.store().query(GraphQuery::EntitiesInFile(file_id.clone())).await.unwrap();
    assert_eq!(before.functions.len(), 1);
    let old_id = before.functions[0].id.clone();

    // Content must actually change or the hash-unchanged fast path
    // skips re-extraction entirely.
    write_project_file(project.path(), "src/a.ts", "v2");
    parser.set("src/a.ts", file_node("src/a.ts", vec![function_node("run", "fn run(x: i32)", 1)]));

    updater
        .apply(FileChangeSet { added: vec![], modified: vec![path], deleted: vec![] }, |_| {})
        .await
        .unwrap();

    let after = updater.store().query(GraphQuery::EntitiesInFile(file_id)).await.unwrap();
    assert_eq!(after.functions.len(), 1, "the old signature's row must be gone, not accumulated");
    assert_ne!(after.functions[0].id, old_id);
}

/// Scenario 2 (§8): a function with the same name and signature in two
/// different files gets two distinct ids — the owning file is part of
/// the id's scope, so same-shaped code never collides across files.
#[tokio::test]
async fn same_named_function_in_different_files_gets_distinct_ids() {
    let project = tempfile::tempdir().unwrap();
    let a = write_project_file(project.path(), "src/a.ts", "a");
    let b = write_project_file(project.path(), "src/b.ts", "b");

    let parser = ScriptedParser::new();
    parser.set("src/a.ts", file_node("src/a.ts", vec![function_node("run", "fn run()", 1)]));
    parser.set("src/b.ts", file_node("src/b.ts", vec![function_node("run", "fn run()", 1)]));

    let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
    store.initialize(true).await.unwrap();
    let updater = IncrementalUpdater::new(store, parser, project.path());
    updater
        .apply(FileChangeSet { added: vec![a, b], modified: vec![], deleted: vec![] }, |_| {})
        .await
        .unwrap();

    let in_a = updater.store().query(GraphQuery::EntitiesInFile(file_id_of("src/a.ts"))).await.unwrap();
    let in_b = updater.store().query(GraphQuery::EntitiesInFile(file_id_of("src/b.ts"))).await.unwrap();
    assert_eq!(in_a.functions.len(), 1);
    assert_eq!(in_b.functions.len(), 1);
    assert_ne!(in_a.functions[0].id, in_b.functions[0].id);
}

/// Scenario 3 (§8): external imports get a deduped `GhostNode` keyed by
/// the full import source, not by package alone — two files importing
/// the very same source collapse to one ghost node, but two distinct
/// sources from the same package stay distinct.
#[tokio::test]
async fn external_import_ghosts_dedup_by_symbol_not_by_source() {
    let project = tempfile::tempdir().unwrap();
    let a = write_project_file(project.path(), "src/a.ts", "a");
    let b = write_project_file(project.path(), "src/b.ts", "b");

    let parser = ScriptedParser::new();
    parser.set("src/a.ts", file_node("src/a.ts", vec![import_node_with_symbols("react", &["useState"])]));
    parser.set("src/b.ts", file_node("src/b.ts", vec![import_node_with_symbols("react", &["useEffect"])]));

    let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
    store.initialize(true).await.unwrap();
    let updater = IncrementalUpdater::new(store, parser, project.path());
    updater
        .apply(FileChangeSet { added: vec![a, b], modified: vec![], deleted: vec![] }, |_| {})
        .await
        .unwrap();

    let react_ghosts = updater.store().query(GraphQuery::GhostsByPackage("react".into())).await.unwrap();
    let ids: std::collections::HashSet<_> = react_ghosts.ghost_nodes.iter().map(|g| g.id.clone()).collect();
    assert_eq!(ids.len(), 2, "one ghost per imported symbol, sharing one react package, not one per source");
    assert!(ids.contains(&GhostId::new("react", "useState")));
    assert!(ids.contains(&GhostId::new("react", "useEffect")));
    assert!(react_ghosts.ghost_nodes.iter().all(|g| g.package_name == "react"));
}

/// Scenario 4 (§8): a call left unresolved because its target wasn't
/// indexed yet upgrades to `Exact` once that target lands, without
/// re-touching the caller's file.
#[tokio::test]
async fn unresolved_call_upgrades_once_its_target_is_indexed() {
    let project = tempfile::tempdir().unwrap();
    let a = write_project_file(project.path(), "src/a.ts", "a");

    let parser = ScriptedParser::new();
    parser.set("src/a.ts", file_node("src/a.ts", vec![call_node("bar()", 1)]));

    let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
    store.initialize(true).await.unwrap();
    let updater = IncrementalUpdater::new(store, parser.clone(), project.path());
    updater
        .apply(FileChangeSet { added: vec![a], modified: vec![], deleted: vec![] }, |_| {})
        .await
        .unwrap();

    let unresolved = updater.store().query(GraphQuery::UnresolvedCalls).await.unwrap();
    assert_eq!(unresolved.calls.len(), 1);
    assert_eq!(unresolved.calls[0].resolution, CallResolution::Unresolved);

    let b = write_project_file(project.path(), "src/b.ts", "b");
    parser.set("src/b.ts", file_node("src/b.ts", vec![function_node("bar", "fn bar()", 1)]));
    updater
        .apply(FileChangeSet { added: vec![b], modified: vec![], deleted: vec![] }, |_| {})
        .await
        .unwrap();

    let resolved = updater.store().query(GraphQuery::UnresolvedCalls).await.unwrap();
    assert!(resolved.calls.is_empty(), "the call must no longer show up as unresolved");

    let bar_in_b = updater.store().query(GraphQuery::EntitiesInFile(file_id_of("src/b.ts"))).await.unwrap();
    let bar_id = bar_in_b.functions[0].id.clone();
    let callers_of_bar = updater.store().query(GraphQuery::CallersOf(bar_id)).await.unwrap();
    assert_eq!(callers_of_bar.calls.len(), 1);
    assert_eq!(callers_of_bar.calls[0].resolution, CallResolution::Exact);
}

/// Scenario 5 (§8): a subscription filtered to one event type receives
/// exactly the matching entries, in append order, and nothing else.
#[tokio::test]
async fn ledger_subscription_filters_to_the_requested_event_type() {
    let ledger = ChangeLedger::in_memory();
    let mut subscription = ledger.subscribe(SubscriptionFilter {
        event_types: Some(vec!["index:file:modified".to_string()]),
        ..Default::default()
    });

    ledger
        .append(NewLedgerEntry::new("index:file:modified", "watcher", "modified a.ts"))
        .await
        .unwrap();
    ledger
        .append(NewLedgerEntry::new("index:file:deleted", "watcher", "deleted c.ts"))
        .await
        .unwrap();
    ledger
        .append(NewLedgerEntry::new("index:file:modified", "watcher", "modified b.ts"))
        .await
        .unwrap();

    let first = subscription.recv().await.unwrap();
    let second = subscription.recv().await.unwrap();
    assert_eq!(first.summary, "modified a.ts");
    assert_eq!(second.summary, "modified b.ts");

    let none = tokio::time::timeout(std::time::Duration::from_millis(50), subscription.recv()).await;
    assert!(none.is_err(), "no third matching event should arrive");
}

/// Scenario 6 (§8): a call-graph-intent query fans out to the graph
/// source and a semantic query (with an embedding supplied) fans out
/// to the vector source — different intents genuinely engage
/// different backends, not just different weights on the same hits.
#[tokio::test]
async fn fusion_weighting_routes_different_intents_to_different_sources() {
    let callee = EntityId::new("callee".to_string());
    let caller = EntityId::new("caller".to_string());
    let embedded = EntityId::new("embedded".to_string());

    let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
    store.initialize(true).await.unwrap();

    let mut batch = WriteBatch::default();
    batch.calls.push(CallsEdge {
        caller_id: caller,
        callee_id: Some(callee.clone()),
        callee_text: "target()".into(),
        call_site_line: 1,
        resolution: CallResolution::Exact,
    });
    batch.embeddings.push(EmbeddingRow { entity_id: embedded, vector: vec![1.0, 0.0, 0.0] });
    store.write_batch(batch).await.unwrap();

    let lexical = LexicalIndexManager::new(
        0,
        project_tempdir_path(),
        PathBuf::from("."),
        std::time::Duration::from_millis(10),
        std::time::Duration::from_secs(30),
    );
    let retriever = HybridRetriever::new(store, lexical);
    let cancellation = CancellationToken::new();

    let graph_query = ValidatedSearchQuery::new(format!("who calls \"{}\"", callee.as_str())).unwrap();
    let graph_response = retriever.retrieve(&graph_query, None, &cancellation, false).await.unwrap();
    assert_eq!(graph_response.intent, Intent::CallGraph);
    assert!(graph_response.hits.iter().any(|h| h.sources.contains(&"graph")));

    let semantic_query = ValidatedSearchQuery::new("how does this component behave").unwrap();
    let semantic_response = retriever
        .retrieve(&semantic_query, Some(&[1.0, 0.0, 0.0]), &cancellation, false)
        .await
        .unwrap();
    assert_eq!(semantic_response.intent, Intent::Semantic);
    assert!(semantic_response.hits.iter().any(|h| h.sources.contains(&"vector")));
    assert!(!semantic_response.hits.iter().any(|h| h.sources.contains(&"graph")));
}

/// Justification lookup (C8, §4.8): a graph hit whose entity carries a
/// `JustificationRow` gets `purpose_summary` filled in; a hit with no
/// justification on record keeps it `None`.
#[tokio::test]
async fn graph_hits_pick_up_justification_summary_when_present() {
    let callee = EntityId::new("callee".to_string());
    let caller = EntityId::new("caller".to_string());

    let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
    store.initialize(true).await.unwrap();

    let mut batch = WriteBatch::default();
    batch.calls.push(CallsEdge {
        caller_id: caller.clone(),
        callee_id: Some(callee.clone()),
        callee_text: "target()".into(),
        call_site_line: 1,
        resolution: CallResolution::Exact,
    });
    batch.justifications.push(JustificationRow {
        entity_id: caller.clone(),
        purpose_summary: "dispatches outbound webhook retries".into(),
        confidence: 0.9,
    });
    store.write_batch(batch).await.unwrap();

    let lexical = LexicalIndexManager::new(
        0,
        project_tempdir_path(),
        PathBuf::from("."),
        std::time::Duration::from_millis(10),
        std::time::Duration::from_secs(30),
    );
    let retriever = HybridRetriever::new(store, lexical);
    let cancellation = CancellationToken::new();

    let query = ValidatedSearchQuery::new(format!("who calls \"{}\"", callee.as_str())).unwrap();
    let response = retriever.retrieve(&query, None, &cancellation, false).await.unwrap();

    let hit = response
        .hits
        .iter()
        .find(|h| h.entity_id.as_ref() == Some(&caller))
        .expect("caller hit present");
    assert_eq!(hit.purpose_summary.as_deref(), Some("dispatches outbound webhook retries"));
}

fn project_tempdir_path() -> PathBuf {
    // The lexical index manager never starts a subprocess in these
    // tests; this directory only needs to exist as a value, not on disk.
    PathBuf::from(std::env::temp_dir()).join("codegraph-engine-tests-lexical")
}
