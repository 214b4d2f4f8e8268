//! Graph Writer (C4): atomic per-file write with delete-then-insert
//! ordering and per-file error isolation across a batch.

use crate::extractor::ExtractionResult;
use crate::graph::store::GraphStore;
use crate::types::FileId;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { deleted_count: usize },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct FileWriteResult {
    pub file_id: FileId,
    pub outcome: WriteOutcome,
}

/// Writes one file's extraction result under a single transaction:
/// delete the file's prior rows (if any), insert the new File row,
/// entities, self-contained edges, and any ghost nodes edges reference.
/// Any failure rolls the whole thing back.
pub async fn write_file<S: GraphStore>(store: &S, extraction: ExtractionResult) -> FileWriteResult {
    let Some(file_id) = extraction.batch.files.first().map(|f| f.id.clone()) else {
        return FileWriteResult {
            file_id: FileId::from_relative_path(&crate::types::ValidatedPath::new("unknown").unwrap()),
            outcome: WriteOutcome::Failed {
                error: "extraction result carried no File row".to_string(),
            },
        };
    };

    let mut batch = extraction.batch;
    batch.delete_file = Some(file_id.clone());

    match store.write_batch(batch).await {
        Ok(deleted_count) => FileWriteResult {
            file_id,
            outcome: WriteOutcome::Written { deleted_count },
        },
        Err(e) => FileWriteResult {
            file_id,
            outcome: WriteOutcome::Failed { error: e.to_string() },
        },
    }
}

/// Sequentially writes every extraction, continuing past individual
/// failures and returning one outcome per input (§4.4).
pub async fn write_files<S: GraphStore>(
    store: &S,
    extractions: Vec<ExtractionResult>,
) -> Result<Vec<FileWriteResult>> {
    let mut results = Vec::with_capacity(extractions.len());
    for extraction in extractions {
        results.push(write_file(store, extraction).await);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageEngineKind;
    use crate::extractor::EntityExtractor;
    use crate::graph::store::InMemoryGraphStore;
    use crate::parsing::UceNode;
    use crate::types::{ContentHash, ValidatedPath};

    fn make_extraction(path: &str) -> ExtractionResult {
        let validated = ValidatedPath::new(path).unwrap();
        let file = crate::graph::schema::FileRow {
            id: FileId::from_relative_path(&validated),
            relative_path: path.to_string(),
            basename: path.to_string(),
            ext: "ts".into(),
            content_hash: ContentHash::of(path.as_bytes()),
            size: 10,
            last_modified: 0,
            language: "typescript".into(),
            framework: None,
            parse_error: false,
        };
        let uce = UceNode::File {
            relative_path: path.to_string(),
            language: "typescript".into(),
            parse_error: false,
            children: vec![],
        };
        EntityExtractor::new("/project").extract(file, &uce)
    }

    #[tokio::test]
    async fn write_file_inserts_and_is_idempotent_on_rewrite() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();

        let result = write_file(&store, make_extraction("src/a.ts")).await;
        assert!(matches!(result.outcome, WriteOutcome::Written { .. }));

        let result2 = write_file(&store, make_extraction("src/a.ts")).await;
        assert!(matches!(result2.outcome, WriteOutcome::Written { .. }));
        assert_eq!(store.files.len(), 1);
    }

    #[tokio::test]
    async fn rewriting_with_no_entities_still_deletes_the_prior_rows() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();

        let path = "src/a.ts";
        let validated = ValidatedPath::new(path).unwrap();
        let file_id = FileId::from_relative_path(&validated);
        let file = crate::graph::schema::FileRow {
            id: file_id.clone(),
            relative_path: path.to_string(),
            basename: path.to_string(),
            ext: "ts".into(),
            content_hash: ContentHash::of(b"v1"),
            size: 2,
            last_modified: 0,
            language: "typescript".into(),
            framework: None,
            parse_error: false,
        };
        let uce_with_function = UceNode::File {
            relative_path: path.to_string(),
            language: "typescript".into(),
            parse_error: false,
            children: vec![UceNode::Function {
                name: "run".into(),
                location: crate::parsing::Location { start_line: 1, end_line: 1, start_col: 0, end_col: 1 },
                signature: "fn run()".into(),
                return_type: None,
                is_exported: true,
                is_async: false,
                is_static: false,
                param_count: 0,
                doc_comment: None,
                body_text: String::new(),
            }],
        };
        let first = EntityExtractor::new("/project").extract(file.clone(), &uce_with_function);
        write_file(&store, first).await;
        assert_eq!(store.functions.len(), 1);

        let uce_now_empty = UceNode::File {
            relative_path: path.to_string(),
            language: "typescript".into(),
            parse_error: false,
            children: vec![],
        };
        let second = EntityExtractor::new("/project").extract(file, &uce_now_empty);
        let result = write_file(&store, second).await;
        assert!(matches!(result.outcome, WriteOutcome::Written { .. }));
        assert!(store.functions.is_empty(), "the function dropped from the file must be gone, not orphaned");
        assert_eq!(store.files.len(), 1);
    }

    #[tokio::test]
    async fn write_files_keeps_going_past_individual_failures() {
        let mut store = InMemoryGraphStore::new(StorageEngineKind::InMemory);
        store.initialize(true).await.unwrap();

        let mut bad = make_extraction("src/b.ts");
        bad.batch.files.clear();

        let results = write_files(&store, vec![make_extraction("src/a.ts"), bad])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].outcome, WriteOutcome::Written { .. }));
        assert!(matches!(results[1].outcome, WriteOutcome::Failed { .. }));
    }
}
