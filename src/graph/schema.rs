// Typed row and relation shapes for the graph store (§3 Data Model).
// A tagged-sum over typed row shapes rather than an inheritance
// hierarchy — queries dispatch on `Relation`/the row's own variant.

use crate::types::{
    CallResolution, ContentHash, EntityId, FileId, GhostId, ImportType, RelationType,
};
use serde::{Deserialize, Serialize};

/// Every relation the store knows how to hold. Used as the grouping key
/// in a [`crate::graph::store::WriteBatch`] and as the dispatch tag for
/// `query`/`execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    File,
    Function,
    Class,
    Interface,
    TypeAlias,
    Variable,
    GhostNode,
    Contains,
    Calls,
    Imports,
    ReferencesExternal,
    ExtendsClass,
    Implements,
    ExtendsInterface,
    Justification,
    Classification,
    DesignPattern,
    PatternParticipant,
    LlmCache,
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: FileId,
    pub relative_path: String,
    pub basename: String,
    pub ext: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub last_modified: i64,
    pub language: String,
    pub framework: Option<String>,
    pub parse_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRow {
    pub id: EntityId,
    pub name: String,
    pub file_id: FileId,
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub signature: String,
    pub return_type: Option<String>,
    pub is_exported: bool,
    pub is_async: bool,
    pub is_static: bool,
    pub param_count: u32,
    pub complexity: u32,
    pub doc_comment: Option<String>,
    pub body_hash: Option<String>,
    pub embedding_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRow {
    pub id: EntityId,
    pub name: String,
    pub file_id: FileId,
    pub start_line: u32,
    pub end_line: u32,
    pub is_exported: bool,
    pub is_abstract: bool,
    pub extends_class: Option<String>,
    pub implements: Vec<String>,
    pub doc_comment: Option<String>,
    pub embedding_id: Option<EntityId>,
    /// Methods/properties, denormalized schema-less per §3.
    pub members_json: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRow {
    pub id: EntityId,
    pub name: String,
    pub file_id: FileId,
    pub start_line: u32,
    pub end_line: u32,
    pub is_exported: bool,
    pub extends: Vec<String>,
    pub doc_comment: Option<String>,
    pub properties_json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasRow {
    pub id: EntityId,
    pub name: String,
    pub file_id: FileId,
    pub start_line: u32,
    pub end_line: u32,
    pub is_exported: bool,
    pub definition: String,
    pub doc_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRow {
    pub id: EntityId,
    pub name: String,
    pub file_id: FileId,
    pub line: u32,
    pub col: u32,
    pub variable_type: Option<String>,
    pub is_const: bool,
    pub is_exported: bool,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostNodeRow {
    pub id: GhostId,
    pub name: String,
    pub package_name: String,
    pub entity_type: String,
    pub signature: Option<String>,
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainsEdge {
    pub file_id: FileId,
    pub entity_id: EntityId,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallsEdge {
    pub caller_id: EntityId,
    /// `None` while `resolution == Unresolved`; the raw callee text is
    /// retained in `callee_text` for observability either way.
    pub callee_id: Option<EntityId>,
    pub callee_text: String,
    pub call_site_line: u32,
    pub resolution: CallResolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportsEdge {
    pub from_file: FileId,
    pub to_file: FileId,
    pub imported_symbols: Vec<String>,
    pub import_type: ImportType,
    pub is_type_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencesExternalEdge {
    pub entity_id: EntityId,
    pub ghost_id: GhostId,
    pub usage_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedInheritanceEdge {
    pub from_id: EntityId,
    pub to_name: String,
    pub kind: RelationType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JustificationRow {
    pub entity_id: EntityId,
    pub purpose_summary: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRow {
    pub entity_id: EntityId,
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignPatternRow {
    pub id: String,
    pub pattern_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternParticipantRow {
    pub pattern_id: String,
    pub entity_id: EntityId,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCacheRow {
    pub cache_key: String,
    pub result: serde_json::Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub entity_id: EntityId,
    pub vector: Vec<f32>,
}
