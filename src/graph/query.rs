// Typed query surface (§4.1 `query`/`execute`). This is a deliberate
// simplification of a general datalog engine down to the fixed set of
// traversals the rest of the crate actually needs — each variant maps
// to one indexed scan over the store's tables, not an open-ended query
// language. New access patterns get a new variant, not a parser.

use super::schema::*;
use super::store::InMemoryGraphStore;
use crate::types::{EntityId, FileId, GhostId};
use anyhow::Result;

#[derive(Debug, Clone)]
pub enum GraphQuery {
    CallersOf(EntityId),
    CalleesOf(EntityId),
    ImportersOf(FileId),
    ImportedBy(FileId),
    EntitiesInFile(FileId),
    UnresolvedCalls,
    GhostsByPackage(String),
    ReferencesToGhost(GhostId),
    FileByPath(String),
    JustificationFor(EntityId),
}

/// The result shape varies per query; callers downcast via the `as_*`
/// helpers rather than matching on a giant sum type.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub calls: Vec<CallsEdge>,
    pub imports: Vec<ImportsEdge>,
    pub functions: Vec<FunctionRow>,
    pub classes: Vec<ClassRow>,
    pub interfaces: Vec<InterfaceRow>,
    pub type_aliases: Vec<TypeAliasRow>,
    pub variables: Vec<VariableRow>,
    pub ghost_nodes: Vec<GhostNodeRow>,
    pub references_external: Vec<ReferencesExternalEdge>,
    pub files: Vec<FileRow>,
    pub justifications: Vec<JustificationRow>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
            && self.imports.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.interfaces.is_empty()
            && self.type_aliases.is_empty()
            && self.variables.is_empty()
            && self.ghost_nodes.is_empty()
            && self.references_external.is_empty()
            && self.files.is_empty()
            && self.justifications.is_empty()
    }
}

pub fn execute(store: &InMemoryGraphStore, script: GraphQuery) -> Result<QueryRows> {
    let mut out = QueryRows::default();
    match script {
        GraphQuery::CallersOf(callee) => {
            out.calls = store
                .calls
                .iter()
                .filter(|e| e.callee_id.as_ref() == Some(&callee))
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::CalleesOf(caller) => {
            out.calls = store
                .calls
                .iter()
                .filter(|e| e.caller_id == caller)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::ImportersOf(to_file) => {
            out.imports = store
                .imports
                .iter()
                .filter(|e| e.to_file == to_file)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::ImportedBy(from_file) => {
            out.imports = store
                .imports
                .iter()
                .filter(|e| e.from_file == from_file)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::EntitiesInFile(file_id) => {
            out.functions = store
                .functions
                .iter()
                .filter(|e| e.file_id == file_id)
                .map(|e| e.clone())
                .collect();
            out.classes = store
                .classes
                .iter()
                .filter(|e| e.file_id == file_id)
                .map(|e| e.clone())
                .collect();
            out.interfaces = store
                .interfaces
                .iter()
                .filter(|e| e.file_id == file_id)
                .map(|e| e.clone())
                .collect();
            out.type_aliases = store
                .type_aliases
                .iter()
                .filter(|e| e.file_id == file_id)
                .map(|e| e.clone())
                .collect();
            out.variables = store
                .variables
                .iter()
                .filter(|e| e.file_id == file_id)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::UnresolvedCalls => {
            out.calls = store
                .calls
                .iter()
                .filter(|e| e.resolution == crate::types::CallResolution::Unresolved)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::GhostsByPackage(package_name) => {
            out.ghost_nodes = store
                .ghost_nodes
                .iter()
                .filter(|e| e.package_name == package_name)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::ReferencesToGhost(ghost_id) => {
            out.references_external = store
                .references_external
                .iter()
                .filter(|e| e.ghost_id == ghost_id)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::FileByPath(relative_path) => {
            out.files = store
                .files
                .iter()
                .filter(|e| e.relative_path == relative_path)
                .map(|e| e.clone())
                .collect();
        }
        GraphQuery::JustificationFor(entity_id) => {
            out.justifications = store
                .justifications
                .get(&entity_id)
                .map(|e| vec![e.clone()])
                .unwrap_or_default();
        }
    }
    Ok(out)
}
