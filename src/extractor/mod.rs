//! Entity Extractor (C3): walks a UCE tree into graph rows, ghost
//! nodes, pass-1 unresolved calls, and embedding chunks.

pub mod calls;
pub mod embedding_text;
pub mod id_gen;
pub mod imports;

use crate::graph::schema::{
    CallsEdge, ClassRow, ContainsEdge, FileRow, FunctionRow, GhostNodeRow, ImportsEdge,
    InterfaceRow, ReferencesExternalEdge, TypeAliasRow, VariableRow,
};
use crate::graph::store::WriteBatch;
use crate::parsing::{UceImportSpecifier, UceNode};
use crate::types::{CallResolution, EntityId, FileId, GhostId, ImportType};
use std::path::Path;

/// One text blob ready to be sent to an embedding model. Vector
/// generation itself is outside this crate's scope (§1 Non-goals) —
/// the extractor only produces the canonical text and the entity it
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingChunk {
    pub entity_id: EntityId,
    pub text: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedCall {
    pub caller_id: EntityId,
    pub callee_text: String,
    pub call_site_line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub batch: WriteBatch,
    pub unresolved_calls: Vec<UnresolvedCall>,
    pub embedding_chunks: Vec<EmbeddingChunk>,
    pub errors: Vec<String>,
}

pub struct EntityExtractor {
    project_root: std::path::PathBuf,
}

impl EntityExtractor {
    pub fn new(project_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn extract(&self, file: FileRow, uce: &UceNode) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        let children = match uce {
            UceNode::File { parse_error, children, .. } if !parse_error => children,
            UceNode::File { parse_error: true, .. } => {
                result.errors.push(format!("{}: fatal parse error", file.relative_path));
                result.batch.files.push(file);
                return result;
            }
            _ => {
                result.errors.push(format!("{}: expected a File node at the root", file.relative_path));
                return result;
            }
        };

        let file_id = file.id.clone();
        let parent_scope = file_id.as_str().to_string();
        result.batch.files.push(file);

        for child in children {
            self.extract_node(child, &file_id, &parent_scope, &mut result);
        }

        result
    }

    fn extract_node(
        &self,
        node: &UceNode,
        file_id: &FileId,
        parent_scope: &str,
        result: &mut ExtractionResult,
    ) {
        match node {
            UceNode::Function { .. } => self.extract_function(node, file_id, parent_scope, 1, result),
            UceNode::Class { .. } => self.extract_class(node, file_id, parent_scope, result),
            UceNode::Interface {
                name,
                location,
                is_exported,
                extends: _,
                doc_comment,
                properties,
            } => {
                let id = id_gen::entity_id(parent_scope, "interface", name, &format!("{location:?}"));
                result.batch.interfaces.push(InterfaceRow {
                    id: id.clone(),
                    name: name.clone(),
                    file_id: file_id.clone(),
                    start_line: location.start_line,
                    end_line: location.end_line,
                    is_exported: *is_exported,
                    extends: Vec::new(),
                    doc_comment: doc_comment.clone(),
                    properties_json: Some(serde_json::json!(properties)),
                });
                result.batch.contains.push(ContainsEdge {
                    file_id: file_id.clone(),
                    entity_id: id.clone(),
                    depth: 1,
                });
                result.embedding_chunks.push(EmbeddingChunk {
                    entity_id: id,
                    text: embedding_text::build_embedding_text(
                        name,
                        doc_comment.as_deref(),
                        "interface",
                        Some(properties),
                    ),
                    metadata: serde_json::json!({ "kind": "interface" }),
                });
            }
            UceNode::TypeAlias { name, location, is_exported, definition, doc_comment } => {
                let id = id_gen::entity_id(parent_scope, "type_alias", name, &format!("{location:?}"));
                result.batch.type_aliases.push(TypeAliasRow {
                    id: id.clone(),
                    name: name.clone(),
                    file_id: file_id.clone(),
                    start_line: location.start_line,
                    end_line: location.end_line,
                    is_exported: *is_exported,
                    definition: definition.clone(),
                    doc_comment: doc_comment.clone(),
                });
                result.batch.contains.push(ContainsEdge {
                    file_id: file_id.clone(),
                    entity_id: id,
                    depth: 1,
                });
            }
            UceNode::Variable { name, location, variable_type, is_const, is_exported } => {
                let id = id_gen::entity_id(parent_scope, "variable", name, &format!("{location:?}"));
                result.batch.variables.push(VariableRow {
                    id: id.clone(),
                    name: name.clone(),
                    file_id: file_id.clone(),
                    line: location.start_line,
                    col: location.start_col,
                    variable_type: variable_type.clone(),
                    is_const: *is_const,
                    is_exported: *is_exported,
                    scope: parent_scope.to_string(),
                });
                result.batch.contains.push(ContainsEdge {
                    file_id: file_id.clone(),
                    entity_id: id,
                    depth: 1,
                });
            }
            UceNode::Import { source, specifiers, side_effect: _, type_only } => {
                self.extract_import(source, *type_only, specifiers, file_id, result);
            }
            UceNode::CallSite { caller_location, callee_text } => {
                // A call site with no enclosing function is attributed to
                // the file itself — still observable, never silently
                // dropped.
                let caller_id = EntityId::new(file_id.as_str().to_string());
                let edge = CallsEdge {
                    caller_id: caller_id.clone(),
                    callee_id: None,
                    callee_text: callee_text.clone(),
                    call_site_line: caller_location.start_line,
                    resolution: CallResolution::Unresolved,
                };
                result.unresolved_calls.push(UnresolvedCall {
                    caller_id,
                    callee_text: callee_text.clone(),
                    call_site_line: caller_location.start_line,
                });
                result.batch.calls.push(edge);
            }
            UceNode::File { .. } => {
                result.errors.push("unexpected nested File node".to_string());
            }
        }
    }

    fn extract_function(
        &self,
        node: &UceNode,
        file_id: &FileId,
        parent_scope: &str,
        depth: u32,
        result: &mut ExtractionResult,
    ) {
        let UceNode::Function {
            name,
            location,
            signature,
            return_type,
            is_exported,
            is_async,
            is_static,
            param_count,
            doc_comment,
            body_text: _,
        } = node
        else {
            return;
        };

        let id = id_gen::entity_id(parent_scope, "function", name, signature);
        result.batch.functions.push(FunctionRow {
            id: id.clone(),
            name: name.clone(),
            file_id: file_id.clone(),
            start_line: location.start_line,
            end_line: location.end_line,
            start_col: location.start_col,
            end_col: location.end_col,
            signature: signature.clone(),
            return_type: return_type.clone(),
            is_exported: *is_exported,
            is_async: *is_async,
            is_static: *is_static,
            param_count: *param_count,
            complexity: 1,
            doc_comment: doc_comment.clone(),
            body_hash: None,
            embedding_id: Some(id.clone()),
        });
        result.batch.contains.push(ContainsEdge {
            file_id: file_id.clone(),
            entity_id: id.clone(),
            depth,
        });
        result.embedding_chunks.push(EmbeddingChunk {
            entity_id: id,
            text: embedding_text::build_embedding_text(name, doc_comment.as_deref(), signature, None),
            metadata: serde_json::json!({ "kind": "function", "isExported": is_exported }),
        });
    }

    fn extract_class(
        &self,
        node: &UceNode,
        file_id: &FileId,
        parent_scope: &str,
        result: &mut ExtractionResult,
    ) {
        let UceNode::Class {
            name,
            location,
            is_exported,
            is_abstract,
            extends_class,
            implements,
            doc_comment,
            members,
        } = node
        else {
            return;
        };

        let id = id_gen::entity_id(parent_scope, "class", name, &format!("{location:?}"));
        let member_summaries: Vec<serde_json::Value> = members
            .iter()
            .map(|m| serde_json::json!({ "kind": member_kind(m), "name": member_name(m) }))
            .collect();

        result.batch.classes.push(ClassRow {
            id: id.clone(),
            name: name.clone(),
            file_id: file_id.clone(),
            start_line: location.start_line,
            end_line: location.end_line,
            is_exported: *is_exported,
            is_abstract: *is_abstract,
            extends_class: extends_class.clone(),
            implements: implements.clone(),
            doc_comment: doc_comment.clone(),
            embedding_id: Some(id.clone()),
            members_json: serde_json::json!(member_summaries),
        });
        result.batch.contains.push(ContainsEdge {
            file_id: file_id.clone(),
            entity_id: id.clone(),
            depth: 1,
        });
        result.embedding_chunks.push(EmbeddingChunk {
            entity_id: id.clone(),
            text: embedding_text::build_embedding_text(name, doc_comment.as_deref(), name, None),
            metadata: serde_json::json!({ "kind": "class" }),
        });

        let class_scope = format!("{parent_scope}::{name}");
        for member in members {
            if matches!(member, UceNode::Function { .. }) {
                self.extract_function(member, file_id, &class_scope, 2, result);
            }
        }
    }

    fn extract_import(
        &self,
        source: &str,
        type_only: bool,
        specifiers: &[UceImportSpecifier],
        file_id: &FileId,
        result: &mut ExtractionResult,
    ) {
        if imports::is_relative_source(source) {
            let file_dir = Path::new(file_id.as_str().trim_start_matches("file:"))
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .to_path_buf();
            if let Some(target) = imports::resolve_relative_import(&self.project_root, &file_dir, source) {
                result.batch.imports.push(ImportsEdge {
                    from_file: file_id.clone(),
                    to_file: target,
                    imported_symbols: Vec::new(),
                    import_type: ImportType::Named,
                    is_type_only: type_only,
                });
                return;
            }
            result.errors.push(format!("could not resolve relative import '{source}' from {file_id}"));
            return;
        }

        let package = imports::extract_package_name(source);
        let file_entity = EntityId::new(file_id.as_str().to_string());

        // A side-effect import (no named specifiers) has no symbol to
        // key a ghost node by; ghost the module itself in that case.
        if specifiers.is_empty() {
            let ghost_id = GhostId::new(&package, &package);
            result.batch.ghost_nodes.push(GhostNodeRow {
                id: ghost_id.clone(),
                name: package.clone(),
                package_name: package,
                entity_type: "module".into(),
                signature: None,
                is_external: true,
            });
            result.batch.references_external.push(ReferencesExternalEdge {
                entity_id: file_entity,
                ghost_id,
                usage_count: 1,
            });
            return;
        }

        for specifier in specifiers {
            let symbol = specifier.imported_name.as_str();
            let ghost_id = imports::ghost_id_for_symbol(&package, symbol);
            result.batch.ghost_nodes.push(GhostNodeRow {
                id: ghost_id.clone(),
                name: symbol.to_string(),
                package_name: package.clone(),
                entity_type: "symbol".into(),
                signature: None,
                is_external: true,
            });
            result.batch.references_external.push(ReferencesExternalEdge {
                entity_id: file_entity.clone(),
                ghost_id,
                usage_count: 1,
            });
        }
    }
}

fn member_kind(node: &UceNode) -> &'static str {
    match node {
        UceNode::Function { .. } => "function",
        UceNode::Variable { .. } => "property",
        _ => "other",
    }
}

fn member_name(node: &UceNode) -> String {
    match node {
        UceNode::Function { name, .. } => name.clone(),
        UceNode::Variable { name, .. } => name.clone(),
        _ => String::new(),
    }
}
