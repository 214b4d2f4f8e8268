//! Concrete tree-sitter-backed `Parser` (C2). Walks each language's
//! native syntax tree and projects it down to the UCE node set; node
//! kind names are gathered per-language the same way the constant lists
//! above once matched the stock tree-sitter grammars.

use super::{Location, UceImportSpecifier, UceNode};
use tree_sitter::{Language, Node, Parser as TsParser};

const FUNCTION_NODES: &[&str] = &[
    "function_item",      // Rust
    "function_declaration", "function_signature", "method_definition", // TS/JS
    "function_definition", // Python
];
const CLASS_NODES: &[&str] = &["class_declaration", "class_definition"];
const INTERFACE_NODES: &[&str] = &["interface_declaration"];
const TYPE_ALIAS_NODES: &[&str] = &["type_alias_declaration"];
const VARIABLE_NODES: &[&str] = &[
    "let_declaration", "const_item", "static_item", // Rust
    "variable_declarator", // TS/JS
    "assignment",          // Python
];
const IMPORT_NODES: &[&str] = &[
    "use_declaration",                                   // Rust
    "import_statement", "import_clause",                 // TS/JS
    "import_from_statement", "future_import_statement",   // Python
];
const CALL_NODES: &[&str] = &["call_expression", "call"];

pub struct TreeSitterParser;

impl TreeSitterParser {
    pub fn new() -> Self {
        Self
    }

    fn language_for(language: &str) -> Option<Language> {
        match language {
            "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
            "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "python" => Some(tree_sitter_python::LANGUAGE.into()),
            _ => None,
        }
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Parser for TreeSitterParser {
    fn parse(&self, relative_path: &str, content: &str, language: &str) -> UceNode {
        let Some(ts_language) = Self::language_for(language) else {
            return super::error_file(relative_path, language);
        };

        let mut parser = TsParser::new();
        if parser.set_language(&ts_language).is_err() {
            return super::error_file(relative_path, language);
        }

        let Some(tree) = parser.parse(content, None) else {
            return super::error_file(relative_path, language);
        };

        let root = tree.root_node();
        if root.has_error() && root.child_count() == 0 {
            return super::error_file(relative_path, language);
        }

        let children = walk_children(root, content);
        UceNode::File {
            relative_path: relative_path.to_string(),
            language: language.to_string(),
            parse_error: false,
            children,
        }
    }
}

fn node_location(node: Node) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location {
        start_line: start.row as u32,
        end_line: end.row as u32,
        start_col: start.column as u32,
        end_col: end.column as u32,
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn identifier_child<'a>(node: Node<'a>, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
}

/// Walks direct and nested declaration-bearing children, producing a
/// flat UCE child list. Bodies of functions/classes are not recursed
/// into beyond their own declaration members, matching the UCE's
/// "declarations with locations" scope (no full-statement AST).
fn walk_children(node: Node, source: &str) -> Vec<UceNode> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();
        if FUNCTION_NODES.contains(&kind) {
            out.push(build_function(child, source));
        } else if CLASS_NODES.contains(&kind) {
            out.push(build_class(child, source));
        } else if INTERFACE_NODES.contains(&kind) {
            out.push(build_interface(child, source));
        } else if TYPE_ALIAS_NODES.contains(&kind) {
            out.push(build_type_alias(child, source));
        } else if VARIABLE_NODES.contains(&kind) {
            out.push(build_variable(child, source));
        } else if IMPORT_NODES.contains(&kind) {
            out.push(build_import(child, source));
        } else if CALL_NODES.contains(&kind) {
            out.push(build_call_site(child, source));
        } else if child.child_count() > 0 {
            out.extend(walk_children(child, source));
        }
    }
    out
}

fn build_function(node: Node, source: &str) -> UceNode {
    let name = identifier_child(node, source).unwrap_or_else(|| "<anonymous>".into());
    let signature = node_text(node, source).lines().next().unwrap_or("").trim().to_string();
    let is_async = node_text(node, source).trim_start().starts_with("async");
    let params = node
        .child_by_field_name("parameters")
        .map(|p| p.named_child_count() as u32)
        .unwrap_or(0);
    let body_children = node
        .child_by_field_name("body")
        .map(|b| walk_children(b, source))
        .unwrap_or_default();

    UceNode::Function {
        name,
        location: node_location(node),
        signature,
        return_type: node
            .child_by_field_name("return_type")
            .map(|n| node_text(n, source).to_string()),
        is_exported: is_exported(node, source),
        is_async,
        is_static: node_text(node, source).contains("static "),
        param_count: params,
        doc_comment: leading_doc_comment(node, source),
        body_text: {
            let mut text = node_text(node, source).to_string();
            text.push_str(&format!(" [{} nested declarations]", body_children.len()));
            text
        },
    }
}

fn build_class(node: Node, source: &str) -> UceNode {
    let name = identifier_child(node, source).unwrap_or_else(|| "<anonymous>".into());
    let members = node
        .child_by_field_name("body")
        .map(|b| walk_children(b, source))
        .unwrap_or_default();
    UceNode::Class {
        name,
        location: node_location(node),
        is_exported: is_exported(node, source),
        is_abstract: node_text(node, source).trim_start().starts_with("abstract"),
        extends_class: node
            .child_by_field_name("superclass")
            .map(|n| node_text(n, source).to_string()),
        implements: Vec::new(),
        doc_comment: leading_doc_comment(node, source),
        members,
    }
}

fn build_interface(node: Node, source: &str) -> UceNode {
    let name = identifier_child(node, source).unwrap_or_else(|| "<anonymous>".into());
    UceNode::Interface {
        name,
        location: node_location(node),
        is_exported: is_exported(node, source),
        extends: Vec::new(),
        doc_comment: leading_doc_comment(node, source),
        properties: Vec::new(),
    }
}

fn build_type_alias(node: Node, source: &str) -> UceNode {
    let name = identifier_child(node, source).unwrap_or_else(|| "<anonymous>".into());
    UceNode::TypeAlias {
        name,
        location: node_location(node),
        is_exported: is_exported(node, source),
        definition: node_text(node, source).to_string(),
        doc_comment: leading_doc_comment(node, source),
    }
}

fn build_variable(node: Node, source: &str) -> UceNode {
    let name = identifier_child(node, source)
        .or_else(|| node.child(0).map(|n| node_text(n, source).to_string()))
        .unwrap_or_else(|| "<anonymous>".into());
    UceNode::Variable {
        name,
        location: node_location(node),
        variable_type: node
            .child_by_field_name("type")
            .map(|n| node_text(n, source).to_string()),
        is_const: node.kind() == "const_item",
        is_exported: is_exported(node, source),
    }
}

fn build_import(node: Node, source: &str) -> UceNode {
    let text = node_text(node, source);
    UceNode::Import {
        source: text.to_string(),
        specifiers: Vec::new(),
        side_effect: !text.contains(" as ") && !text.contains('{'),
        type_only: text.contains("import type"),
    }
    .also_extract_specifiers(node, source)
}

fn build_call_site(node: Node, source: &str) -> UceNode {
    let callee = node
        .child_by_field_name("function")
        .or_else(|| node.child(0))
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    UceNode::CallSite {
        caller_location: node_location(node),
        callee_text: callee,
    }
}

fn is_exported(node: Node, source: &str) -> bool {
    node_text(node, source).trim_start().starts_with("pub")
        || node
            .prev_sibling()
            .map(|s| s.kind() == "export" || node_text(s, source) == "export")
            .unwrap_or(false)
}

fn leading_doc_comment(node: Node, source: &str) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut cursor = node.prev_sibling();
    while let Some(sibling) = cursor {
        let kind = sibling.kind();
        if kind == "line_comment" || kind == "block_comment" || kind == "comment" {
            doc_lines.push(node_text(sibling, source).trim().to_string());
            cursor = sibling.prev_sibling();
        } else {
            break;
        }
    }
    if doc_lines.is_empty() {
        None
    } else {
        doc_lines.reverse();
        Some(doc_lines.join("\n"))
    }
}

/// Small helper to keep `build_import` a single expression; extracting
/// named specifiers from `{ a, b as c }` clauses is best-effort.
trait ExtractSpecifiers {
    fn also_extract_specifiers(self, node: Node, source: &str) -> Self;
}

impl ExtractSpecifiers for UceNode {
    fn also_extract_specifiers(self, node: Node, source: &str) -> Self {
        let UceNode::Import {
            source: import_source,
            side_effect,
            type_only,
            ..
        } = &self
        else {
            return self;
        };

        let mut specifiers = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "import_specifier" || child.kind() == "identifier" {
                let name = node_text(child, source).to_string();
                specifiers.push(UceImportSpecifier {
                    imported_name: name.clone(),
                    local_name: name,
                });
            }
        }

        UceNode::Import {
            source: import_source.clone(),
            specifiers,
            side_effect: *side_effect,
            type_only: *type_only,
        }
    }
}
