//! Parser Adapter (C2): a language-neutral tree of declarations with
//! locations (UCE — "universal code entity"). Concrete parsers never
//! hand back a partial tree on fatal failure: downstream IDs are
//! content-derived, and a partial tree would let two different inputs
//! collide on the same entity IDs.

#[cfg(feature = "tree-sitter-parsing")]
mod tree_sitter_adapter;

#[cfg(feature = "tree-sitter-parsing")]
pub use tree_sitter_adapter::TreeSitterParser;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl Location {
    pub fn point(line: u32, col: u32) -> Self {
        Self {
            start_line: line,
            end_line: line,
            start_col: col,
            end_col: col,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UceImportSpecifier {
    pub imported_name: String,
    pub local_name: String,
}

/// One declaration, import, or call site in the UCE tree. `File` is the
/// root and the only kind that may appear with no parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UceNode {
    File {
        relative_path: String,
        language: String,
        parse_error: bool,
        children: Vec<UceNode>,
    },
    Function {
        name: String,
        location: Location,
        signature: String,
        return_type: Option<String>,
        is_exported: bool,
        is_async: bool,
        is_static: bool,
        param_count: u32,
        doc_comment: Option<String>,
        body_text: String,
    },
    Class {
        name: String,
        location: Location,
        is_exported: bool,
        is_abstract: bool,
        extends_class: Option<String>,
        implements: Vec<String>,
        doc_comment: Option<String>,
        members: Vec<UceNode>,
    },
    Interface {
        name: String,
        location: Location,
        is_exported: bool,
        extends: Vec<String>,
        doc_comment: Option<String>,
        properties: Vec<String>,
    },
    TypeAlias {
        name: String,
        location: Location,
        is_exported: bool,
        definition: String,
        doc_comment: Option<String>,
    },
    Variable {
        name: String,
        location: Location,
        variable_type: Option<String>,
        is_const: bool,
        is_exported: bool,
    },
    Import {
        source: String,
        specifiers: Vec<UceImportSpecifier>,
        side_effect: bool,
        type_only: bool,
    },
    CallSite {
        caller_location: Location,
        callee_text: String,
    },
}

/// Contract: `parse(path, content, language) -> UCE`. On a fatal parse
/// error, return a bare `File { parse_error: true, children: vec![] }`
/// rather than a best-effort partial tree.
pub trait Parser: Send + Sync {
    fn parse(&self, relative_path: &str, content: &str, language: &str) -> UceNode;
}

pub fn error_file(relative_path: &str, language: &str) -> UceNode {
    UceNode::File {
        relative_path: relative_path.to_string(),
        language: language.to_string(),
        parse_error: true,
        children: Vec::new(),
    }
}

/// Languages this crate recognizes by file extension.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "rs" => Some("rust"),
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "py" => Some("python"),
        _ => None,
    }
}
