// Validated types shared across the extraction and retrieval pipeline.
// These wrappers enforce §3's data-model invariants at construction time
// so malformed entities cannot be built in the first place.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A project-relative path, normalized and guaranteed free of directory
/// traversal and null bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedPath {
    inner: String,
}

impl ValidatedPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8"))?;
        ensure!(!path_str.is_empty(), "path cannot be empty");
        ensure!(!path_str.contains('\0'), "path contains a null byte");
        ensure!(
            !path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir)),
            "path contains directory traversal: {path_str}"
        );
        let normalized = path_str.replace('\\', "/");
        Ok(Self { inner: normalized })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl fmt::Display for ValidatedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// The primary key of a `File` row: `"file:" + normalized_relative_path`.
/// Pure function of the path, per §3 invariant 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    pub fn from_relative_path(path: &ValidatedPath) -> Self {
        Self(format!("file:{}", path.as_str()))
    }

    /// Reconstructs a `FileId` from its already-prefixed string form,
    /// e.g. one recovered from an `EntityId` that aliases a file (top
    /// level call sites attribute to the file itself).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The primary key of any non-File entity row:
/// `hash(parent_scope, kind, name, signature_or_location)`.
/// Construction is pure and deterministic; see `extractor::id_gen`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(hex_digest: String) -> Self {
        Self(hex_digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The primary key of a `GhostNode`: `"ghost:" + package_name + ":" + symbol_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GhostId(String);

impl GhostId {
    pub fn new(package_name: &str, symbol_name: &str) -> Self {
        Self(format!("ghost:{package_name}:{symbol_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GhostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 content hash of a File's byte content, stored as lowercase hex.
/// §3 invariant 5: a mismatch is a forced re-extraction trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A validated, non-empty, length-bounded search query string, sanitized
/// of the same injection patterns the lexical and vector backends would
/// otherwise choke on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSearchQuery {
    text: String,
}

impl ValidatedSearchQuery {
    const MAX_LENGTH: usize = 1024;

    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        let trimmed = query.trim();
        ensure!(!trimmed.is_empty(), "search query cannot be empty");
        ensure!(
            trimmed.len() <= Self::MAX_LENGTH,
            "search query exceeds {} characters",
            Self::MAX_LENGTH
        );
        ensure!(!trimmed.contains('\0'), "search query contains a null byte");
        Ok(Self {
            text: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// A limit value bounded above, used for pagination throughout §6's
/// query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLimit {
    inner: usize,
}

impl ValidatedLimit {
    pub const MAX: usize = 1000;

    pub fn new(limit: usize) -> Result<Self> {
        ensure!(limit > 0, "limit must be greater than zero");
        ensure!(limit <= Self::MAX, "limit exceeds maximum of {}", Self::MAX);
        Ok(Self { inner: limit })
    }

    pub fn get(&self) -> usize {
        self.inner
    }
}

/// Typed relationship kinds between code symbols (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Calls,
    Imports,
    ExtendsClass,
    Implements,
    ExtendsInterface,
    ReferencesExternal,
}

/// Resolution status of a `CALLS` edge (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallResolution {
    Exact,
    Ambiguous,
    Unresolved,
}

/// Import specifier kind (§3 `IMPORTS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportType {
    Named,
    Default,
    Namespace,
    SideEffect,
}

pub fn project_relative(root: &Path, path: &Path) -> Result<PathBuf> {
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_path_buf();
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_pure_function_of_path() {
        let p1 = ValidatedPath::new("src/a.ts").unwrap();
        let p2 = ValidatedPath::new("src/a.ts").unwrap();
        assert_eq!(FileId::from_relative_path(&p1), FileId::from_relative_path(&p2));
    }

    #[test]
    fn validated_path_rejects_traversal() {
        assert!(ValidatedPath::new("../../etc/passwd").is_err());
    }

    #[test]
    fn validated_path_rejects_empty() {
        assert!(ValidatedPath::new("").is_err());
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = ContentHash::of(b"hello world");
        let b = ContentHash::of(b"hello world");
        assert_eq!(a, b);
        let c = ContentHash::of(b"hello world!");
        assert_ne!(a, c);
    }

    #[test]
    fn ghost_id_keyed_by_package_and_symbol() {
        let a = GhostId::new("react", "useState");
        let b = GhostId::new("react", "useEffect");
        assert_ne!(a, b);
        assert_eq!(GhostId::new("react", "useState"), a);
    }

    #[test]
    fn validated_search_query_rejects_empty_and_overlong() {
        assert!(ValidatedSearchQuery::new("  ").is_err());
        assert!(ValidatedSearchQuery::new("x".repeat(2000)).is_err());
        assert!(ValidatedSearchQuery::new("fn foo").is_ok());
    }
}
