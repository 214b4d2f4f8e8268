//! Import resolution (§4.3): relative imports resolve against the real
//! file system; anything else is external and gets a deduped GhostNode.

use crate::types::{FileId, GhostId, ValidatedPath};
use std::path::{Path, PathBuf};

const RESOLUTION_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs"];

/// Attempts to resolve a relative import `source` (written from the
/// importing file's directory) against real files under `project_root`.
/// Tries the bare path, each extension in turn, then `/index.*`.
pub fn resolve_relative_import(
    project_root: &Path,
    importing_file_dir: &Path,
    source: &str,
) -> Option<FileId> {
    let joined = importing_file_dir.join(source);

    let mut candidates = vec![joined.clone()];
    for ext in RESOLUTION_EXTENSIONS {
        candidates.push(joined.with_extension(ext));
    }
    for ext in RESOLUTION_EXTENSIONS {
        candidates.push(joined.join(format!("index.{ext}")));
    }

    for candidate in candidates {
        let absolute = project_root.join(&candidate);
        if absolute.is_file() {
            let relative = candidate.strip_prefix(project_root).unwrap_or(&candidate);
            if let Ok(validated) = ValidatedPath::new(relative) {
                return Some(FileId::from_relative_path(&validated));
            }
        }
    }
    None
}

pub fn is_relative_source(source: &str) -> bool {
    source.starts_with('.')
}

/// Package-name extraction (§4.3): scoped `@scope/pkg/sub` collapses to
/// `@scope/pkg`; `node:foo` passes through unchanged; everything else
/// takes the segment before the first `/`.
pub fn extract_package_name(source: &str) -> String {
    if source.starts_with("node:") {
        return source.to_string();
    }
    if let Some(rest) = source.strip_prefix('@') {
        let mut parts = rest.splitn(2, '/');
        let scope = parts.next().unwrap_or_default();
        let pkg = parts.next().and_then(|r| r.split('/').next()).unwrap_or_default();
        return format!("@{scope}/{pkg}");
    }
    source.split('/').next().unwrap_or(source).to_string()
}

/// Ghost-node identity for one imported symbol (spec's `ghost:<package>:<symbol>`,
/// §3/§4.3): dedup key is `(package_name, symbol)`, not the import source
/// string, so `useState` and `useEffect` from the same package get
/// distinct ghost nodes under one shared package.
pub fn ghost_id_for_symbol(package_name: &str, symbol: &str) -> GhostId {
    GhostId::new(package_name, symbol)
}
