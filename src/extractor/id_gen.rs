//! Deterministic entity ID generation (§4.3): `hash(parent_scope, kind,
//! name, signature_or_location)`. Pure and platform-independent — the
//! digest is taken over UTF-8 bytes of a fixed field order, joined by a
//! byte that cannot appear inside any field (`\0`).

use crate::types::EntityId;
use sha2::{Digest, Sha256};

/// Uses the first 16 bytes (128 bits) of the SHA-256 digest, hex
/// encoded. 128 bits keeps collision probability negligible for any
/// codebase this crate will realistically index while keeping IDs
/// short enough to read in logs and ledger entries.
pub fn entity_id(parent_scope: &str, kind: &str, name: &str, signature_or_location: &str) -> EntityId {
    let mut hasher = Sha256::new();
    hasher.update(parent_scope.as_bytes());
    hasher.update(b"\0");
    hasher.update(kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(signature_or_location.as_bytes());
    let digest = hasher.finalize();
    EntityId::new(hex::encode(&digest[..16]))
}
