//! Canonical JSON emission and content hashing
//!
//! Cache keys, template checksums and persisted manifests all go through
//! JCS (RFC 8785) so that object key order never influences the bytes that
//! get hashed or written.

use anyhow::{Context, Result};
use blake3::Hasher;
use serde::Serialize;

pub const CANONICALIZATION_BACKEND: &str = "jcs-rfc8785";
pub const HASH_ALGORITHM: &str = "blake3";

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// # Example
///
/// ```rust
/// use upe_utils::canonicalization::emit_jcs;
/// use std::collections::HashMap;
///
/// let mut map = HashMap::new();
/// map.insert("b", 1);
/// map.insert("a", 2);
/// assert_eq!(emit_jcs(&map).unwrap(), r#"{"a":2,"b":1}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    String::from_utf8(bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// Serialize a value to canonical JSON bytes.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")
}

/// BLAKE3 hex digest of the canonical JSON form of `value`.
///
/// Two values that differ only in map insertion order hash identically.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    Ok(content_hash(&bytes))
}

/// BLAKE3 hex digest of raw bytes.
#[must_use]
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}
