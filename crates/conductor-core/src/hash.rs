//! Content hashing over canonical JSON.
//!
//! Hashes must be stable across processes and serde feature sets, so every
//! value is re-emitted with object keys sorted before it is digested.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Characters used by [`safe_encode`]; no vowels, no easily confused digits.
const SAFE_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Compact JSON text of `value` with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, item) in entries {
                out.insert(key.clone(), sorted(item));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Lowercase hex SHA-256 of the canonical form of `value`.
pub fn content_hash(value: &Value) -> String {
    format!("{:x}", Sha256::digest(canonical_json(value).as_bytes()))
}

/// 32-bit digest of the canonical form of `value`.
pub fn short_hash(value: &Value) -> u32 {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Map every byte of `s` onto a vowel-free alphabet so generated names never
/// spell words.
pub fn safe_encode(s: &str) -> String {
    s.bytes()
        .map(|b| SAFE_ALPHABET[b as usize % SAFE_ALPHABET.len()] as char)
        .collect()
}

/// Short, name-safe hash suitable for object name suffixes.
pub fn name_hash(value: &Value) -> String {
    safe_encode(&short_hash(value).to_string())
}
