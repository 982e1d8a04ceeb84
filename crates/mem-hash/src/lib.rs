//! Content hashing and time-ordered ID generation.
//!
//! Two independent pieces live here:
//!
//! - [`canonical_bytes`] / [`content_hash`]: a deterministic, whitespace-stable
//!   JSON serialization (keys sorted, no insignificant whitespace) and the
//!   SHA-256 hex digest over it. Every persisted item version is identified by
//!   this hash; the same logical item always canonicalizes to the same bytes
//!   regardless of field insertion order.
//! - [`IdGenerator`] / [`generate_id`]: 26-character Crockford base32 IDs
//!   encoding `(ms_timestamp:48 | random:80)`, monotonic within a process even
//!   when two IDs are minted in the same millisecond.
//!
//! # Examples
//!
//! ```rust
//! use mem_hash::{content_hash, generate_id};
//! use serde_json::json;
//!
//! let h1 = content_hash(&json!({"b": 2, "a": 1}));
//! let h2 = content_hash(&json!({"a": 1, "b": 2}));
//! assert_eq!(h1, h2); // key order does not affect the hash
//!
//! let id = generate_id();
//! assert_eq!(id.len(), 26);
//! ```

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

mod crockford;

pub use crockford::encode_crockford26;

/// Errors produced while canonicalizing a value for hashing.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("value could not be serialized to JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Recursively sort object keys so two structurally-equal values with
/// different field insertion order produce identical bytes.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for k in keys {
                let v = map.get(&k).cloned().unwrap_or(serde_json::Value::Null);
                sorted.insert(k, sort_keys(v));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// Serialize `value` to compact JSON with object keys sorted lexicographically
/// and no insignificant whitespace. This is the canonical on-wire form used
/// for content hashing; it is stable across serde field-declaration order and
/// across serde_json versions (it never relies on preserve-order features).
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    let raw = serde_json::to_value(value)?;
    let sorted = sort_keys(raw);
    Ok(serde_json::to_vec(&sorted)?)
}

/// SHA-256 hex digest of arbitrary bytes (no canonicalization). Used by
/// backends that already hold a canonical byte payload (e.g. a serialized
/// item about to be QR-encoded).
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest over the canonical serialization of `value`. This is
/// the `content_hash` referenced throughout the journal and catalog: two
/// values hash identically iff they are structurally equal, independent of
/// field order.
pub fn content_hash<T: Serialize>(value: &T) -> String {
    match canonical_bytes(value) {
        Ok(bytes) => hash_bytes(&bytes),
        // Canonicalization only fails for types serde itself refuses (e.g. a
        // map with non-string keys produced by misuse); callers only ever
        // pass already-validated item structs, so this never triggers in
        // practice. Hash the debug representation rather than panic.
        Err(_) => hash_bytes(format!("{:?}", serde_json::to_string(value).ok()).as_bytes()),
    }
}

const MS_BITS: u32 = 48;
const RAND_BITS: u32 = 80;
const RAND_MASK: u128 = (1u128 << RAND_BITS) - 1;
const MS_MASK: u64 = (1u64 << MS_BITS) - 1;

struct IdState {
    last_ms: u64,
    last_rand: u128,
}

/// Generator for 26-character, lexicographically sortable, time-ordered IDs.
///
/// Each ID encodes a 48-bit millisecond timestamp followed by an 80-bit
/// random tail into 128 bits, Crockford base32-encoded to 26 characters.
/// Two IDs minted in the same millisecond stay strictly increasing by
/// incrementing the random tail instead of re-rolling it, so lexicographic
/// order always agrees with generation order.
pub struct IdGenerator {
    state: Mutex<IdState>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IdState {
                last_ms: 0,
                last_rand: 0,
            }),
        }
    }

    /// Mint the next ID. Monotonic across calls on the same generator, even
    /// under concurrent access and even when the system clock does not
    /// advance between two calls.
    pub fn next_id(&self) -> String {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
            & MS_MASK;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (ms, rand) = if now_ms > state.last_ms {
            (now_ms, random_80())
        } else {
            // Clock has not advanced (or went backward): stay on the last
            // timestamp and bump the random tail so ordering still holds.
            // On tail overflow, borrow one tick from the timestamp so we
            // never wrap back to a smaller value.
            let bumped = state.last_rand.wrapping_add(1) & RAND_MASK;
            if bumped == 0 {
                (state.last_ms.saturating_add(1) & MS_MASK, random_80())
            } else {
                (state.last_ms, bumped)
            }
        };
        state.last_ms = ms;
        state.last_rand = rand;
        drop(state);

        let value: u128 = ((ms as u128) << RAND_BITS) | rand;
        encode_crockford26(value)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_80() -> u128 {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    let hi = rng.next_u64() as u128;
    let lo = rng.next_u32() as u128;
    ((hi << 32) | lo) & RAND_MASK
}

static PROCESS_GENERATOR: OnceLock<IdGenerator> = OnceLock::new();

/// Mint the next ID from the process-wide generator. Equivalent to building
/// one [`IdGenerator`] and reusing it; provided for call sites that do not
/// need to own a generator themselves.
pub fn generate_id() -> String {
    PROCESS_GENERATOR.get_or_init(IdGenerator::new).next_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_hash_ignores_key_order() {
        let a = json!({"title": "x", "tags": ["a", "b"]});
        let b = json!({"tags": ["a", "b"], "title": "x"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_differs_on_value_change() {
        let a = json!({"title": "x"});
        let b = json!({"title": "y"});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn ids_are_26_chars_and_crockford_alphabet() {
        let id = generate_id();
        assert_eq!(id.len(), 26);
        assert!(id
            .chars()
            .all(|c| "0123456789ABCDEFGHJKMNPQRSTVWXYZ".contains(c)));
    }

    #[test]
    fn ids_are_monotonic_even_in_a_tight_loop() {
        let gen = IdGenerator::new();
        let mut prev = gen.next_id();
        for _ in 0..2000 {
            let next = gen.next_id();
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn canonical_bytes_have_no_insignificant_whitespace() {
        let bytes = canonical_bytes(&json!({"a": 1})).unwrap();
        assert_eq!(bytes, br#"{"a":1}"#);
    }
}
