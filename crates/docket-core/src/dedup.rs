//! Deduplication key: a stable fingerprint of `(type name, parameters)`.
//!
//! `dedup_key = hex(sha256(type_name ‖ 0x00 ‖ canonical_json(parameters)))`
//!
//! Type names never contain NUL and canonical JSON escapes it inside strings,
//! so the separator cannot be produced by either side of the concatenation.

use std::fmt::Write as _;

use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};

const SEPARATOR: u8 = 0x00;

/// Computes the dedup key of a task.
pub fn dedup_key(type_name: &str, parameters: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_name.as_bytes());
    hasher.update([SEPARATOR]);
    hasher.update(canonical_json(parameters).as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic JSON text: object keys sorted by UTF-8 byte order, no whitespace.
///
/// Independent of how the value was built (insertion order, map backend).
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Display of a scalar is its compact JSON text (strings quoted and escaped).
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", Value::from(key.as_str()));
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}
