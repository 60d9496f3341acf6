//! Content canonicalization and hashing.
//!
//! Version identity is the SHA-256 of a canonical JSON rendering of the
//! content tree. Canonical form sorts every map's keys recursively, so
//! semantically identical content always hashes the same regardless of
//! insertion order. The rendering is produced here rather than delegated to
//! a serializer so the byte form stays stable across library upgrades.

use serde_json::Value;
use sha2::{Digest, Sha256};

pub mod diff;

pub use diff::{diff_trees, DiffEntry};

/// Stringified placeholder for a value absent on one side of a diff.
pub const MISSING: &str = "missing";

/// Hex SHA-256 of the canonical serialization of `value`.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical JSON rendering: map keys recursively sorted, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                // Key came from the map; the lookup cannot miss.
                if let Some(child) = map.get(key.as_str()) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Human-readable rendering of a value for conflict records: bare text for
/// strings, canonical JSON for everything else.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_keys_recursively() {
        let value = json!({"b": {"d": 1, "c": 2}, "a": 3});
        assert_eq!(canonical_json(&value), r#"{"a":3,"b":{"c":2,"d":1}}"#);
    }

    #[test]
    fn test_hash_is_insertion_order_independent() {
        let mut first = serde_json::Map::new();
        first.insert("title".into(), json!("A"));
        first.insert("note".into(), json!("x"));

        let mut second = serde_json::Map::new();
        second.insert("note".into(), json!("x"));
        second.insert("title".into(), json!("A"));

        assert_eq!(
            content_hash(&Value::Object(first)),
            content_hash(&Value::Object(second))
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_distinct() {
        let a = json!({"title": "A"});
        let b = json!({"title": "B"});
        assert_eq!(content_hash(&a), content_hash(&a));
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let value = json!({"text": "line1\nline2 \"quoted\" \\ tab\t"});
        assert_eq!(
            canonical_json(&value),
            r#"{"text":"line1\nline2 \"quoted\" \\ tab\t"}"#
        );
    }

    #[test]
    fn test_canonical_scalars_and_arrays() {
        assert_eq!(canonical_json(&json!(null)), "null");
        assert_eq!(canonical_json(&json!(true)), "true");
        assert_eq!(canonical_json(&json!(42)), "42");
        assert_eq!(canonical_json(&json!([1, "two", null])), r#"[1,"two",null]"#);
    }

    #[test]
    fn test_stringify_renders_strings_bare() {
        assert_eq!(stringify(&json!("A")), "A");
        assert_eq!(stringify(&json!(7)), "7");
        assert_eq!(stringify(&json!({"k": 1})), r#"{"k":1}"#);
    }
}
