//! Canonical JSON serialization
//!
//! Object keys are sorted, arrays keep their order and no whitespace is
//! emitted. Strings are JSON-escaped so distinct inputs never collide.

use serde_json::Value as JsonValue;

/// Generate canonical JSON (sorted keys)
#[must_use]
pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                if let Some(val) = map.get(key) {
                    write_canonical(val, out);
                }
            }
            out.push('}');
        }
        JsonValue::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        JsonValue::String(s) => write_string(s, out),
        JsonValue::Number(n) => out.push_str(&n.to_string()),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Null => out.push_str("null"),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Display on a JSON string value yields the escaped, quoted form.
    out.push_str(&JsonValue::String(s.to_owned()).to_string());
}
