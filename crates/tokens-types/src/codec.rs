//! JSON codec for the string-to-string maps carried in relation data.
//!
//! Peer payloads are schema-on-read: a value is only trusted once it has
//! been decoded into a flat `string → string` map. Absent and blank values
//! decode to an empty map, which is distinct from a malformed value.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Decodes a relation data value into a string map.
///
/// `None` and whitespace-only input decode to an empty map. Anything other
/// than a JSON object whose members are all strings is rejected.
///
/// # Errors
///
/// Returns `DecodeError::Json` for malformed JSON, `DecodeError::NotAnObject`
/// for arrays, scalars and `null`, and `DecodeError::NonStringValue` for the
/// first member whose value is not a string.
pub fn decode_map(raw: Option<&str>) -> Result<BTreeMap<String, String>, DecodeError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(BTreeMap::new()),
        Some(raw) => raw,
    };

    let object = match serde_json::from_str::<Value>(raw)? {
        Value::Object(object) => object,
        other => {
            return Err(DecodeError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let mut map = BTreeMap::new();
    for (key, value) in object {
        match value {
            Value::String(s) => {
                map.insert(key, s);
            }
            other => {
                return Err(DecodeError::NonStringValue {
                    found: json_kind(&other),
                    key,
                })
            }
        }
    }
    Ok(map)
}

/// Encodes a string map as a JSON object with keys in sorted order.
pub fn encode_map(map: &BTreeMap<String, String>) -> String {
    let object: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(object).to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
