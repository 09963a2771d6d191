//! JSON, urlencoded form and plain text bodies.

use serde_json::{Map, Value};

use super::ERR_PARSE_FAILED;
use crate::error::{Result, RpcError};

/// Decode a JSON body.
///
/// Whitespace-only bodies yield `{}`. In strict mode the top level must be
/// an object or an array.
pub(crate) fn decode_json(bytes: &[u8], strict: bool) -> Result<Value> {
    let trimmed = bytes.trim_ascii_start();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if strict && !matches!(trimmed[0], b'{' | b'[') {
        return Err(RpcError::body(
            "invalid JSON, only supports object and array",
            ERR_PARSE_FAILED,
        ));
    }
    serde_json::from_slice(trimmed)
        .map_err(|e| RpcError::body(format!("invalid JSON: {e}"), ERR_PARSE_FAILED))
}

/// Decode an `application/x-www-form-urlencoded` body.
///
/// Values stay strings. Bracketed keys nest: `user[name]=ada` becomes
/// `{"user": {"name": "ada"}}` and `ids[]=1&ids[]=2` becomes
/// `{"ids": ["1", "2"]}`. A key that appears more than once becomes an array
/// of its values in order. Keys with unbalanced brackets are kept verbatim.
pub(crate) fn decode_form(bytes: &[u8]) -> Result<Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| RpcError::body(format!("invalid form body: {e}"), ERR_PARSE_FAILED))?;

    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        assign(&mut root, &split_key(&key), Value::String(value));
    }
    Ok(root)
}

/// Split `a[b][]` into `["a", "b", ""]`.
fn split_key(key: &str) -> Vec<&str> {
    let open = match key.find('[') {
        Some(open) if open > 0 => open,
        _ => return vec![key],
    };

    let mut segments = vec![&key[..open]];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return vec![key];
        };
        segments.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key];
    }
    segments
}

/// Place `value` at `path` below `node`.
///
/// An empty segment appends to an array.
fn assign(node: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        combine(node, value);
        return;
    };

    if head.is_empty() {
        let array = as_array(node);
        if rest.is_empty() {
            array.push(value);
        } else {
            let mut child = Value::Null;
            assign(&mut child, rest, value);
            array.push(child);
        }
        return;
    }

    let child = as_object(node)
        .entry(head.to_string())
        .or_insert(Value::Null);
    assign(child, rest, value);
}

/// Merge a repeated value into an existing slot.
fn combine(node: &mut Value, value: Value) {
    match node {
        Value::Null => *node = value,
        Value::Array(values) => values.push(value),
        existing => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

fn as_array(node: &mut Value) -> &mut Vec<Value> {
    if !node.is_array() {
        *node = match node.take() {
            Value::Null => Value::Array(Vec::new()),
            other => Value::Array(vec![other]),
        };
    }
    match node {
        Value::Array(values) => values,
        _ => unreachable!("converted to an array above"),
    }
}

fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        // `a[]=x&a[k]=y`: earlier entries are keyed by index
        let map = match node.take() {
            Value::Null => Map::new(),
            Value::Array(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            other => Map::from_iter([("0".to_string(), other)]),
        };
        *node = Value::Object(map);
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("converted to an object above"),
    }
}

/// Decode a `text/*` body into a string argument.
pub(crate) fn decode_text(bytes: &[u8]) -> Result<Value> {
    std::str::from_utf8(bytes)
        .map(|s| Value::String(s.to_string()))
        .map_err(|e| RpcError::body(format!("invalid UTF-8 text: {e}"), ERR_PARSE_FAILED))
}
