//! Canonical JSON: object keys sorted bytewise, no insignificant whitespace.
//!
//! Ledger MACs and seal hashes are computed over these bytes, so the output
//! must not depend on map ordering features enabled elsewhere in the build.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ArbiterError, Result};

/// Serialize any value to canonical JSON bytes.
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)
        .map_err(|e| ArbiterError::Internal(format!("canonical encode failed: {e}")))?;
    canonicalize(&v)
}

/// Serialize any value to a canonical JSON string.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_vec(value)?;
    String::from_utf8(bytes)
        .map_err(|e| ArbiterError::Internal(format!("canonical utf8 failed: {e}")))
}

/// Render an already-built JSON value canonically.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    write_value(value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_str(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_str(k, out)?;
                out.push(b':');
                if let Some(v) = map.get(k) {
                    write_value(v, out)?;
                }
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_str(s: &str, out: &mut Vec<u8>) -> Result<()> {
    let quoted = serde_json::to_string(s)
        .map_err(|e| ArbiterError::Internal(format!("canonical string failed: {e}")))?;
    out.extend_from_slice(quoted.as_bytes());
    Ok(())
}
