//! Newline-delimited JSON bodies (`application/x-ndjson`).

use crate::error::Error;
use serde_json::Value;

/// Encodes a value as ndjson: one JSON document per line for arrays, a
/// single line otherwise.
///
/// # Errors
/// Serialization failures only.
pub fn encode_ndjson(value: &Value) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    match value {
        Value::Array(items) => {
            for item in items {
                serde_json::to_writer(&mut bytes, item)?;
                bytes.push(b'\n');
            }
        }
        other => {
            serde_json::to_writer(&mut bytes, other)?;
            bytes.push(b'\n');
        }
    }
    Ok(bytes)
}

/// Decodes an ndjson body into an array of values. Blank lines are skipped;
/// a partial trailing line is an error.
///
/// # Errors
/// Invalid UTF-8 or any line that is not a complete JSON document.
pub fn decode_ndjson(bytes: &[u8]) -> Result<Value, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::decode("application/x-ndjson", e.to_string()))?;

    let mut rows = Vec::new();
    for (index, line) in text.split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let row: Value = serde_json::from_str(line).map_err(|e| {
            Error::decode(
                "application/x-ndjson",
                format!("line {}: {e}", index + 1),
            )
        })?;
        rows.push(row);
    }
    Ok(Value::Array(rows))
}
