//! `multipart/form-data` body assembly.
//!
//! One part per object property. Each part's content type comes from the
//! request body's per-property encoding when declared, otherwise strings
//! are sent as text and composite values as JSON. The body is assembled
//! into a buffer so retries resend identical bytes.

use crate::error::Error;
use crate::request::parameter::scalar_to_string;
use crate::schema::models::EncodingObject;
use indexmap::IndexMap;
use serde_json::Value;

/// An assembled multipart body and the boundary used.
pub struct MultipartBody {
    pub bytes: Vec<u8>,
    pub boundary: String,
}

/// Encodes an object value as multipart/form-data.
///
/// # Errors
/// The value must be an object.
pub fn encode_multipart(
    value: &Value,
    encoding: &IndexMap<String, EncodingObject>,
) -> Result<MultipartBody, Error> {
    let Value::Object(fields) = value else {
        return Err(Error::unprocessable(
            "multipart bodies require an object value",
        ));
    };

    let boundary = generate_boundary();
    let mut bytes = Vec::new();

    for (name, entry) in fields {
        if entry.is_null() {
            continue;
        }
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        bytes.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"").as_bytes(),
        );

        let field_encoding = encoding.get(name);
        let content_type = field_encoding
            .and_then(|e| e.content_type.first().cloned())
            .or_else(|| default_part_content_type(entry));

        if let Some(content_type) = &content_type {
            bytes.extend_from_slice(format!("\r\nContent-Type: {content_type}").as_bytes());
        }
        bytes.extend_from_slice(b"\r\n\r\n");

        match entry {
            Value::Array(_) | Value::Object(_) => {
                let encoded = serde_json::to_vec(entry)?;
                bytes.extend_from_slice(&encoded);
            }
            scalar => bytes.extend_from_slice(scalar_to_string(scalar).as_bytes()),
        }
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Ok(MultipartBody { bytes, boundary })
}

fn default_part_content_type(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => Some("application/json".to_string()),
        _ => None,
    }
}

fn generate_boundary() -> String {
    let mut tail = String::with_capacity(24);
    for _ in 0..24 {
        let digit = fastrand::u8(0..36);
        let ch = if digit < 10 {
            (b'0' + digit) as char
        } else {
            (b'a' + digit - 10) as char
        };
        tail.push(ch);
    }
    format!("prism-{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_carry_disposition_and_values() {
        let body = encode_multipart(
            &json!({"additionalMetadata": "notes", "count": 2}),
            &IndexMap::new(),
        )
        .unwrap();
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains("Content-Disposition: form-data; name=\"additionalMetadata\""));
        assert!(text.contains("notes"));
        assert!(text.contains("Content-Disposition: form-data; name=\"count\""));
        assert!(text.ends_with(&format!("--{}--\r\n", body.boundary)));
    }

    #[test]
    fn composite_parts_are_json_with_content_type() {
        let body = encode_multipart(&json!({"meta": {"a": 1}}), &IndexMap::new()).unwrap();
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains("Content-Type: application/json"));
        assert!(text.contains("{\"a\":1}"));
    }

    #[test]
    fn declared_part_content_type_wins() {
        let mut encoding = IndexMap::new();
        encoding.insert(
            "file".to_string(),
            EncodingObject {
                content_type: vec!["application/octet-stream".to_string()],
                ..EncodingObject::default()
            },
        );
        let body = encode_multipart(&json!({"file": "binarydata"}), &encoding).unwrap();
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains("Content-Type: application/octet-stream"));
    }
}
