//! Body codecs: serialization and deserialization per content type.
//!
//! The registry is an explicit dependency of the request builder and the
//! executor rather than process-wide state, so tests can substitute it.

pub mod compression;
pub mod form;
pub mod multipart;
pub mod ndjson;
pub mod xml;

use crate::error::Error;
use crate::request::parameter::scalar_to_string;
use crate::schema::models::{Catalog, EncodingObject, Type};
use base64::Engine;
use indexmap::IndexMap;
use serde_json::Value;

/// A serialized request body and its final content type (multipart carries
/// the generated boundary).
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Content-type driven encoder/decoder dispatch.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    _private: (),
}

impl CodecRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Serializes a request body value.
    ///
    /// # Errors
    /// Values that do not fit the content type's required shape.
    pub fn encode_body(
        &self,
        content_type: &str,
        value: &Value,
        body_type: &Type,
        encoding: &IndexMap<String, EncodingObject>,
        catalog: &Catalog,
    ) -> Result<EncodedBody, Error> {
        let mime = normalize(content_type);
        let body = match mime.as_str() {
            "application/x-www-form-urlencoded" => EncodedBody {
                bytes: form::encode_form(value, encoding)?,
                content_type: mime,
            },
            "multipart/form-data" => {
                let multipart = multipart::encode_multipart(value, encoding)?;
                EncodedBody {
                    content_type: format!("multipart/form-data; boundary={}", multipart.boundary),
                    bytes: multipart.bytes,
                }
            }
            "application/x-ndjson" => EncodedBody {
                bytes: ndjson::encode_ndjson(value)?,
                content_type: mime,
            },
            "application/octet-stream" => EncodedBody {
                bytes: match value {
                    Value::String(text) => text.clone().into_bytes(),
                    other => serde_json::to_vec(other)?,
                },
                content_type: mime,
            },
            _ if is_xml(&mime) => EncodedBody {
                bytes: xml::encode_xml(value, body_type, catalog)?,
                content_type: mime,
            },
            _ if mime.starts_with("text/") => EncodedBody {
                bytes: scalar_to_string(value).into_bytes(),
                content_type: mime,
            },
            _ => EncodedBody {
                bytes: serde_json::to_vec(value)?,
                content_type: mime,
            },
        };
        Ok(body)
    }

    /// Deserializes a response body according to its `Content-Type`.
    ///
    /// # Errors
    /// Bodies that do not decode under the declared content type.
    pub fn decode_body(
        &self,
        content_type: &str,
        bytes: &[u8],
        result_type: &Type,
        catalog: &Catalog,
    ) -> Result<Value, Error> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        let mime = normalize(content_type);
        match mime.as_str() {
            "application/x-ndjson" => ndjson::decode_ndjson(bytes),
            // SVG is XML-suffixed but treated as text.
            "image/svg+xml" => Ok(text_value(bytes)),
            "application/octet-stream" => Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            )),
            _ if is_json(&mime) => serde_json::from_slice(bytes)
                .map_err(|e| Error::decode(&mime, e.to_string())),
            _ if is_xml(&mime) => xml::decode_xml(bytes, result_type, catalog),
            _ if mime.starts_with("text/") => Ok(text_value(bytes)),
            _ if mime.starts_with("image/") || mime.starts_with("video/") => Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            )),
            // Unknown types decode as JSON on a best-effort basis.
            _ => Ok(serde_json::from_slice(bytes).unwrap_or_else(|_| text_value(bytes))),
        }
    }
}

fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

fn is_xml(mime: &str) -> bool {
    mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml")
}

fn text_value(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CodecRegistry {
        CodecRegistry::new()
    }

    #[test]
    fn json_suffix_types_decode_as_json() {
        let catalog = Catalog::default();
        let decoded = registry()
            .decode_body(
                "application/vnd.api+json; charset=utf-8",
                br#"{"ok": true}"#,
                &Type::named("JSON"),
                &catalog,
            )
            .unwrap();
        assert_eq!(decoded, json!({"ok": true}));
    }

    #[test]
    fn svg_decodes_as_text_despite_xml_suffix() {
        let catalog = Catalog::default();
        let decoded = registry()
            .decode_body(
                "image/svg+xml",
                b"<svg></svg>",
                &Type::named("String"),
                &catalog,
            )
            .unwrap();
        assert_eq!(decoded, json!("<svg></svg>"));
    }

    #[test]
    fn octet_stream_decodes_as_base64() {
        let catalog = Catalog::default();
        let decoded = registry()
            .decode_body(
                "application/octet-stream",
                &[0xde, 0xad, 0xbe, 0xef],
                &Type::named("Bytes"),
                &catalog,
            )
            .unwrap();
        assert_eq!(decoded, json!("3q2+7w=="));
    }

    #[test]
    fn unknown_types_fall_back_to_json_then_text() {
        let catalog = Catalog::default();
        let json_body = registry()
            .decode_body("application/unknown", b"[1,2]", &Type::named("JSON"), &catalog)
            .unwrap();
        assert_eq!(json_body, json!([1, 2]));

        let text_body = registry()
            .decode_body("application/unknown", b"not json", &Type::named("JSON"), &catalog)
            .unwrap();
        assert_eq!(text_body, json!("not json"));
    }

    #[test]
    fn empty_bodies_decode_to_null() {
        let catalog = Catalog::default();
        let decoded = registry()
            .decode_body("application/json", b"", &Type::named("JSON"), &catalog)
            .unwrap();
        assert_eq!(decoded, Value::Null);
    }

    #[test]
    fn identical_input_produces_identical_bodies() {
        let catalog = Catalog::default();
        let value = json!({"name": "Rex", "tags": ["a", "b"]});
        let first = registry()
            .encode_body(
                "application/json",
                &value,
                &Type::named("JSON"),
                &IndexMap::new(),
                &catalog,
            )
            .unwrap();
        let second = registry()
            .encode_body(
                "application/json",
                &value,
                &Type::named("JSON"),
                &IndexMap::new(),
                &catalog,
            )
            .unwrap();
        assert_eq!(first.bytes, second.bytes);
    }
}
