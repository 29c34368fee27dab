//! `application/x-www-form-urlencoded` body encoding.
//!
//! Properties follow the same style/explode rules as query parameters.

use crate::error::Error;
use crate::request::parameter::encode_query_pairs;
use crate::schema::models::{EncodingObject, ParameterStyle};
use indexmap::IndexMap;
use serde_json::Value;

/// Encodes an object value as a form body.
///
/// # Errors
/// The value must be an object.
pub fn encode_form(
    value: &Value,
    encoding: &IndexMap<String, EncodingObject>,
) -> Result<Vec<u8>, Error> {
    let Value::Object(fields) = value else {
        return Err(Error::unprocessable(
            "form-urlencoded bodies require an object value",
        ));
    };

    let mut pairs: Vec<(String, String)> = Vec::new();
    for (name, entry) in fields {
        if entry.is_null() {
            continue;
        }
        let field_encoding = encoding.get(name);
        let style = field_encoding
            .and_then(|e| e.style)
            .unwrap_or(ParameterStyle::Form);
        let explode = field_encoding.and_then(|e| e.explode).unwrap_or(true);
        let allow_reserved = field_encoding.is_some_and(|e| e.allow_reserved);
        pairs.extend(encode_query_pairs(name, entry, style, explode, allow_reserved));
    }

    let body = pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    Ok(body.into_bytes())
}
