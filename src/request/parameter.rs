//! OpenAPI parameter serialization: the style/explode matrix.
//!
//! Query parameters default to `form`, path parameters to `simple`, header
//! parameters to `simple`. Exploded arrays and objects repeat the key;
//! non-exploded values pack into one comma-joined entry.

use serde_json::Value;

use crate::schema::models::ParameterStyle;

/// Renders a scalar JSON value the way it appears on the wire.
#[must_use]
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode(component: &str, allow_reserved: bool) -> String {
    if allow_reserved {
        component.to_string()
    } else {
        urlencoding::encode(component).into_owned()
    }
}

/// Encodes one query parameter into `key=value` pairs (already
/// percent-encoded); the caller joins pairs with `&`.
#[must_use]
pub fn encode_query_pairs(
    name: &str,
    value: &Value,
    style: ParameterStyle,
    explode: bool,
    allow_reserved: bool,
) -> Vec<(String, String)> {
    let enc = |component: &str| encode(component, allow_reserved);
    let key = encode(name, false);

    match (style, value) {
        (ParameterStyle::DeepObject, Value::Object(fields)) => fields
            .iter()
            .map(|(prop, entry)| {
                (
                    format!("{key}[{}]", encode(prop, false)),
                    enc(&scalar_to_string(entry)),
                )
            })
            .collect(),
        (_, Value::Array(items)) => {
            if explode {
                return items
                    .iter()
                    .map(|item| (key.clone(), enc(&scalar_to_string(item))))
                    .collect();
            }
            let separator = match style {
                ParameterStyle::SpaceDelimited => "%20",
                ParameterStyle::PipeDelimited => "|",
                _ => ",",
            };
            let joined = items
                .iter()
                .map(|item| enc(&scalar_to_string(item)))
                .collect::<Vec<_>>()
                .join(separator);
            vec![(key, joined)]
        }
        (_, Value::Object(fields)) => {
            if explode {
                fields
                    .iter()
                    .map(|(prop, entry)| (encode(prop, false), enc(&scalar_to_string(entry))))
                    .collect()
            } else {
                let joined = fields
                    .iter()
                    .flat_map(|(prop, entry)| {
                        [encode(prop, false), enc(&scalar_to_string(entry))]
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                vec![(key, joined)]
            }
        }
        (_, scalar) => vec![(key, enc(&scalar_to_string(scalar)))],
    }
}

/// Encodes a path parameter into the text substituted for `{name}`.
#[must_use]
pub fn encode_path_segment(
    name: &str,
    value: &Value,
    style: ParameterStyle,
    explode: bool,
) -> String {
    let enc = |component: &str| encode(component, false);
    match style {
        ParameterStyle::Label => {
            let body = match value {
                Value::Array(items) => {
                    let separator = if explode { "." } else { "," };
                    items
                        .iter()
                        .map(|item| enc(&scalar_to_string(item)))
                        .collect::<Vec<_>>()
                        .join(separator)
                }
                Value::Object(fields) => join_object(fields, explode, "."),
                scalar => enc(&scalar_to_string(scalar)),
            };
            format!(".{body}")
        }
        ParameterStyle::Matrix => match value {
            Value::Array(items) => {
                if explode {
                    items
                        .iter()
                        .map(|item| format!(";{name}={}", enc(&scalar_to_string(item))))
                        .collect()
                } else {
                    let joined = items
                        .iter()
                        .map(|item| enc(&scalar_to_string(item)))
                        .collect::<Vec<_>>()
                        .join(",");
                    format!(";{name}={joined}")
                }
            }
            Value::Object(fields) => {
                if explode {
                    fields
                        .iter()
                        .map(|(prop, entry)| {
                            format!(";{prop}={}", enc(&scalar_to_string(entry)))
                        })
                        .collect()
                } else {
                    format!(";{name}={}", join_object(fields, false, ","))
                }
            }
            scalar => format!(";{name}={}", enc(&scalar_to_string(scalar))),
        },
        // `simple` is the default for anything else.
        _ => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| enc(&scalar_to_string(item)))
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(fields) => join_object(fields, explode, ","),
            scalar => enc(&scalar_to_string(scalar)),
        },
    }
}

/// Encodes a header parameter value (`simple` style; no percent-encoding).
#[must_use]
pub fn encode_header_value(value: &Value, explode: bool) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(fields) => {
            if explode {
                fields
                    .iter()
                    .map(|(prop, entry)| format!("{prop}={}", scalar_to_string(entry)))
                    .collect::<Vec<_>>()
                    .join(",")
            } else {
                fields
                    .iter()
                    .flat_map(|(prop, entry)| [prop.clone(), scalar_to_string(entry)])
                    .collect::<Vec<_>>()
                    .join(",")
            }
        }
        scalar => scalar_to_string(scalar),
    }
}

fn join_object(fields: &serde_json::Map<String, Value>, explode: bool, separator: &str) -> String {
    if explode {
        fields
            .iter()
            .map(|(prop, entry)| {
                format!(
                    "{prop}={}",
                    encode(&scalar_to_string(entry), false)
                )
            })
            .collect::<Vec<_>>()
            .join(separator)
    } else {
        fields
            .iter()
            .flat_map(|(prop, entry)| {
                [prop.clone(), encode(&scalar_to_string(entry), false)]
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
