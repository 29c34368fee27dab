//! Argument binding: engine arguments → an executable HTTP request.
//!
//! Splits arguments by parameter location, expands the URL template,
//! assembles the query string and headers, serializes the body and
//! resolves the runtime retry/timeout policy. The produced
//! [`RetryableRequest`] carries the body as a buffer so retries resend
//! identical bytes.

use crate::codec::compression::{compress, ContentEncoding};
use crate::codec::CodecRegistry;
use crate::config::models::ForwardHeadersConfig;
use crate::convert::distributed::HTTP_OPTIONS_ARGUMENT;
use crate::error::Error;
use crate::request::models::RetryableRequest;
use crate::request::parameter::{
    encode_header_value, encode_path_segment, encode_query_pairs,
};
use crate::schema::models::{
    Catalog, OperationInfo, ParameterLocation, ParameterStyle, TypeSchema,
};
use crate::schema::security::{RuntimeSettings, ServerConfig, Settings};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;

/// Headers never relayed from the incoming request.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "host",
];

/// Everything the binder needs besides the operation and its arguments.
pub struct BindContext<'a> {
    pub catalog: &'a Catalog,
    pub settings: &'a Settings,
    pub runtime: &'a RuntimeSettings,
    pub forward_headers: &'a ForwardHeadersConfig,
    pub codecs: &'a CodecRegistry,
}

/// Builds the outbound request for one operation call against one server.
///
/// # Errors
/// Missing/invalid arguments, unresolved URL template variables, and body
/// serialization failures.
pub fn build_request(
    ctx: &BindContext<'_>,
    operation: &OperationInfo,
    arguments: &BTreeMap<String, Value>,
    server: &ServerConfig,
) -> Result<RetryableRequest, Error> {
    let mut path_params: Vec<(String, String)> = Vec::new();
    let mut query_pairs: Vec<(String, String)> = Vec::new();
    let mut header_params: Vec<(String, String)> = Vec::new();
    let mut body_value: Option<Value> = None;

    let forward_field = ctx.forward_headers.active_argument_field();

    for (arg_name, info) in &operation.arguments {
        if arg_name == HTTP_OPTIONS_ARGUMENT || Some(arg_name.as_str()) == forward_field {
            continue;
        }
        let value = arguments.get(arg_name).cloned().unwrap_or(Value::Null);
        if value.is_null() {
            if !info.argument_type.is_nullable() {
                return Err(Error::missing_required_argument(arg_name.clone()));
            }
            continue;
        }
        if let Some(schema) = &info.http.schema {
            validate_argument(arg_name, &value, schema)?;
        }

        let encoding = info.http.encoding.clone().unwrap_or_default();
        match info.http.location {
            ParameterLocation::Path => {
                let style = encoding.style.unwrap_or(ParameterStyle::Simple);
                let explode = encoding.explode.unwrap_or(false);
                path_params.push((
                    info.http.name.clone(),
                    encode_path_segment(&info.http.name, &value, style, explode),
                ));
            }
            ParameterLocation::Query => {
                let style = encoding.style.unwrap_or(ParameterStyle::Form);
                let explode = encoding.explode.unwrap_or(true);
                query_pairs.extend(encode_query_pairs(
                    &info.http.name,
                    &value,
                    style,
                    explode,
                    encoding.allow_reserved,
                ));
            }
            ParameterLocation::Header => {
                let explode = encoding.explode.unwrap_or(false);
                header_params.push((
                    info.http.name.clone(),
                    encode_header_value(&value, explode),
                ));
            }
            ParameterLocation::Body
            | ParameterLocation::FormData
            | ParameterLocation::FormUrlEncoded => {
                body_value = Some(value);
            }
        }
    }

    // URL template expansion.
    let base_url = server.url.resolve()?;
    let mut path = operation.request.url.clone();
    for (name, encoded) in &path_params {
        path = path.replace(&format!("{{{name}}}"), encoded);
    }
    if path.contains('{') || path.contains('}') {
        return Err(Error::unprocessable(format!(
            "unresolved path template variables in '{path}'"
        )));
    }
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if !query_pairs.is_empty() {
        let query = query_pairs
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);
    }

    // Headers: schema-wide, then server, then parameters, then forwarded.
    let mut headers = HeaderMap::new();
    for (name, source) in ctx.settings.headers.iter().chain(server.headers.iter()) {
        insert_header(&mut headers, name, &source.resolve()?)?;
    }
    for (name, value) in header_params {
        insert_header(&mut headers, &name, &value)?;
    }
    if let Some(field) = forward_field {
        if let Some(forwarded) = arguments.get(field) {
            merge_forwarded_headers(&mut headers, forwarded)?;
        }
    }

    // Body serialization.
    let mut body = None;
    let mut content_type = None;
    if let (Some(body_info), Some(value)) = (&operation.request.request_body, body_value) {
        let body_argument = operation
            .arguments
            .values()
            .find(|info| {
                matches!(
                    info.http.location,
                    ParameterLocation::Body
                        | ParameterLocation::FormData
                        | ParameterLocation::FormUrlEncoded
                )
            })
            .map(|info| info.argument_type.clone())
            .ok_or_else(|| Error::internal("request body declared without a body argument"))?;
        let encoded = ctx.codecs.encode_body(
            &body_info.content_type,
            &value,
            &body_argument,
            &body_info.encoding,
            ctx.catalog,
        )?;
        insert_header(&mut headers, CONTENT_TYPE.as_str(), &encoded.content_type)?;
        content_type = Some(encoded.content_type);
        body = Some(encoded.bytes);
    }

    // A configured Content-Encoding header compresses the buffered body.
    let coding = headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .and_then(ContentEncoding::parse);
    if let Some(coding) = coding {
        if let Some(bytes) = body.take() {
            body = Some(compress(coding, &bytes)?);
        }
    }

    let method = Method::from_bytes(operation.request.method.to_uppercase().as_bytes())
        .map_err(|_| Error::bad_request(format!("invalid HTTP method '{}'", operation.request.method)))?;

    Ok(RetryableRequest {
        url,
        method,
        headers,
        body,
        content_type,
        timeout_secs: ctx.runtime.timeout_secs()?,
        retry: ctx.runtime.retry_policy()?,
        security: operation
            .request
            .security
            .clone()
            .or_else(|| ctx.settings.security.clone()),
        sensitive_values: Vec::new(),
    })
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Error> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::unprocessable(format!("invalid header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::unprocessable(format!("invalid header value for '{name:?}': {e}")))?;
    headers.insert(name, value);
    Ok(())
}

/// Merges the forwarded-headers argument into the outgoing header map,
/// dropping hop-by-hop headers.
fn merge_forwarded_headers(headers: &mut HeaderMap, forwarded: &Value) -> Result<(), Error> {
    let Value::Object(entries) = forwarded else {
        return Err(Error::unprocessable(
            "forwarded headers argument must be an object of strings",
        ));
    };
    for (name, value) in entries {
        if HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Value::String(value) = value else {
            return Err(Error::unprocessable(format!(
                "forwarded header '{name}' must be a string"
            )));
        };
        insert_header(headers, name, value)?;
    }
    Ok(())
}

/// Validates a scalar argument against its declared schema facets.
fn validate_argument(name: &str, value: &Value, schema: &TypeSchema) -> Result<(), Error> {
    if let Value::String(text) = value {
        match schema.format.as_deref() {
            Some("date") => {
                if chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_err() {
                    return Err(Error::unprocessable(format!(
                        "argument '{name}' is not a valid date: '{text}'"
                    )));
                }
            }
            Some("date-time") => {
                if chrono::DateTime::parse_from_rfc3339(text).is_err() {
                    return Err(Error::unprocessable(format!(
                        "argument '{name}' is not a valid RFC 3339 timestamp: '{text}'"
                    )));
                }
            }
            _ => {}
        }
        if let Some(pattern) = &schema.pattern {
            if let Ok(regex) = regex::Regex::new(pattern) {
                if !regex.is_match(text) {
                    return Err(Error::unprocessable(format!(
                        "argument '{name}' does not match pattern '{pattern}'"
                    )));
                }
            }
        }
        let length = text.chars().count() as u64;
        if let Some(min) = schema.min_length {
            if length < min {
                return Err(Error::unprocessable(format!(
                    "argument '{name}' is shorter than {min} characters"
                )));
            }
        }
        if let Some(max) = schema.max_length {
            if length > max {
                return Err(Error::unprocessable(format!(
                    "argument '{name}' is longer than {max} characters"
                )));
            }
        }
    }
    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.minimum {
            if number < min {
                return Err(Error::unprocessable(format!(
                    "argument '{name}' is below the minimum {min}"
                )));
            }
        }
        if let Some(max) = schema.maximum {
            if number > max {
                return Err(Error::unprocessable(format!(
                    "argument '{name}' is above the maximum {max}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value_source::ValueSource;
    use crate::schema::models::{
        ArgumentInfo as Arg, EncodingObject, OperationRequest, RequestParameter, ResponseInfo,
        Type,
    };
    use indexmap::IndexMap;

    fn server() -> ServerConfig {
        ServerConfig {
            id: "server-1".into(),
            url: ValueSource::Literal("http://localhost:4000".into()),
            headers: IndexMap::new(),
            security: None,
            security_schemes: IndexMap::new(),
            tls: None,
        }
    }

    fn operation() -> OperationInfo {
        let mut arguments = IndexMap::new();
        arguments.insert(
            "petId".to_string(),
            Arg {
                argument_type: Type::named("Int64"),
                description: None,
                http: RequestParameter {
                    name: "petId".into(),
                    location: ParameterLocation::Path,
                    schema: Some(TypeSchema::scalar("integer")),
                    encoding: None,
                },
            },
        );
        arguments.insert(
            "status".to_string(),
            Arg {
                argument_type: Type::nullable(Type::named("String")),
                description: None,
                http: RequestParameter {
                    name: "status".into(),
                    location: ParameterLocation::Query,
                    schema: Some(TypeSchema::scalar("string")),
                    encoding: Some(EncodingObject {
                        style: Some(ParameterStyle::Form),
                        explode: Some(true),
                        ..EncodingObject::default()
                    }),
                },
            },
        );
        OperationInfo {
            request: OperationRequest {
                url: "/pet/{petId}".into(),
                method: "get".into(),
                request_body: None,
                response: ResponseInfo {
                    content_type: "application/json".into(),
                },
                security: None,
                servers: None,
                distributed: false,
            },
            arguments,
            result_type: Type::named("JSON"),
            description: None,
        }
    }

    fn context<'a>(
        catalog: &'a Catalog,
        settings: &'a Settings,
        runtime: &'a RuntimeSettings,
        forward: &'a ForwardHeadersConfig,
        codecs: &'a CodecRegistry,
    ) -> BindContext<'a> {
        BindContext {
            catalog,
            settings,
            runtime,
            forward_headers: forward,
            codecs,
        }
    }

    #[test]
    fn path_and_query_parameters_build_the_url() {
        let catalog = Catalog::default();
        let settings = Settings::default();
        let runtime = RuntimeSettings::default();
        let forward = ForwardHeadersConfig::default();
        let codecs = CodecRegistry::new();
        let ctx = context(&catalog, &settings, &runtime, &forward, &codecs);

        let mut arguments = BTreeMap::new();
        arguments.insert("petId".to_string(), serde_json::json!(42));
        arguments.insert("status".to_string(), serde_json::json!("available"));

        let request = build_request(&ctx, &operation(), &arguments, &server()).unwrap();
        assert_eq!(request.url, "http://localhost:4000/pet/42?status=available");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.timeout_secs, 30);
    }

    #[test]
    fn missing_required_path_parameter_is_rejected() {
        let catalog = Catalog::default();
        let settings = Settings::default();
        let runtime = RuntimeSettings::default();
        let forward = ForwardHeadersConfig::default();
        let codecs = CodecRegistry::new();
        let ctx = context(&catalog, &settings, &runtime, &forward, &codecs);

        let err = build_request(&ctx, &operation(), &BTreeMap::new(), &server()).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn forwarded_headers_merge_but_skip_hop_by_hop() {
        let catalog = Catalog::default();
        let settings = Settings::default();
        let runtime = RuntimeSettings::default();
        let forward = ForwardHeadersConfig {
            enabled: true,
            argument_field: Some("headers".into()),
            response_headers: None,
        };
        let codecs = CodecRegistry::new();
        let ctx = context(&catalog, &settings, &runtime, &forward, &codecs);

        let mut arguments = BTreeMap::new();
        arguments.insert("petId".to_string(), serde_json::json!(1));
        arguments.insert(
            "headers".to_string(),
            serde_json::json!({
                "X-Custom-Header": "This is a test",
                "Connection": "keep-alive"
            }),
        );

        let request = build_request(&ctx, &operation(), &arguments, &server()).unwrap();
        assert_eq!(
            request.headers.get("x-custom-header").unwrap(),
            "This is a test"
        );
        assert!(request.headers.get("connection").is_none());
    }

    #[test]
    fn pattern_validation_rejects_bad_values() {
        let catalog = Catalog::default();
        let settings = Settings::default();
        let runtime = RuntimeSettings::default();
        let forward = ForwardHeadersConfig::default();
        let codecs = CodecRegistry::new();
        let ctx = context(&catalog, &settings, &runtime, &forward, &codecs);

        let mut op = operation();
        if let Some(arg) = op.arguments.get_mut("status") {
            arg.http.schema = Some(TypeSchema {
                pattern: Some("^[a-z]+$".into()),
                ..TypeSchema::scalar("string")
            });
        }
        let mut arguments = BTreeMap::new();
        arguments.insert("petId".to_string(), serde_json::json!(1));
        arguments.insert("status".to_string(), serde_json::json!("NOT LOWER"));

        let err = build_request(&ctx, &op, &arguments, &server()).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn date_arguments_must_parse() {
        let catalog = Catalog::default();
        let settings = Settings::default();
        let runtime = RuntimeSettings::default();
        let forward = ForwardHeadersConfig::default();
        let codecs = CodecRegistry::new();
        let ctx = context(&catalog, &settings, &runtime, &forward, &codecs);

        let mut op = operation();
        if let Some(arg) = op.arguments.get_mut("status") {
            arg.http.schema = Some(TypeSchema {
                format: Some("date".into()),
                ..TypeSchema::scalar("string")
            });
        }
        let mut arguments = BTreeMap::new();
        arguments.insert("petId".to_string(), serde_json::json!(1));
        arguments.insert("status".to_string(), serde_json::json!("2024-13-40"));
        assert!(build_request(&ctx, &op, &arguments, &server()).is_err());

        arguments.insert("status".to_string(), serde_json::json!("2024-06-01"));
        assert!(build_request(&ctx, &op, &arguments, &server()).is_ok());
    }

    #[test]
    fn identical_arguments_yield_identical_bodies() {
        use crate::schema::models::RequestBodyInfo;

        let catalog = Catalog::default();
        let settings = Settings::default();
        let runtime = RuntimeSettings::default();
        let forward = ForwardHeadersConfig::default();
        let codecs = CodecRegistry::new();
        let ctx = context(&catalog, &settings, &runtime, &forward, &codecs);

        let mut op = operation();
        op.request.method = "post".into();
        op.request.url = "/pet".into();
        op.arguments.shift_remove("petId");
        op.request.request_body = Some(RequestBodyInfo {
            content_type: "application/json".into(),
            encoding: IndexMap::new(),
        });
        op.arguments.insert(
            "body".to_string(),
            Arg {
                argument_type: Type::named("JSON"),
                description: None,
                http: RequestParameter {
                    name: "body".into(),
                    location: ParameterLocation::Body,
                    schema: None,
                    encoding: None,
                },
            },
        );

        let mut arguments = BTreeMap::new();
        arguments.insert(
            "body".to_string(),
            serde_json::json!({"name": "Rex", "tags": ["a", "b"]}),
        );

        let first = build_request(&ctx, &op, &arguments, &server()).unwrap();
        let second = build_request(&ctx, &op, &arguments, &server()).unwrap();
        assert_eq!(first.body, second.body);
        assert!(first.body.is_some());
    }
}
