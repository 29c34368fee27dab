//! Error handling for the connector.
//!
//! All failures are funneled into a single [`Error`] type. External library
//! errors keep their own variants; everything the connector itself raises is
//! a [`Error::Connector`] with one of the [`ErrorKind`] categories, a message
//! and optional structured details. The kind decides the HTTP status the
//! host reports to the engine.

use serde::Serialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A connector-raised error with a category and structured details.
    #[error("{kind}: {message}")]
    Connector {
        kind: ErrorKind,
        message: Cow<'static, str>,
        details: Option<Value>,
    },

    /// The upstream service answered with a non-2xx status after retry
    /// exhaustion. The decoded (or raw) body travels with the error.
    #[error("upstream returned status {status}")]
    Upstream { status: u16, body: Value },

    /// The caller cancelled the request or the deadline expired.
    #[error("request was cancelled")]
    Cancelled,
}

/// Error categories raised by the connector itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration problems: missing config file, bad field format,
    /// unresolvable environment variables or TLS material.
    Config,
    /// OpenAPI conversion problems: unresolved `$ref`, unsupported schema
    /// or parameter shapes.
    Conversion,
    /// The engine sent something the connector cannot interpret: unknown
    /// collection/procedure, undecodable arguments.
    BadRequest,
    /// Arguments failed parameter validation, or forwarded headers /
    /// server selections are malformed.
    UnprocessableContent,
    /// Invariant violations: missing catalog types, body re-materialization
    /// failures.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "configuration error",
            Self::Conversion => "conversion error",
            Self::BadRequest => "bad request",
            Self::UnprocessableContent => "unprocessable content",
            Self::Internal => "internal error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wire representation of an error: `{message, details}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub details: Value,
}

impl Error {
    const fn connector(kind: ErrorKind, message: Cow<'static, str>, details: Option<Value>) -> Self {
        Self::Connector {
            kind,
            message,
            details,
        }
    }

    /// HTTP status the host should report for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Connector { kind, .. } => match kind {
                ErrorKind::BadRequest => 400,
                ErrorKind::UnprocessableContent => 422,
                ErrorKind::Config | ErrorKind::Conversion | ErrorKind::Internal => 500,
            },
            Self::Upstream { status, .. } => *status,
            Self::Cancelled => 499,
            _ => 500,
        }
    }

    /// Wire shape `{message, details{cause?}}` reported to the engine.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            Self::Connector {
                details: Some(d), ..
            } => d.clone(),
            Self::Upstream { body, .. } => json!({ "cause": body }),
            _ => Value::Object(serde_json::Map::new()),
        };
        ErrorResponse {
            message: self.to_string(),
            details,
        }
    }

    // ---- Config ----

    pub fn config(message: impl Into<String>) -> Self {
        Self::connector(ErrorKind::Config, Cow::Owned(message.into()), None)
    }

    pub fn missing_config_file(dir: impl Into<String>) -> Self {
        let dir = dir.into();
        Self::connector(
            ErrorKind::Config,
            Cow::Owned(format!("no config.{{json,yaml,yml}} found in '{dir}'")),
            Some(json!({ "dir": dir })),
        )
    }

    pub fn missing_env_var(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::connector(
            ErrorKind::Config,
            Cow::Owned(format!("required environment variable '{name}' is not set")),
            Some(json!({ "env": name })),
        )
    }

    pub fn invalid_value_source(reason: impl Into<String>) -> Self {
        Self::connector(ErrorKind::Config, Cow::Owned(reason.into()), None)
    }

    pub fn invalid_argument_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::connector(
            ErrorKind::Config,
            Cow::Owned(format!(
                "forwardHeaders.argumentField '{field}' does not match ^[A-Za-z_]\\w+$"
            )),
            Some(json!({ "argumentField": field })),
        )
    }

    pub fn invalid_tls_material(reason: impl Into<String>) -> Self {
        Self::connector(
            ErrorKind::Config,
            Cow::Owned(format!("unparseable TLS material: {}", reason.into())),
            None,
        )
    }

    /// A scheme that requires headers forwarding was used without it.
    pub fn headers_forwarding_required(scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        Self::connector(
            ErrorKind::Config,
            Cow::Owned(format!(
                "security scheme '{scheme}' requires forwardHeaders to be enabled"
            )),
            Some(json!({ "scheme": scheme })),
        )
    }

    // ---- Conversion ----

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::connector(ErrorKind::Conversion, Cow::Owned(message.into()), None)
    }

    pub fn unresolved_reference(reference: impl Into<String>) -> Self {
        let reference = reference.into();
        Self::connector(
            ErrorKind::Conversion,
            Cow::Owned(format!("unresolved reference '{reference}'")),
            Some(json!({ "ref": reference })),
        )
    }

    pub fn unsupported_schema(location: impl Into<String>, reason: impl Into<String>) -> Self {
        let location = location.into();
        let reason = reason.into();
        Self::connector(
            ErrorKind::Conversion,
            Cow::Owned(format!("unsupported schema at '{location}': {reason}")),
            Some(json!({ "location": location, "reason": reason })),
        )
    }

    pub fn unsupported_parameter_location(
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let location = location.into();
        Self::connector(
            ErrorKind::Conversion,
            Cow::Owned(format!(
                "parameter '{name}' has unsupported location '{location}'"
            )),
            Some(json!({ "parameter": name, "in": location })),
        )
    }

    // ---- BadRequest ----

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::connector(ErrorKind::BadRequest, Cow::Owned(message.into()), None)
    }

    pub fn unknown_operation(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::connector(
            ErrorKind::BadRequest,
            Cow::Owned(format!("unknown operation '{name}'")),
            Some(json!({ "operation": name })),
        )
    }

    // ---- UnprocessableContent ----

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::connector(
            ErrorKind::UnprocessableContent,
            Cow::Owned(message.into()),
            None,
        )
    }

    pub fn missing_required_argument(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::connector(
            ErrorKind::UnprocessableContent,
            Cow::Owned(format!("required argument '{name}' is missing")),
            Some(json!({ "argument": name })),
        )
    }

    pub fn unknown_server_ids(unknown: &[String], valid: &[String]) -> Self {
        Self::connector(
            ErrorKind::UnprocessableContent,
            Cow::Owned(format!(
                "unknown server id(s) {unknown:?}; valid ids are {valid:?}"
            )),
            Some(json!({ "unknown": unknown, "valid": valid })),
        )
    }

    // ---- Internal ----

    pub fn internal(message: impl Into<String>) -> Self {
        Self::connector(ErrorKind::Internal, Cow::Owned(message.into()), None)
    }

    pub fn missing_type(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::connector(
            ErrorKind::Internal,
            Cow::Owned(format!("type '{name}' is not present in the catalog")),
            Some(json!({ "type": name })),
        )
    }

    pub fn decode(content_type: impl Into<String>, reason: impl Into<String>) -> Self {
        let content_type = content_type.into();
        let reason = reason.into();
        Self::connector(
            ErrorKind::Internal,
            Cow::Owned(format!(
                "failed to decode '{content_type}' response: {reason}"
            )),
            Some(json!({ "contentType": content_type, "reason": reason })),
        )
    }

    /// True when the error carries an upstream 401, used for the single
    /// token-invalidation retry in the OAuth2 injector.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Upstream { status: 401, .. })
    }
}
