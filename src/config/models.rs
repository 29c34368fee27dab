//! Connector configuration data model.
//!
//! The host delivers a directory containing `config.{json,yaml,yml}`; this
//! module is the decoded shape. Every schema file entry carries its own
//! conversion options and runtime (timeout/retry) settings.

use crate::config::value_source::EnvInt;
use crate::error::Error;
use crate::schema::security::RetrySettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Path of the cached merged catalog, relative to the config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub forward_headers: ForwardHeadersConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub files: Vec<FileConfig>,
}

impl Configuration {
    /// Validates cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns a config error for a malformed `forwardHeaders.argumentField`.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(field) = &self.forward_headers.argument_field {
            let pattern = Regex::new(r"^[A-Za-z_]\w+$").expect("hardcoded pattern is valid");
            if !pattern.is_match(field) {
                return Err(Error::invalid_argument_field(field.clone()));
            }
        }
        Ok(())
    }
}

/// Incoming/outgoing header relay settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardHeadersConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Name of the per-request argument field the host stores headers in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<ResponseHeadersConfig>,
}

impl ForwardHeadersConfig {
    /// The argument field name when forwarding is active.
    #[must_use]
    pub fn active_argument_field(&self) -> Option<&str> {
        if self.enabled {
            self.argument_field.as_deref()
        } else {
            None
        }
    }
}

/// Wraps every result as `{headersField: {...}, resultField: <original>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeadersConfig {
    pub headers_field: String,
    pub result_field: String,
    /// Response header names to surface; empty forwards all.
    #[serde(default)]
    pub forward_headers: Vec<String>,
}

/// Orthogonal fan-out bounds. A limit of 1 or less means sequential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyConfig {
    #[serde(default = "default_concurrency")]
    pub query: u32,
    #[serde(default = "default_concurrency")]
    pub mutation: u32,
    #[serde(default = "default_concurrency")]
    pub http: u32,
}

const fn default_concurrency() -> u32 {
    1
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            query: 1,
            mutation: 1,
            http: 1,
        }
    }
}

/// Declared format of a schema file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaSpecType {
    #[default]
    #[serde(rename = "oas3")]
    OpenApiV3,
    #[serde(rename = "oas2")]
    OpenApiV2,
    /// A catalog already in the connector's native format.
    #[serde(rename = "native", alias = "ndc")]
    Native,
}

/// One schema file and its conversion options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub file: String,
    #[serde(default)]
    pub spec: SchemaSpecType,
    /// HTTP method renames applied when deriving fallback operation names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub method_alias: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_prefix: Option<String>,
    /// Treat every GET operation as a function even without a response body.
    #[serde(default)]
    pub pure: bool,
    #[serde(default)]
    pub strict: bool,
    /// Skip operations marked deprecated.
    #[serde(default)]
    pub no_deprecation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_before: Vec<PatchConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_after: Vec<PatchConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_content_types: Vec<String>,
    /// Generate `<Op>Distributed` fan-out operations.
    #[serde(default)]
    pub distributed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<EnvInt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PatchStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchStrategy {
    /// RFC 7396 merge patch.
    #[serde(rename = "merge")]
    Merge,
    /// RFC 6902 operation list.
    #[serde(rename = "json6902")]
    Json6902,
}
