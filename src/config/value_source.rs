//! Configuration value indirection.
//!
//! Settings that carry credentials or deployment-specific values are not
//! written inline: they are a [`ValueSource`] that resolves to a concrete
//! value at access time. That keeps resolution out of config decoding so
//! tests can override the environment after loading a configuration.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A string value that is either inline, environment-backed, or read from a
/// file (used for TLS PEM material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    /// Inline literal.
    Literal(String),
    /// Named environment variable with an optional default.
    Env {
        env: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Filesystem path whose contents are the value.
    File { file: PathBuf },
}

impl ValueSource {
    /// Shorthand for an environment-backed value without a default.
    #[must_use]
    pub const fn env(name: String) -> Self {
        Self::Env {
            env: name,
            value: None,
        }
    }

    /// Resolves to a concrete string.
    ///
    /// # Errors
    /// Returns a config error when the environment variable is unset with no
    /// default, or the backing file cannot be read.
    pub fn resolve(&self) -> Result<String, Error> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Env { env, value } => match std::env::var(env) {
                Ok(resolved) if !resolved.is_empty() => Ok(resolved),
                _ => value
                    .clone()
                    .ok_or_else(|| Error::missing_env_var(env.clone())),
            },
            Self::File { file } => std::fs::read_to_string(file).map_err(|e| {
                Error::invalid_value_source(format!(
                    "cannot read value from '{}': {e}",
                    file.display()
                ))
            }),
        }
    }

    /// Resolves to raw bytes; used for certificate material.
    ///
    /// # Errors
    /// Same conditions as [`ValueSource::resolve`].
    pub fn resolve_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            Self::File { file } => std::fs::read(file).map_err(|e| {
                Error::invalid_value_source(format!(
                    "cannot read value from '{}': {e}",
                    file.display()
                ))
            }),
            _ => self.resolve().map(String::into_bytes),
        }
    }
}

/// A string setting that deserializes from a bare literal or `{env, value}`.
pub type EnvString = ValueSource;

/// An integer setting that is either inline or environment-backed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvInt {
    Literal(i64),
    Env {
        env: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<i64>,
    },
}

impl EnvInt {
    /// Resolves to a concrete integer.
    ///
    /// # Errors
    /// Returns a config error on an unset variable without default, or a
    /// value that does not parse as an integer.
    pub fn resolve(&self) -> Result<i64, Error> {
        match self {
            Self::Literal(value) => Ok(*value),
            Self::Env { env, value } => match std::env::var(env) {
                Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| {
                    Error::invalid_value_source(format!(
                        "environment variable '{env}' is not an integer: '{raw}'"
                    ))
                }),
                _ => value.ok_or_else(|| Error::missing_env_var(env.clone())),
            },
        }
    }
}

impl From<i64> for EnvInt {
    fn from(value: i64) -> Self {
        Self::Literal(value)
    }
}
