//! OpenAPI document conversion into the operation catalog.
//!
//! The pipeline: strip control characters, decode to a JSON value, apply
//! patch-before files, dispatch to the v2 or v3 builder, generate
//! distributed variants, apply patch-after, prune unused types and apply
//! the configured name prefix.
//!
//! Per-operation failures do not abort the pass: they accumulate and are
//! returned next to the catalog. In strict mode any accumulated error is
//! fatal. A missing named reference inside a used type is always fatal.

pub mod name;
pub mod patch;
pub mod prune;
pub mod sanitize;
pub mod schema_builder;
pub mod v2;
pub mod v3;

pub mod distributed;

use crate::config::models::{FileConfig, PatchConfig, SchemaSpecType};
use crate::error::Error;
use crate::schema::models::Catalog;
use crate::schema::security::RuntimeSettings;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Conversion options for one schema file, decoupled from the config file
/// shape so the CLI can drive conversions directly.
#[derive(Debug, Clone, Default)]
pub struct ConvertConfig {
    pub spec: SchemaSpecType,
    pub method_alias: HashMap<String, String>,
    pub prefix: Option<String>,
    pub trim_prefix: Option<String>,
    pub env_prefix: Option<String>,
    pub pure: bool,
    pub strict: bool,
    pub no_deprecation: bool,
    pub allowed_content_types: Vec<String>,
    pub distributed: bool,
    /// Whether the root configuration enables forwarded headers; schemes
    /// that depend on them warn during conversion when disabled.
    pub headers_forwarding: bool,
    pub runtime: RuntimeSettings,
}

impl From<&FileConfig> for ConvertConfig {
    fn from(file: &FileConfig) -> Self {
        Self {
            spec: file.spec,
            method_alias: file.method_alias.clone(),
            prefix: file.prefix.clone(),
            trim_prefix: file.trim_prefix.clone(),
            env_prefix: file.env_prefix.clone(),
            pure: file.pure,
            strict: file.strict,
            no_deprecation: file.no_deprecation,
            allowed_content_types: file.allowed_content_types.clone(),
            distributed: file.distributed,
            headers_forwarding: false,
            runtime: RuntimeSettings {
                timeout: file.timeout.clone(),
                retry: file.retry.clone(),
            },
        }
    }
}

/// A converted catalog together with accumulated non-fatal errors.
#[derive(Debug)]
pub struct ConversionOutcome {
    pub catalog: Catalog,
    pub errors: Vec<String>,
}

/// Converts a raw schema document, applying patches from `base_dir`.
///
/// # Errors
/// Fatal decode failures, missing named references inside used types, and
/// (in strict mode) any accumulated conversion error.
pub fn convert_document(
    raw: &str,
    config: &ConvertConfig,
    patch_before: &[PatchConfig],
    patch_after: &[PatchConfig],
    base_dir: &Path,
) -> Result<ConversionOutcome, Error> {
    let cleaned = sanitize::strip_control_characters(raw);
    let mut document: Value = serde_yaml::from_str(&cleaned)
        .map_err(|e| Error::conversion(format!("schema document is not valid YAML/JSON: {e}")))?;

    patch::apply_patches(&mut document, patch_before, base_dir)?;

    let mut outcome = match config.spec {
        SchemaSpecType::OpenApiV3 => v3::build(&document, config)?,
        SchemaSpecType::OpenApiV2 => v2::build(&document, config)?,
        SchemaSpecType::Native => ConversionOutcome {
            catalog: serde_json::from_value(document.clone())
                .map_err(|e| Error::conversion(format!("invalid native catalog: {e}")))?,
            errors: Vec::new(),
        },
    };

    if config.distributed {
        distributed::generate_distributed_operations(&mut outcome.catalog);
    }

    if !patch_after.is_empty() {
        let mut catalog_value = serde_json::to_value(&outcome.catalog)?;
        patch::apply_patches(&mut catalog_value, patch_after, base_dir)?;
        outcome.catalog = serde_json::from_value(catalog_value)
            .map_err(|e| Error::conversion(format!("catalog invalid after patch-after: {e}")))?;
    }

    prune::prune_unused_types(&mut outcome.catalog)?;
    if let Some(prefix) = &config.prefix {
        prune::apply_prefix(&mut outcome.catalog, prefix);
    }

    for error in &outcome.errors {
        tracing::warn!(target: "prism::convert", "{error}");
    }
    if config.strict {
        if let Some(first) = outcome.errors.first() {
            return Err(Error::conversion(format!(
                "strict mode: {} conversion error(s), first: {first}",
                outcome.errors.len()
            )));
        }
    }

    Ok(outcome)
}
