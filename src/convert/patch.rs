//! JSON patching of schema documents, before and after conversion.
//!
//! Two strategies are supported: RFC 7396 merge patches and RFC 6902
//! operation lists. When the config does not pin a strategy, it is detected
//! from the patch document's root token: an object is a merge patch, an
//! array is an operation list.

use crate::config::models::{PatchConfig, PatchStrategy};
use crate::error::Error;
use serde_json::Value;
use std::path::Path;

/// Applies a list of patch files to a document in order.
///
/// # Errors
/// Returns a config error when a patch file cannot be read or decoded, and a
/// conversion error when a 6902 operation fails to apply.
pub fn apply_patches(
    document: &mut Value,
    patches: &[PatchConfig],
    base_dir: &Path,
) -> Result<(), Error> {
    for patch in patches {
        let path = base_dir.join(&patch.path);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::config(format!("cannot read patch file '{}': {e}", path.display()))
        })?;
        let patch_doc: Value = serde_yaml::from_str(&raw).map_err(|e| {
            Error::config(format!(
                "patch file '{}' is not valid YAML/JSON: {e}",
                path.display()
            ))
        })?;
        apply_patch_value(document, &patch_doc, patch.strategy)?;
    }
    Ok(())
}

/// Applies one decoded patch document with an optional explicit strategy.
///
/// # Errors
/// Returns a conversion error when the strategy and the document shape
/// disagree, or a 6902 operation fails.
pub fn apply_patch_value(
    document: &mut Value,
    patch_doc: &Value,
    strategy: Option<PatchStrategy>,
) -> Result<(), Error> {
    let strategy = strategy.map_or_else(|| detect_strategy(patch_doc), Ok)?;
    match strategy {
        PatchStrategy::Merge => {
            json_patch::merge(document, patch_doc);
            Ok(())
        }
        PatchStrategy::Json6902 => {
            let operations: json_patch::Patch = serde_json::from_value(patch_doc.clone())
                .map_err(|e| Error::conversion(format!("invalid JSON-patch operations: {e}")))?;
            json_patch::patch(document, &operations)
                .map_err(|e| Error::conversion(format!("JSON-patch application failed: {e}")))
        }
    }
}

fn detect_strategy(patch_doc: &Value) -> Result<PatchStrategy, Error> {
    match patch_doc {
        Value::Object(_) => Ok(PatchStrategy::Merge),
        Value::Array(_) => Ok(PatchStrategy::Json6902),
        other => Err(Error::conversion(format!(
            "patch document root must be an object or array, got {other}"
        ))),
    }
}
