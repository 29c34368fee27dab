//! Configuration loading: file discovery, schema conversion, catalog cache.
//!
//! `config.json` is preferred over `config.yaml`, which is preferred over
//! `config.yml`; discovery stops at the first match. When the configured
//! `output` cache file exists next to the config, it is loaded instead of
//! re-running conversion.

use crate::config::models::Configuration;
use crate::convert::{convert_document, ConvertConfig};
use crate::error::Error;
use crate::schema::models::Catalog;
use crate::schema::security::RuntimeSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

const CONFIG_FILE_NAMES: [&str; 3] = ["config.json", "config.yaml", "config.yml"];

/// One converted schema file with its runtime settings. Operations are
/// looked up per file so each file's timeout/retry policy applies to its
/// own operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCatalog {
    pub catalog: Catalog,
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

/// Loads and validates the configuration in a directory.
///
/// # Errors
/// No config file, undecodable config, or invalid field formats.
pub fn load_configuration(dir: &Path) -> Result<Configuration, Error> {
    let mut found = None;
    for name in CONFIG_FILE_NAMES {
        let path = dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                found = Some((name, raw));
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    let Some((name, raw)) = found else {
        return Err(Error::missing_config_file(dir.display().to_string()));
    };

    let configuration: Configuration = if name.ends_with(".json") {
        serde_json::from_str(&raw)?
    } else {
        serde_yaml::from_str(&raw)?
    };
    configuration.validate()?;
    Ok(configuration)
}

/// Converts every schema file in the configuration, preferring the cached
/// catalog when present.
///
/// # Errors
/// Unreadable schema files and fatal conversion failures.
pub fn load_catalogs(dir: &Path, configuration: &Configuration) -> Result<Vec<FileCatalog>, Error> {
    if let Some(output) = &configuration.output {
        let cache_path = dir.join(output);
        match std::fs::read_to_string(&cache_path) {
            Ok(raw) => {
                tracing::info!(
                    target: "prism::config",
                    cache = %cache_path.display(),
                    "loading catalogs from cache"
                );
                return serde_json::from_str(&raw).map_err(|e| {
                    Error::config(format!(
                        "catalog cache '{}' is invalid: {e}",
                        cache_path.display()
                    ))
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    convert_catalogs(dir, configuration)
}

/// Runs conversion for every schema file, ignoring any cache.
///
/// # Errors
/// Unreadable schema files and fatal conversion failures.
pub fn convert_catalogs(
    dir: &Path,
    configuration: &Configuration,
) -> Result<Vec<FileCatalog>, Error> {
    let mut files = Vec::with_capacity(configuration.files.len());
    for file in &configuration.files {
        let path = dir.join(&file.file);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::config(format!("cannot read schema file '{}': {e}", path.display()))
        })?;

        let mut convert_config = ConvertConfig::from(file);
        convert_config.headers_forwarding = configuration.forward_headers.enabled;
        // File-level strict falls back to the root flag.
        convert_config.strict = file.strict || configuration.strict;

        let outcome = convert_document(
            &raw,
            &convert_config,
            &file.patch_before,
            &file.patch_after,
            dir,
        )?;
        tracing::info!(
            target: "prism::config",
            file = %file.file,
            functions = outcome.catalog.functions.len(),
            procedures = outcome.catalog.procedures.len(),
            errors = outcome.errors.len(),
            "schema file converted"
        );
        files.push(FileCatalog {
            catalog: outcome.catalog,
            runtime: convert_config.runtime,
        });
    }
    Ok(files)
}

/// Writes the converted catalogs to the configured `output` cache path.
///
/// # Errors
/// Serialization or filesystem failures; a no-op without an `output` path.
pub fn write_catalog_cache(
    dir: &Path,
    configuration: &Configuration,
    files: &[FileCatalog],
) -> Result<(), Error> {
    let Some(output) = &configuration.output else {
        return Ok(());
    };
    let path = dir.join(output);
    let serialized = serde_json::to_string_pretty(files)?;
    std::fs::write(&path, serialized)?;
    tracing::info!(target: "prism::config", cache = %path.display(), "catalog cache written");
    Ok(())
}

/// Builds the merged schema view served by `get_schema`, serialized once.
///
/// # Errors
/// Serialization failures only.
pub fn merged_schema(files: &[FileCatalog]) -> Result<serde_json::Value, Error> {
    let mut merged = Catalog::default();
    for file in files {
        merged.merge(file.catalog.clone());
    }
    Ok(serde_json::to_value(&merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn json_config_wins_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.json", r#"{"strict": true, "files": []}"#);
        write(dir.path(), "config.yaml", "strict: false\nfiles: []\n");

        let configuration = load_configuration(dir.path()).unwrap();
        assert!(configuration.strict);
    }

    #[test]
    fn missing_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_configuration(dir.path()).unwrap_err();
        assert!(err.to_string().contains("config"));
    }

    #[test]
    fn catalogs_convert_and_round_trip_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "config.json",
            r#"{"output": "catalog.json", "files": [{"file": "openapi.json", "spec": "oas3"}]}"#,
        );
        write(
            dir.path(),
            "openapi.json",
            r#"{
                "openapi": "3.0.0",
                "info": {"title": "t", "version": "1"},
                "servers": [{"url": "http://localhost:4000"}],
                "paths": {
                    "/pet": {
                        "get": {
                            "operationId": "findPets",
                            "responses": {
                                "200": {
                                    "description": "ok",
                                    "content": {"application/json": {"schema": {"type": "object", "properties": {"name": {"type": "string"}}}}}
                                }
                            }
                        }
                    }
                }
            }"#,
        );

        let configuration = load_configuration(dir.path()).unwrap();
        let files = load_catalogs(dir.path(), &configuration).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].catalog.functions.contains_key("findPets"));

        write_catalog_cache(dir.path(), &configuration, &files).unwrap();
        let cached = load_catalogs(dir.path(), &configuration).unwrap();
        assert_eq!(cached[0].catalog, files[0].catalog);

        // The reloaded operation set matches the converted one exactly.
        let original: Vec<_> = files[0].catalog.functions.keys().collect();
        let reloaded: Vec<_> = cached[0].catalog.functions.keys().collect();
        assert_eq!(original, reloaded);
    }
}
