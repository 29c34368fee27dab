//! Final catalog passes: unused-type pruning and prefix renaming.
//!
//! Pruning runs after the write-schema transform and distributed-operation
//! generation, and before the catalog is serialized, so clients never see
//! orphan types.

use crate::convert::name::{to_camel_case, to_pascal_case};
use crate::convert::schema_builder::DEFAULT_SCALAR_NAMES;
use crate::error::Error;
use crate::schema::models::{Catalog, ScalarType, Type, TypeRepresentation};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Deletes every named type not reachable from an operation's arguments or
/// result. Referenced built-in scalars missing from the catalog are
/// backfilled; any other missing reference is fatal.
///
/// # Errors
/// A named reference inside a used type that resolves to nothing.
pub fn prune_unused_types(catalog: &mut Catalog) -> Result<(), Error> {
    let mut reachable: HashSet<String> = HashSet::new();
    let mut worklist: Vec<String> = Vec::new();

    let mut visit = |ty: &Type, worklist: &mut Vec<String>| {
        if let Some(name) = ty.underlying_name() {
            worklist.push(name.to_string());
        }
    };

    for operation in catalog
        .functions
        .values()
        .chain(catalog.procedures.values())
    {
        visit(&operation.result_type, &mut worklist);
        for argument in operation.arguments.values() {
            visit(&argument.argument_type, &mut worklist);
        }
    }

    while let Some(name) = worklist.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(object) = catalog.object_types.get(&name) {
            for field in object.fields.values() {
                if let Some(field_name) = field.field_type.underlying_name() {
                    worklist.push(field_name.to_string());
                }
            }
        } else if !catalog.scalar_types.contains_key(&name) {
            match default_scalar(&name) {
                Some(representation) => {
                    catalog
                        .scalar_types
                        .insert(name.clone(), ScalarType::new(representation));
                }
                None => return Err(Error::missing_type(name)),
            }
        }
    }

    catalog
        .object_types
        .retain(|name, _| reachable.contains(name));
    catalog
        .scalar_types
        .retain(|name, _| reachable.contains(name));
    Ok(())
}

fn default_scalar(name: &str) -> Option<TypeRepresentation> {
    match name {
        "Boolean" => Some(TypeRepresentation::Boolean),
        "Int32" => Some(TypeRepresentation::Int32),
        "Int64" => Some(TypeRepresentation::Int64),
        "Float32" => Some(TypeRepresentation::Float32),
        "Float64" => Some(TypeRepresentation::Float64),
        "String" => Some(TypeRepresentation::String),
        "Date" => Some(TypeRepresentation::Date),
        "TimestampTZ" => Some(TypeRepresentation::TimestampTz),
        "Bytes" => Some(TypeRepresentation::Bytes),
        "UUID" => Some(TypeRepresentation::Uuid),
        "JSON" => Some(TypeRepresentation::Json),
        _ => None,
    }
}

/// Wraps all non-default type names and operation names with the configured
/// prefix: PascalCase for types, camelCase for operations.
pub fn apply_prefix(catalog: &mut Catalog, prefix: &str) {
    if prefix.is_empty() {
        return;
    }

    let mut type_renames: HashMap<String, String> = HashMap::new();
    for name in catalog.object_types.keys() {
        type_renames.insert(name.clone(), to_pascal_case(&format!("{prefix} {name}")));
    }
    for name in catalog.scalar_types.keys() {
        if !DEFAULT_SCALAR_NAMES.contains(&name.as_str()) {
            type_renames.insert(name.clone(), to_pascal_case(&format!("{prefix} {name}")));
        }
    }

    catalog.object_types = rename_keys(std::mem::take(&mut catalog.object_types), &type_renames);
    catalog.scalar_types = rename_keys(std::mem::take(&mut catalog.scalar_types), &type_renames);

    let rename_type = |ty: &mut Type| {
        if let Some(name) = ty.underlying_name() {
            if let Some(renamed) = type_renames.get(name) {
                ty.rename_underlying(renamed);
            }
        }
    };

    for operation in catalog
        .functions
        .values_mut()
        .chain(catalog.procedures.values_mut())
    {
        rename_type(&mut operation.result_type);
        for argument in operation.arguments.values_mut() {
            rename_type(&mut argument.argument_type);
        }
    }
    for object in catalog.object_types.values_mut() {
        for field in object.fields.values_mut() {
            rename_type(&mut field.field_type);
        }
    }

    catalog.functions = std::mem::take(&mut catalog.functions)
        .into_iter()
        .map(|(name, op)| (to_camel_case(&format!("{prefix} {name}")), op))
        .collect();
    catalog.procedures = std::mem::take(&mut catalog.procedures)
        .into_iter()
        .map(|(name, op)| (to_camel_case(&format!("{prefix} {name}")), op))
        .collect();
}

fn rename_keys<V>(map: IndexMap<String, V>, renames: &HashMap<String, String>) -> IndexMap<String, V> {
    map.into_iter()
        .map(|(name, value)| {
            let renamed = renames.get(&name).cloned().unwrap_or(name);
            (renamed, value)
        })
        .collect()
}
