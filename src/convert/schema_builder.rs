//! Conversion of JSON-schema nodes into catalog types.
//!
//! Both the v2 and v3 document builders feed raw schema values through one
//! [`SchemaBuilder`]. Working on raw values keeps `xml` annotations (which
//! typed OpenAPI models drop) and lets Swagger 2.0 definitions share the
//! walker with OpenAPI 3 component schemas.
//!
//! Self-referential schemas are broken by registering a named stub before
//! descending into properties, so a `$ref` back to the type under
//! construction resolves to the stub instead of recursing forever.

use crate::convert::name::{to_camel_case, to_pascal_case};
use crate::convert::ConvertConfig;
use crate::error::Error;
use crate::schema::merge::{
    is_xml_leaf_object, merge_object_types, UnionTypeKind, XML_VALUE_FIELD,
};
use crate::schema::models::{
    ObjectField, ObjectType, ScalarType, Type, TypeRepresentation, TypeSchema, XmlTypeInfo,
};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Built-in scalar names that are never prefixed or pruned by name.
pub const DEFAULT_SCALAR_NAMES: &[&str] = &[
    "Boolean",
    "Int32",
    "Int64",
    "Float32",
    "Float64",
    "String",
    "Date",
    "TimestampTZ",
    "Bytes",
    "UUID",
    "JSON",
];

/// Catalog name of a scalar representation.
#[must_use]
pub const fn representation_name(representation: &TypeRepresentation) -> &'static str {
    match representation {
        TypeRepresentation::Boolean => "Boolean",
        TypeRepresentation::Int32 => "Int32",
        TypeRepresentation::Int64 => "Int64",
        TypeRepresentation::Float32 => "Float32",
        TypeRepresentation::Float64 => "Float64",
        TypeRepresentation::String => "String",
        TypeRepresentation::Date => "Date",
        TypeRepresentation::TimestampTz => "TimestampTZ",
        TypeRepresentation::Bytes => "Bytes",
        TypeRepresentation::Uuid => "UUID",
        TypeRepresentation::Json => "JSON",
        TypeRepresentation::Enum { .. } => "Enum",
    }
}

pub struct SchemaBuilder<'a> {
    pub config: &'a ConvertConfig,
    pub object_types: IndexMap<String, ObjectType>,
    pub scalar_types: IndexMap<String, ScalarType>,
    pub errors: Vec<String>,
    named: IndexMap<String, Value>,
    aliases: HashMap<String, Type>,
    building: HashSet<String>,
    enum_names: HashMap<Vec<String>, String>,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(config: &'a ConvertConfig, named: IndexMap<String, Value>) -> Self {
        Self {
            config,
            object_types: IndexMap::new(),
            scalar_types: IndexMap::new(),
            errors: Vec::new(),
            named,
            aliases: HashMap::new(),
            building: HashSet::new(),
            enum_names: HashMap::new(),
        }
    }

    /// Converts every named schema up front (the components pass). Distinct
    /// raw names that normalize to the same catalog name are a conflict:
    /// the first definition wins, the rest are dropped with a warning.
    pub fn build_all_named(&mut self) {
        let names: Vec<String> = self.named.keys().cloned().collect();
        let mut seen: HashMap<String, String> = HashMap::new();
        for name in names {
            let formatted = to_pascal_case(&name);
            if let Some(first) = seen.get(&formatted) {
                if self.named.get(&name) != self.named.get(first) {
                    tracing::warn!(
                        target: "prism::convert",
                        object = %formatted,
                        dropped = %name,
                        kept = %first,
                        "conflicting duplicate object definition, keeping the first"
                    );
                    self.errors.push(format!(
                        "conflicting duplicate definition of object type '{formatted}' \
                         (from '{name}'), keeping '{first}'"
                    ));
                }
                continue;
            }
            seen.insert(formatted, name.clone());
            if let Err(e) = self.build_named(&name) {
                self.errors.push(format!("schema '{name}': {e}"));
            }
        }
    }

    /// Converts a named schema, returning its catalog type. Re-entrant
    /// lookups during construction resolve to a `Named` stub.
    pub fn build_named(&mut self, raw_name: &str) -> Result<Type, Error> {
        let formatted = to_pascal_case(raw_name);
        if let Some(alias) = self.aliases.get(&formatted) {
            return Ok(alias.clone());
        }
        if self.building.contains(&formatted) {
            return Ok(Type::named(formatted));
        }

        let raw = self
            .named
            .get(raw_name)
            .cloned()
            .ok_or_else(|| Error::unresolved_reference(raw_name.to_string()))?;

        self.building.insert(formatted.clone());
        let (built, _) = self.build_schema(&[formatted.clone()], &raw)?;
        self.building.remove(&formatted);

        self.aliases.insert(formatted, built.clone());
        Ok(built)
    }

    /// Converts an inline schema node. `hint` is the name path used for
    /// synthetic object and enum scalar names.
    pub fn build_schema(&mut self, hint: &[String], value: &Value) -> Result<(Type, TypeSchema), Error> {
        if let Some(reference) = value.get("$ref").and_then(Value::as_str) {
            let name = reference
                .rsplit('/')
                .next()
                .ok_or_else(|| Error::unresolved_reference(reference.to_string()))?;
            let ty = self.build_named(name)?;
            return Ok((ty, TypeSchema::default()));
        }

        let mut schema = extract_type_schema(value);
        let mut nullable = value
            .get("nullable")
            .or_else(|| value.get("x-nullable"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // 3.1 documents carry type arrays; "null" entries mean nullable.
        let type_name = match value.get("type") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(Value::Array(names)) => {
                let mut concrete = None;
                for entry in names.iter().filter_map(Value::as_str) {
                    if entry == "null" {
                        nullable = true;
                    } else if concrete.is_none() {
                        concrete = Some(entry.to_string());
                    }
                }
                concrete
            }
            _ => None,
        };

        let ty = match type_name.as_deref() {
            Some("string") => self.build_string(hint, value, &schema),
            Some("integer") => {
                let representation = if schema.format.as_deref() == Some("int64") {
                    TypeRepresentation::Int64
                } else {
                    TypeRepresentation::Int32
                };
                self.scalar(representation)
            }
            Some("number") => {
                let representation = if schema.format.as_deref() == Some("float") {
                    TypeRepresentation::Float32
                } else {
                    TypeRepresentation::Float64
                };
                self.scalar(representation)
            }
            Some("boolean") => self.scalar(TypeRepresentation::Boolean),
            Some("array") => {
                let (element, item_schema) = match value.get("items") {
                    Some(items) => self.build_schema(hint, items)?,
                    None => (self.scalar(TypeRepresentation::Json), TypeSchema::default()),
                };
                schema.items = Some(Box::new(item_schema));
                Type::array(element)
            }
            Some("object") => self.build_object(hint, value)?,
            Some(other) => {
                self.errors
                    .push(format!("unknown schema type '{other}' at {}", hint.join(".")));
                self.scalar(TypeRepresentation::Json)
            }
            None => self.build_untyped(hint, value)?,
        };

        let ty = if nullable { Type::nullable(ty) } else { ty };
        Ok((ty, schema))
    }

    fn build_string(&mut self, hint: &[String], value: &Value, schema: &TypeSchema) -> Type {
        let enumeration: Vec<String> = value
            .get("enum")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if !enumeration.is_empty() {
            return self.enum_scalar(hint, enumeration);
        }
        let representation = match schema.format.as_deref() {
            Some("date") => TypeRepresentation::Date,
            Some("date-time") => TypeRepresentation::TimestampTz,
            Some("byte" | "binary") => TypeRepresentation::Bytes,
            Some("uuid") => TypeRepresentation::Uuid,
            _ => TypeRepresentation::String,
        };
        self.scalar(representation)
    }

    /// Schemas without a `type` keyword: composition keywords or free-form.
    fn build_untyped(&mut self, hint: &[String], value: &Value) -> Result<Type, Error> {
        for (keyword, kind) in [
            ("allOf", UnionTypeKind::AllOf),
            ("oneOf", UnionTypeKind::OneOf),
            ("anyOf", UnionTypeKind::AnyOf),
        ] {
            if let Some(branches) = value.get(keyword).and_then(Value::as_array) {
                return self.build_union(hint, branches, kind);
            }
        }
        if value.get("properties").is_some() {
            return self.build_object(hint, value);
        }
        Ok(self.scalar(TypeRepresentation::Json))
    }

    fn build_object(&mut self, hint: &[String], value: &Value) -> Result<Type, Error> {
        let Some(properties) = value.get("properties").and_then(Value::as_object) else {
            // Empty-property objects carry arbitrary payloads.
            return Ok(self.scalar(TypeRepresentation::Json));
        };
        if properties.is_empty() {
            return Ok(self.scalar(TypeRepresentation::Json));
        }

        let required: HashSet<&str> = value
            .get("required")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut object = ObjectType {
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            fields: IndexMap::new(),
            xml: extract_xml(value.get("xml")),
        };

        for (prop_name, prop_value) in properties {
            let mut child_hint = hint.to_vec();
            child_hint.push(prop_name.clone());
            match self.build_schema(&child_hint, prop_value) {
                Ok((mut field_type, field_schema)) => {
                    if !required.contains(prop_name.as_str()) {
                        field_type = Type::nullable(field_type);
                    }
                    object.fields.insert(
                        prop_name.clone(),
                        ObjectField {
                            field_type,
                            description: field_schema.description.clone(),
                            http: Some(field_schema),
                        },
                    );
                }
                Err(e) => self
                    .errors
                    .push(format!("property '{}': {e}", child_hint.join("."))),
            }
        }

        if is_xml_leaf_object(&object) {
            let text_type = self.scalar(TypeRepresentation::String);
            object.fields.insert(
                XML_VALUE_FIELD.to_string(),
                ObjectField {
                    field_type: Type::nullable(text_type),
                    description: None,
                    http: Some(TypeSchema::scalar("string")),
                },
            );
        }

        Ok(Type::named(self.insert_object(hint, object)))
    }

    fn build_union(
        &mut self,
        hint: &[String],
        branches: &[Value],
        kind: UnionTypeKind,
    ) -> Result<Type, Error> {
        let mut merged: Option<ObjectType> = None;
        for (index, branch) in branches.iter().enumerate() {
            // Branch objects get their own suffixed names; the merged object
            // takes the union's name.
            let mut branch_hint = hint.to_vec();
            branch_hint.push(format!("{index}"));
            let (ty, _) = self.build_schema(&branch_hint, branch)?;
            let object = match ty.non_nullable() {
                Type::Named { name } => self.object_types.get(name).cloned(),
                _ => None,
            };
            let Some(object) = object else {
                // A non-object branch degrades the whole union to JSON.
                return Ok(self.scalar(TypeRepresentation::Json));
            };
            merged = Some(match merged {
                None => object,
                Some(existing) => merge_object_types(&existing, &object, kind),
            });
        }

        match merged {
            Some(object) => Ok(Type::named(self.insert_object(hint, object))),
            None => Ok(self.scalar(TypeRepresentation::Json)),
        }
    }

    /// Stores an object under the hint-derived name. The first definition of
    /// a name wins; a later conflicting definition is dropped with a warning
    /// unless it is identical.
    fn insert_object(&mut self, hint: &[String], object: ObjectType) -> String {
        let name = to_pascal_case(&hint.join(" "));
        match self.object_types.get(&name) {
            None => {
                self.object_types.insert(name.clone(), object);
            }
            Some(existing) if *existing == object => {}
            Some(_) => {
                tracing::warn!(
                    target: "prism::convert",
                    object = %name,
                    "conflicting duplicate object definition, keeping the first"
                );
                self.errors.push(format!(
                    "conflicting duplicate definition of object type '{name}', keeping the first"
                ));
            }
        }
        name
    }

    pub(crate) fn scalar(&mut self, representation: TypeRepresentation) -> Type {
        let name = representation_name(&representation);
        self.scalar_types
            .entry(name.to_string())
            .or_insert_with(|| ScalarType::new(representation));
        Type::named(name)
    }

    /// Names an enum scalar. The same value set always resolves to the same
    /// name; fresh sets try resource+field, then the field path, then the
    /// field path with an `Enum` suffix.
    fn enum_scalar(&mut self, hint: &[String], mut values: Vec<String>) -> Type {
        values.sort();
        values.dedup();
        if let Some(existing) = self.enum_names.get(&values) {
            return Type::named(existing.clone());
        }

        let resource_field = match hint {
            [] => "Enum".to_string(),
            [only] => to_pascal_case(only),
            [first, .., last] => to_pascal_case(&format!("{first} {last}")),
        };
        let field_path = to_pascal_case(&hint.join(" "));
        let mut candidates = vec![
            resource_field,
            field_path.clone(),
            format!("{field_path}Enum"),
        ];
        for counter in 2.. {
            if candidates
                .iter()
                .any(|c| !c.is_empty() && !self.is_name_taken(c))
            {
                break;
            }
            candidates.push(format!("{field_path}Enum{counter}"));
        }
        let name = candidates
            .into_iter()
            .find(|c| !c.is_empty() && !self.is_name_taken(c))
            .unwrap_or_else(|| "Enum".to_string());

        self.enum_names.insert(values.clone(), name.clone());
        self.scalar_types.insert(
            name.clone(),
            ScalarType::new(TypeRepresentation::Enum { one_of: values }),
        );
        Type::named(name)
    }

    fn is_name_taken(&self, name: &str) -> bool {
        self.object_types.contains_key(name)
            || self.scalar_types.contains_key(name)
            || self.aliases.contains_key(name)
            || self.building.contains(name)
    }
}

/// Extracts the raw HTTP annotation facets shared by every schema node.
#[must_use]
pub fn extract_type_schema(value: &Value) -> TypeSchema {
    let string_field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    TypeSchema {
        type_names: match value.get("type") {
            Some(Value::String(name)) => vec![name.clone()],
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        },
        format: string_field("format"),
        pattern: string_field("pattern"),
        maximum: value.get("maximum").and_then(Value::as_f64),
        minimum: value.get("minimum").and_then(Value::as_f64),
        max_length: value.get("maxLength").and_then(Value::as_u64),
        min_length: value.get("minLength").and_then(Value::as_u64),
        description: string_field("description"),
        read_only: value
            .get("readOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        write_only: value
            .get("writeOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        items: None,
        xml: extract_xml(value.get("xml")),
    }
}

fn extract_xml(value: Option<&Value>) -> Option<XmlTypeInfo> {
    let value = value?;
    Some(XmlTypeInfo {
        name: value.get("name").and_then(Value::as_str).map(str::to_string),
        prefix: value
            .get("prefix")
            .and_then(Value::as_str)
            .map(str::to_string),
        namespace: value
            .get("namespace")
            .and_then(Value::as_str)
            .map(str::to_string),
        wrapped: value
            .get("wrapped")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        attribute: value
            .get("attribute")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Reserved argument name for request bodies. A colliding declared
/// parameter is renamed to [`PARAM_BODY_ARGUMENT`].
pub const BODY_ARGUMENT: &str = "body";
pub const PARAM_BODY_ARGUMENT: &str = "paramBody";

/// Argument name helper used by both document builders.
#[must_use]
pub fn argument_name(raw: &str) -> String {
    if raw == BODY_ARGUMENT {
        PARAM_BODY_ARGUMENT.to_string()
    } else {
        to_camel_case(raw)
    }
}
