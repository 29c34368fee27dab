//! Response projection through the engine's field selection.
//!
//! Selected fields are looked up by key; missing keys project as null.
//! Scalars are coerced per their catalog representation on the way out:
//! numbers widen to float64 only for float representations, integers
//! round-trip through i64, everything else passes through unchanged.

use crate::connector::models::{Field, NestedField};
use crate::schema::models::{Catalog, Type, TypeRepresentation};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Projects a decoded response value through a nested selection. `ty` is
/// the declared type at this position when known; it drives scalar
/// coercion and field-type tracking.
#[must_use]
pub fn project(
    value: Value,
    selection: Option<&NestedField>,
    ty: Option<&Type>,
    catalog: &Catalog,
) -> Value {
    let ty = ty.map(Type::non_nullable);
    match selection {
        None => coerce(value, ty, catalog),
        Some(NestedField::Object(object)) => {
            let Value::Object(mut entries) = value else {
                return Value::Null;
            };
            let object_type = ty
                .and_then(Type::underlying_name)
                .and_then(|name| catalog.object_types.get(name));
            let mut projected = Map::new();
            for (alias, field) in &object.fields {
                let Field::Column { column, fields } = field;
                let entry = entries.remove(column).unwrap_or(Value::Null);
                let field_type =
                    object_type.and_then(|object| object.fields.get(column).map(|f| &f.field_type));
                projected.insert(
                    alias.clone(),
                    project(entry, fields.as_ref(), field_type, catalog),
                );
            }
            Value::Object(projected)
        }
        Some(NestedField::Array(array)) => {
            let Value::Array(items) = value else {
                return Value::Null;
            };
            let element_type = ty.and_then(|ty| match ty {
                Type::Array { element_type } => Some(element_type.as_ref()),
                _ => None,
            });
            Value::Array(
                items
                    .into_iter()
                    .map(|item| project(item, Some(&array.fields), element_type, catalog))
                    .collect(),
            )
        }
    }
}

/// Projects a top-level row through the engine's column selection.
#[must_use]
pub fn project_row(
    value: Value,
    fields: Option<&IndexMap<String, Field>>,
    ty: Option<&Type>,
    catalog: &Catalog,
) -> IndexMap<String, Value> {
    let Some(fields) = fields else {
        let mut row = IndexMap::new();
        row.insert(
            crate::connector::models::VALUE_FIELD.to_string(),
            coerce(value, ty, catalog),
        );
        return row;
    };

    let mut row = IndexMap::new();
    for (alias, field) in fields {
        let Field::Column { column, fields } = field;
        // The single logical column is `__value`; anything else reads a key
        // out of an object result.
        let (entry, entry_type) = if column == crate::connector::models::VALUE_FIELD {
            (value.clone(), ty)
        } else {
            let entry = value.get(column).cloned().unwrap_or(Value::Null);
            (entry, None)
        };
        row.insert(
            alias.clone(),
            project(entry, fields.as_ref(), entry_type, catalog),
        );
    }
    row
}

fn coerce(value: Value, ty: Option<&Type>, catalog: &Catalog) -> Value {
    let Some(ty) = ty else {
        return value;
    };
    match (ty.non_nullable(), value) {
        (_, Value::Null) => Value::Null,
        (Type::Array { element_type }, Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| coerce(item, Some(element_type), catalog))
                .collect(),
        ),
        (Type::Named { name }, value) => {
            let Some(scalar) = catalog.scalar_types.get(name) else {
                return value;
            };
            coerce_scalar(value, &scalar.representation)
        }
        (_, value) => value,
    }
}

fn coerce_scalar(value: Value, representation: &TypeRepresentation) -> Value {
    match representation {
        TypeRepresentation::Float32 | TypeRepresentation::Float64 => value
            .as_f64()
            .map_or(value, |number| {
                serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number)
            }),
        TypeRepresentation::Int32 | TypeRepresentation::Int64 => match value.as_i64() {
            Some(number) => Value::Number(number.into()),
            None => value,
        },
        TypeRepresentation::Boolean => match value.as_bool() {
            Some(flag) => Value::Bool(flag),
            None => value,
        },
        // Dates, UUIDs and bytes pass through as strings.
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::models::NestedObject;
    use crate::schema::models::{ObjectField, ObjectType, ScalarType};
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog
            .scalar_types
            .insert("Int64".into(), ScalarType::new(TypeRepresentation::Int64));
        catalog
            .scalar_types
            .insert("Float64".into(), ScalarType::new(TypeRepresentation::Float64));
        catalog
            .scalar_types
            .insert("String".into(), ScalarType::new(TypeRepresentation::String));

        let mut fields = IndexMap::new();
        fields.insert(
            "id".to_string(),
            ObjectField {
                field_type: Type::named("Int64"),
                description: None,
                http: None,
            },
        );
        fields.insert(
            "weight".to_string(),
            ObjectField {
                field_type: Type::named("Float64"),
                description: None,
                http: None,
            },
        );
        fields.insert(
            "name".to_string(),
            ObjectField {
                field_type: Type::named("String"),
                description: None,
                http: None,
            },
        );
        catalog.object_types.insert(
            "Pet".into(),
            ObjectType {
                description: None,
                fields,
                xml: None,
            },
        );
        catalog
    }

    fn object_selection(columns: &[&str]) -> NestedField {
        let fields = columns
            .iter()
            .map(|column| {
                (
                    (*column).to_string(),
                    Field::Column {
                        column: (*column).to_string(),
                        fields: None,
                    },
                )
            })
            .collect();
        NestedField::Object(NestedObject { fields })
    }

    #[test]
    fn missing_selected_keys_project_as_null() {
        let catalog = catalog();
        let selection = object_selection(&["id", "name", "missing"]);
        let projected = project(
            json!({"id": 7, "name": "Rex"}),
            Some(&selection),
            Some(&Type::named("Pet")),
            &catalog,
        );
        assert_eq!(projected, json!({"id": 7, "name": "Rex", "missing": null}));
    }

    #[test]
    fn floats_widen_integers_stay_integers() {
        let catalog = catalog();
        let selection = object_selection(&["id", "weight"]);
        let projected = project(
            json!({"id": 7, "weight": 3}),
            Some(&selection),
            Some(&Type::named("Pet")),
            &catalog,
        );
        assert_eq!(projected["id"], json!(7));
        assert_eq!(projected["weight"], json!(3.0));
    }

    #[test]
    fn arrays_project_per_element() {
        let catalog = catalog();
        let selection = NestedField::Array(crate::connector::models::NestedArray {
            fields: Box::new(object_selection(&["name"])),
        });
        let projected = project(
            json!([{ "name": "Rex", "id": 1 }, { "name": "Tom", "id": 2 }]),
            Some(&selection),
            Some(&Type::array(Type::named("Pet"))),
            &catalog,
        );
        assert_eq!(projected, json!([{ "name": "Rex" }, { "name": "Tom" }]));
    }

    #[test]
    fn row_projection_defaults_to_value_field() {
        let catalog = catalog();
        let row = project_row(json!({"ok": true}), None, None, &catalog);
        assert_eq!(row["__value"], json!({"ok": true}));
    }
}
