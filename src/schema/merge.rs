//! Object type composition for `anyOf` / `oneOf` / `allOf` schemas and the
//! read/write variant split.

use crate::schema::models::{ObjectType, Type};

/// The composition keyword an object union came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionTypeKind {
    AnyOf,
    OneOf,
    AllOf,
}

/// Synthetic field name carrying the text content of an XML leaf object
/// whose real fields are all attributes.
pub const XML_VALUE_FIELD: &str = "xmlValue";

/// Merges two object types field-wise.
///
/// For `anyOf`/`oneOf` only one branch needs to match, so fields that exist
/// on a single side are forced nullable. For `allOf` every branch applies;
/// a field present on both sides stays non-nullable only when both sides
/// agree it is required.
#[must_use]
pub fn merge_object_types(left: &ObjectType, right: &ObjectType, kind: UnionTypeKind) -> ObjectType {
    let mut merged = ObjectType {
        description: left
            .description
            .clone()
            .or_else(|| right.description.clone()),
        fields: left.fields.clone(),
        xml: left.xml.clone().or_else(|| right.xml.clone()),
    };

    match kind {
        UnionTypeKind::AnyOf | UnionTypeKind::OneOf => {
            // Fields only on the left become nullable.
            for (name, field) in &mut merged.fields {
                if !right.fields.contains_key(name) {
                    field.field_type = Type::nullable(field.field_type.clone());
                }
            }
            // Fields only on the right join as nullable.
            for (name, field) in &right.fields {
                if !merged.fields.contains_key(name) {
                    let mut field = field.clone();
                    field.field_type = Type::nullable(field.field_type.clone());
                    merged.fields.insert(name.clone(), field);
                }
            }
        }
        UnionTypeKind::AllOf => {
            for (name, field) in &right.fields {
                match merged.fields.get_mut(name) {
                    Some(existing) => {
                        // Required only when required on both sides.
                        if field.field_type.is_nullable() {
                            existing.field_type = Type::nullable(existing.field_type.clone());
                        }
                        if existing.description.is_none() {
                            existing.description = field.description.clone();
                        }
                    }
                    None => {
                        merged.fields.insert(name.clone(), field.clone());
                    }
                }
            }
        }
    }

    merged
}

/// True when every field of the object is an XML attribute. Such objects
/// gain a synthetic [`XML_VALUE_FIELD`] text field during conversion.
#[must_use]
pub fn is_xml_leaf_object(object: &ObjectType) -> bool {
    !object.fields.is_empty()
        && object.fields.values().all(|field| {
            field
                .http
                .as_ref()
                .and_then(|schema| schema.xml.as_ref())
                .is_some_and(|xml| xml.attribute)
        })
}

/// Name of the write-only variant of an object type.
#[must_use]
pub fn format_write_object_name(name: &str) -> String {
    format!("{name}Input")
}
