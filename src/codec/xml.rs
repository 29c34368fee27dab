//! XML body encoding and decoding, driven by catalog type annotations.
//!
//! Element and attribute names come from each field's `xml` annotation
//! (falling back to the field name), attribute/element discrimination from
//! `xml.attribute`, and array wrapping from `xml.wrapped`. A leaf object's
//! synthetic `xmlValue` field maps to the element's text content. Field
//! order follows the object type's declaration order.

use crate::error::Error;
use crate::schema::merge::XML_VALUE_FIELD;
use crate::schema::models::{Catalog, ObjectField, ObjectType, Type, TypeRepresentation};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

/// Serializes a value of the given catalog type as XML.
///
/// # Errors
/// Unknown named types, or values that do not match the type shape.
pub fn encode_xml(value: &Value, ty: &Type, catalog: &Catalog) -> Result<Vec<u8>, Error> {
    let mut writer = Writer::new(Vec::new());
    let root_name = root_element_name(ty, catalog);
    write_node(&mut writer, &root_name, value, ty, catalog)?;
    Ok(writer.into_inner())
}

fn root_element_name(ty: &Type, catalog: &Catalog) -> String {
    ty.underlying_name()
        .and_then(|name| {
            catalog.object_types.get(name).map(|object| {
                object
                    .xml
                    .as_ref()
                    .and_then(|xml| xml.name.clone())
                    .unwrap_or_else(|| name.to_string())
            })
        })
        .unwrap_or_else(|| "root".to_string())
}

fn write_node(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    ty: &Type,
    catalog: &Catalog,
) -> Result<(), Error> {
    match ty {
        Type::Nullable { underlying_type } => {
            if value.is_null() {
                return Ok(());
            }
            write_node(writer, name, value, underlying_type, catalog)
        }
        Type::Array { element_type } => {
            let Value::Array(items) = value else {
                return Err(Error::internal(format!(
                    "expected an array for element '{name}'"
                )));
            };
            for item in items {
                write_node(writer, name, item, element_type, catalog)?;
            }
            Ok(())
        }
        Type::Named { name: type_name } => {
            if let Some(object) = catalog.object_types.get(type_name) {
                write_object(writer, name, value, object, catalog)
            } else {
                write_text_element(writer, name, value)
            }
        }
    }
}

fn write_object(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    object: &ObjectType,
    catalog: &Catalog,
) -> Result<(), Error> {
    let Value::Object(fields) = value else {
        return Err(Error::internal(format!(
            "expected an object for element '{name}'"
        )));
    };

    let mut start = BytesStart::new(name);
    if let Some(xml) = &object.xml {
        if let (Some(prefix), Some(namespace)) = (&xml.prefix, &xml.namespace) {
            start.push_attribute((format!("xmlns:{prefix}").as_str(), namespace.as_str()));
        }
    }

    // Attribute fields first, in declaration order.
    for (field_name, field) in &object.fields {
        if !is_attribute(field) {
            continue;
        }
        if let Some(entry) = fields.get(field_name) {
            if !entry.is_null() {
                let attr_name = xml_name(field, field_name);
                start.push_attribute((
                    attr_name.as_str(),
                    crate::request::parameter::scalar_to_string(entry).as_str(),
                ));
            }
        }
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| Error::internal(format!("XML write failed: {e}")))?;

    for (field_name, field) in &object.fields {
        if is_attribute(field) {
            continue;
        }
        let Some(entry) = fields.get(field_name) else {
            continue;
        };
        if field_name == XML_VALUE_FIELD {
            if !entry.is_null() {
                writer
                    .write_event(Event::Text(BytesText::new(
                        &crate::request::parameter::scalar_to_string(entry),
                    )))
                    .map_err(|e| Error::internal(format!("XML write failed: {e}")))?;
            }
            continue;
        }

        let element_name = xml_name(field, field_name);
        if is_wrapped_array(field) {
            let item_name = item_element_name(field, field_name);
            writer
                .write_event(Event::Start(BytesStart::new(element_name.as_str())))
                .map_err(|e| Error::internal(format!("XML write failed: {e}")))?;
            let element_type = array_element_type(&field.field_type);
            let Value::Array(items) = entry else {
                return Err(Error::internal(format!(
                    "expected an array for element '{element_name}'"
                )));
            };
            for item in items {
                write_node(writer, &item_name, item, element_type, catalog)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(element_name.as_str())))
                .map_err(|e| Error::internal(format!("XML write failed: {e}")))?;
        } else {
            write_node(writer, &element_name, entry, &field.field_type, catalog)?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| Error::internal(format!("XML write failed: {e}")))
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> Result<(), Error> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| Error::internal(format!("XML write failed: {e}")))?;
    if !value.is_null() {
        writer
            .write_event(Event::Text(BytesText::new(
                &crate::request::parameter::scalar_to_string(value),
            )))
            .map_err(|e| Error::internal(format!("XML write failed: {e}")))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| Error::internal(format!("XML write failed: {e}")))
}

fn is_attribute(field: &ObjectField) -> bool {
    field
        .http
        .as_ref()
        .and_then(|schema| schema.xml.as_ref())
        .is_some_and(|xml| xml.attribute)
}

fn is_wrapped_array(field: &ObjectField) -> bool {
    matches!(field.field_type.non_nullable(), Type::Array { .. })
        && field
            .http
            .as_ref()
            .and_then(|schema| schema.xml.as_ref())
            .is_some_and(|xml| xml.wrapped)
}

fn xml_name(field: &ObjectField, fallback: &str) -> String {
    let xml = field.http.as_ref().and_then(|schema| schema.xml.as_ref());
    let base = xml
        .and_then(|xml| xml.name.clone())
        .unwrap_or_else(|| fallback.to_string());
    match xml.and_then(|xml| xml.prefix.as_ref()) {
        Some(prefix) => format!("{prefix}:{base}"),
        None => base,
    }
}

fn item_element_name(field: &ObjectField, fallback: &str) -> String {
    field
        .http
        .as_ref()
        .and_then(|schema| schema.items.as_ref())
        .and_then(|items| items.xml.as_ref())
        .and_then(|xml| xml.name.clone())
        .unwrap_or_else(|| fallback.to_string())
}

fn array_element_type(ty: &Type) -> &Type {
    match ty.non_nullable() {
        Type::Array { element_type } => element_type,
        other => other,
    }
}

// ---- decoding ----

#[derive(Debug, Default)]
struct XmlNode {
    attributes: Vec<(String, String)>,
    children: Vec<(String, XmlNode)>,
    text: String,
}

/// Parses XML into a value shaped by the declared result type.
///
/// # Errors
/// Malformed XML or values that cannot be coerced to the target scalars.
pub fn decode_xml(bytes: &[u8], ty: &Type, catalog: &Catalog) -> Result<Value, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::decode("application/xml", e.to_string()))?;
    let root = parse_tree(text)?;
    Ok(node_to_value(&root, ty, catalog))
}

fn parse_tree(text: &str) -> Result<XmlNode, Error> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<(String, XmlNode)> = vec![(String::new(), XmlNode::default())];
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = local_name(start.name().as_ref());
                let mut node = XmlNode::default();
                collect_attributes(&start, &mut node)?;
                stack.push((name, node));
            }
            Ok(Event::Empty(start)) => {
                let name = local_name(start.name().as_ref());
                let mut node = XmlNode::default();
                collect_attributes(&start, &mut node)?;
                if let Some((_, parent)) = stack.last_mut() {
                    parent.children.push((name, node));
                }
            }
            Ok(Event::Text(text)) => {
                let content = text
                    .unescape()
                    .map_err(|e| Error::decode("application/xml", e.to_string()))?;
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&content);
                }
            }
            Ok(Event::End(_)) => {
                let (name, node) = stack
                    .pop()
                    .ok_or_else(|| Error::decode("application/xml", "unbalanced end tag"))?;
                if let Some((_, parent)) = stack.last_mut() {
                    parent.children.push((name, node));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::decode("application/xml", e.to_string())),
        }
    }

    let (_, mut root) = stack
        .pop()
        .ok_or_else(|| Error::decode("application/xml", "empty document"))?;
    match root.children.len() {
        1 => Ok(root.children.remove(0).1),
        _ => Ok(root),
    }
}

fn collect_attributes(start: &BytesStart<'_>, node: &mut XmlNode) -> Result<(), Error> {
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::decode("application/xml", e.to_string()))?;
        let key = local_name(attribute.key.as_ref());
        if key.starts_with("xmlns") {
            continue;
        }
        let value = attribute
            .unescape_value()
            .map_err(|e| Error::decode("application/xml", e.to_string()))?;
        node.attributes.push((key, value.into_owned()));
    }
    Ok(())
}

fn local_name(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.rsplit(':').next().unwrap_or(&text).to_string()
}

fn node_to_value(node: &XmlNode, ty: &Type, catalog: &Catalog) -> Value {
    match ty {
        Type::Nullable { underlying_type } => {
            if node.children.is_empty() && node.attributes.is_empty() && node.text.is_empty() {
                Value::Null
            } else {
                node_to_value(node, underlying_type, catalog)
            }
        }
        Type::Array { element_type } => Value::Array(
            node.children
                .iter()
                .map(|(_, child)| node_to_value(child, element_type, catalog))
                .collect(),
        ),
        Type::Named { name } => catalog.object_types.get(name).map_or_else(
            || scalar_from_text(&node.text, name, catalog),
            |object| object_from_node(node, object, catalog),
        ),
    }
}

fn object_from_node(node: &XmlNode, object: &ObjectType, catalog: &Catalog) -> Value {
    let mut map = Map::new();
    for (field_name, field) in &object.fields {
        if field_name == XML_VALUE_FIELD {
            map.insert(field_name.clone(), Value::String(node.text.clone()));
            continue;
        }
        let lookup = xml_lookup_name(field, field_name);
        if is_attribute(field) {
            let value = node
                .attributes
                .iter()
                .find(|(name, _)| *name == lookup)
                .map_or(Value::Null, |(_, value)| {
                    scalar_value_for(&field.field_type, value, catalog)
                });
            map.insert(field_name.clone(), value);
            continue;
        }

        match field.field_type.non_nullable() {
            Type::Array { element_type } => {
                let items: Vec<&XmlNode> = if is_wrapped_array(field) {
                    node.children
                        .iter()
                        .find(|(name, _)| *name == lookup)
                        .map(|(_, wrapper)| {
                            wrapper.children.iter().map(|(_, child)| child).collect()
                        })
                        .unwrap_or_default()
                } else {
                    let item_name = item_element_name(field, field_name);
                    node.children
                        .iter()
                        .filter(|(name, _)| *name == lookup || *name == item_name)
                        .map(|(_, child)| child)
                        .collect()
                };
                let values = items
                    .into_iter()
                    .map(|child| node_to_value(child, element_type, catalog))
                    .collect();
                map.insert(field_name.clone(), Value::Array(values));
            }
            inner => {
                let value = node
                    .children
                    .iter()
                    .find(|(name, _)| *name == lookup)
                    .map_or(Value::Null, |(_, child)| node_to_value(child, inner, catalog));
                map.insert(field_name.clone(), value);
            }
        }
    }
    Value::Object(map)
}

fn xml_lookup_name(field: &ObjectField, fallback: &str) -> String {
    field
        .http
        .as_ref()
        .and_then(|schema| schema.xml.as_ref())
        .and_then(|xml| xml.name.clone())
        .unwrap_or_else(|| fallback.to_string())
}

fn scalar_from_text(text: &str, type_name: &str, catalog: &Catalog) -> Value {
    let representation = catalog
        .scalar_types
        .get(type_name)
        .map(|scalar| &scalar.representation);
    match representation {
        Some(TypeRepresentation::Boolean) => text
            .parse::<bool>()
            .map_or_else(|_| Value::String(text.to_string()), Value::Bool),
        Some(TypeRepresentation::Int32 | TypeRepresentation::Int64) => text
            .parse::<i64>()
            .map_or_else(|_| Value::String(text.to_string()), Value::from),
        Some(TypeRepresentation::Float32 | TypeRepresentation::Float64) => text
            .parse::<f64>()
            .map_or_else(|_| Value::String(text.to_string()), Value::from),
        _ => Value::String(text.to_string()),
    }
}

fn scalar_value_for(ty: &Type, text: &str, catalog: &Catalog) -> Value {
    ty.underlying_name()
        .map_or_else(|| Value::String(text.to_string()), |name| {
            scalar_from_text(text, name, catalog)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::models::{ScalarType, TypeSchema, XmlTypeInfo};
    use indexmap::IndexMap;

    fn pet_catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog
            .scalar_types
            .insert("String".into(), ScalarType::new(TypeRepresentation::String));
        catalog
            .scalar_types
            .insert("Int64".into(), ScalarType::new(TypeRepresentation::Int64));

        let mut fields = IndexMap::new();
        fields.insert(
            "id".to_string(),
            ObjectField {
                field_type: Type::named("Int64"),
                description: None,
                http: Some(TypeSchema {
                    xml: Some(XmlTypeInfo {
                        attribute: true,
                        ..XmlTypeInfo::default()
                    }),
                    ..TypeSchema::scalar("integer")
                }),
            },
        );
        fields.insert(
            "name".to_string(),
            ObjectField {
                field_type: Type::named("String"),
                description: None,
                http: Some(TypeSchema::scalar("string")),
            },
        );
        fields.insert(
            "tags".to_string(),
            ObjectField {
                field_type: Type::array(Type::named("String")),
                description: None,
                http: Some(TypeSchema {
                    xml: Some(XmlTypeInfo {
                        name: Some("tags".into()),
                        wrapped: true,
                        ..XmlTypeInfo::default()
                    }),
                    items: Some(Box::new(TypeSchema {
                        xml: Some(XmlTypeInfo {
                            name: Some("tag".into()),
                            ..XmlTypeInfo::default()
                        }),
                        ..TypeSchema::scalar("string")
                    })),
                    ..TypeSchema::scalar("array")
                }),
            },
        );
        catalog.object_types.insert(
            "Pet".into(),
            ObjectType {
                description: None,
                fields,
                xml: Some(XmlTypeInfo {
                    name: Some("pet".into()),
                    ..XmlTypeInfo::default()
                }),
            },
        );
        catalog
    }

    #[test]
    fn encodes_attributes_elements_and_wrapped_arrays() {
        let catalog = pet_catalog();
        let value = serde_json::json!({
            "id": 7,
            "name": "Rex",
            "tags": ["small", "brown"]
        });
        let bytes = encode_xml(&value, &Type::named("Pet"), &catalog).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"<pet id="7"><name>Rex</name><tags><tag>small</tag><tag>brown</tag></tags></pet>"#
        );
    }

    #[test]
    fn decode_round_trips_the_encoded_document() {
        let catalog = pet_catalog();
        let value = serde_json::json!({
            "id": 7,
            "name": "Rex",
            "tags": ["small", "brown"]
        });
        let bytes = encode_xml(&value, &Type::named("Pet"), &catalog).unwrap();
        let decoded = decode_xml(&bytes, &Type::named("Pet"), &catalog).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn null_fields_are_omitted_from_output() {
        let catalog = pet_catalog();
        let value = serde_json::json!({"id": 1, "name": "Rex", "tags": []});
        let bytes = encode_xml(&value, &Type::named("Pet"), &catalog).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"<pet id="1"><name>Rex</name><tags></tags></pet>"#);
    }
}
