//! Language-neutral schema catalog.
//!
//! The converter produces a [`Catalog`]: operations (functions and
//! procedures), object types, scalar types and connection settings. The
//! catalog is built once at configuration parse and is immutable afterwards;
//! the binder, auth injector and projection all read from it.

use crate::schema::security::Settings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a scalar is represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TypeRepresentation {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Date,
    #[serde(rename = "timestamptz")]
    TimestampTz,
    Bytes,
    #[serde(rename = "uuid")]
    Uuid,
    #[serde(rename = "json")]
    Json,
    Enum {
        one_of: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
    pub representation: TypeRepresentation,
}

impl ScalarType {
    #[must_use]
    pub const fn new(representation: TypeRepresentation) -> Self {
        Self { representation }
    }
}

/// A type expression: a named type, a nullable wrapper or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Type {
    Named { name: String },
    Nullable { underlying_type: Box<Type> },
    Array { element_type: Box<Type> },
}

impl Type {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    /// Wraps a type in `Nullable`. `Nullable(Nullable(T))` collapses to
    /// `Nullable(T)`.
    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        if matches!(inner, Self::Nullable { .. }) {
            inner
        } else {
            Self::Nullable {
                underlying_type: Box::new(inner),
            }
        }
    }

    #[must_use]
    pub fn array(element: Self) -> Self {
        Self::Array {
            element_type: Box::new(element),
        }
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable { .. })
    }

    /// Strips nullable wrappers.
    #[must_use]
    pub fn non_nullable(&self) -> &Self {
        match self {
            Self::Nullable { underlying_type } => underlying_type.non_nullable(),
            other => other,
        }
    }

    /// The named type at the bottom of the expression, if any.
    #[must_use]
    pub fn underlying_name(&self) -> Option<&str> {
        match self {
            Self::Named { name } => Some(name),
            Self::Nullable { underlying_type } => underlying_type.underlying_name(),
            Self::Array { element_type } => element_type.underlying_name(),
        }
    }

    /// Rewrites the underlying named type in place.
    pub fn rename_underlying(&mut self, new_name: &str) {
        match self {
            Self::Named { name } => *name = new_name.to_string(),
            Self::Nullable { underlying_type } => underlying_type.rename_underlying(new_name),
            Self::Array { element_type } => element_type.rename_underlying(new_name),
        }
    }
}

/// XML annotations attached to object types and fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlTypeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub wrapped: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub attribute: bool,
}

/// Raw HTTP schema annotation carried next to the neutral type, preserving
/// validation facets the engine type system cannot express.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub type_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub write_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml: Option<XmlTypeInfo>,
}

impl TypeSchema {
    #[must_use]
    pub fn scalar(name: &str) -> Self {
        Self {
            type_names: vec![name.to_string()],
            ..Self::default()
        }
    }
}

/// Where a request parameter is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
    #[serde(rename = "formURLEncoded")]
    FormUrlEncoded,
}

impl ParameterLocation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::FormData => "formData",
            Self::FormUrlEncoded => "formURLEncoded",
        }
    }
}

/// OpenAPI serialization styles for parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterStyle {
    Form,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
    Simple,
    Label,
    Matrix,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ParameterStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_reserved: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_type: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, TypeSchema>,
}

/// How an argument maps onto the HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TypeSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EncodingObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentInfo {
    #[serde(rename = "type")]
    pub argument_type: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub http: RequestParameter,
}

/// Request body description for operations that carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBodyInfo {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub encoding: IndexMap<String, EncodingObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub content_type: String,
}

/// Security requirement: scheme key to required scopes.
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// The HTTP half of an operation: where and how to call upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodyInfo>,
    pub response: ResponseInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    /// Server ids this operation is pinned to; `None` means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
    /// True for generated `<Op>Distributed` fan-out operations.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub distributed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    pub request: OperationRequest,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub arguments: IndexMap<String, ArgumentInfo>,
    pub result_type: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectField {
    #[serde(rename = "type")]
    pub field_type: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<TypeSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, ObjectField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml: Option<XmlTypeInfo>,
}

/// The full catalog for one schema file (or the merged set of files).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub functions: IndexMap<String, OperationInfo>,
    #[serde(default)]
    pub procedures: IndexMap<String, OperationInfo>,
    #[serde(default)]
    pub object_types: IndexMap<String, ObjectType>,
    #[serde(default)]
    pub scalar_types: IndexMap<String, ScalarType>,
}

impl Catalog {
    /// Looks up an operation by name in functions then procedures.
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<(&OperationInfo, OperationKind)> {
        self.functions
            .get(name)
            .map(|op| (op, OperationKind::Function))
            .or_else(|| {
                self.procedures
                    .get(name)
                    .map(|op| (op, OperationKind::Procedure))
            })
    }

    /// Merges another catalog into this one. Duplicate object types keep the
    /// first definition; duplicate operation names keep the first and warn.
    pub fn merge(&mut self, other: Self) {
        for (name, op) in other.functions {
            if self.functions.contains_key(&name) || self.procedures.contains_key(&name) {
                tracing::warn!(target: "prism::convert", operation = %name, "duplicate operation dropped during merge");
                continue;
            }
            self.functions.insert(name, op);
        }
        for (name, op) in other.procedures {
            if self.functions.contains_key(&name) || self.procedures.contains_key(&name) {
                tracing::warn!(target: "prism::convert", operation = %name, "duplicate operation dropped during merge");
                continue;
            }
            self.procedures.insert(name, op);
        }
        for (name, object) in other.object_types {
            if self.object_types.contains_key(&name) {
                tracing::warn!(target: "prism::convert", object = %name, "duplicate object type dropped during merge");
                continue;
            }
            self.object_types.insert(name, object);
        }
        for (name, scalar) in other.scalar_types {
            self.scalar_types.entry(name).or_insert(scalar);
        }
        if self.settings.servers.is_empty() {
            self.settings = other.settings;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Read-only, idempotent (GET with a response body).
    Function,
    /// State-changing.
    Procedure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_nullable_collapses() {
        let ty = Type::nullable(Type::nullable(Type::named("Pet")));
        assert_eq!(ty, Type::nullable(Type::named("Pet")));
    }

    #[test]
    fn underlying_name_skips_wrappers() {
        let ty = Type::nullable(Type::array(Type::named("Pet")));
        assert_eq!(ty.underlying_name(), Some("Pet"));
    }

    #[test]
    fn catalog_merge_keeps_first_duplicate() {
        let mut a = Catalog::default();
        a.functions.insert(
            "findPets".into(),
            sample_operation("first"),
        );
        let mut b = Catalog::default();
        b.functions.insert(
            "findPets".into(),
            sample_operation("second"),
        );
        a.merge(b);
        assert_eq!(
            a.functions["findPets"].description.as_deref(),
            Some("first")
        );
    }

    fn sample_operation(description: &str) -> OperationInfo {
        OperationInfo {
            request: OperationRequest {
                url: "/pet".into(),
                method: "get".into(),
                request_body: None,
                response: ResponseInfo {
                    content_type: "application/json".into(),
                },
                security: None,
                servers: None,
                distributed: false,
            },
            arguments: IndexMap::new(),
            result_type: Type::named("Pet"),
            description: Some(description.into()),
        }
    }
}
