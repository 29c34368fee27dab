//! Engine-facing wire types.
//!
//! These are the JSON shapes exchanged with the host query engine: query
//! and mutation requests with nested field selections, row sets, explain
//! details and the serialized schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    pub collection: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, Argument>,
    #[serde(default)]
    pub query: Query,
    /// Each entry produces one row set; arguments may reference variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<BTreeMap<String, Value>>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Argument {
    Literal { value: Value },
    Variable { name: String },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<IndexMap<String, Field>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Field {
    Column {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<NestedField>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NestedField {
    Object(NestedObject),
    Array(NestedArray),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NestedObject {
    pub fields: IndexMap<String, Field>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NestedArray {
    pub fields: Box<NestedField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<IndexMap<String, Value>>>,
}

pub type QueryResponse = Vec<RowSet>;

/// Engine convention: a function's result is a single row keyed `__value`.
pub const VALUE_FIELD: &str = "__value";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MutationRequest {
    #[serde(default)]
    pub operations: Vec<MutationOperation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MutationOperation {
    pub name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<NestedField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResponse {
    pub operation_results: Vec<MutationOperationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationOperationResult {
    pub result: Value,
}

/// Dry-run output: the request that would be issued, credentials masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub details: BTreeMap<String, String>,
}
