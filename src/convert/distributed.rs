//! Generation of `<Op>Distributed` fan-out operations.
//!
//! When a schema file is marked distributed, every operation gains a twin
//! that fans the call out to the configured servers and aggregates
//! per-server results and errors instead of returning a single value.

use crate::convert::name::to_pascal_case;
use crate::schema::models::{
    ArgumentInfo, Catalog, ObjectField, ObjectType, OperationInfo, ParameterLocation,
    RequestParameter, Type, TypeSchema,
};
use indexmap::IndexMap;

/// Synthetic argument accepted by distributed operations. Consumed by the
/// distributor before binding, never encoded onto the wire.
pub const HTTP_OPTIONS_ARGUMENT: &str = "httpOptions";

const HTTP_OPTIONS_TYPE: &str = "HttpOptions";
const DISTRIBUTED_ERROR_TYPE: &str = "DistributedError";

pub fn generate_distributed_operations(catalog: &mut Catalog) {
    if catalog.functions.is_empty() && catalog.procedures.is_empty() {
        return;
    }
    ensure_shared_types(catalog);

    let functions: Vec<(String, OperationInfo)> = catalog
        .functions
        .iter()
        .map(|(name, op)| (name.clone(), op.clone()))
        .collect();
    for (name, operation) in functions {
        let (distributed_name, distributed) = distribute(catalog, &name, &operation);
        catalog.functions.insert(distributed_name, distributed);
    }

    let procedures: Vec<(String, OperationInfo)> = catalog
        .procedures
        .iter()
        .map(|(name, op)| (name.clone(), op.clone()))
        .collect();
    for (name, operation) in procedures {
        let (distributed_name, distributed) = distribute(catalog, &name, &operation);
        catalog.procedures.insert(distributed_name, distributed);
    }
}

fn distribute(
    catalog: &mut Catalog,
    name: &str,
    operation: &OperationInfo,
) -> (String, OperationInfo) {
    let pascal = to_pascal_case(name);
    let data_type = format!("{pascal}DistributedResultData");
    let result_type = format!("{pascal}DistributedResult");

    catalog.object_types.insert(
        data_type.clone(),
        ObjectType {
            description: None,
            fields: IndexMap::from([
                (
                    "server".to_string(),
                    ObjectField {
                        field_type: Type::named("String"),
                        description: None,
                        http: Some(TypeSchema::scalar("string")),
                    },
                ),
                (
                    "data".to_string(),
                    ObjectField {
                        field_type: operation.result_type.clone(),
                        description: None,
                        http: None,
                    },
                ),
            ]),
            xml: None,
        },
    );
    catalog.object_types.insert(
        result_type.clone(),
        ObjectType {
            description: None,
            fields: IndexMap::from([
                (
                    "results".to_string(),
                    ObjectField {
                        field_type: Type::array(Type::named(&data_type)),
                        description: None,
                        http: None,
                    },
                ),
                (
                    "errors".to_string(),
                    ObjectField {
                        field_type: Type::array(Type::named(DISTRIBUTED_ERROR_TYPE)),
                        description: None,
                        http: None,
                    },
                ),
            ]),
            xml: None,
        },
    );

    let mut distributed = operation.clone();
    distributed.request.distributed = true;
    distributed.result_type = Type::named(result_type);
    distributed.arguments.insert(
        HTTP_OPTIONS_ARGUMENT.to_string(),
        ArgumentInfo {
            argument_type: Type::nullable(Type::named(HTTP_OPTIONS_TYPE)),
            description: Some("Distribution options: server subset and parallelism.".to_string()),
            http: RequestParameter {
                name: HTTP_OPTIONS_ARGUMENT.to_string(),
                location: ParameterLocation::Query,
                schema: None,
                encoding: None,
            },
        },
    );

    (format!("{name}Distributed"), distributed)
}

fn ensure_shared_types(catalog: &mut Catalog) {
    catalog
        .object_types
        .entry(HTTP_OPTIONS_TYPE.to_string())
        .or_insert_with(|| ObjectType {
            description: Some("Per-call distribution options.".to_string()),
            fields: IndexMap::from([
                (
                    "servers".to_string(),
                    ObjectField {
                        field_type: Type::nullable(Type::array(Type::named("String"))),
                        description: Some("Restrict the call to these server ids.".to_string()),
                        http: None,
                    },
                ),
                (
                    "parallel".to_string(),
                    ObjectField {
                        field_type: Type::nullable(Type::named("Boolean")),
                        description: Some("Run the sub-calls concurrently.".to_string()),
                        http: None,
                    },
                ),
            ]),
            xml: None,
        });
    catalog
        .object_types
        .entry(DISTRIBUTED_ERROR_TYPE.to_string())
        .or_insert_with(|| ObjectType {
            description: None,
            fields: IndexMap::from([
                (
                    "server".to_string(),
                    ObjectField {
                        field_type: Type::named("String"),
                        description: None,
                        http: None,
                    },
                ),
                (
                    "message".to_string(),
                    ObjectField {
                        field_type: Type::named("String"),
                        description: None,
                        http: None,
                    },
                ),
                (
                    "details".to_string(),
                    ObjectField {
                        field_type: Type::nullable(Type::named("JSON")),
                        description: None,
                        http: None,
                    },
                ),
            ]),
            xml: None,
        });
}
