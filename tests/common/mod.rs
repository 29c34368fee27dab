#![allow(dead_code)]

//! Shared fixtures: hand-built catalogs pointed at mock servers.

use indexmap::IndexMap;
use prism_connector::config::manager::FileCatalog;
use prism_connector::config::models::Configuration;
use prism_connector::config::value_source::ValueSource;
use prism_connector::connector::models::{Argument, Query, QueryRequest};
use prism_connector::schema::models::{
    ArgumentInfo, Catalog, EncodingObject, ObjectField, ObjectType, OperationInfo,
    OperationRequest, ParameterLocation, ParameterStyle, RequestParameter, ResponseInfo,
    ScalarType, SecurityRequirement, Type, TypeRepresentation, TypeSchema,
};
use prism_connector::schema::security::{SecurityScheme, ServerConfig, Settings};
use prism_connector::HttpConnector;
use serde_json::Value;
use std::collections::BTreeMap;

pub fn server(id: &str, url: &str) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        url: ValueSource::Literal(url.to_string()),
        headers: IndexMap::new(),
        security: None,
        security_schemes: IndexMap::new(),
        tls: None,
    }
}

pub fn string_argument(name: &str, location: ParameterLocation) -> ArgumentInfo {
    ArgumentInfo {
        argument_type: Type::nullable(Type::named("String")),
        description: None,
        http: RequestParameter {
            name: name.to_string(),
            location,
            schema: Some(TypeSchema::scalar("string")),
            encoding: Some(EncodingObject {
                style: Some(ParameterStyle::Form),
                explode: Some(true),
                ..EncodingObject::default()
            }),
        },
    }
}

pub fn get_operation(path: &str, result_type: Type) -> OperationInfo {
    OperationInfo {
        request: OperationRequest {
            url: path.to_string(),
            method: "get".to_string(),
            request_body: None,
            response: ResponseInfo {
                content_type: "application/json".to_string(),
            },
            security: None,
            servers: None,
            distributed: false,
        },
        arguments: IndexMap::new(),
        result_type,
        description: None,
    }
}

/// A small pet-store catalog: `findPets`, `findPetsByStatus` and a `Pet`
/// object type, served by the given servers.
pub fn pet_catalog(servers: Vec<ServerConfig>) -> Catalog {
    let mut catalog = Catalog::default();
    catalog.settings = Settings {
        servers,
        ..Settings::default()
    };
    catalog
        .scalar_types
        .insert("String".into(), ScalarType::new(TypeRepresentation::String));
    catalog
        .scalar_types
        .insert("JSON".into(), ScalarType::new(TypeRepresentation::Json));

    let mut pet_fields = IndexMap::new();
    pet_fields.insert(
        "name".to_string(),
        ObjectField {
            field_type: Type::named("String"),
            description: None,
            http: Some(TypeSchema::scalar("string")),
        },
    );
    catalog.object_types.insert(
        "Pet".into(),
        ObjectType {
            description: None,
            fields: pet_fields,
            xml: None,
        },
    );

    catalog
        .functions
        .insert("findPets".into(), get_operation("/pet", Type::named("JSON")));

    let mut find_by_status = get_operation("/pet/findByStatus", Type::named("JSON"));
    find_by_status.arguments.insert(
        "status".to_string(),
        string_argument("status", ParameterLocation::Query),
    );
    catalog
        .functions
        .insert("findPetsByStatus".into(), find_by_status);

    catalog
}

/// Attaches a schema-level security scheme and requires it on every
/// operation.
pub fn secure(catalog: &mut Catalog, key: &str, scheme: SecurityScheme) {
    catalog
        .settings
        .security_schemes
        .insert(key.to_string(), scheme);
    let requirement: SecurityRequirement = IndexMap::from([(key.to_string(), Vec::new())]);
    catalog.settings.security = Some(vec![requirement]);
}

pub fn connector(configuration: Configuration, catalog: Catalog) -> HttpConnector {
    HttpConnector::from_parts(
        configuration,
        vec![FileCatalog {
            catalog,
            runtime: prism_connector::schema::security::RuntimeSettings::default(),
        }],
    )
    .expect("connector builds from parts")
}

pub fn query_request(collection: &str, arguments: &[(&str, Value)]) -> QueryRequest {
    let arguments: BTreeMap<String, Argument> = arguments
        .iter()
        .map(|(name, value)| {
            (
                (*name).to_string(),
                Argument::Literal {
                    value: value.clone(),
                },
            )
        })
        .collect();
    QueryRequest {
        collection: collection.to_string(),
        arguments,
        query: Query::default(),
        variables: None,
    }
}
