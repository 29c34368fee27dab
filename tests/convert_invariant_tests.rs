use prism_connector::config::models::SchemaSpecType;
use prism_connector::convert::{convert_document, ConvertConfig};
use prism_connector::schema::models::{Catalog, Type};
use serde_json::json;
use std::path::Path;

fn petstore_document() -> String {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Pet Store", "version": "1.0.19"},
        "servers": [{"url": "https://petstore.example/api/v3"}],
        "paths": {
            "/pet": {
                "post": {
                    "operationId": "addPet",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "ok",
                            "content": {
                                "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                            }
                        }
                    }
                }
            },
            "/pet/findByStatus": {
                "get": {
                    "operationId": "findPetsByStatus",
                    "parameters": [{
                        "name": "status",
                        "in": "query",
                        "schema": {"type": "string", "enum": ["available", "pending", "sold"]}
                    }],
                    "responses": {
                        "200": {
                            "description": "ok",
                            "content": {
                                "application/json": {
                                    "schema": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
                                }
                            }
                        }
                    }
                }
            },
            "/pet/{petId}": {
                "get": {
                    "operationId": "getPetById",
                    "parameters": [{
                        "name": "petId",
                        "in": "path",
                        "required": true,
                        "schema": {"type": "integer", "format": "int64"}
                    }],
                    "responses": {
                        "200": {
                            "description": "ok",
                            "content": {
                                "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                            }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "name": {"type": "string"},
                        "category": {"$ref": "#/components/schemas/Category"},
                        "status": {"type": "string", "enum": ["available", "pending", "sold"]}
                    }
                },
                "Category": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "name": {"type": "string"}
                    }
                },
                "Unused": {
                    "type": "object",
                    "properties": {"ghost": {"type": "string"}}
                }
            },
            "securitySchemes": {
                "api_key": {"type": "apiKey", "name": "api_key", "in": "header"},
                "cookie_session": {"type": "openIdConnect", "openIdConnectUrl": "https://issuer/.well-known"}
            }
        }
    })
    .to_string()
}

fn convert(config: &ConvertConfig) -> prism_connector::convert::ConversionOutcome {
    convert_document(&petstore_document(), config, &[], &[], Path::new(".")).unwrap()
}

#[test]
fn catalog_round_trips_through_serialization() {
    let outcome = convert(&ConvertConfig::default());
    let serialized = serde_json::to_string(&outcome.catalog).unwrap();
    let reloaded: Catalog = serde_json::from_str(&serialized).unwrap();

    let original_ops: Vec<&String> = outcome
        .catalog
        .functions
        .keys()
        .chain(outcome.catalog.procedures.keys())
        .collect();
    let reloaded_ops: Vec<&String> = reloaded
        .functions
        .keys()
        .chain(reloaded.procedures.keys())
        .collect();
    assert_eq!(original_ops, reloaded_ops);
    assert_eq!(outcome.catalog, reloaded);
}

#[test]
fn every_argument_carries_a_parameter_location() {
    let outcome = convert(&ConvertConfig::default());
    for (name, operation) in outcome
        .catalog
        .functions
        .iter()
        .chain(outcome.catalog.procedures.iter())
    {
        for (arg_name, argument) in &operation.arguments {
            let serialized = serde_json::to_value(&argument.http).unwrap();
            let location = serialized["in"].as_str().unwrap_or_default();
            assert!(
                ["path", "query", "header", "body", "formData", "formURLEncoded"]
                    .contains(&location),
                "{name}.{arg_name} has location '{location}'"
            );
        }
    }
}

#[test]
fn every_named_reference_resolves_in_the_catalog() {
    let outcome = convert(&ConvertConfig::default());
    let catalog = &outcome.catalog;

    let check = |ty: &Type, context: &str| {
        if let Some(name) = ty.underlying_name() {
            assert!(
                catalog.object_types.contains_key(name) || catalog.scalar_types.contains_key(name),
                "{context} references missing type '{name}'"
            );
        }
    };

    for (name, operation) in catalog.functions.iter().chain(catalog.procedures.iter()) {
        check(&operation.result_type, name);
        for (arg_name, argument) in &operation.arguments {
            check(&argument.argument_type, &format!("{name}.{arg_name}"));
        }
    }
    for (name, object) in &catalog.object_types {
        for (field_name, field) in &object.fields {
            check(&field.field_type, &format!("{name}.{field_name}"));
        }
    }
}

#[test]
fn unused_types_are_pruned() {
    let outcome = convert(&ConvertConfig::default());
    assert!(!outcome.catalog.object_types.contains_key("Unused"));
    assert!(outcome.catalog.object_types.contains_key("Pet"));
    assert!(outcome.catalog.object_types.contains_key("Category"));
}

#[test]
fn forwarding_schemes_warn_once_each_when_forwarding_is_disabled() {
    let outcome = convert(&ConvertConfig::default());
    let warnings: Vec<&String> = outcome
        .errors
        .iter()
        .filter(|error| error.contains("forwarded headers"))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("cookie_session"));

    let forwarding = ConvertConfig {
        headers_forwarding: true,
        ..ConvertConfig::default()
    };
    let outcome = convert(&forwarding);
    assert!(outcome
        .errors
        .iter()
        .all(|error| !error.contains("forwarded headers")));
}

#[test]
fn prefix_wraps_operations_and_types() {
    let config = ConvertConfig {
        prefix: Some("hub".into()),
        ..ConvertConfig::default()
    };
    let outcome = convert(&config);
    assert!(outcome.catalog.functions.contains_key("hubFindPetsByStatus"));
    assert!(outcome.catalog.procedures.contains_key("hubAddPet"));
    assert!(outcome.catalog.object_types.contains_key("HubPet"));
    assert!(outcome.catalog.scalar_types.contains_key("String"));
}

#[test]
fn strict_mode_turns_accumulated_errors_fatal() {
    let config = ConvertConfig {
        strict: true,
        ..ConvertConfig::default()
    };
    // The openIdConnect scheme warns without forwarding, so strict fails.
    let err = convert_document(&petstore_document(), &config, &[], &[], Path::new("."));
    assert!(err.is_err());
}

#[test]
fn swagger_documents_convert_through_the_v2_builder() {
    let document = json!({
        "swagger": "2.0",
        "info": {"title": "Pet Store", "version": "1.0.6"},
        "host": "petstore.example",
        "basePath": "/v2",
        "schemes": ["https"],
        "paths": {
            "/pet/findByStatus": {
                "get": {
                    "operationId": "findPetsByStatus",
                    "produces": ["application/json"],
                    "parameters": [{
                        "name": "status",
                        "in": "query",
                        "required": false,
                        "type": "string"
                    }],
                    "responses": {
                        "200": {"description": "ok", "schema": {"type": "array", "items": {"$ref": "#/definitions/Pet"}}}
                    }
                }
            }
        },
        "definitions": {
            "Pet": {
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string"}}
            }
        }
    })
    .to_string();

    let config = ConvertConfig {
        spec: SchemaSpecType::OpenApiV2,
        ..ConvertConfig::default()
    };
    let outcome = convert_document(&document, &config, &[], &[], Path::new(".")).unwrap();
    assert!(outcome.catalog.functions.contains_key("findPetsByStatus"));
    assert!(outcome.catalog.object_types.contains_key("Pet"));
}
