//! Swagger 2.0 document builder.
//!
//! There is no maintained typed model for 2.0, so the document is walked as
//! a raw value. Schema nodes share the [`SchemaBuilder`] with the v3 path.

use crate::convert::name::{
    format_operation_name, operation_name_from_path, security_env_name, server_url_env_name,
    to_pascal_case, EnvRole,
};
use crate::convert::schema_builder::{argument_name, SchemaBuilder, BODY_ARGUMENT};
use crate::convert::{ConversionOutcome, ConvertConfig};
use crate::config::value_source::ValueSource;
use crate::error::Error;
use crate::schema::models::{
    ArgumentInfo, Catalog, EncodingObject, ObjectField, ObjectType, OperationInfo,
    OperationRequest, ParameterLocation, ParameterStyle, RequestBodyInfo, RequestParameter,
    ResponseInfo, SecurityRequirement, Type, TypeSchema,
};
use crate::schema::security::{
    ApiKeyLocation, OAuthFlow, OAuthFlowType, SecurityScheme, ServerConfig, Settings,
};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

const METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "head", "options", "trace",
];

/// Builds a catalog from a decoded Swagger 2.0 document.
///
/// # Errors
/// Fails when the document root is not an object; per-operation problems
/// accumulate in the outcome.
pub fn build(document: &Value, config: &ConvertConfig) -> Result<ConversionOutcome, Error> {
    if !document.is_object() {
        return Err(Error::conversion("Swagger 2.0 document root must be an object"));
    }

    let named = crate::convert::v3::raw_named_schemas(document, "/definitions");
    let mut schemas = SchemaBuilder::new(config, named);
    schemas.build_all_named();

    let mut builder = V2Builder {
        schemas,
        document,
        config,
        functions: IndexMap::new(),
        procedures: IndexMap::new(),
        used_names: HashSet::new(),
    };

    let settings = builder.build_settings();
    builder.build_paths();

    Ok(ConversionOutcome {
        catalog: Catalog {
            settings,
            functions: builder.functions,
            procedures: builder.procedures,
            object_types: builder.schemas.object_types,
            scalar_types: builder.schemas.scalar_types,
        },
        errors: builder.schemas.errors,
    })
}

struct V2Builder<'a> {
    schemas: SchemaBuilder<'a>,
    document: &'a Value,
    config: &'a ConvertConfig,
    functions: IndexMap<String, OperationInfo>,
    procedures: IndexMap<String, OperationInfo>,
    used_names: HashSet<String>,
}

impl V2Builder<'_> {
    fn build_settings(&mut self) -> Settings {
        let document = self.document;
        let mut settings = Settings {
            version: document
                .pointer("/info/version")
                .and_then(Value::as_str)
                .map(str::to_string),
            security: document
                .get("security")
                .and_then(Value::as_array)
                .map(|entries| entries.iter().filter_map(requirement_from_value).collect()),
            ..Settings::default()
        };

        // host + basePath + first scheme form the single server URL.
        if let Some(host) = document.get("host").and_then(Value::as_str) {
            let scheme = document
                .pointer("/schemes/0")
                .and_then(Value::as_str)
                .unwrap_or("https");
            let base_path = document
                .get("basePath")
                .and_then(Value::as_str)
                .unwrap_or("");
            let url = format!("{scheme}://{host}{base_path}");
            settings.servers.push(ServerConfig {
                id: "server-1".to_string(),
                url: ValueSource::Env {
                    env: server_url_env_name(self.config.env_prefix.as_deref(), None, 0),
                    value: Some(url),
                },
                headers: IndexMap::new(),
                security: None,
                security_schemes: IndexMap::new(),
                tls: None,
            });
        }

        if let Some(definitions) = document
            .get("securityDefinitions")
            .and_then(Value::as_object)
        {
            for (key, definition) in definitions {
                match self.convert_security_definition(key, definition) {
                    Ok(scheme) => {
                        if scheme.requires_headers_forwarding() && !self.config.headers_forwarding {
                            self.schemas.errors.push(format!(
                                "security scheme '{key}' needs forwarded headers, which are disabled"
                            ));
                        }
                        settings.security_schemes.insert(key.clone(), scheme);
                    }
                    Err(e) => self
                        .schemas
                        .errors
                        .push(format!("security definition '{key}': {e}")),
                }
            }
        }

        settings
    }

    fn convert_security_definition(
        &self,
        key: &str,
        definition: &Value,
    ) -> Result<SecurityScheme, Error> {
        let prefix = self.config.env_prefix.as_deref();
        let env = |role: EnvRole| ValueSource::env(security_env_name(prefix, key, role));
        let kind = definition
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match kind {
            "basic" => Ok(SecurityScheme::Basic {
                username: env(EnvRole::Username),
                password: env(EnvRole::Password),
            }),
            "apiKey" => {
                let name = definition
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::conversion("apiKey definition without a name"))?;
                let location = match definition.get("in").and_then(Value::as_str) {
                    Some("query") => ApiKeyLocation::Query,
                    Some("header") | None => ApiKeyLocation::Header,
                    Some(other) => {
                        return Err(Error::unsupported_parameter_location(name, other));
                    }
                };
                Ok(SecurityScheme::ApiKey {
                    name: name.to_string(),
                    location,
                    value: env(EnvRole::Value),
                })
            }
            "oauth2" => {
                let flow_name = definition
                    .get("flow")
                    .and_then(Value::as_str)
                    .unwrap_or("application");
                let flow_type = match flow_name {
                    "application" => OAuthFlowType::ClientCredentials,
                    "accessCode" => OAuthFlowType::AuthorizationCode,
                    "implicit" => OAuthFlowType::Implicit,
                    "password" => OAuthFlowType::Password,
                    other => {
                        return Err(Error::conversion(format!("unknown OAuth2 flow '{other}'")))
                    }
                };
                let scopes = definition
                    .get("scopes")
                    .and_then(Value::as_object)
                    .map(|scopes| {
                        scopes
                            .iter()
                            .filter_map(|(scope, description)| {
                                description
                                    .as_str()
                                    .map(|d| (scope.clone(), d.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let mut flow = OAuthFlow {
                    scopes,
                    authorization_url: definition
                        .get("authorizationUrl")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    ..OAuthFlow::default()
                };
                if let Some(token_url) = definition.get("tokenUrl").and_then(Value::as_str) {
                    flow.token_url = Some(ValueSource::Env {
                        env: security_env_name(prefix, key, EnvRole::TokenUrl),
                        value: Some(token_url.to_string()),
                    });
                }
                if flow_type == OAuthFlowType::ClientCredentials {
                    flow.client_id = Some(env(EnvRole::ClientId));
                    flow.client_secret = Some(env(EnvRole::ClientSecret));
                }
                let mut flows = IndexMap::new();
                flows.insert(flow_type, flow);
                Ok(SecurityScheme::Oauth2 { flows })
            }
            other => Err(Error::conversion(format!(
                "unsupported security definition type '{other}'"
            ))),
        }
    }

    fn build_paths(&mut self) {
        let Some(paths) = self.document.get("paths").and_then(Value::as_object) else {
            return;
        };
        let paths: Vec<(String, Value)> = paths
            .iter()
            .map(|(path, item)| (path.clone(), item.clone()))
            .collect();

        for (path, item) in paths {
            let shared: Vec<Value> = item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for method in METHODS {
                let Some(operation) = item.get(method) else { continue };
                let deprecated = operation
                    .get("deprecated")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if deprecated && self.config.no_deprecation {
                    continue;
                }
                if let Err(e) = self.build_operation(&path, method, operation, &shared) {
                    self.schemas
                        .errors
                        .push(format!("{method} {path}: {e}"));
                }
            }
        }
    }

    fn build_operation(
        &mut self,
        path: &str,
        method: &str,
        operation: &Value,
        shared_parameters: &[Value],
    ) -> Result<(), Error> {
        let name = self.operation_name(
            operation.get("operationId").and_then(Value::as_str),
            method,
            path,
        );

        let mut arguments: IndexMap<String, ArgumentInfo> = IndexMap::new();
        let mut form_fields: IndexMap<String, ObjectField> = IndexMap::new();
        let mut has_file_field = false;
        let mut request_body: Option<RequestBodyInfo> = None;

        let parameters: Vec<&Value> = shared_parameters
            .iter()
            .chain(operation.get("parameters").and_then(Value::as_array).into_iter().flatten())
            .collect();

        for parameter in parameters {
            let parameter = self.resolve_parameter(parameter)?;
            let Some(param_name) = parameter.get("name").and_then(Value::as_str) else {
                self.schemas
                    .errors
                    .push(format!("{method} {path}: parameter without a name"));
                continue;
            };
            let location = parameter.get("in").and_then(Value::as_str).unwrap_or("");
            match location {
                "body" => {
                    let schema = parameter.get("schema").cloned().unwrap_or(Value::Null);
                    let (mut body_type, body_schema) = self
                        .schemas
                        .build_schema(&[name.clone(), "body".to_string()], &schema)?;
                    if !is_required(&parameter) {
                        body_type = Type::nullable(body_type);
                    }
                    let content_type = operation
                        .pointer("/consumes/0")
                        .or_else(|| self.document.pointer("/consumes/0"))
                        .and_then(Value::as_str)
                        .unwrap_or("application/json")
                        .to_string();
                    if let Some(existing) = arguments.shift_remove(BODY_ARGUMENT) {
                        arguments.insert("paramBody".to_string(), existing);
                    }
                    arguments.insert(
                        BODY_ARGUMENT.to_string(),
                        ArgumentInfo {
                            argument_type: body_type,
                            description: parameter
                                .get("description")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                            http: RequestParameter {
                                name: BODY_ARGUMENT.to_string(),
                                location: ParameterLocation::Body,
                                schema: Some(body_schema),
                                encoding: None,
                            },
                        },
                    );
                    request_body = Some(RequestBodyInfo {
                        content_type,
                        encoding: IndexMap::new(),
                    });
                }
                "formData" => {
                    if parameter.get("type").and_then(Value::as_str) == Some("file") {
                        has_file_field = true;
                        let bytes = self
                            .schemas
                            .scalar(crate::schema::models::TypeRepresentation::Bytes);
                        form_fields.insert(
                            param_name.to_string(),
                            ObjectField {
                                field_type: bytes,
                                description: None,
                                http: Some(TypeSchema::scalar("string")),
                            },
                        );
                        continue;
                    }
                    let (mut field_type, field_schema) = self
                        .schemas
                        .build_schema(&[name.clone(), param_name.to_string()], &parameter)?;
                    if !is_required(&parameter) {
                        field_type = Type::nullable(field_type);
                    }
                    form_fields.insert(
                        param_name.to_string(),
                        ObjectField {
                            field_type,
                            description: field_schema.description.clone(),
                            http: Some(field_schema),
                        },
                    );
                }
                "query" | "header" | "path" => {
                    let (arg_name, info) =
                        self.build_simple_parameter(&name, param_name, location, &parameter)?;
                    arguments.insert(arg_name, info);
                }
                other => {
                    self.schemas.errors.push(
                        Error::unsupported_parameter_location(param_name, other).to_string(),
                    );
                }
            }
        }

        // formData parameters collapse into a synthetic `<OpName>Body` object.
        if !form_fields.is_empty() {
            let body_name = format!("{}Body", to_pascal_case(&name));
            self.schemas.object_types.insert(
                body_name.clone(),
                ObjectType {
                    description: None,
                    fields: form_fields,
                    xml: None,
                },
            );
            let content_type = if has_file_field {
                "multipart/form-data"
            } else {
                "application/x-www-form-urlencoded"
            };
            arguments.insert(
                BODY_ARGUMENT.to_string(),
                ArgumentInfo {
                    argument_type: Type::named(body_name),
                    description: None,
                    http: RequestParameter {
                        name: BODY_ARGUMENT.to_string(),
                        location: ParameterLocation::FormData,
                        schema: None,
                        encoding: None,
                    },
                },
            );
            request_body = Some(RequestBodyInfo {
                content_type: content_type.to_string(),
                encoding: IndexMap::new(),
            });
        }

        let (result_type, response_content_type) =
            self.build_response(&name, operation)?;

        let info = OperationInfo {
            request: OperationRequest {
                url: path.to_string(),
                method: method.to_string(),
                request_body,
                response: ResponseInfo {
                    content_type: response_content_type.clone(),
                },
                security: operation
                    .get("security")
                    .and_then(Value::as_array)
                    .map(|entries| entries.iter().filter_map(requirement_from_value).collect()),
                servers: None,
                distributed: false,
            },
            arguments,
            result_type,
            description: operation
                .get("summary")
                .or_else(|| operation.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        if method == "get" && (self.config.pure || !response_content_type.is_empty()) {
            self.functions.insert(name, info);
        } else {
            self.procedures.insert(name, info);
        }
        Ok(())
    }

    fn build_simple_parameter(
        &mut self,
        operation_name: &str,
        param_name: &str,
        location: &str,
        parameter: &Value,
    ) -> Result<(String, ArgumentInfo), Error> {
        let location = match location {
            "query" => ParameterLocation::Query,
            "header" => ParameterLocation::Header,
            "path" => ParameterLocation::Path,
            other => return Err(Error::unsupported_parameter_location(param_name, other)),
        };

        let (mut argument_type, schema) = self.schemas.build_schema(
            &[operation_name.to_string(), param_name.to_string()],
            parameter,
        )?;
        let required =
            is_required(parameter) || location == ParameterLocation::Path;
        if !required {
            argument_type = Type::nullable(argument_type);
        }

        let (style, explode) = collection_format(parameter, location);
        Ok((
            argument_name(param_name),
            ArgumentInfo {
                argument_type,
                description: parameter
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                http: RequestParameter {
                    name: param_name.to_string(),
                    location,
                    schema: Some(schema),
                    encoding: Some(EncodingObject {
                        style: Some(style),
                        explode: Some(explode),
                        allow_reserved: false,
                        content_type: Vec::new(),
                        headers: IndexMap::new(),
                    }),
                },
            },
        ))
    }

    fn build_response(
        &mut self,
        operation_name: &str,
        operation: &Value,
    ) -> Result<(Type, String), Error> {
        let responses = operation.get("responses").and_then(Value::as_object);
        let success = responses.and_then(|responses| {
            responses
                .iter()
                .filter_map(|(code, response)| {
                    code.parse::<u16>()
                        .ok()
                        .filter(|status| (200..300).contains(status))
                        .map(|status| (status, response))
                })
                .next()
        });
        let Some((status, response)) = success else {
            return Ok((Type::nullable(Type::named("Boolean")), String::new()));
        };
        if status == 204 {
            return Ok((Type::nullable(Type::named("Boolean")), String::new()));
        }

        let Some(schema) = response.get("schema") else {
            return Ok((Type::nullable(Type::named("JSON")), String::new()));
        };
        let (result_type, _) = self
            .schemas
            .build_schema(&[operation_name.to_string(), "result".to_string()], schema)?;

        let produces: Vec<String> = operation
            .get("produces")
            .or_else(|| self.document.get("produces"))
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let content_type = select_produced_content_type(
            &produces,
            &self.config.allowed_content_types,
        );

        Ok((result_type, content_type))
    }

    fn resolve_parameter(&self, parameter: &Value) -> Result<Value, Error> {
        let Some(reference) = parameter.get("$ref").and_then(Value::as_str) else {
            return Ok(parameter.clone());
        };
        let name = reference
            .rsplit('/')
            .next()
            .ok_or_else(|| Error::unresolved_reference(reference.to_string()))?;
        self.document
            .pointer(&format!("/parameters/{name}"))
            .cloned()
            .ok_or_else(|| Error::unresolved_reference(reference.to_string()))
    }

    fn operation_name(&mut self, operation_id: Option<&str>, method: &str, path: &str) -> String {
        let aliased_method = self
            .config
            .method_alias
            .get(method)
            .map_or(method, String::as_str);
        let mut name = operation_id
            .and_then(format_operation_name)
            .unwrap_or_else(|| {
                operation_name_from_path(aliased_method, path, self.config.trim_prefix.as_deref())
            });
        if self.used_names.contains(&name) {
            name = format!("{name}{}", to_pascal_case(&format!("{method} {path}")));
        }
        self.used_names.insert(name.clone());
        name
    }
}

fn is_required(parameter: &Value) -> bool {
    parameter
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Maps Swagger 2.0 `collectionFormat` onto OpenAPI 3 style/explode pairs.
fn collection_format(parameter: &Value, location: ParameterLocation) -> (ParameterStyle, bool) {
    let default_style = if location == ParameterLocation::Query {
        ParameterStyle::Form
    } else {
        ParameterStyle::Simple
    };
    match parameter.get("collectionFormat").and_then(Value::as_str) {
        Some("multi") => (ParameterStyle::Form, true),
        Some("ssv") => (ParameterStyle::SpaceDelimited, false),
        Some("pipes") => (ParameterStyle::PipeDelimited, false),
        _ => (default_style, false),
    }
}

fn requirement_from_value(value: &Value) -> Option<SecurityRequirement> {
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .map(|(key, scopes)| {
                let scopes = scopes
                    .as_array()
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                (key.clone(), scopes)
            })
            .collect(),
    )
}

fn select_produced_content_type(produces: &[String], allowed: &[String]) -> String {
    for preferred in ["application/json", "application/xml"] {
        if produces.iter().any(|ct| ct == preferred) {
            return preferred.to_string();
        }
    }
    for preferred in allowed {
        if produces.contains(preferred) {
            return preferred.clone();
        }
    }
    produces
        .first()
        .cloned()
        .unwrap_or_else(|| "application/json".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(document: Value) -> ConversionOutcome {
        let config = ConvertConfig::default();
        build(&document, &config).unwrap()
    }

    fn swagger_doc() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "Pet Store", "version": "1.0.6"},
            "host": "petstore.example",
            "basePath": "/v2",
            "schemes": ["https"],
            "paths": {
                "/pet/{petId}": {
                    "get": {
                        "operationId": "getPetById",
                        "produces": ["application/json"],
                        "parameters": [{
                            "name": "petId",
                            "in": "path",
                            "required": true,
                            "type": "integer",
                            "format": "int64"
                        }],
                        "responses": {
                            "200": {
                                "description": "ok",
                                "schema": {"$ref": "#/definitions/Pet"}
                            }
                        }
                    }
                },
                "/pet/{petId}/uploadImage": {
                    "post": {
                        "operationId": "uploadFile",
                        "consumes": ["multipart/form-data"],
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "type": "integer"},
                            {"name": "additionalMetadata", "in": "formData", "type": "string"},
                            {"name": "file", "in": "formData", "type": "file"}
                        ],
                        "responses": {
                            "200": {"description": "ok", "schema": {"type": "object", "properties": {"code": {"type": "integer"}}}}
                        }
                    }
                }
            },
            "definitions": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "name": {"type": "string"}
                    }
                }
            },
            "securityDefinitions": {
                "api_key": {"type": "apiKey", "name": "api_key", "in": "header"},
                "petstore_auth": {
                    "type": "oauth2",
                    "flow": "application",
                    "tokenUrl": "https://petstore.example/oauth/token",
                    "scopes": {"write:pets": "modify pets"}
                }
            }
        })
    }

    #[test]
    fn host_and_base_path_become_the_server_url() {
        let outcome = convert(swagger_doc());
        let server = &outcome.catalog.settings.servers[0];
        assert_eq!(
            server.url,
            ValueSource::Env {
                env: "SERVER_URL".into(),
                value: Some("https://petstore.example/v2".into()),
            }
        );
    }

    #[test]
    fn path_parameter_is_non_nullable_int64() {
        let outcome = convert(swagger_doc());
        let pet_id = &outcome.catalog.functions["getPetById"].arguments["petId"];
        assert_eq!(pet_id.argument_type, Type::named("Int64"));
        assert_eq!(pet_id.http.location, ParameterLocation::Path);
    }

    #[test]
    fn form_data_collapses_into_synthetic_body_object() {
        let outcome = convert(swagger_doc());
        let upload = &outcome.catalog.procedures["uploadFile"];
        let body = &upload.arguments["body"];
        assert_eq!(body.argument_type.underlying_name(), Some("UploadFileBody"));
        assert_eq!(
            upload.request.request_body.as_ref().unwrap().content_type,
            "multipart/form-data"
        );

        let body_object = &outcome.catalog.object_types["UploadFileBody"];
        assert!(body_object.fields.contains_key("additionalMetadata"));
        assert!(body_object.fields.contains_key("file"));
    }

    #[test]
    fn application_flow_maps_to_client_credentials() {
        let outcome = convert(swagger_doc());
        let scheme = &outcome.catalog.settings.security_schemes["petstore_auth"];
        let SecurityScheme::Oauth2 { flows } = scheme else {
            panic!("expected oauth2 scheme");
        };
        let flow = &flows[&OAuthFlowType::ClientCredentials];
        assert!(flow.client_id.is_some());
        assert_eq!(
            flow.token_url,
            Some(ValueSource::Env {
                env: "PETSTORE_AUTH_TOKEN_URL".into(),
                value: Some("https://petstore.example/oauth/token".into()),
            })
        );
    }
}
