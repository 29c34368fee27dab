//! OpenAPI 3.x document builder.
//!
//! The document structure (paths, operations, parameters, bodies,
//! responses, security schemes, servers) is walked through the typed
//! `openapiv3` model; schema nodes are handed to the raw-value
//! [`SchemaBuilder`] so `xml` annotations survive.

use crate::convert::name::{
    format_operation_name, operation_name_from_path, security_env_name, server_url_env_name,
    to_pascal_case, EnvRole,
};
use crate::convert::schema_builder::{argument_name, SchemaBuilder, BODY_ARGUMENT};
use crate::convert::{ConversionOutcome, ConvertConfig};
use crate::config::value_source::ValueSource;
use crate::error::Error;
use crate::schema::merge::format_write_object_name;
use crate::schema::models::{
    ArgumentInfo, Catalog, EncodingObject, ObjectType, OperationInfo, OperationRequest,
    ParameterLocation, ParameterStyle, RequestBodyInfo, RequestParameter, ResponseInfo, Type,
    TypeSchema,
};
use crate::schema::security::{
    ApiKeyLocation, OAuthFlow, OAuthFlowType, SecurityScheme, ServerConfig, Settings,
};
use indexmap::IndexMap;
use openapiv3::{
    MediaType, OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathStyle, QueryStyle,
    ReferenceOr, RequestBody, Response, StatusCode,
};
use serde_json::Value;
use std::collections::HashSet;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Builds a catalog from a decoded OpenAPI 3.x document.
///
/// # Errors
/// Fails only on undecodable documents; per-operation problems accumulate
/// in the outcome.
pub fn build(document: &Value, config: &ConvertConfig) -> Result<ConversionOutcome, Error> {
    let doc: OpenAPI = serde_json::from_value(document.clone())
        .map_err(|e| Error::conversion(format!("not a valid OpenAPI 3.x document: {e}")))?;

    let named_schemas = raw_named_schemas(document, "/components/schemas");
    let mut builder = DocumentBuilder {
        schemas: SchemaBuilder::new(config, named_schemas),
        doc: &doc,
        config,
        functions: IndexMap::new(),
        procedures: IndexMap::new(),
        used_names: HashSet::new(),
    };

    builder.schemas.build_all_named();
    let settings = builder.build_settings();
    builder.build_paths();

    let mut catalog = Catalog {
        settings,
        functions: builder.functions,
        procedures: builder.procedures,
        object_types: builder.schemas.object_types,
        scalar_types: builder.schemas.scalar_types,
    };
    apply_write_schema_transform(&mut catalog);

    Ok(ConversionOutcome {
        catalog,
        errors: builder.schemas.errors,
    })
}

/// Extracts the raw named-schema map at a JSON pointer, preserving
/// annotations the typed model drops.
pub(crate) fn raw_named_schemas(document: &Value, pointer: &str) -> IndexMap<String, Value> {
    document
        .pointer(pointer)
        .and_then(Value::as_object)
        .map(|schemas| {
            schemas
                .iter()
                .map(|(name, schema)| (name.clone(), schema.clone()))
                .collect()
        })
        .unwrap_or_default()
}

struct DocumentBuilder<'a> {
    schemas: SchemaBuilder<'a>,
    doc: &'a OpenAPI,
    config: &'a ConvertConfig,
    functions: IndexMap<String, OperationInfo>,
    procedures: IndexMap<String, OperationInfo>,
    used_names: HashSet<String>,
}

impl DocumentBuilder<'_> {
    // ---- settings: servers + security ----

    fn build_settings(&mut self) -> Settings {
        let doc = self.doc;
        let mut settings = Settings {
            version: Some(doc.info.version.clone()),
            security: doc.security.clone().map(convert_security_requirements),
            ..Settings::default()
        };

        for (index, server) in doc.servers.iter().enumerate() {
            let declared_id = server
                .extensions
                .get("x-server-id")
                .and_then(Value::as_str)
                .map(str::to_string);
            let env = server_url_env_name(
                self.config.env_prefix.as_deref(),
                declared_id.as_deref(),
                index,
            );
            settings.servers.push(ServerConfig {
                id: declared_id.unwrap_or_else(|| format!("server-{}", index + 1)),
                url: ValueSource::Env {
                    env,
                    value: Some(server.url.clone()),
                },
                headers: IndexMap::new(),
                security: None,
                security_schemes: IndexMap::new(),
                tls: None,
            });
        }

        if let Some(components) = &doc.components {
            for (key, scheme) in &components.security_schemes {
                match scheme {
                    ReferenceOr::Item(scheme) => {
                        let converted = self.convert_security_scheme(key, scheme);
                        if converted.requires_headers_forwarding() && !self.config.headers_forwarding
                        {
                            self.schemas.errors.push(format!(
                                "security scheme '{key}' needs forwarded headers, which are disabled"
                            ));
                        }
                        settings.security_schemes.insert(key.clone(), converted);
                    }
                    ReferenceOr::Reference { reference } => self
                        .schemas
                        .errors
                        .push(format!("security scheme '{key}': unresolved {reference}")),
                }
            }
        }

        settings
    }

    fn convert_security_scheme(
        &self,
        key: &str,
        scheme: &openapiv3::SecurityScheme,
    ) -> SecurityScheme {
        let prefix = self.config.env_prefix.as_deref();
        let env = |role: EnvRole| ValueSource::env(security_env_name(prefix, key, role));
        match scheme {
            openapiv3::SecurityScheme::APIKey { location, name, .. } => {
                let location = match location {
                    openapiv3::APIKeyLocation::Header => ApiKeyLocation::Header,
                    openapiv3::APIKeyLocation::Query => ApiKeyLocation::Query,
                    openapiv3::APIKeyLocation::Cookie => ApiKeyLocation::Cookie,
                };
                SecurityScheme::ApiKey {
                    name: name.clone(),
                    location,
                    value: env(EnvRole::Value),
                }
            }
            openapiv3::SecurityScheme::HTTP { scheme, .. } => {
                if scheme.eq_ignore_ascii_case("basic") {
                    SecurityScheme::Basic {
                        username: env(EnvRole::Username),
                        password: env(EnvRole::Password),
                    }
                } else {
                    SecurityScheme::Http {
                        scheme: to_pascal_case(scheme),
                        header: "Authorization".to_string(),
                        value: env(EnvRole::Token),
                    }
                }
            }
            openapiv3::SecurityScheme::OAuth2 { flows, .. } => {
                let mut converted = IndexMap::new();
                if let Some(flow) = &flows.client_credentials {
                    converted.insert(
                        OAuthFlowType::ClientCredentials,
                        OAuthFlow {
                            token_url: Some(ValueSource::Env {
                                env: security_env_name(prefix, key, EnvRole::TokenUrl),
                                value: Some(flow.token_url.clone()),
                            }),
                            refresh_url: flow
                                .refresh_url
                                .clone()
                                .map(|url| ValueSource::Env {
                                    env: security_env_name(prefix, key, EnvRole::RefreshUrl),
                                    value: Some(url),
                                }),
                            scopes: flow.scopes.clone(),
                            client_id: Some(env(EnvRole::ClientId)),
                            client_secret: Some(env(EnvRole::ClientSecret)),
                            ..OAuthFlow::default()
                        },
                    );
                }
                if let Some(flow) = &flows.authorization_code {
                    converted.insert(
                        OAuthFlowType::AuthorizationCode,
                        OAuthFlow {
                            authorization_url: Some(flow.authorization_url.clone()),
                            token_url: Some(ValueSource::Literal(flow.token_url.clone())),
                            scopes: flow.scopes.clone(),
                            ..OAuthFlow::default()
                        },
                    );
                }
                if let Some(flow) = &flows.implicit {
                    converted.insert(
                        OAuthFlowType::Implicit,
                        OAuthFlow {
                            authorization_url: Some(flow.authorization_url.clone()),
                            scopes: flow.scopes.clone(),
                            ..OAuthFlow::default()
                        },
                    );
                }
                if let Some(flow) = &flows.password {
                    converted.insert(
                        OAuthFlowType::Password,
                        OAuthFlow {
                            token_url: Some(ValueSource::Literal(flow.token_url.clone())),
                            scopes: flow.scopes.clone(),
                            ..OAuthFlow::default()
                        },
                    );
                }
                SecurityScheme::Oauth2 { flows: converted }
            }
            openapiv3::SecurityScheme::OpenIDConnect {
                open_id_connect_url,
                ..
            } => SecurityScheme::OpenIdConnect {
                open_id_connect_url: open_id_connect_url.clone(),
            },
        }
    }

    // ---- paths ----

    fn build_paths(&mut self) {
        // Clone the path list up front; conversion needs &mut self for the
        // schema builder while walking.
        let doc = self.doc;
        let paths: Vec<(String, openapiv3::PathItem)> = doc
            .paths
            .iter()
            .filter_map(|(path, item)| match item {
                ReferenceOr::Item(item) => Some((path.clone(), item.clone())),
                ReferenceOr::Reference { reference } => {
                    self.schemas
                        .errors
                        .push(format!("path '{path}': unresolved {reference}"));
                    None
                }
            })
            .collect();

        for (path, item) in paths {
            let methods: [(&str, Option<&Operation>); 8] = [
                ("get", item.get.as_ref()),
                ("post", item.post.as_ref()),
                ("put", item.put.as_ref()),
                ("delete", item.delete.as_ref()),
                ("patch", item.patch.as_ref()),
                ("head", item.head.as_ref()),
                ("options", item.options.as_ref()),
                ("trace", item.trace.as_ref()),
            ];
            for (method, operation) in methods {
                let Some(operation) = operation else { continue };
                if operation.deprecated && self.config.no_deprecation {
                    continue;
                }
                if let Err(e) = self.build_operation(&path, method, operation, &item.parameters) {
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
        operation: &Operation,
        shared_parameters: &[ReferenceOr<Parameter>],
    ) -> Result<(), Error> {
        let name = self.operation_name(operation.operation_id.as_deref(), method, path);
        let mut arguments: IndexMap<String, ArgumentInfo> = IndexMap::new();

        for parameter in shared_parameters.iter().chain(&operation.parameters) {
            match self.resolve_parameter(parameter) {
                Ok(parameter) => {
                    if let Some((arg_name, info)) = self.build_parameter(&name, &parameter)? {
                        arguments.insert(arg_name, info);
                    }
                }
                Err(e) => self.schemas.errors.push(format!("{method} {path}: {e}")),
            }
        }

        let request_body = match &operation.request_body {
            Some(body) => self.build_request_body(&name, body, &mut arguments)?,
            None => None,
        };

        let (result_type, response_content_type) = self.build_response(&name, operation)?;

        let info = OperationInfo {
            request: OperationRequest {
                url: path.to_string(),
                method: method.to_string(),
                request_body,
                response: ResponseInfo {
                    content_type: response_content_type.clone(),
                },
                security: operation.security.clone().map(convert_security_requirements),
                servers: None,
                distributed: false,
            },
            arguments,
            result_type,
            description: operation
                .summary
                .clone()
                .or_else(|| operation.description.clone()),
        };

        let is_function =
            method == "get" && (self.config.pure || !response_content_type.is_empty());
        if is_function {
            self.functions.insert(name, info);
        } else {
            self.procedures.insert(name, info);
        }
        Ok(())
    }

    /// Operation names come from the declared id when unique; collisions and
    /// missing ids fall back to a method+path derived name.
    fn operation_name(&mut self, operation_id: Option<&str>, method: &str, path: &str) -> String {
        let aliased_method = self
            .config
            .method_alias
            .get(method)
            .map_or(method, String::as_str);
        let fallback = || {
            operation_name_from_path(aliased_method, path, self.config.trim_prefix.as_deref())
        };

        let mut name = operation_id
            .and_then(format_operation_name)
            .unwrap_or_else(fallback);
        if self.used_names.contains(&name) {
            name = format!("{name}{}", to_pascal_case(&format!("{method} {path}")));
        }
        self.used_names.insert(name.clone());
        name
    }

    fn resolve_parameter(&self, parameter: &ReferenceOr<Parameter>) -> Result<Parameter, Error> {
        match parameter {
            ReferenceOr::Item(item) => Ok(item.clone()),
            ReferenceOr::Reference { reference } => {
                let name = reference
                    .rsplit('/')
                    .next()
                    .ok_or_else(|| Error::unresolved_reference(reference.clone()))?;
                match self
                    .doc
                    .components
                    .as_ref()
                    .and_then(|c| c.parameters.get(name))
                {
                    Some(ReferenceOr::Item(item)) => Ok(item.clone()),
                    _ => Err(Error::unresolved_reference(reference.clone())),
                }
            }
        }
    }

    fn build_parameter(
        &mut self,
        operation_name: &str,
        parameter: &Parameter,
    ) -> Result<Option<(String, ArgumentInfo)>, Error> {
        let (data, location, style, explode, allow_reserved) = match parameter {
            Parameter::Query {
                parameter_data,
                style,
                allow_reserved,
                ..
            } => {
                let style = match style {
                    QueryStyle::Form => ParameterStyle::Form,
                    QueryStyle::SpaceDelimited => ParameterStyle::SpaceDelimited,
                    QueryStyle::PipeDelimited => ParameterStyle::PipeDelimited,
                    QueryStyle::DeepObject => ParameterStyle::DeepObject,
                };
                (
                    parameter_data,
                    ParameterLocation::Query,
                    style,
                    parameter_data.explode,
                    *allow_reserved,
                )
            }
            Parameter::Path {
                parameter_data,
                style,
                ..
            } => {
                let style = match style {
                    PathStyle::Simple => ParameterStyle::Simple,
                    PathStyle::Label => ParameterStyle::Label,
                    PathStyle::Matrix => ParameterStyle::Matrix,
                };
                (
                    parameter_data,
                    ParameterLocation::Path,
                    style,
                    parameter_data.explode,
                    false,
                )
            }
            Parameter::Header { parameter_data, .. } => (
                parameter_data,
                ParameterLocation::Header,
                ParameterStyle::Simple,
                parameter_data.explode,
                false,
            ),
            Parameter::Cookie { parameter_data, .. } => {
                return Err(Error::unsupported_parameter_location(
                    parameter_data.name.clone(),
                    "cookie",
                ));
            }
        };

        let (mut argument_type, schema) = match &data.format {
            ParameterSchemaOrContent::Schema(schema) => {
                let raw = reference_or_schema_to_value(schema)?;
                self.schemas
                    .build_schema(&[operation_name.to_string(), data.name.clone()], &raw)?
            }
            ParameterSchemaOrContent::Content(_) => (
                Type::named("JSON"),
                TypeSchema::scalar("object"),
            ),
        };

        // Required path parameters are never nullable.
        let required = data.required || location == ParameterLocation::Path;
        if !required {
            argument_type = Type::nullable(argument_type);
        }

        let info = ArgumentInfo {
            argument_type,
            description: data.description.clone(),
            http: RequestParameter {
                name: data.name.clone(),
                location,
                schema: Some(schema),
                encoding: Some(EncodingObject {
                    style: Some(style),
                    explode,
                    allow_reserved,
                    content_type: Vec::new(),
                    headers: IndexMap::new(),
                }),
            },
        };
        Ok(Some((argument_name(&data.name), info)))
    }

    fn build_request_body(
        &mut self,
        operation_name: &str,
        body: &ReferenceOr<RequestBody>,
        arguments: &mut IndexMap<String, ArgumentInfo>,
    ) -> Result<Option<RequestBodyInfo>, Error> {
        let body = match body {
            ReferenceOr::Item(body) => body.clone(),
            ReferenceOr::Reference { reference } => {
                let name = reference
                    .rsplit('/')
                    .next()
                    .ok_or_else(|| Error::unresolved_reference(reference.clone()))?;
                match self
                    .doc
                    .components
                    .as_ref()
                    .and_then(|c| c.request_bodies.get(name))
                {
                    Some(ReferenceOr::Item(body)) => body.clone(),
                    _ => return Err(Error::unresolved_reference(reference.clone())),
                }
            }
        };

        let Some((content_type, media)) =
            select_content_type(&body.content, &self.config.allowed_content_types)
        else {
            return Ok(None);
        };

        let (mut body_type, schema) = match &media.schema {
            Some(schema) => {
                let raw = reference_or_schema_to_value(schema)?;
                self.schemas
                    .build_schema(&[operation_name.to_string(), "body".to_string()], &raw)?
            }
            None => (Type::named("JSON"), TypeSchema::default()),
        };
        if !body.required {
            body_type = Type::nullable(body_type);
        }

        // A declared parameter named `body` moves aside for the body argument.
        if let Some(existing) = arguments.shift_remove(BODY_ARGUMENT) {
            arguments.insert("paramBody".to_string(), existing);
        }
        arguments.insert(
            BODY_ARGUMENT.to_string(),
            ArgumentInfo {
                argument_type: body_type,
                description: body.description.clone(),
                http: RequestParameter {
                    name: BODY_ARGUMENT.to_string(),
                    location: ParameterLocation::Body,
                    schema: Some(schema),
                    encoding: None,
                },
            },
        );

        let encoding = media
            .encoding
            .iter()
            .map(|(property, encoding)| {
                (
                    property.clone(),
                    EncodingObject {
                        style: encoding.style.as_ref().map(|style| match style {
                            QueryStyle::Form => ParameterStyle::Form,
                            QueryStyle::SpaceDelimited => ParameterStyle::SpaceDelimited,
                            QueryStyle::PipeDelimited => ParameterStyle::PipeDelimited,
                            QueryStyle::DeepObject => ParameterStyle::DeepObject,
                        }),
                        explode: Some(encoding.explode),
                        allow_reserved: false,
                        content_type: encoding
                            .content_type
                            .clone()
                            .map(|ct| vec![ct])
                            .unwrap_or_default(),
                        headers: IndexMap::new(),
                    },
                )
            })
            .collect();

        Ok(Some(RequestBodyInfo {
            content_type: content_type.clone(),
            encoding,
        }))
    }

    /// Picks the first 2xx response and derives the result type.
    fn build_response(
        &mut self,
        operation_name: &str,
        operation: &Operation,
    ) -> Result<(Type, String), Error> {
        let success = operation.responses.responses.iter().find_map(|(code, response)| {
            let status = match code {
                StatusCode::Code(code) => *code,
                StatusCode::Range(range) => range * 100,
            };
            (200..300).contains(&status).then_some((status, response))
        });

        let Some((status, response)) = success else {
            // No declared success response: the operation yields nothing.
            return Ok((
                Type::nullable(Type::named("Boolean")),
                String::new(),
            ));
        };

        let response: Response = match response {
            ReferenceOr::Item(response) => response.clone(),
            ReferenceOr::Reference { reference } => {
                let name = reference
                    .rsplit('/')
                    .next()
                    .ok_or_else(|| Error::unresolved_reference(reference.clone()))?;
                match self
                    .doc
                    .components
                    .as_ref()
                    .and_then(|c| c.responses.get(name))
                {
                    Some(ReferenceOr::Item(response)) => response.clone(),
                    _ => return Err(Error::unresolved_reference(reference.clone())),
                }
            }
        };

        if status == 204 {
            return Ok((Type::nullable(Type::named("Boolean")), String::new()));
        }
        let Some((content_type, media)) =
            select_content_type(&response.content, &self.config.allowed_content_types)
        else {
            return Ok((Type::nullable(Type::named("JSON")), String::new()));
        };

        let (result_type, _) = match &media.schema {
            Some(schema) => {
                let raw = reference_or_schema_to_value(schema)?;
                self.schemas
                    .build_schema(&[operation_name.to_string(), "result".to_string()], &raw)?
            }
            None => (
                Type::nullable(Type::named("JSON")),
                TypeSchema::default(),
            ),
        };

        let result_type = if content_type == NDJSON_CONTENT_TYPE {
            Type::array(result_type)
        } else {
            result_type
        };
        Ok((result_type, content_type.clone()))
    }
}

fn convert_security_requirements(
    requirements: Vec<openapiv3::SecurityRequirement>,
) -> Vec<crate::schema::models::SecurityRequirement> {
    requirements
        .into_iter()
        .map(|requirement| requirement.into_iter().collect())
        .collect()
}

fn reference_or_schema_to_value(
    schema: &ReferenceOr<openapiv3::Schema>,
) -> Result<Value, Error> {
    match schema {
        ReferenceOr::Reference { reference } => {
            Ok(serde_json::json!({ "$ref": reference }))
        }
        ReferenceOr::Item(item) => serde_json::to_value(item)
            .map_err(|e| Error::conversion(format!("schema serialization failed: {e}"))),
    }
}

/// Preferred content type: `application/json`, then `application/xml`, then
/// the configured allow-list order, then the first declared.
fn select_content_type<'a>(
    content: &'a IndexMap<String, MediaType>,
    allowed: &[String],
) -> Option<(&'a String, &'a MediaType)> {
    for preferred in ["application/json", "application/xml"] {
        if let Some(entry) = content.get_key_value(preferred) {
            return Some(entry);
        }
    }
    for preferred in allowed {
        if let Some(entry) = content.get_key_value(preferred) {
            return Some(entry);
        }
    }
    content.iter().next()
}

/// Clones every object with write-only fields into a `<Name>Input` variant
/// used as argument types: read-only fields are excluded from the Input
/// variant, write-only fields from the read variant. Body arguments are
/// re-pointed at the Input variants.
pub fn apply_write_schema_transform(catalog: &mut Catalog) {
    let needs_variant: Vec<String> = catalog
        .object_types
        .iter()
        .filter(|(_, object)| {
            object.fields.values().any(|field| {
                field
                    .http
                    .as_ref()
                    .is_some_and(|schema| schema.read_only || schema.write_only)
            })
        })
        .map(|(name, _)| name.clone())
        .collect();
    if needs_variant.is_empty() {
        return;
    }

    let variant_names: HashSet<String> = needs_variant.iter().cloned().collect();

    for name in &needs_variant {
        let Some(object) = catalog.object_types.get(name).cloned() else {
            continue;
        };

        let mut input_variant = ObjectType {
            description: object.description.clone(),
            fields: IndexMap::new(),
            xml: object.xml.clone(),
        };
        for (field_name, field) in &object.fields {
            let read_only = field
                .http
                .as_ref()
                .is_some_and(|schema| schema.read_only);
            if read_only {
                continue;
            }
            let mut field = field.clone();
            // Nested write variants reference each other.
            if let Some(underlying) = field.field_type.underlying_name() {
                if variant_names.contains(underlying) {
                    let input_name = format_write_object_name(underlying);
                    field.field_type.rename_underlying(&input_name);
                }
            }
            input_variant.fields.insert(field_name.clone(), field);
        }
        catalog
            .object_types
            .insert(format_write_object_name(name), input_variant);

        // Strip write-only fields from the read variant.
        if let Some(read_variant) = catalog.object_types.get_mut(name) {
            read_variant.fields.retain(|_, field| {
                !field
                    .http
                    .as_ref()
                    .is_some_and(|schema| schema.write_only)
            });
        }
    }

    // Body arguments send data upstream, so they use the Input variants.
    for operation in catalog
        .functions
        .values_mut()
        .chain(catalog.procedures.values_mut())
    {
        for argument in operation.arguments.values_mut() {
            if argument.http.location != ParameterLocation::Body {
                continue;
            }
            if let Some(underlying) = argument.argument_type.underlying_name() {
                if variant_names.contains(underlying) {
                    let input_name = format_write_object_name(underlying);
                    argument.argument_type.rename_underlying(&input_name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(document: Value) -> Catalog {
        let config = ConvertConfig::default();
        build(&document, &config).unwrap().catalog
    }

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Pet Store", "version": "1.0.19"},
            "servers": [{"url": "https://petstore.example/api/v3"}],
            "paths": {
                "/pet/findByStatus": {
                    "get": {
                        "operationId": "findPetsByStatus",
                        "parameters": [{
                            "name": "status",
                            "in": "query",
                            "required": false,
                            "schema": {"type": "string", "enum": ["available", "pending", "sold"]}
                        }],
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": {"$ref": "#/components/schemas/Pet"}
                                        }
                                    }
                                }
                            }
                        }
                    }
                },
                "/pet": {
                    "post": {
                        "operationId": "addPet",
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/Pet"}
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {
                                    "application/json": {
                                        "schema": {"$ref": "#/components/schemas/Pet"}
                                    }
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
                            "id": {"type": "integer", "format": "int64", "readOnly": true},
                            "name": {"type": "string"},
                            "status": {"type": "string", "enum": ["available", "pending", "sold"]}
                        }
                    }
                },
                "securitySchemes": {
                    "api_key": {"type": "apiKey", "name": "api_key", "in": "header"}
                }
            }
        })
    }

    #[test]
    fn get_with_body_is_function_post_is_procedure() {
        let catalog = convert(petstore());
        assert!(catalog.functions.contains_key("findPetsByStatus"));
        assert!(catalog.procedures.contains_key("addPet"));
    }

    #[test]
    fn enum_parameter_reuses_component_scalar_name() {
        let catalog = convert(petstore());
        let status = &catalog.functions["findPetsByStatus"].arguments["status"];
        // The parameter's value set matches Pet.status, so they share one
        // enum scalar.
        assert_eq!(status.argument_type.underlying_name(), Some("PetStatus"));
        assert!(status.argument_type.is_nullable());
    }

    #[test]
    fn security_scheme_generates_env_backed_value() {
        let catalog = convert(petstore());
        let scheme = &catalog.settings.security_schemes["api_key"];
        match scheme {
            SecurityScheme::ApiKey { name, value, .. } => {
                assert_eq!(name, "api_key");
                assert_eq!(value, &ValueSource::env("API_KEY".into()));
            }
            other => panic!("expected apiKey scheme, got {other:?}"),
        }
    }

    #[test]
    fn server_url_is_env_backed_with_declared_default() {
        let catalog = convert(petstore());
        let server = &catalog.settings.servers[0];
        assert_eq!(server.id, "server-1");
        assert_eq!(
            server.url,
            ValueSource::Env {
                env: "SERVER_URL".into(),
                value: Some("https://petstore.example/api/v3".into()),
            }
        );
    }

    #[test]
    fn write_transform_splits_read_only_fields() {
        let catalog = convert(petstore());
        let read = &catalog.object_types["Pet"];
        assert!(read.fields.contains_key("id"));

        let input = &catalog.object_types["PetInput"];
        assert!(!input.fields.contains_key("id"));
        assert!(input.fields.contains_key("name"));

        let body = &catalog.procedures["addPet"].arguments["body"];
        assert_eq!(body.argument_type.underlying_name(), Some("PetInput"));
    }

    #[test]
    fn missing_success_response_yields_nullable_boolean() {
        let document = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/ping": {
                    "delete": {
                        "operationId": "deletePing",
                        "responses": {"204": {"description": "gone"}}
                    }
                }
            }
        });
        let catalog = convert(document);
        let result = &catalog.procedures["deletePing"].result_type;
        assert_eq!(result, &Type::nullable(Type::named("Boolean")));
    }

    #[test]
    fn ndjson_response_wraps_result_in_array() {
        let document = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/model": {
                    "post": {
                        "operationId": "runModel",
                        "responses": {
                            "200": {
                                "description": "stream",
                                "content": {
                                    "application/x-ndjson": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "completed": {"type": "integer"},
                                                "status": {"type": "string"}
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
        let catalog = convert(document);
        let result = &catalog.procedures["runModel"].result_type;
        assert!(matches!(result, Type::Array { .. }));
        assert_eq!(
            catalog.procedures["runModel"].request.response.content_type,
            "application/x-ndjson"
        );
    }

    #[test]
    fn duplicate_operation_ids_get_method_path_tail() {
        let document = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {
                    "get": {
                        "operationId": "list",
                        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {"type": "string"}}}}}
                    }
                },
                "/b": {
                    "get": {
                        "operationId": "list",
                        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {"type": "string"}}}}}
                    }
                }
            }
        });
        let catalog = convert(document);
        assert_eq!(catalog.functions.len(), 2);
        assert!(catalog.functions.contains_key("list"));
        assert!(catalog.functions.keys().any(|name| name.starts_with("listGet")));
    }
}
