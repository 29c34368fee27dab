//! The connector facade: the four operations the host calls.
//!
//! `parse_configuration` builds the immutable state (catalogs, per-server
//! HTTP clients, codec registry, OAuth2 token cache); `get_schema` serves
//! the merged catalog serialized once; `query`/`mutation` (and their
//! explain twins) drive binding, auth, execution and projection.

pub mod capabilities;
pub mod models;

use crate::auth::oauth::TokenCache;
use crate::auth::{build_http_client, AuthContext};
use crate::client::distributor::{self, HttpOptions};
use crate::client::{execute_decoded, DecodedResponse};
use crate::codec::CodecRegistry;
use crate::config::manager::{self, FileCatalog};
use crate::config::models::Configuration;
use crate::convert::distributed::HTTP_OPTIONS_ARGUMENT;
use crate::error::Error;
use crate::projection::{project, project_row};
use crate::request::builder::{build_request, BindContext};
use crate::schema::models::{OperationInfo, OperationKind};
use models::{
    Argument, ExplainResponse, MutationOperation, MutationOperationResult, MutationRequest,
    MutationResponse, QueryRequest, QueryResponse, RowSet,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Static capabilities advertisement.
#[must_use]
pub fn get_capabilities() -> Value {
    capabilities::capabilities()
}

/// The connector. Cheap to clone; all state is shared and immutable apart
/// from the OAuth2 token cache.
#[derive(Clone)]
pub struct HttpConnector {
    state: Arc<ConnectorState>,
}

struct ConnectorState {
    configuration: Configuration,
    files: Vec<FileCatalog>,
    schema: Value,
    codecs: CodecRegistry,
    token_cache: TokenCache,
    clients: HashMap<(usize, String), reqwest::Client>,
    default_client: reqwest::Client,
}

impl HttpConnector {
    /// Discovers and loads `config.{json,yaml,yml}` in the directory, runs
    /// schema conversion (or loads the catalog cache) and prepares
    /// per-server HTTP clients.
    ///
    /// # Errors
    /// Missing/invalid configuration, fatal conversion failures, bad TLS
    /// material.
    pub fn parse_configuration(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let configuration = manager::load_configuration(dir)?;
        let files = manager::load_catalogs(dir, &configuration)?;
        Self::from_parts(configuration, files)
    }

    /// Builds a connector from already-loaded parts (used by tests and the
    /// CLI after a fresh conversion).
    ///
    /// # Errors
    /// Bad TLS material or serialization failures.
    pub fn from_parts(
        configuration: Configuration,
        files: Vec<FileCatalog>,
    ) -> Result<Self, Error> {
        let schema = manager::merged_schema(&files)?;

        let mut clients = HashMap::new();
        for (file_index, file) in files.iter().enumerate() {
            let settings = &file.catalog.settings;
            for server in &settings.servers {
                let tls = server.tls.as_ref().or(settings.tls.as_ref());
                clients.insert(
                    (file_index, server.id.clone()),
                    build_http_client(tls)?,
                );
            }
        }

        Ok(Self {
            state: Arc::new(ConnectorState {
                configuration,
                files,
                schema,
                codecs: CodecRegistry::new(),
                token_cache: TokenCache::new(),
                clients,
                default_client: build_http_client(None)?,
            }),
        })
    }

    /// The merged catalog, serialized once at configuration parse.
    #[must_use]
    pub fn get_schema(&self) -> &Value {
        &self.state.schema
    }

    /// Executes a query request: one row set per variable set. The caller's
    /// cancellation token propagates through every spawned task and HTTP
    /// attempt; a fired token discards partial results and returns
    /// cancelled.
    ///
    /// # Errors
    /// Unknown collections, procedures called as queries, cancellation,
    /// binding and upstream failures.
    pub async fn query(
        &self,
        request: QueryRequest,
        cancellation: CancellationToken,
    ) -> Result<QueryResponse, Error> {
        let span =
            tracing::info_span!(target: "prism::connector", "query", collection = %request.collection);
        self.query_inner(request, cancellation).instrument(span).await
    }

    async fn query_inner(
        &self,
        request: QueryRequest,
        cancellation: CancellationToken,
    ) -> Result<QueryResponse, Error> {
        let state = &self.state;
        let (file_index, operation, kind) = state.find_operation(&request.collection)?;
        if kind != OperationKind::Function {
            return Err(Error::bad_request(format!(
                "'{}' is a procedure; call it through mutation",
                request.collection
            )));
        }
        let operation = operation.clone();

        let variable_sets: Vec<Option<&BTreeMap<String, Value>>> = match &request.variables {
            None => vec![None],
            Some(sets) => sets.iter().map(Some).collect(),
        };

        let concurrency = state.configuration.concurrency.query.max(1) as usize;
        if variable_sets.len() >= 2 && concurrency > 1 {
            self.query_parallel(&request, &operation, file_index, concurrency, &cancellation)
                .await
        } else {
            let mut row_sets = Vec::with_capacity(variable_sets.len());
            for variables in variable_sets {
                if cancellation.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let arguments = resolve_arguments(&request.arguments, variables)?;
                let value = state
                    .call_operation(&self.state, file_index, &operation, &arguments, &cancellation)
                    .await?;
                row_sets.push(state.row_set(file_index, &operation, &request, value));
            }
            Ok(row_sets)
        }
    }

    async fn query_parallel(
        &self,
        request: &QueryRequest,
        operation: &OperationInfo,
        file_index: usize,
        concurrency: usize,
        cancellation: &CancellationToken,
    ) -> Result<QueryResponse, Error> {
        let variable_sets = request.variables.clone().unwrap_or_default();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(variable_sets.len());

        for variables in variable_sets {
            let state = Arc::clone(&self.state);
            let operation = operation.clone();
            let arguments_spec = request.arguments.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancellation = cancellation.clone();
            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    () = cancellation.cancelled() => return Err(Error::Cancelled),
                    permit = semaphore.acquire() => permit.expect("semaphore is never closed"),
                };
                let arguments = resolve_arguments(&arguments_spec, Some(&variables))?;
                state
                    .call_operation(&state, file_index, &operation, &arguments, &cancellation)
                    .await
            }));
        }

        // Results are collected at the task's input index, preserving the
        // variable-set order. A fired token aborts outstanding tasks.
        let values = collect_task_results(handles, cancellation).await?;
        let mut row_sets = Vec::with_capacity(values.len());
        for value in values {
            row_sets.push(self.state.row_set(file_index, operation, request, value?));
        }
        Ok(row_sets)
    }

    /// Explains the first variable row of a query without dispatching it.
    ///
    /// # Errors
    /// Same pre-dispatch failures as `query`.
    pub async fn query_explain(&self, request: QueryRequest) -> Result<ExplainResponse, Error> {
        let state = &self.state;
        let (file_index, operation, _) = state.find_operation(&request.collection)?;
        let operation = operation.clone();
        let variables = request
            .variables
            .as_ref()
            .and_then(|sets| sets.first());
        let arguments = resolve_arguments(&request.arguments, variables)?;
        state.explain(file_index, &operation, &arguments).await
    }

    /// Executes a mutation request, one result per operation. The caller's
    /// cancellation token propagates through every spawned task and HTTP
    /// attempt.
    ///
    /// # Errors
    /// Unknown procedures, functions called as mutations, cancellation,
    /// binding and upstream failures.
    pub async fn mutation(
        &self,
        request: MutationRequest,
        cancellation: CancellationToken,
    ) -> Result<MutationResponse, Error> {
        let span = tracing::info_span!(
            target: "prism::connector",
            "mutation",
            operations = request.operations.len(),
        );
        self.mutation_inner(request, cancellation)
            .instrument(span)
            .await
    }

    async fn mutation_inner(
        &self,
        request: MutationRequest,
        cancellation: CancellationToken,
    ) -> Result<MutationResponse, Error> {
        let concurrency = self.state.configuration.concurrency.mutation.max(1) as usize;
        if request.operations.len() >= 2 && concurrency > 1 {
            return self.mutation_parallel(request, concurrency, &cancellation).await;
        }

        let mut operation_results = Vec::with_capacity(request.operations.len());
        for operation in &request.operations {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            operation_results.push(MutationOperationResult {
                result: self.run_mutation_operation(operation, &cancellation).await?,
            });
        }
        Ok(MutationResponse { operation_results })
    }

    async fn mutation_parallel(
        &self,
        request: MutationRequest,
        concurrency: usize,
        cancellation: &CancellationToken,
    ) -> Result<MutationResponse, Error> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(request.operations.len());
        for operation in request.operations {
            let connector = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancellation = cancellation.clone();
            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    () = cancellation.cancelled() => return Err(Error::Cancelled),
                    permit = semaphore.acquire() => permit.expect("semaphore is never closed"),
                };
                connector
                    .run_mutation_operation(&operation, &cancellation)
                    .await
            }));
        }

        let results = collect_task_results(handles, cancellation).await?;
        let mut operation_results = Vec::with_capacity(results.len());
        for result in results {
            operation_results.push(MutationOperationResult { result: result? });
        }
        Ok(MutationResponse { operation_results })
    }

    async fn run_mutation_operation(
        &self,
        operation: &MutationOperation,
        cancellation: &CancellationToken,
    ) -> Result<Value, Error> {
        let state = &self.state;
        let (file_index, info, kind) = state.find_operation(&operation.name)?;
        if kind != OperationKind::Procedure {
            return Err(Error::bad_request(format!(
                "'{}' is a function; call it through query",
                operation.name
            )));
        }
        let info = info.clone();
        let value = state
            .call_operation(
                &self.state,
                file_index,
                &info,
                &operation.arguments,
                cancellation,
            )
            .await?;
        let catalog = &state.files[file_index].catalog;
        Ok(project(
            value,
            operation.fields.as_ref(),
            Some(&info.result_type),
            catalog,
        ))
    }

    /// Explains the first mutation operation without dispatching it.
    ///
    /// # Errors
    /// Same pre-dispatch failures as `mutation`.
    pub async fn mutation_explain(
        &self,
        request: MutationRequest,
    ) -> Result<ExplainResponse, Error> {
        let state = &self.state;
        let Some(operation) = request.operations.first() else {
            return Err(Error::bad_request("mutation request has no operations"));
        };
        let (file_index, info, _) = state.find_operation(&operation.name)?;
        let info = info.clone();
        state.explain(file_index, &info, &operation.arguments).await
    }
}

impl ConnectorState {
    fn find_operation(&self, name: &str) -> Result<(usize, &OperationInfo, OperationKind), Error> {
        for (file_index, file) in self.files.iter().enumerate() {
            if let Some((operation, kind)) = file.catalog.operation(name) {
                return Ok((file_index, operation, kind));
            }
        }
        Err(Error::unknown_operation(name))
    }

    fn row_set(
        &self,
        file_index: usize,
        operation: &OperationInfo,
        request: &QueryRequest,
        value: Value,
    ) -> RowSet {
        let catalog = &self.files[file_index].catalog;
        let row = project_row(
            value,
            request.query.fields.as_ref(),
            Some(&operation.result_type),
            catalog,
        );
        RowSet { rows: Some(vec![row]) }
    }

    async fn call_operation(
        &self,
        state: &Arc<Self>,
        file_index: usize,
        operation: &OperationInfo,
        arguments: &BTreeMap<String, Value>,
        cancellation: &CancellationToken,
    ) -> Result<Value, Error> {
        if operation.request.distributed {
            return self
                .call_distributed(state, file_index, operation, arguments, cancellation)
                .await;
        }

        let server_id = {
            let candidates = self.server_candidates(file_index, operation, None)?;
            distributor::pick_server(&candidates)
                .cloned()
                .ok_or_else(|| Error::config("no servers configured"))?
        };
        self.call_single(file_index, operation, arguments, &server_id, cancellation)
            .await
    }

    async fn call_distributed(
        &self,
        state: &Arc<Self>,
        file_index: usize,
        operation: &OperationInfo,
        arguments: &BTreeMap<String, Value>,
        cancellation: &CancellationToken,
    ) -> Result<Value, Error> {
        let options = HttpOptions::from_value(arguments.get(HTTP_OPTIONS_ARGUMENT))?;
        let servers =
            self.server_candidates(file_index, operation, options.servers.as_deref())?;
        let concurrency = self.configuration.concurrency.http.max(1) as usize;

        let state = Arc::clone(state);
        let operation = operation.clone();
        let arguments = arguments.clone();
        let call_cancellation = cancellation.clone();
        let call = move |server: String| {
            let state = Arc::clone(&state);
            let operation = operation.clone();
            let arguments = arguments.clone();
            let cancellation = call_cancellation.clone();
            async move {
                state
                    .call_single(file_index, &operation, &arguments, &server, &cancellation)
                    .await
            }
        };

        let outcome = distributor::run(
            servers,
            options.parallel,
            concurrency,
            cancellation.clone(),
            call,
        )
        .await?;
        if outcome.all_failed() {
            let mut errors = outcome.errors;
            if errors.len() == 1 {
                return Err(errors.remove(0).1);
            }
            let details: Vec<String> = errors
                .iter()
                .map(|(server, error)| format!("{server}: {error}"))
                .collect();
            return Err(Error::internal(format!(
                "all distributed sub-calls failed: {}",
                details.join("; ")
            )));
        }
        Ok(outcome.into_value())
    }

    async fn call_single(
        &self,
        file_index: usize,
        operation: &OperationInfo,
        arguments: &BTreeMap<String, Value>,
        server_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<Value, Error> {
        let file = &self.files[file_index];
        let settings = &file.catalog.settings;
        let server = settings
            .server(server_id)
            .ok_or_else(|| Error::config(format!("server '{server_id}' is not configured")))?;

        let bind = BindContext {
            catalog: &file.catalog,
            settings,
            runtime: &file.runtime,
            forward_headers: &self.configuration.forward_headers,
            codecs: &self.codecs,
        };
        let mut request = build_request(&bind, operation, arguments, server)?;

        let http = self
            .clients
            .get(&(file_index, server_id.to_string()))
            .unwrap_or(&self.default_client);
        let auth = AuthContext {
            settings,
            server,
            token_cache: &self.token_cache,
            http: &self.default_client,
            headers_forwarding: self.configuration.forward_headers.enabled,
        };
        let span = tracing::debug_span!(
            target: "prism::executor",
            "http_call",
            method = %operation.request.method,
            path = %operation.request.url,
            server = %server_id,
        );
        let decoded = execute_decoded(
            http,
            &mut request,
            &auth,
            &self.codecs,
            &file.catalog,
            &operation.result_type,
            &operation.request.response.content_type,
            cancellation,
        )
        .instrument(span)
        .await?;
        Ok(self.wrap_response_headers(decoded))
    }

    /// Applies the response-header forwarding wrap when configured.
    fn wrap_response_headers(&self, decoded: DecodedResponse) -> Value {
        let forward = &self.configuration.forward_headers;
        let Some(config) = forward
            .response_headers
            .as_ref()
            .filter(|_| forward.enabled)
        else {
            return decoded.value;
        };

        let mut headers = serde_json::Map::new();
        for (name, value) in &decoded.headers {
            let name = name.as_str();
            if !config.forward_headers.is_empty()
                && !config
                    .forward_headers
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(name))
            {
                continue;
            }
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), Value::String(value.to_string()));
            }
        }

        let mut wrapped = serde_json::Map::new();
        wrapped.insert(config.headers_field.clone(), Value::Object(headers));
        wrapped.insert(config.result_field.clone(), decoded.value);
        Value::Object(wrapped)
    }

    fn server_candidates(
        &self,
        file_index: usize,
        operation: &OperationInfo,
        requested: Option<&[String]>,
    ) -> Result<Vec<String>, Error> {
        let settings = &self.files[file_index].catalog.settings;
        let mut candidates = distributor::select_servers(&settings.servers, requested)?;
        if let Some(pinned) = &operation.request.servers {
            candidates.retain(|id| pinned.contains(id));
            if candidates.is_empty() {
                return Err(Error::config(format!(
                    "operation is pinned to servers {pinned:?}, none of which are selected"
                )));
            }
        }
        Ok(candidates)
    }

    async fn explain(
        &self,
        file_index: usize,
        operation: &OperationInfo,
        arguments: &BTreeMap<String, Value>,
    ) -> Result<ExplainResponse, Error> {
        let options = if operation.request.distributed {
            HttpOptions::from_value(arguments.get(HTTP_OPTIONS_ARGUMENT))?
        } else {
            HttpOptions::default()
        };
        let candidates =
            self.server_candidates(file_index, operation, options.servers.as_deref())?;
        let server_id = distributor::pick_server(&candidates)
            .cloned()
            .ok_or_else(|| Error::config("no servers configured"))?;

        let file = &self.files[file_index];
        let settings = &file.catalog.settings;
        let server = settings
            .server(&server_id)
            .ok_or_else(|| Error::config(format!("server '{server_id}' is not configured")))?;

        let bind = BindContext {
            catalog: &file.catalog,
            settings,
            runtime: &file.runtime,
            forward_headers: &self.configuration.forward_headers,
            codecs: &self.codecs,
        };
        let mut request = build_request(&bind, operation, arguments, server)?;
        let auth = AuthContext {
            settings,
            server,
            token_cache: &self.token_cache,
            http: &self.default_client,
            headers_forwarding: self.configuration.forward_headers.enabled,
        };
        crate::auth::apply_security(&mut request, &auth).await?;

        let mut details = BTreeMap::new();
        details.insert("url".to_string(), request.url.clone());
        let headers: serde_json::Map<String, Value> = request
            .masked_headers()
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        details.insert(
            "headers".to_string(),
            serde_json::to_string(&headers)?,
        );
        if let Some(body) = &request.body {
            details.insert(
                "body".to_string(),
                String::from_utf8_lossy(body).into_owned(),
            );
        }
        Ok(ExplainResponse { details })
    }
}

/// Awaits spawned task handles in spawn order, racing the cancellation
/// token. A fired token aborts the remaining tasks and the collection
/// returns cancelled, as does any task that itself observed cancellation;
/// partial results are discarded either way.
async fn collect_task_results<T>(
    handles: Vec<tokio::task::JoinHandle<Result<T, Error>>>,
    cancellation: &CancellationToken,
) -> Result<Vec<Result<T, Error>>, Error> {
    let mut outputs = Vec::with_capacity(handles.len());
    let mut cancelled = false;
    for mut handle in handles {
        if cancelled {
            handle.abort();
            continue;
        }
        let joined = tokio::select! {
            () = cancellation.cancelled() => {
                handle.abort();
                cancelled = true;
                continue;
            }
            joined = &mut handle => joined,
        };
        match joined {
            Ok(Err(Error::Cancelled)) => cancelled = true,
            Ok(result) => outputs.push(result),
            Err(join_error) => outputs.push(Err(Error::internal(join_error.to_string()))),
        }
    }
    if cancelled {
        return Err(Error::Cancelled);
    }
    Ok(outputs)
}

/// Resolves engine arguments against an optional variable set.
fn resolve_arguments(
    arguments: &BTreeMap<String, Argument>,
    variables: Option<&BTreeMap<String, Value>>,
) -> Result<BTreeMap<String, Value>, Error> {
    let mut resolved = BTreeMap::new();
    for (name, argument) in arguments {
        let value = match argument {
            Argument::Literal { value } => value.clone(),
            Argument::Variable { name: variable } => variables
                .and_then(|set| set.get(variable))
                .cloned()
                .ok_or_else(|| {
                    Error::unprocessable(format!("variable '{variable}' is not bound"))
                })?,
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_collection_is_bad_request() {
        let connector =
            HttpConnector::from_parts(Configuration::default(), Vec::new()).unwrap();
        let err = connector.state.find_operation("nope").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn literal_and_variable_arguments_resolve() {
        let mut arguments = BTreeMap::new();
        arguments.insert(
            "status".to_string(),
            Argument::Literal {
                value: serde_json::json!("available"),
            },
        );
        arguments.insert(
            "limit".to_string(),
            Argument::Variable {
                name: "limit".to_string(),
            },
        );
        let mut variables = BTreeMap::new();
        variables.insert("limit".to_string(), serde_json::json!(10));

        let resolved = resolve_arguments(&arguments, Some(&variables)).unwrap();
        assert_eq!(resolved["status"], serde_json::json!("available"));
        assert_eq!(resolved["limit"], serde_json::json!(10));

        let unbound = resolve_arguments(&arguments, None).unwrap_err();
        assert_eq!(unbound.status_code(), 422);
    }
}
