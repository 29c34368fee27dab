//! Multi-server fan-out for distributed operations.
//!
//! Sequential mode iterates servers in declared order and never aborts
//! early on per-server failures. Parallel mode spawns one task per server,
//! bounded by the HTTP concurrency limit, and collects results in spawn
//! order so `results[]` keeps the declared server order regardless of
//! completion order. A distributed call only fails outright when every
//! sub-call failed.
//!
//! The caller's cancellation token is honored at every suspension point;
//! when it fires, spawned tasks are aborted and the run returns cancelled
//! instead of a partial aggregate.

use crate::error::Error;
use crate::schema::security::ServerConfig;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Per-call options decoded from the `httpOptions` argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpOptions {
    pub servers: Option<Vec<String>>,
    pub parallel: bool,
}

impl HttpOptions {
    /// Decodes the `httpOptions` argument value.
    ///
    /// # Errors
    /// Values that are not an object of the documented shape.
    pub fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        if value.is_null() {
            return Ok(Self::default());
        }
        let Value::Object(fields) = value else {
            return Err(Error::unprocessable("httpOptions must be an object"));
        };
        let servers = match fields.get("servers") {
            None | Some(Value::Null) => None,
            Some(Value::Array(entries)) => Some(
                entries
                    .iter()
                    .map(|entry| {
                        entry.as_str().map(str::to_string).ok_or_else(|| {
                            Error::unprocessable("httpOptions.servers must be strings")
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => {
                return Err(Error::unprocessable("httpOptions.servers must be an array"));
            }
        };
        let parallel = match fields.get("parallel") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(parallel)) => *parallel,
            Some(_) => {
                return Err(Error::unprocessable("httpOptions.parallel must be a boolean"));
            }
        };
        Ok(Self { servers, parallel })
    }
}

/// Resolves the target server ids for a call: the requested subset when
/// present, all configured servers otherwise.
///
/// # Errors
/// Unknown requested ids, or an empty selection.
pub fn select_servers(
    configured: &[ServerConfig],
    requested: Option<&[String]>,
) -> Result<Vec<String>, Error> {
    let valid: Vec<String> = configured.iter().map(|server| server.id.clone()).collect();
    let Some(requested) = requested else {
        return Ok(valid);
    };

    let unknown: Vec<String> = requested
        .iter()
        .filter(|id| !valid.contains(id))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(Error::unknown_server_ids(&unknown, &valid));
    }
    // Keep declared order, not request order.
    let selected: Vec<String> = valid
        .into_iter()
        .filter(|id| requested.contains(id))
        .collect();
    if selected.is_empty() {
        return Err(Error::unprocessable("httpOptions.servers selected no servers"));
    }
    Ok(selected)
}

/// Picks the single server for a non-distributed call: the only candidate
/// when there is one, a random choice otherwise.
#[must_use]
pub fn pick_server(candidates: &[String]) -> Option<&String> {
    match candidates {
        [] => None,
        [only] => Some(only),
        many => many.get(fastrand::usize(..many.len())),
    }
}

/// Aggregated outcome of a distributed call.
#[derive(Debug, Default)]
pub struct DistributedOutcome {
    pub results: Vec<(String, Value)>,
    pub errors: Vec<(String, Error)>,
}

impl DistributedOutcome {
    /// The wire shape: `{results: [{server, data}], errors: [{server,
    /// message, details}]}`.
    #[must_use]
    pub fn into_value(self) -> Value {
        json!({
            "results": self
                .results
                .into_iter()
                .map(|(server, data)| json!({ "server": server, "data": data }))
                .collect::<Vec<_>>(),
            "errors": self
                .errors
                .into_iter()
                .map(|(server, error)| {
                    let response = error.to_response();
                    json!({
                        "server": server,
                        "message": response.message,
                        "details": response.details,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }

    /// True when every sub-call failed; only then does the outer operation
    /// surface an error.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.results.is_empty() && !self.errors.is_empty()
    }
}

/// Runs one sub-call per server, sequentially or in parallel.
///
/// Exactly one call is attempted per selected server; per-server failures
/// become `errors[]` entries instead of aborting the run. Cancellation is
/// different: a fired token aborts outstanding sub-calls and the whole run
/// returns `Cancelled`, discarding partial results.
///
/// # Errors
/// `Cancelled` only; everything else aggregates into the outcome.
pub async fn run<F, Fut>(
    servers: Vec<String>,
    parallel: bool,
    http_concurrency: usize,
    cancellation: CancellationToken,
    call: F,
) -> Result<DistributedOutcome, Error>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Value, Error>> + Send + 'static,
{
    let mut outcome = DistributedOutcome::default();

    if !parallel || http_concurrency <= 1 || servers.len() <= 1 {
        for server in servers {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match call(server.clone()).await {
                Ok(value) => outcome.results.push((server, value)),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => outcome.errors.push((server, error)),
            }
        }
        return Ok(outcome);
    }

    let semaphore = Arc::new(Semaphore::new(http_concurrency));
    let mut handles = Vec::with_capacity(servers.len());
    for server in servers {
        let call = call.clone();
        let semaphore = Arc::clone(&semaphore);
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(async move {
            let _permit = tokio::select! {
                () = cancellation.cancelled() => return (server, Err(Error::Cancelled)),
                permit = semaphore.acquire() => permit.expect("semaphore is never closed"),
            };
            let result = call(server.clone()).await;
            (server, result)
        }));
    }

    // Results land in spawn order, which is the declared server order. A
    // fired token aborts every task still in flight.
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
            Ok((server, Ok(value))) => outcome.results.push((server, value)),
            Ok((_, Err(Error::Cancelled))) => cancelled = true,
            Ok((server, Err(error))) => outcome.errors.push((server, error)),
            Err(join_error) => outcome
                .errors
                .push((String::new(), Error::internal(join_error.to_string()))),
        }
    }
    if cancelled {
        return Err(Error::Cancelled);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value_source::ValueSource;
    use indexmap::IndexMap;
    use serde_json::json;

    fn servers(ids: &[&str]) -> Vec<ServerConfig> {
        ids.iter()
            .map(|id| ServerConfig {
                id: (*id).to_string(),
                url: ValueSource::Literal(format!("http://localhost/{id}")),
                headers: IndexMap::new(),
                security: None,
                security_schemes: IndexMap::new(),
                tls: None,
            })
            .collect()
    }

    #[test]
    fn selection_defaults_to_all_servers_in_order() {
        let configured = servers(&["dog", "cat"]);
        let selected = select_servers(&configured, None).unwrap();
        assert_eq!(selected, vec!["dog", "cat"]);
    }

    #[test]
    fn selection_keeps_declared_order_for_subsets() {
        let configured = servers(&["dog", "cat", "bird"]);
        let requested = vec!["bird".to_string(), "dog".to_string()];
        let selected = select_servers(&configured, Some(&requested)).unwrap();
        assert_eq!(selected, vec!["dog", "bird"]);
    }

    #[test]
    fn unknown_server_ids_are_rejected() {
        let configured = servers(&["dog", "cat"]);
        let requested = vec!["mouse".to_string()];
        let err = select_servers(&configured, Some(&requested)).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn sequential_run_never_aborts_early() {
        let outcome = run(
            vec!["dog".to_string(), "cat".to_string()],
            false,
            1,
            CancellationToken::new(),
            |server| async move {
                if server == "dog" {
                    Err(Error::internal("dog failed"))
                } else {
                    Ok(json!({"name": server}))
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, "dog");
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn parallel_results_keep_declared_order() {
        let servers: Vec<String> = (0..6).map(|i| format!("server-{i}")).collect();
        let outcome = run(
            servers.clone(),
            true,
            3,
            CancellationToken::new(),
            |server| async move {
                // Later servers answer faster; ordering must not follow
                // completion.
                let index: u64 = server
                    .rsplit('-')
                    .next()
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_millis(60 - index * 10)).await;
                Ok(json!(server))
            },
        )
        .await
        .unwrap();

        let order: Vec<String> = outcome
            .results
            .iter()
            .map(|(server, _)| server.clone())
            .collect();
        assert_eq!(order, servers);
        assert_eq!(outcome.results.len() + outcome.errors.len(), 6);
    }

    #[tokio::test]
    async fn all_failed_surfaces_as_outer_error() {
        let outcome = run(
            vec!["dog".to_string()],
            false,
            1,
            CancellationToken::new(),
            |_server| async move { Err::<Value, _>(Error::internal("down")) },
        )
        .await
        .unwrap();
        assert!(outcome.all_failed());

        let value = outcome.into_value();
        assert_eq!(value["errors"][0]["server"], "dog");
        assert!(value["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fired_token_discards_partial_results() {
        let token = CancellationToken::new();
        token.cancel();
        let result = run(
            vec!["dog".to_string(), "cat".to_string()],
            false,
            1,
            token,
            |server| async move { Ok(json!({"name": server})) },
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn parallel_run_returns_cancelled_when_a_sub_call_is_cancelled() {
        let token = CancellationToken::new();
        let trip = token.clone();
        let result = run(
            vec!["dog".to_string(), "cat".to_string()],
            true,
            2,
            token,
            move |server| {
                let trip = trip.clone();
                async move {
                    if server == "dog" {
                        trip.cancel();
                        Err(Error::Cancelled)
                    } else {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                        Ok(json!({"name": server}))
                    }
                }
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn http_options_decode_servers_and_parallel() {
        let options =
            HttpOptions::from_value(Some(&json!({"servers": ["cat"], "parallel": true})))
                .unwrap();
        assert_eq!(options.servers, Some(vec!["cat".to_string()]));
        assert!(options.parallel);

        assert_eq!(HttpOptions::from_value(None).unwrap(), HttpOptions::default());
        assert!(HttpOptions::from_value(Some(&json!("nope"))).is_err());
    }
}
