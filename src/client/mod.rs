//! Single-request HTTP execution with retry, deadline and decoding.
//!
//! The per-operation timeout is an overall deadline across all attempts:
//! each attempt is bounded by the remaining budget and retries that cannot
//! complete in time are skipped. The request body is re-materialized from
//! the buffered copy on every attempt.
//!
//! The caller's cancellation token is consulted at every suspension point:
//! before dispatch, racing the in-flight attempt, during the retry delay
//! and around auth token refreshes. A fired token aborts the attempt and
//! surfaces as [`Error::Cancelled`].

pub mod distributor;

use crate::auth::{apply_security, AuthContext};
use crate::codec::compression::{decompress, ContentEncoding};
use crate::codec::CodecRegistry;
use crate::error::Error;
use crate::logging::{log_request, log_response};
use crate::request::models::RetryableRequest;
use crate::schema::models::{Catalog, Type};
use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A raw upstream response: status, headers, buffered body.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A decoded upstream response.
#[derive(Debug)]
pub struct DecodedResponse {
    pub value: Value,
    pub status: u16,
    pub headers: HeaderMap,
}

/// Dispatches a request with the configured retry policy under the overall
/// deadline. Returns the last response on retry exhaustion.
///
/// # Errors
/// Transport failures after exhaustion, or `Cancelled` when the caller's
/// token fires or the deadline expires.
pub async fn execute(
    http: &reqwest::Client,
    request: &RetryableRequest,
    cancellation: &CancellationToken,
) -> Result<HttpResponse, Error> {
    let deadline = Instant::now() + Duration::from_secs(request.timeout_secs);
    let attempts = request.retry.times + 1;
    let mut last_error: Option<Error> = None;

    for attempt in 1..=attempts {
        // Cancelled before dispatch: nothing goes on the wire.
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Cancelled);
        }

        log_request(
            request.method.as_str(),
            &request.url,
            &request.headers,
            &request.sensitive_values,
        );
        let started = Instant::now();
        // Cancelled mid-flight: dropping the dispatch future aborts the
        // attempt.
        let outcome = tokio::select! {
            () = cancellation.cancelled() => return Err(Error::Cancelled),
            outcome = tokio::time::timeout(remaining, dispatch_once(http, request)) => outcome,
        };
        match outcome {
            Err(_) => return Err(Error::Cancelled),
            Ok(Ok(response)) => {
                log_response(response.status, started.elapsed().as_millis(), Some(&response.body));
                if request.retry.retries_status(response.status) && attempt < attempts {
                    tracing::debug!(
                        target: "prism::executor",
                        attempt,
                        of = attempts,
                        status = response.status,
                        "retrying after retryable status"
                    );
                    if !wait_for_retry(cancellation, request.retry.delay_ms, deadline).await? {
                        return Ok(response);
                    }
                    continue;
                }
                return Ok(response);
            }
            Ok(Err(e)) => {
                tracing::debug!(
                    target: "prism::executor",
                    attempt,
                    of = attempts,
                    error = %e,
                    "attempt failed"
                );
                if attempt < attempts {
                    if !wait_for_retry(cancellation, request.retry.delay_ms, deadline).await? {
                        return Err(e.into());
                    }
                    continue;
                }
                last_error = Some(e.into());
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::internal("retry loop ended without a response")))
}

/// Sleeps the retry delay; `Ok(false)` when the deadline would be crossed.
///
/// # Errors
/// `Cancelled` when the token fires during the wait.
async fn wait_for_retry(
    cancellation: &CancellationToken,
    delay_ms: u64,
    deadline: Instant,
) -> Result<bool, Error> {
    let delay = Duration::from_millis(delay_ms);
    if Instant::now() + delay >= deadline {
        return Ok(false);
    }
    tokio::select! {
        () = cancellation.cancelled() => Err(Error::Cancelled),
        () = tokio::time::sleep(delay) => Ok(true),
    }
}

async fn dispatch_once(
    http: &reqwest::Client,
    request: &RetryableRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let mut builder = http
        .request(request.method.clone(), &request.url)
        .headers(request.headers.clone());
    if let Some(body) = &request.body {
        // Resend the buffered body unchanged.
        builder = builder.body(body.clone());
    }
    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Applies auth, executes, and decodes one call. An upstream 401 after a
/// cache-served OAuth2 token invalidates the token and retries exactly
/// once.
///
/// # Errors
/// Auth resolution failures, transport errors, cancellation, non-2xx
/// statuses (as `Upstream`), and body decode failures.
pub async fn execute_decoded(
    http: &reqwest::Client,
    request: &mut RetryableRequest,
    auth: &AuthContext<'_>,
    codecs: &CodecRegistry,
    catalog: &Catalog,
    result_type: &Type,
    declared_content_type: &str,
    cancellation: &CancellationToken,
) -> Result<DecodedResponse, Error> {
    // Auth application can wait on an OAuth2 token refresh; race it against
    // the caller's token.
    let usage = tokio::select! {
        () = cancellation.cancelled() => return Err(Error::Cancelled),
        usage = apply_security(request, auth) => usage?,
    };
    let mut response = execute(http, request, cancellation).await?;

    if response.status == 401 {
        if let Some(usage) = usage {
            auth.token_cache.invalidate(&usage.key).await;
            tokio::select! {
                () = cancellation.cancelled() => return Err(Error::Cancelled),
                reapplied = apply_security(request, auth) => {
                    reapplied?;
                }
            }
            response = execute(http, request, cancellation).await?;
        }
    }

    decode_response(&response, codecs, catalog, result_type, declared_content_type)
}

/// Decompresses (per `Content-Encoding`) and decodes a response body.
///
/// # Errors
/// Non-2xx statuses surface as `Upstream`; coding/body mismatches and
/// undecodable bodies as decode errors.
pub fn decode_response(
    response: &HttpResponse,
    codecs: &CodecRegistry,
    catalog: &Catalog,
    result_type: &Type,
    declared_content_type: &str,
) -> Result<DecodedResponse, Error> {
    let coding = response
        .headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .and_then(ContentEncoding::parse);
    let body = match coding {
        Some(coding) => decompress(coding, &response.body)?,
        None => response.body.clone(),
    };

    let content_type = response
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(declared_content_type)
        .to_string();

    if !(200..300).contains(&response.status) {
        let details = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
        return Err(Error::Upstream {
            status: response.status,
            body: details,
        });
    }

    let value = codecs.decode_body(&content_type, &body, result_type, catalog)?;
    Ok(DecodedResponse {
        value,
        status: response.status,
        headers: response.headers.clone(),
    })
}
