//! The executable request model.
//!
//! A [`RetryableRequest`] carries its body as an in-memory buffer captured
//! at build time, so every retry attempt resends identical bytes. It also
//! records which header values were injected by the auth layer, so explain
//! rendering can mask by source instead of guessing from header names.

use crate::logging::mask_string;
use crate::schema::models::SecurityRequirement;
use reqwest::header::HeaderMap;
use reqwest::Method;

/// Retry policy resolved from runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first; total attempts = `times + 1`.
    pub times: u32,
    pub delay_ms: u64,
    pub http_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            times: 0,
            delay_ms: 1000,
            http_status: vec![429, 500, 502, 503],
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn retries_status(&self, status: u16) -> bool {
        self.http_status.contains(&status)
    }
}

/// A fully-built outbound request, ready for (repeated) dispatch.
#[derive(Debug, Clone)]
pub struct RetryableRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    /// Buffered body; re-materialized for every attempt.
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    /// Overall deadline across all attempts, seconds.
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Effective security requirements (operation-level overrides global).
    pub security: Option<Vec<SecurityRequirement>>,
    /// Values injected by the auth layer; masked in explain output.
    pub sensitive_values: Vec<String>,
}

impl RetryableRequest {
    /// Registers an injected credential so explain output masks it.
    pub fn mark_sensitive(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() && !self.sensitive_values.contains(&value) {
            self.sensitive_values.push(value);
        }
    }

    /// Renders the headers with injected credentials masked, for explain
    /// responses and debug logging.
    #[must_use]
    pub fn masked_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let raw = String::from_utf8_lossy(value.as_bytes()).to_string();
                let masked = self
                    .sensitive_values
                    .iter()
                    .fold(raw, |acc, secret| {
                        if acc.contains(secret.as_str()) {
                            acc.replace(secret.as_str(), &mask_string(secret))
                        } else {
                            acc
                        }
                    });
                (name.as_str().to_string(), masked)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_matches_documented_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.times, 0);
        assert_eq!(policy.delay_ms, 1000);
        assert!(policy.retries_status(429));
        assert!(policy.retries_status(503));
        assert!(!policy.retries_status(404));
    }

    #[test]
    fn masked_headers_hide_injected_values_only() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            "Bearer random_bearer_token".parse().unwrap(),
        );
        headers.insert("x-custom", "visible".parse().unwrap());

        let mut request = RetryableRequest {
            url: "http://localhost/pet".into(),
            method: Method::GET,
            headers,
            body: None,
            content_type: None,
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            security: None,
            sensitive_values: Vec::new(),
        };
        request.mark_sensitive("random_bearer_token");

        let masked = request.masked_headers();
        let auth = masked.iter().find(|(name, _)| name == "authorization").unwrap();
        assert_eq!(auth.1, "Bearer ran*******(19)");
        let custom = masked.iter().find(|(name, _)| name == "x-custom").unwrap();
        assert_eq!(custom.1, "visible");
    }
}
