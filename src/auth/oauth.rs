//! OAuth2 client-credentials token acquisition and caching.
//!
//! Tokens are cached per `(scheme, server, scope set)`. Each key has its own
//! async mutex held across the refresh, so at most one refresh is in flight
//! per key and concurrent callers wait for it instead of stampeding the
//! token endpoint. Entries expire 30 seconds before the server-reported
//! `expires_in` to avoid using a token at the edge of its lifetime.

use crate::error::Error;
use crate::schema::security::OAuthFlow;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Cache key: scheme key, server id, sorted scope set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub scheme: String,
    pub server: String,
    pub scopes: Vec<String>,
}

impl TokenKey {
    #[must_use]
    pub fn new(scheme: &str, server: &str, scopes: &[String]) -> Self {
        let mut scopes = scopes.to_vec();
        scopes.sort();
        scopes.dedup();
        Self {
            scheme: scheme.to_string(),
            server: server.to_string(),
            scopes,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Shared, mutable across requests; the only cross-request state in the
/// connector.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: Mutex<HashMap<TokenKey, Arc<Mutex<Option<CachedToken>>>>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a valid access token for the key, fetching or refreshing
    /// through the flow's token endpoint when needed.
    ///
    /// # Errors
    /// Missing flow credentials, unreachable token endpoints, or token
    /// responses without an `access_token`.
    pub async fn token(
        &self,
        key: &TokenKey,
        flow: &OAuthFlow,
        http: &reqwest::Client,
    ) -> Result<String, Error> {
        let slot = {
            let mut entries = self.entries.lock().await;
            Arc::clone(
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(None))),
            )
        };

        // Per-key single writer: a concurrent refresh holds this lock and
        // everyone else waits for its result.
        let mut guard = slot.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let fetched = fetch_token(key, flow, http).await?;
        let token = fetched.access_token.clone();
        *guard = Some(fetched);
        Ok(token)
    }

    /// Drops the cached token for a key; the next call refreshes.
    pub async fn invalidate(&self, key: &TokenKey) {
        let slot = {
            let entries = self.entries.lock().await;
            entries.get(key).map(Arc::clone)
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }
}

async fn fetch_token(
    key: &TokenKey,
    flow: &OAuthFlow,
    http: &reqwest::Client,
) -> Result<CachedToken, Error> {
    let token_url = flow
        .token_url
        .as_ref()
        .ok_or_else(|| Error::config(format!("OAuth2 scheme '{}' has no token URL", key.scheme)))?
        .resolve()?;
    let client_id = flow
        .client_id
        .as_ref()
        .ok_or_else(|| Error::config(format!("OAuth2 scheme '{}' has no client id", key.scheme)))?
        .resolve()?;
    let client_secret = flow
        .client_secret
        .as_ref()
        .ok_or_else(|| {
            Error::config(format!("OAuth2 scheme '{}' has no client secret", key.scheme))
        })?
        .resolve()?;

    let mut form: Vec<(String, String)> = vec![
        ("grant_type".to_string(), "client_credentials".to_string()),
        ("client_id".to_string(), client_id),
        ("client_secret".to_string(), client_secret),
    ];
    if !key.scopes.is_empty() {
        form.push(("scope".to_string(), key.scopes.join(" ")));
    }
    for (name, value) in &flow.endpoint_params {
        form.push((name.clone(), value.clone()));
    }

    tracing::debug!(target: "prism::auth", scheme = %key.scheme, server = %key.server, "fetching OAuth2 token");
    let response = http.post(&token_url).form(&form).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::config(format!(
            "token endpoint '{token_url}' returned {status}: {body}"
        )));
    }
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::config(format!("invalid token response from '{token_url}': {e}")))?;

    let lifetime = token
        .expires_in
        .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
    let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);
    Ok(CachedToken {
        access_token: token.access_token,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_normalize_scope_order() {
        let a = TokenKey::new("auth", "dog", &["write".into(), "read".into()]);
        let b = TokenKey::new("auth", "dog", &["read".into(), "write".into()]);
        assert_eq!(a, b);

        let c = TokenKey::new("auth", "cat", &["read".into(), "write".into()]);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn invalidate_clears_only_the_given_key() {
        let cache = TokenCache::new();
        let key = TokenKey::new("auth", "dog", &[]);
        {
            let mut entries = cache.entries.lock().await;
            entries.insert(
                key.clone(),
                Arc::new(Mutex::new(Some(CachedToken {
                    access_token: "cached".into(),
                    expires_at: Instant::now() + Duration::from_secs(600),
                }))),
            );
        }
        cache.invalidate(&key).await;
        let entries = cache.entries.lock().await;
        assert!(entries.get(&key).unwrap().lock().await.is_none());
    }
}
