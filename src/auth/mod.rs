//! Security scheme application.
//!
//! The injector resolves the request's effective security requirements
//! (operation-level overrides the schema-global list), picks the first
//! requirement whose schemes it can satisfy, and mutates the request.
//! Every injected value is registered as sensitive so explain output and
//! debug logs mask it.

pub mod oauth;

use crate::error::Error;
use crate::request::models::RetryableRequest;
use crate::schema::security::{
    ApiKeyLocation, OAuthFlowType, SecurityScheme, ServerConfig, Settings, TlsConfig,
};
use base64::Engine;

use self::oauth::{TokenCache, TokenKey};

/// Dependencies of the injector, passed explicitly per call.
pub struct AuthContext<'a> {
    pub settings: &'a Settings,
    pub server: &'a ServerConfig,
    pub token_cache: &'a TokenCache,
    pub http: &'a reqwest::Client,
    pub headers_forwarding: bool,
}

/// Records that an OAuth2 token from the cache was used, enabling the
/// single invalidate-and-retry on an upstream 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthUsage {
    pub key: TokenKey,
}

/// Applies the request's security requirements.
///
/// # Errors
/// Unresolvable credentials, unknown scheme keys, or schemes that require
/// forwarded headers while forwarding is disabled. Failing here means the
/// call fails before dispatch.
pub async fn apply_security(
    request: &mut RetryableRequest,
    ctx: &AuthContext<'_>,
) -> Result<Option<OAuthUsage>, Error> {
    let Some(requirements) = request.security.clone() else {
        return Ok(None);
    };
    if requirements.is_empty() {
        return Ok(None);
    }
    // An empty requirement object means the operation allows anonymous
    // access.
    if requirements.iter().any(|requirement| requirement.is_empty()) {
        return Ok(None);
    }

    let mut last_error = None;
    for requirement in &requirements {
        let mut usage = None;
        let mut staged = request.clone();
        let mut satisfied = true;
        for (scheme_key, scopes) in requirement {
            let Some(scheme) = ctx.settings.scheme(ctx.server, scheme_key) else {
                satisfied = false;
                last_error = Some(Error::config(format!(
                    "security scheme '{scheme_key}' is not configured"
                )));
                break;
            };
            match apply_scheme(&mut staged, scheme_key, scheme, scopes, ctx).await {
                Ok(scheme_usage) => usage = usage.or(scheme_usage),
                Err(e) => {
                    satisfied = false;
                    last_error = Some(e);
                    break;
                }
            }
        }
        if satisfied {
            *request = staged;
            return Ok(usage);
        }
    }

    Err(last_error.unwrap_or_else(|| Error::config("no security requirement could be satisfied")))
}

async fn apply_scheme(
    request: &mut RetryableRequest,
    scheme_key: &str,
    scheme: &SecurityScheme,
    scopes: &[String],
    ctx: &AuthContext<'_>,
) -> Result<Option<OAuthUsage>, Error> {
    match scheme {
        SecurityScheme::ApiKey {
            name,
            location,
            value,
        } => {
            let resolved = value.resolve()?;
            match location {
                ApiKeyLocation::Header => {
                    insert_header(request, name, &resolved)?;
                }
                ApiKeyLocation::Query => {
                    let separator = if request.url.contains('?') { '&' } else { '?' };
                    request.url.push(separator);
                    request.url.push_str(&urlencoding::encode(name));
                    request.url.push('=');
                    request.url.push_str(&urlencoding::encode(&resolved));
                }
                ApiKeyLocation::Cookie => {
                    insert_header(request, "Cookie", &format!("{name}={resolved}"))?;
                }
            }
            request.mark_sensitive(resolved);
            Ok(None)
        }
        SecurityScheme::Http {
            scheme,
            header,
            value,
        } => {
            let token = value.resolve()?;
            insert_header(request, header, &format!("{scheme} {token}"))?;
            request.mark_sensitive(token);
            Ok(None)
        }
        SecurityScheme::Basic { username, password } => {
            let credentials = format!("{}:{}", username.resolve()?, password.resolve()?);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            insert_header(request, "Authorization", &format!("Basic {encoded}"))?;
            request.mark_sensitive(encoded);
            Ok(None)
        }
        SecurityScheme::Oauth2 { flows } => {
            let Some(flow) = flows.get(&OAuthFlowType::ClientCredentials) else {
                // Other flows carry the token through forwarded headers.
                return if ctx.headers_forwarding {
                    Ok(None)
                } else {
                    Err(Error::headers_forwarding_required(scheme_key))
                };
            };
            let key = TokenKey::new(scheme_key, &ctx.server.id, scopes);
            let token = ctx.token_cache.token(&key, flow, ctx.http).await?;
            insert_header(request, "Authorization", &format!("Bearer {token}"))?;
            request.mark_sensitive(token);
            Ok(Some(OAuthUsage { key }))
        }
        SecurityScheme::OpenIdConnect { .. } | SecurityScheme::Cookie => {
            if ctx.headers_forwarding {
                Ok(None)
            } else {
                Err(Error::headers_forwarding_required(scheme_key))
            }
        }
        // TLS identity is applied when the per-server client is built.
        SecurityScheme::MutualTls => Ok(None),
    }
}

fn insert_header(request: &mut RetryableRequest, name: &str, value: &str) -> Result<(), Error> {
    let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::config(format!("invalid auth header name '{name}': {e}")))?;
    let value = reqwest::header::HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("invalid auth header value: {e}")))?;
    request.headers.insert(name, value);
    Ok(())
}

/// Builds a reqwest client for a server, applying TLS material when
/// configured. Automatic response decompression stays off so the codec
/// layer sees declared encodings.
///
/// # Errors
/// Unparseable certificate or key material.
pub fn build_http_client(tls: Option<&TlsConfig>) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder().no_gzip().no_brotli().no_deflate();
    if let Some(tls) = tls {
        if let Some(ca) = &tls.ca_pem {
            let certificate = reqwest::Certificate::from_pem(&ca.resolve_bytes()?)
                .map_err(|e| Error::invalid_tls_material(e.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let (Some(cert), Some(key)) = (&tls.cert_pem, &tls.key_pem) {
            let mut identity = cert.resolve_bytes()?;
            identity.extend_from_slice(&key.resolve_bytes()?);
            let identity = reqwest::Identity::from_pem(&identity)
                .map_err(|e| Error::invalid_tls_material(e.to_string()))?;
            builder = builder.identity(identity);
        }
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))
}
