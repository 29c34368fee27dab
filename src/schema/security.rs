//! Security schemes and connection settings.
//!
//! Credentials never appear inline in the catalog: every secret position is
//! a [`ValueSource`] resolved at call time. The converter generates the
//! environment variable names; this module only models them.

use crate::config::value_source::{EnvInt, ValueSource};
use crate::error::Error;
use crate::schema::models::SecurityRequirement;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where an API key is placed on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OAuthFlowType {
    ClientCredentials,
    AuthorizationCode,
    Implicit,
    Password,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_url: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scopes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<ValueSource>,
    /// Extra form fields appended to the token request.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub endpoint_params: IndexMap<String, String>,
}

/// A security scheme attached to a server or the whole schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecurityScheme {
    /// Key in a header, query parameter or cookie.
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: ApiKeyLocation,
        value: ValueSource,
    },
    /// `Authorization: <Scheme> <token>`; scheme defaults to `Bearer`.
    #[serde(rename_all = "camelCase")]
    Http {
        scheme: String,
        #[serde(default = "default_auth_header")]
        header: String,
        value: ValueSource,
    },
    Basic {
        username: ValueSource,
        password: ValueSource,
    },
    Oauth2 {
        flows: IndexMap<OAuthFlowType, OAuthFlow>,
    },
    #[serde(rename_all = "camelCase")]
    OpenIdConnect {
        open_id_connect_url: String,
    },
    #[serde(rename = "mutualTLS")]
    MutualTls,
    Cookie,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

impl SecurityScheme {
    /// Schemes the connector cannot satisfy itself: the caller must supply
    /// the token through forwarded headers.
    #[must_use]
    pub fn requires_headers_forwarding(&self) -> bool {
        match self {
            Self::Cookie | Self::OpenIdConnect { .. } => true,
            Self::Oauth2 { flows } => !flows.contains_key(&OAuthFlowType::ClientCredentials),
            _ => false,
        }
    }
}

/// TLS material for a server (mTLS client identity and/or custom CA).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_pem: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pem: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_pem: Option<ValueSource>,
}

/// One configured upstream server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    pub url: ValueSource,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub security_schemes: IndexMap<String, SecurityScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// Connection settings for a schema file: servers plus schema-wide headers
/// and security.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub security_schemes: IndexMap<String, SecurityScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Settings {
    /// Finds a server by id.
    #[must_use]
    pub fn server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// The scheme for a key, preferring the server-local definition.
    #[must_use]
    pub fn scheme<'a>(&'a self, server: &'a ServerConfig, key: &str) -> Option<&'a SecurityScheme> {
        server
            .security_schemes
            .get(key)
            .or_else(|| self.security_schemes.get(key))
    }
}

/// Per-schema-file runtime knobs, resolved lazily from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<EnvInt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<EnvInt>,
    /// Delay between attempts, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<EnvInt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_status: Vec<u16>,
}

impl RuntimeSettings {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
    pub const DEFAULT_RETRY_STATUS: [u16; 4] = [429, 500, 502, 503];

    /// Resolves the overall deadline.
    ///
    /// # Errors
    /// Propagates environment resolution failures.
    pub fn timeout_secs(&self) -> Result<u64, Error> {
        self.timeout.as_ref().map_or(Ok(Self::DEFAULT_TIMEOUT_SECS), |t| {
            Ok(u64::try_from(t.resolve()?).unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
        })
    }

    /// Resolves the retry policy, applying defaults for absent fields.
    ///
    /// # Errors
    /// Propagates environment resolution failures.
    pub fn retry_policy(&self) -> Result<crate::request::models::RetryPolicy, Error> {
        let retry = self.retry.clone().unwrap_or_default();
        let times = retry
            .times
            .as_ref()
            .map_or(Ok(0), EnvInt::resolve)
            .map(|t| u32::try_from(t).unwrap_or(0))?;
        let delay_ms = retry
            .delay
            .as_ref()
            .map_or(Ok(i64::try_from(Self::DEFAULT_RETRY_DELAY_MS).unwrap_or(1000)), EnvInt::resolve)
            .map(|d| u64::try_from(d).unwrap_or(Self::DEFAULT_RETRY_DELAY_MS))?;
        let http_status = if retry.http_status.is_empty() {
            Self::DEFAULT_RETRY_STATUS.to_vec()
        } else {
            retry.http_status
        };
        Ok(crate::request::models::RetryPolicy {
            times,
            delay_ms,
            http_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let runtime = RuntimeSettings::default();
        assert_eq!(runtime.timeout_secs().unwrap(), 30);
        let policy = runtime.retry_policy().unwrap();
        assert_eq!(policy.times, 0);
        assert_eq!(policy.delay_ms, 1000);
        assert_eq!(policy.http_status, vec![429, 500, 502, 503]);
    }

    #[test]
    fn oauth_non_client_credentials_requires_forwarding() {
        let mut flows = IndexMap::new();
        flows.insert(OAuthFlowType::AuthorizationCode, OAuthFlow::default());
        let scheme = SecurityScheme::Oauth2 { flows };
        assert!(scheme.requires_headers_forwarding());

        let mut flows = IndexMap::new();
        flows.insert(OAuthFlowType::ClientCredentials, OAuthFlow::default());
        let scheme = SecurityScheme::Oauth2 { flows };
        assert!(!scheme.requires_headers_forwarding());
    }

    #[test]
    fn cookie_and_oidc_require_forwarding() {
        assert!(SecurityScheme::Cookie.requires_headers_forwarding());
        assert!(SecurityScheme::OpenIdConnect {
            open_id_connect_url: "https://issuer/.well-known".into()
        }
        .requires_headers_forwarding());
        assert!(!SecurityScheme::MutualTls.requires_headers_forwarding());
    }

    #[test]
    fn scheme_lookup_prefers_server_local() {
        let key_scheme = |env: &str| SecurityScheme::ApiKey {
            name: "api_key".into(),
            location: ApiKeyLocation::Header,
            value: ValueSource::env(env.to_string()),
        };
        let mut settings = Settings::default();
        settings
            .security_schemes
            .insert("api_key".into(), key_scheme("GLOBAL_KEY"));
        let mut server = ServerConfig {
            id: "dog".into(),
            url: ValueSource::Literal("http://localhost".into()),
            headers: IndexMap::new(),
            security: None,
            security_schemes: IndexMap::new(),
            tls: None,
        };
        server
            .security_schemes
            .insert("api_key".into(), key_scheme("DOG_KEY"));

        let resolved = settings.scheme(&server, "api_key").unwrap();
        assert!(matches!(
            resolved,
            SecurityScheme::ApiKey { value: ValueSource::Env { env, .. }, .. } if env == "DOG_KEY"
        ));
    }
}
