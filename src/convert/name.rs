//! Stable name derivation for operations, types and environment variables.

/// Splits an identifier into lowercase words on separators and camel-case
/// boundaries. `"findPetsByStatus"` and `"find_pets-by status"` both yield
/// `["find", "pets", "by", "status"]`.
fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.extend(ch.to_lowercase());
        } else {
            prev_lower = false;
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[must_use]
pub fn to_pascal_case(input: &str) -> String {
    split_words(input)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

#[must_use]
pub fn to_camel_case(input: &str) -> String {
    let pascal = to_pascal_case(input);
    let mut chars = pascal.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

#[must_use]
pub fn to_constant_case(input: &str) -> String {
    split_words(input)
        .iter()
        .map(|word| word.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalizes a declared `operationId` into a catalog operation name.
/// Returns `None` when the id is empty after sanitation.
#[must_use]
pub fn format_operation_name(operation_id: &str) -> Option<String> {
    let name = to_camel_case(operation_id);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Fallback operation name derived from method and path:
/// `camelCase(method + PascalCase(path))`, with template braces dropped and
/// an optional path prefix trimmed first.
#[must_use]
pub fn operation_name_from_path(method: &str, path: &str, trim_prefix: Option<&str>) -> String {
    let trimmed = trim_prefix
        .and_then(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path);
    let without_braces: String = trimmed.replace(['{', '}'], "");
    to_camel_case(&format!("{method} {}", to_pascal_case(&without_braces)))
}

/// Credential roles appended to generated environment variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvRole {
    Value,
    Username,
    Password,
    ClientId,
    ClientSecret,
    Token,
    TokenUrl,
    RefreshUrl,
}

impl EnvRole {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Value => "",
            Self::Username => "USERNAME",
            Self::Password => "PASSWORD",
            Self::ClientId => "CLIENT_ID",
            Self::ClientSecret => "CLIENT_SECRET",
            Self::Token => "TOKEN",
            Self::TokenUrl => "TOKEN_URL",
            Self::RefreshUrl => "REFRESH_URL",
        }
    }
}

/// `CONSTANT_CASE(envPrefix + scheme key + role)`.
#[must_use]
pub fn security_env_name(env_prefix: Option<&str>, scheme_key: &str, role: EnvRole) -> String {
    let mut parts = Vec::new();
    if let Some(prefix) = env_prefix {
        if !prefix.is_empty() {
            parts.push(to_constant_case(prefix));
        }
    }
    parts.push(to_constant_case(scheme_key));
    let suffix = role.suffix();
    if !suffix.is_empty() {
        parts.push(suffix.to_string());
    }
    parts.retain(|p| !p.is_empty());
    parts.join("_")
}

/// Environment variable holding a server base URL. The first server uses
/// `SERVER_URL`, later ones `SERVER_URL_2`, `SERVER_URL_3`, … unless the
/// document pins an explicit server id.
#[must_use]
pub fn server_url_env_name(env_prefix: Option<&str>, server_id: Option<&str>, index: usize) -> String {
    let mut parts = Vec::new();
    if let Some(prefix) = env_prefix {
        if !prefix.is_empty() {
            parts.push(to_constant_case(prefix));
        }
    }
    if let Some(id) = server_id {
        parts.push(to_constant_case(id));
        parts.push("SERVER_URL".to_string());
    } else if index == 0 {
        parts.push("SERVER_URL".to_string());
    } else {
        parts.push(format!("SERVER_URL_{}", index + 1));
    }
    parts.join("_")
}
