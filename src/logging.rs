//! Request/response logging with credential masking.
//!
//! Anything injected by the auth layer is mask-eligible; masking never
//! depends on matching known header names against the raw value. The same
//! mask format is used in explain responses and debug logs.

use reqwest::header::HeaderMap;
use tracing::{debug, info, trace};

/// Masks a credential: `abc*******(len)` for long values, `a*****` for
/// short ones, all asterisks below six characters.
#[must_use]
pub fn mask_string(value: &str) -> String {
    let length = value.chars().count();
    if length < 6 {
        "*".repeat(length)
    } else if length < 12 {
        let first: String = value.chars().take(1).collect();
        format!("{first}*****")
    } else {
        let first: String = value.chars().take(3).collect();
        format!("{first}*******({length})")
    }
}

/// Logs an outbound request. Headers at debug carry masked values for
/// everything in `sensitive`.
pub fn log_request(method: &str, url: &str, headers: &HeaderMap, sensitive: &[String]) {
    info!(target: "prism::executor", "→ {} {}", method.to_uppercase(), url);
    for (name, value) in headers {
        let raw = String::from_utf8_lossy(value.as_bytes()).to_string();
        let masked = sensitive.iter().fold(raw, |acc, secret| {
            if !secret.is_empty() && acc.contains(secret.as_str()) {
                acc.replace(secret.as_str(), &mask_string(secret))
            } else {
                acc
            }
        });
        debug!(target: "prism::executor", "  {}: {}", name.as_str(), masked);
    }
}

/// Logs a response status with timing; body preview at trace level.
pub fn log_response(status: u16, elapsed_ms: u128, body: Option<&[u8]>) {
    info!(target: "prism::executor", "← {} ({}ms)", status, elapsed_ms);
    if let Some(body) = body {
        const PREVIEW: usize = 1000;
        let text = String::from_utf8_lossy(&body[..body.len().min(PREVIEW)]);
        trace!(target: "prism::executor", "response body: {}", text);
    }
}
