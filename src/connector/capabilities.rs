//! Static capability advertisement.

use serde_json::{json, Value};

/// Engine protocol version the connector speaks.
pub const PROTOCOL_VERSION: &str = "0.1.6";

/// Capabilities served to the host: query variables and nested-field
/// selection. Mutations are present without extended capabilities.
#[must_use]
pub fn capabilities() -> Value {
    json!({
        "version": PROTOCOL_VERSION,
        "capabilities": {
            "query": {
                "variables": {},
                "nested_fields": {}
            },
            "mutation": {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_variables_and_nested_fields() {
        let value = capabilities();
        assert!(value["capabilities"]["query"]["variables"].is_object());
        assert!(value["capabilities"]["query"]["nested_fields"].is_object());
        assert!(value["capabilities"]["mutation"].is_object());
    }
}
