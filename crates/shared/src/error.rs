use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error body exchanged with the backend and returned by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub detail: String,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Extracts a human-readable message from a backend error body.
///
/// Prefers a string `detail`. The backend answers malformed orders with a
/// map of field name to messages instead; those are flattened into
/// `field: message` pairs. Anything else yields `None`.
pub fn error_message_from_body(body: &Value) -> Option<String> {
    let object = body.as_object()?;
    if let Some(detail) = object.get("detail").and_then(Value::as_str) {
        return Some(detail.to_string());
    }

    let mut parts = Vec::new();
    for (field, messages) in object {
        match messages {
            Value::String(message) => parts.push(format!("{field}: {message}")),
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    parts.push(format!("{field}: {joined}"));
                }
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
