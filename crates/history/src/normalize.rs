//! Recovery of plain message text from bodies written by the legacy backend encoder.
//!
//! Two malformed shapes are known:
//! - assistant bodies stored as a JSON object `{"text": ..., "title": ..., "type": ...}`;
//! - user bodies stored as a Python-style dict with single quotes and, sometimes, no
//!   closing brace: `{'type': 'student', 'text': 'hello'`.
//!
//! Anything that cannot be recovered is returned unchanged.

use serde_json::Value;

use super::types::Role;

/// Returns the displayable text for a stored message body.
pub fn normalize(raw: &str, role: Role) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return raw.to_string();
    }

    let recovered = match role {
        Role::Assistant => text_field(trimmed),
        Role::User => text_field(trimmed).or_else(|| text_field(&repair_user_body(trimmed))),
    };

    match recovered {
        Some(text) => text,
        None => {
            tracing::debug!(?role, "legacy body not recoverable; showing raw text");
            raw.to_string()
        }
    }
}

/// Rewrites the single-quoted, possibly unterminated user encoding into JSON.
fn repair_user_body(trimmed: &str) -> String {
    let mut repaired = trimmed.to_string();
    if !repaired.ends_with('}') {
        repaired.push('}');
    }
    repaired.replace('\'', "\"")
}

fn text_field(candidate: &str) -> Option<String> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => match fields.get("text") {
            Some(Value::String(text)) => Some(text.clone()),
            _ => None,
        },
        Ok(_) => None,
        Err(error) => {
            tracing::debug!(error = %error, "message body is not valid JSON");
            None
        }
    }
}
