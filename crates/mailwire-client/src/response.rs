//! Classification of API responses.
//!
//! The body is parsed as JSON when possible; otherwise it is wrapped as
//! `{"message": <body>}` so error messages survive non-JSON error pages.

use mailwire_core::{MailError, Result};
use serde_json::{json, Value};

/// Parses a response body, falling back to `{"message": body}`.
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "message": body }))
}

/// Maps a status code and raw body to a parsed success body or an error.
///
/// - 401 becomes [`MailError::Authentication`].
/// - Any other status of 400 and above becomes [`MailError::Api`] with the
///   parsed body; the message is taken from the body's `error` field, then
///   its `message` field, then falls back to `HTTP {status}`.
/// - Anything below 400 returns the parsed body.
///
/// # Errors
///
/// Returns the classified error for 4xx and 5xx statuses.
pub fn process_response(status: u16, body: &str) -> Result<Value> {
    if status == 401 {
        return Err(MailError::Authentication);
    }

    let parsed = parse_body(body);
    if status >= 400 {
        let message = error_message(&parsed).unwrap_or_else(|| format!("HTTP {status}"));
        return Err(MailError::api(status, message, parsed));
    }

    Ok(parsed)
}

/// Extracts the server's error text from a parsed body.
///
/// Prefers `error`, then `message`. Empty strings count as absent.
pub fn error_message(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|field| match body.get(field) {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        Some(Value::Object(object)) => object
            .get("message")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string),
        _ => None,
    })
}
