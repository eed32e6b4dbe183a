//! Webhook parsing and dispatch errors.

use thiserror::Error;

use crate::events::EventKind;

/// Result type alias for webhook operations.
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Errors raised while parsing or dispatching a webhook payload.
///
/// Signature mismatches are not errors; [`crate::WebhookHandler::verify`]
/// reports them as `false`.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The payload is not valid JSON.
    #[error("Invalid JSON payload: {message}")]
    InvalidJson {
        /// Parser error
        message: String,
    },

    /// The payload is JSON but neither an event object nor an array of them.
    #[error("malformed webhook payload: {message}")]
    Malformed {
        /// What was wrong with the shape
        message: String,
    },

    /// A required field is absent.
    #[error("missing required field: {field}")]
    MissingField {
        /// Field name
        field: &'static str,
    },

    /// The event discriminator names no known event kind.
    #[error("unknown event kind: {kind}")]
    UnknownEventKind {
        /// Discriminator value as received
        kind: String,
    },

    /// A signing operation was requested without a configured secret.
    #[error("no webhook secret configured")]
    MissingSecret,

    /// The secret cannot be used as an HMAC key.
    #[error("invalid webhook secret")]
    InvalidSecret,

    /// A registered handler returned an error.
    #[error("{kind} handler failed: {message}")]
    Handler {
        /// Kind of the event being handled
        kind: EventKind,
        /// Handler error message
        message: String,
    },

    /// Some elements of a batch payload failed to parse or dispatch.
    ///
    /// Every other element was still dispatched.
    #[error("{} of {} batch events failed: {}", .failures.len(), .total, summarize(.failures))]
    Batch {
        /// Number of elements in the batch
        total: usize,
        /// Failing elements as `(index, error)` pairs, in index order
        failures: Vec<(usize, WebhookError)>,
    },
}

impl WebhookError {
    /// Creates an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson { message: message.into() }
    }

    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }

    /// Creates a handler failure.
    pub fn handler(kind: EventKind, message: impl Into<String>) -> Self {
        Self::Handler { kind, message: message.into() }
    }
}

fn summarize(failures: &[(usize, WebhookError)]) -> String {
    failures
        .iter()
        .map(|(index, error)| format!("[{index}] {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_json_message_names_the_problem() {
        let error = WebhookError::invalid_json("expected value at line 1 column 1");
        assert!(error.to_string().contains("Invalid JSON payload"));
    }

    #[test]
    fn batch_error_lists_each_failure() {
        let error = WebhookError::Batch {
            total: 3,
            failures: vec![
                (0, WebhookError::MissingField { field: "event" }),
                (2, WebhookError::UnknownEventKind { kind: "teleported".to_string() }),
            ],
        };

        assert_eq!(
            error.to_string(),
            "2 of 3 batch events failed: [0] missing required field: event; [2] unknown event \
             kind: teleported"
        );
    }

    #[test]
    fn handler_error_names_kind() {
        let error = WebhookError::handler(EventKind::Bounce, "database unavailable");
        assert_eq!(error.to_string(), "bounce handler failed: database unavailable");
    }
}
