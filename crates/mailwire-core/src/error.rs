//! Error taxonomy shared by the dispatch and webhook layers.
//!
//! `MailError` is what callers of the client see. Its variants fall into four
//! kinds (see [`ErrorKind`]): generic client failures, authentication
//! failures, API errors reported by the server, and validation failures
//! raised before any network activity. `ValidationError` describes why a
//! single message was rejected by the model layer.

use std::{fmt, time::Duration};

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, MailError>;

/// Errors surfaced by the email client.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Unclassified client-side failure.
    #[error("client error: {message}")]
    Client {
        /// Description of the failure
        message: String,
    },

    /// The per-client request budget for the current window is spent.
    #[error("rate limit exceeded: retry in {}ms", retry_after.as_millis())]
    RateLimited {
        /// Time remaining until the current window closes
        retry_after: Duration,
    },

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Configured per-attempt timeout
        timeout: Duration,
    },

    /// The API host could not be reached.
    #[error("failed to connect: {message}")]
    Connection {
        /// Underlying connection failure
        message: String,
    },

    /// Every attempt failed without producing a response.
    #[error("request failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last failure observed
        message: String,
    },

    /// The API rejected the credentials (HTTP 401).
    #[error("authentication failed: invalid or missing API token")]
    Authentication,

    /// The API answered with an error status.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body
        message: String,
        /// Parsed response body
        body: serde_json::Value,
    },

    /// Input was rejected before any request was made.
    #[error("validation failed: {message}")]
    Validation {
        /// Summary of the failure
        message: String,
        /// Per-message failures as `(index, reason)` pairs
        failures: Vec<(usize, String)>,
    },
}

impl MailError {
    /// Creates a generic client error.
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client { message: message.into() }
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Creates a validation error without per-message detail.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), failures: Vec::new() }
    }

    /// Creates a validation error summarizing a rejected batch.
    ///
    /// The summary lists every failure as `[index] reason`.
    pub fn batch_validation(failures: Vec<(usize, String)>) -> Self {
        let details = failures
            .iter()
            .map(|(index, reason)| format!("[{index}] {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation {
            message: format!("all {} messages are invalid: {details}", failures.len()),
            failures,
        }
    }

    /// Creates an API error from a status and a parsed body.
    pub fn api(status: u16, message: impl Into<String>, body: serde_json::Value) -> Self {
        Self::Api { status, message: message.into(), body }
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from(self)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication => Some(401),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Category of a [`MailError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Catch-all client failures: rate limiting, transport, timeouts.
    Client,
    /// Rejected credentials.
    Authentication,
    /// Error status returned by the API.
    Api,
    /// Malformed input.
    Validation,
}

impl From<&MailError> for ErrorKind {
    fn from(error: &MailError) -> Self {
        match error {
            MailError::Client { .. }
            | MailError::RateLimited { .. }
            | MailError::Timeout { .. }
            | MailError::Connection { .. }
            | MailError::RetriesExhausted { .. } => Self::Client,
            MailError::Authentication => Self::Authentication,
            MailError::Api { .. } => Self::Api,
            MailError::Validation { .. } => Self::Validation,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Authentication => write!(f, "authentication"),
            Self::Api => write!(f, "api"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Reasons a single message fails model-level validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An address does not satisfy the address invariants.
    #[error("invalid {field} address '{email}': {reason}")]
    InvalidAddress {
        /// Which message field held the address
        field: &'static str,
        /// The offending address
        email: String,
        /// Why it was rejected
        reason: String,
    },

    /// `to`, `cc` and `bcc` are all empty.
    #[error("at least one recipient is required in to, cc or bcc")]
    MissingRecipients,

    /// Neither a body nor a template was supplied.
    #[error("one of text, html or template_id is required")]
    MissingContent,

    /// An attachment is malformed.
    #[error("invalid attachment at position {position}: {reason}")]
    InvalidAttachment {
        /// Position in the attachment list
        position: usize,
        /// Why it was rejected
        reason: String,
    },

    /// A custom header is malformed.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A tag is empty.
    #[error("tags must not be empty")]
    EmptyTag,
}
