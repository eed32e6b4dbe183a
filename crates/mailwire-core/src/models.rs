//! Wire-representable email entities.
//!
//! These types mirror the JSON accepted by `POST /v1/email/send`. They are
//! plain values: the dispatch layer only ever borrows a [`Message`] to
//! validate and serialize it. Validation rules live in
//! [`validation`](crate::validation).

use std::{collections::BTreeMap, fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// An email address with an optional display name.
///
/// # Example
///
/// ```
/// use mailwire_core::Address;
///
/// let address: Address = "Ada Lovelace <ada@example.com>".parse().unwrap();
/// assert_eq!(address.email, "ada@example.com");
/// assert_eq!(address.name.as_deref(), Some("Ada Lovelace"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Mailbox, e.g. `ada@example.com`.
    pub email: String,
    /// Human-readable display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Address {
    /// Creates an address without a display name.
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into(), name: None }
    }

    /// Creates an address with a display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self { email: email.into(), name: Some(name.into()) }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    /// Parses `email` or `Display Name <email>` and validates the result.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let address = match (s.rfind('<'), s.ends_with('>')) {
            (Some(open), true) => {
                let email = s[open + 1..s.len() - 1].trim();
                let name = s[..open].trim().trim_matches('"').trim();
                if name.is_empty() {
                    Self::new(email)
                } else {
                    Self::with_name(email, name)
                }
            },
            _ => Self::new(s),
        };

        address.validate("address")?;
        Ok(address)
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

/// A file attached to a message, or an inline part referenced by content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    /// File name shown to the recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Content id for inline parts referenced from HTML (`cid:`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// Base64-encoded payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Attachment {
    /// Creates a file attachment from raw bytes.
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            content_type: content_type.into(),
            filename: Some(filename.into()),
            content_id: None,
            content: Some(STANDARD.encode(bytes)),
        }
    }

    /// Creates an inline part referenced by `content_id`.
    pub fn inline(
        content_id: impl Into<String>,
        content_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            content_type: content_type.into(),
            filename: None,
            content_id: Some(content_id.into()),
            content: Some(STANDARD.encode(bytes)),
        }
    }
}

/// Open and click tracking switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackingSettings {
    /// Track message opens with a tracking pixel.
    #[serde(default)]
    pub opens: bool,
    /// Rewrite links to track clicks.
    #[serde(default)]
    pub clicks: bool,
}

/// One outbound email.
///
/// Built with [`Message::builder`]. The client never mutates a message; it
/// validates it with [`Message::validate`] and serializes it with
/// [`Message::to_wire`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Sender.
    pub from: Address,
    /// Primary recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Address>,
    /// Carbon-copy recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Address>,
    /// Blind carbon-copy recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Address>,
    /// Reply-to address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Address>,
    /// Subject line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Plain-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Server-side template to render instead of a body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Variables passed to the template.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub template_data: Map<String, Value>,
    /// Attachments and inline parts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Custom headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Tags used to group messages in reporting and webhooks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Free-form metadata echoed back in webhook events.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Open/click tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingSettings>,
    /// Scheduled delivery time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_at: Option<DateTime<Utc>>,
}

impl Default for Address {
    fn default() -> Self {
        Self::new("")
    }
}

impl Message {
    /// Starts building a message.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Serializes the message into its wire representation.
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Total number of recipients across to, cc and bcc.
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

/// Fluent builder for [`Message`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Sets the sender.
    pub fn from(mut self, address: impl Into<Address>) -> Self {
        self.message.from = address.into();
        self
    }

    /// Adds a primary recipient.
    pub fn to(mut self, address: impl Into<Address>) -> Self {
        self.message.to.push(address.into());
        self
    }

    /// Adds a carbon-copy recipient.
    pub fn cc(mut self, address: impl Into<Address>) -> Self {
        self.message.cc.push(address.into());
        self
    }

    /// Adds a blind carbon-copy recipient.
    pub fn bcc(mut self, address: impl Into<Address>) -> Self {
        self.message.bcc.push(address.into());
        self
    }

    /// Sets the reply-to address.
    pub fn reply_to(mut self, address: impl Into<Address>) -> Self {
        self.message.reply_to = Some(address.into());
        self
    }

    /// Sets the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.message.subject = Some(subject.into());
        self
    }

    /// Sets the plain-text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.message.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.message.html = Some(html.into());
        self
    }

    /// Renders a server-side template instead of a body.
    pub fn template(mut self, template_id: impl Into<String>) -> Self {
        self.message.template_id = Some(template_id.into());
        self
    }

    /// Adds a template variable.
    pub fn template_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.message.template_data.insert(key.into(), value.into());
        self
    }

    /// Adds an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.message.attachments.push(attachment);
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.message.tags.push(tag.into());
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.message.metadata.insert(key.into(), value.into());
        self
    }

    /// Enables or disables tracking.
    pub fn tracking(mut self, tracking: TrackingSettings) -> Self {
        self.message.tracking = Some(tracking);
        self
    }

    /// Schedules delivery.
    pub fn send_at(mut self, at: DateTime<Utc>) -> Self {
        self.message.send_at = Some(at);
        self
    }

    /// Finishes the message. Validation happens at send time.
    pub fn build(self) -> Message {
        self.message
    }
}

/// Outcome tag of a [`SendResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// The API accepted the message.
    Accepted,
    /// The request carrying the message failed.
    Failed,
    /// The message was rejected locally and never sent.
    ValidationFailed,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Failed => write!(f, "failed"),
            Self::ValidationFailed => write!(f, "validation_failed"),
        }
    }
}

/// Per-message outcome of a batch send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Position of the message in the submitted batch.
    pub index: usize,
    /// Outcome tag.
    pub status: SendStatus,
    /// Failure description for non-accepted results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `true` only for accepted messages.
    pub success: bool,
}

impl SendResult {
    /// Result for a message the API accepted.
    pub fn accepted(index: usize) -> Self {
        Self { index, status: SendStatus::Accepted, error: None, success: true }
    }

    /// Result for a message whose request failed.
    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self { index, status: SendStatus::Failed, error: Some(error.into()), success: false }
    }

    /// Result for a message rejected by local validation.
    pub fn validation_failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            status: SendStatus::ValidationFailed,
            error: Some(error.into()),
            success: false,
        }
    }
}
