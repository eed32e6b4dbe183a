//! Message and webhook payload fixtures.

use mailwire_core::{Address, Message};
use mailwire_webhook::{EventKind, WebhookError};
use serde_json::{json, Map, Value};

/// A valid text message to `recipient-{n}@example.com`.
pub fn valid_message(n: usize) -> Message {
    Message::builder()
        .from(Address::with_name("noreply@example.com", "Example"))
        .to(format!("recipient-{n}@example.com"))
        .subject(format!("Message {n}"))
        .text("Hello from the test suite.")
        .build()
}

/// A message that fails validation: the recipient address has no `@`.
pub fn invalid_message(n: usize) -> Message {
    Message::builder()
        .from("noreply@example.com")
        .to(format!("recipient-{n}.example.com"))
        .text("Never sent.")
        .build()
}

/// A batch where `pattern[i]` decides whether message `i` is valid.
pub fn mixed_batch(pattern: &[bool]) -> Vec<Message> {
    pattern
        .iter()
        .enumerate()
        .map(|(i, &valid)| if valid { valid_message(i) } else { invalid_message(i) })
        .collect()
}

/// Builder for webhook event payload objects.
#[derive(Debug, Clone)]
pub struct EventPayloadBuilder {
    fields: Map<String, Value>,
}

impl EventPayloadBuilder {
    /// Starts a payload for `kind` with a filled-in base.
    pub fn new(kind: EventKind) -> Self {
        let mut fields = Map::new();
        fields.insert("event".to_string(), json!(kind.as_str()));
        fields.insert("email".to_string(), json!("ada@example.com"));
        fields.insert("batch_id".to_string(), json!("batch-1"));
        fields.insert("message_id".to_string(), json!("msg-1"));
        fields.insert("tag".to_string(), json!("welcome"));
        fields.insert("timestamp".to_string(), json!(1_700_000_000));
        Self { fields }
    }

    /// Starts a payload with no discriminator and no base fields.
    pub fn empty() -> Self {
        Self { fields: Map::new() }
    }

    /// Sets or replaces a field.
    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Removes a field.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }

    /// The payload as a JSON value.
    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    /// The payload as a JSON string.
    pub fn to_payload(self) -> String {
        self.build().to_string()
    }
}

/// Serializes payload objects as a batch array.
pub fn batch_payload(events: impl IntoIterator<Item = Value>) -> String {
    Value::Array(events.into_iter().collect()).to_string()
}

/// Signs `payload` the way the API does, as `sha256=<hex>`.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSecret` if the secret cannot key the MAC.
pub fn signature_header(payload: &str, secret: &str) -> Result<String, WebhookError> {
    let signature = mailwire_webhook::generate_signature(payload.as_bytes(), secret)?;
    Ok(format!("{}{signature}", mailwire_webhook::SIGNATURE_PREFIX))
}
