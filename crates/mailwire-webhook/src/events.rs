//! Typed webhook events.
//!
//! Every event carries an [`EventBase`]; some kinds add extra fields. The
//! wire discriminator is the `event` field. Parsing is lenient about
//! optional fields (absent or mistyped values become empty strings, zero or
//! `false`) and strict about the discriminator: it must be present and name
//! one of the [`EventKind`]s.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WebhookError};

/// Name of the discriminator field.
pub const KIND_FIELD: &str = "event";

/// Closed set of webhook event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The receiving server accepted the message.
    Delivered,
    /// The message bounced.
    Bounce,
    /// Delivery was temporarily deferred and will be retried.
    Deferred,
    /// The message was dropped without a delivery attempt.
    Dropped,
    /// The recipient opened the message.
    Open,
    /// The recipient clicked a tracked link.
    Click,
    /// The recipient marked the message as spam.
    SpamReport,
    /// The recipient unsubscribed.
    Unsubscribe,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 8] = [
        Self::Delivered,
        Self::Bounce,
        Self::Deferred,
        Self::Dropped,
        Self::Open,
        Self::Click,
        Self::SpamReport,
        Self::Unsubscribe,
    ];

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Bounce => "bounce",
            Self::Deferred => "deferred",
            Self::Dropped => "dropped",
            Self::Open => "open",
            Self::Click => "click",
            Self::SpamReport => "spam_report",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WebhookError::UnknownEventKind { kind: s.to_string() })
    }
}

/// Fields shared by every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBase {
    /// Recipient address.
    pub email: String,
    /// Batch the message was sent in.
    pub batch_id: String,
    /// Provider message id.
    pub message_id: String,
    /// Metadata attached to the message at send time.
    pub metadata: Map<String, Value>,
    /// Tag attached to the message at send time.
    pub tag: String,
    /// Event time in unix seconds.
    pub timestamp: i64,
}

/// A parsed webhook event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookEvent {
    /// See [`EventKind::Delivered`].
    Delivered {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
    },
    /// See [`EventKind::Bounce`].
    Bounce {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
        /// SMTP status code reported by the receiving server
        code: String,
        /// SMTP response text
        text: String,
        /// Permanent failure
        hard: bool,
    },
    /// See [`EventKind::Deferred`].
    Deferred {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
        /// Deferral reason
        reason: String,
        /// Delivery attempt number
        attempt: u32,
    },
    /// See [`EventKind::Dropped`].
    Dropped {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
        /// Drop reason
        reason: String,
    },
    /// See [`EventKind::Open`].
    Open {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
        /// Client user agent
        user_agent: String,
        /// Client IP address
        ip: String,
    },
    /// See [`EventKind::Click`].
    Click {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
        /// Clicked URL
        url: String,
        /// Client user agent
        user_agent: String,
        /// Client IP address
        ip: String,
    },
    /// See [`EventKind::SpamReport`].
    SpamReport {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
    },
    /// See [`EventKind::Unsubscribe`].
    Unsubscribe {
        /// Shared fields
        #[serde(flatten)]
        base: EventBase,
    },
}

impl WebhookEvent {
    /// Kind of the event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Delivered { .. } => EventKind::Delivered,
            Self::Bounce { .. } => EventKind::Bounce,
            Self::Deferred { .. } => EventKind::Deferred,
            Self::Dropped { .. } => EventKind::Dropped,
            Self::Open { .. } => EventKind::Open,
            Self::Click { .. } => EventKind::Click,
            Self::SpamReport { .. } => EventKind::SpamReport,
            Self::Unsubscribe { .. } => EventKind::Unsubscribe,
        }
    }

    /// Shared fields.
    pub fn base(&self) -> &EventBase {
        match self {
            Self::Delivered { base }
            | Self::Bounce { base, .. }
            | Self::Deferred { base, .. }
            | Self::Dropped { base, .. }
            | Self::Open { base, .. }
            | Self::Click { base, .. }
            | Self::SpamReport { base }
            | Self::Unsubscribe { base } => base,
        }
    }

    /// Wire form of the event, with the `event` discriminator.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Builds an event from one JSON object.
    ///
    /// # Errors
    ///
    /// - `Malformed` if `value` is not an object or the discriminator is not
    ///   a string
    /// - `MissingField` if the discriminator is absent
    /// - `UnknownEventKind` if the discriminator names no known kind
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| WebhookError::malformed("event must be a JSON object"))?;

        let kind = match object.get(KIND_FIELD) {
            None | Some(Value::Null) => return Err(WebhookError::MissingField { field: KIND_FIELD }),
            Some(Value::String(kind)) => kind.parse::<EventKind>()?,
            Some(_) => return Err(WebhookError::malformed("event field must be a string")),
        };

        let fields = Fields(object);
        let base = EventBase {
            email: fields.string("email"),
            batch_id: fields.string("batch_id"),
            message_id: fields.string("message_id"),
            metadata: object.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default(),
            tag: fields.string("tag"),
            timestamp: fields.integer("timestamp"),
        };

        Ok(match kind {
            EventKind::Delivered => Self::Delivered { base },
            EventKind::Bounce => Self::Bounce {
                base,
                code: fields.string("code"),
                text: fields.string("text"),
                hard: fields.boolean("hard"),
            },
            EventKind::Deferred => Self::Deferred {
                base,
                reason: fields.string("reason"),
                attempt: u32::try_from(fields.integer("attempt")).unwrap_or(0),
            },
            EventKind::Dropped => Self::Dropped { base, reason: fields.string("reason") },
            EventKind::Open => Self::Open {
                base,
                user_agent: fields.string("user_agent"),
                ip: fields.string("ip"),
            },
            EventKind::Click => Self::Click {
                base,
                url: fields.string("url"),
                user_agent: fields.string("user_agent"),
                ip: fields.string("ip"),
            },
            EventKind::SpamReport => Self::SpamReport { base },
            EventKind::Unsubscribe => Self::Unsubscribe { base },
        })
    }
}

/// Lenient field accessors over an event object.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn string(&self, name: &str) -> String {
        match self.0.get(name) {
            Some(Value::String(value)) => value.clone(),
            Some(Value::Number(value)) => value.to_string(),
            _ => String::new(),
        }
    }

    fn integer(&self, name: &str) -> i64 {
        match self.0.get(name) {
            Some(Value::Number(value)) => {
                value.as_i64().or_else(|| value.as_f64().map(|v| v as i64)).unwrap_or(0)
            },
            Some(Value::String(value)) => value.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    fn boolean(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(Value::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_round_trips_through_wire_name() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        let error = "teleported".parse::<EventKind>().unwrap_err();
        assert!(matches!(error, WebhookError::UnknownEventKind { kind } if kind == "teleported"));
    }

    #[test]
    fn bounce_copies_base_and_extras() {
        let event = WebhookEvent::from_json(&json!({
            "event": "bounce",
            "email": "ada@example.com",
            "batch_id": "b-1",
            "message_id": "m-1",
            "metadata": {"user_id": 42},
            "tag": "welcome",
            "timestamp": 1_700_000_000,
            "code": 550,
            "text": "mailbox unavailable",
            "hard": true,
            "url": "https://ignored.example.com"
        }))
        .unwrap();

        assert_eq!(event.kind(), EventKind::Bounce);
        assert_eq!(event.base().email, "ada@example.com");
        assert_eq!(event.base().metadata["user_id"], 42);
        assert_eq!(event.base().timestamp, 1_700_000_000);
        match event {
            WebhookEvent::Bounce { code, text, hard, .. } => {
                assert_eq!(code, "550");
                assert_eq!(text, "mailbox unavailable");
                assert!(hard);
            },
            other => panic!("expected bounce, got {other:?}"),
        }
    }

    #[test]
    fn absent_fields_default_to_empty() {
        let event = WebhookEvent::from_json(&json!({"event": "click"})).unwrap();

        assert_eq!(event, WebhookEvent::Click {
            base: EventBase::default(),
            url: String::new(),
            user_agent: String::new(),
            ip: String::new(),
        });
    }

    #[test]
    fn mistyped_fields_default() {
        let event = WebhookEvent::from_json(&json!({
            "event": "deferred",
            "email": ["not", "a", "string"],
            "metadata": "nope",
            "timestamp": "1700000000",
            "attempt": -3
        }))
        .unwrap();

        assert_eq!(event.base().email, "");
        assert!(event.base().metadata.is_empty());
        assert_eq!(event.base().timestamp, 1_700_000_000);
        assert!(matches!(event, WebhookEvent::Deferred { attempt: 0, .. }));
    }

    #[test]
    fn missing_discriminator_is_an_error() {
        let error = WebhookEvent::from_json(&json!({"email": "ada@example.com"})).unwrap_err();
        assert!(matches!(error, WebhookError::MissingField { field: "event" }));

        let error = WebhookEvent::from_json(&json!({"event": null})).unwrap_err();
        assert!(matches!(error, WebhookError::MissingField { .. }));
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            WebhookEvent::from_json(&json!("delivered")).unwrap_err(),
            WebhookError::Malformed { .. }
        ));
        assert!(matches!(
            WebhookEvent::from_json(&json!({"event": 7})).unwrap_err(),
            WebhookError::Malformed { .. }
        ));
    }

    #[test]
    fn wire_form_carries_discriminator() {
        let event = WebhookEvent::Dropped {
            base: EventBase { email: "ada@example.com".to_string(), ..EventBase::default() },
            reason: "suppressed".to_string(),
        };

        let wire = event.to_json();
        assert_eq!(wire["event"], "dropped");
        assert_eq!(wire["email"], "ada@example.com");
        assert_eq!(wire["reason"], "suppressed");
        assert_eq!(WebhookEvent::from_json(&wire).unwrap(), event);
    }
}
