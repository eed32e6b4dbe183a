//! Inbound webhook handling for mailwire.
//!
//! Verifies HMAC-SHA256 signatures over raw payload bytes, parses single or
//! batched payloads into typed [`WebhookEvent`]s, and dispatches each event
//! to the handler registered for its kind.
//!
//! # Example
//!
//! ```
//! use mailwire_webhook::{sync_handler, EventKind, WebhookEvent, WebhookHandler};
//!
//! # async fn example() -> Result<(), mailwire_webhook::WebhookError> {
//! let handler = WebhookHandler::with_secret("whsec_example").on(
//!     EventKind::Bounce,
//!     sync_handler(|event: &WebhookEvent| {
//!         println!("bounced: {}", event.base().email);
//!         Ok(())
//!     }),
//! );
//!
//! let payload = r#"{"event":"bounce","email":"ada@example.com","hard":true}"#;
//! let signature = handler.sign(payload)?;
//!
//! assert!(handler.verify(payload, &signature));
//! let report = handler.process(payload).await?;
//! assert_eq!(report.dispatched, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod handler;
pub mod signature;

pub use error::{Result, WebhookError};
pub use events::{EventBase, EventKind, WebhookEvent};
pub use handler::{
    handler_fn, sync_handler, DispatchReport, EventHandler, HandlerError, HandlerResult, Parsed,
    WebhookHandler,
};
pub use signature::{generate_signature, verify_signature, SIGNATURE_HEADER, SIGNATURE_PREFIX};
