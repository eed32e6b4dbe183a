//! Core types for the mailwire transactional email client.
//!
//! Provides the wire models (addresses, attachments, messages, send
//! results), their validation and serialization contract, the error taxonomy
//! shared by the dispatch and webhook layers, and the clock abstraction used
//! for backoff and rate limiting.
//!
//! # Example
//!
//! ```
//! use mailwire_core::{Address, Message};
//!
//! let message = Message::builder()
//!     .from(Address::with_name("noreply@example.com", "Example"))
//!     .to("ada@example.com")
//!     .subject("Welcome")
//!     .text("Thanks for signing up.")
//!     .build();
//!
//! assert!(message.validate().is_ok());
//! assert_eq!(message.to_wire()["to"][0]["email"], "ada@example.com");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod time;
pub mod validation;

pub use error::{ErrorKind, MailError, Result, ValidationError};
pub use models::{
    Address, Attachment, Message, MessageBuilder, SendResult, SendStatus, TrackingSettings,
};
pub use time::{Clock, RealClock, TestClock};
