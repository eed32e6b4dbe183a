//! Batch email dispatch for the mailwire API.
//!
//! This crate turns caller-supplied messages into one API request and maps
//! the single aggregate outcome back to per-message results.
//!
//! # Send path
//!
//! 1. **Validate** - every message is checked independently; invalid ones
//!    become `validation_failed` results, and a batch with no valid message
//!    is rejected before any network activity
//! 2. **Rate limit** - one slot of the per-client fixed window is taken per
//!    batch
//! 3. **Send** - the valid messages are posted together, retrying transport
//!    failures, 429 and 5xx with exponential backoff and jitter
//! 4. **Reconcile** - the aggregate response is fanned out to one result per
//!    sent message and merged with validation failures in input order
//!
//! # Example
//!
//! ```no_run
//! use mailwire_client::{ClientConfig, EmailClient};
//! use mailwire_core::{MailError, Message};
//!
//! # async fn example() -> Result<(), MailError> {
//! let client = EmailClient::new(ClientConfig::new("mw_live_token"))?;
//!
//! let message = Message::builder()
//!     .from("noreply@example.com")
//!     .to("ada@example.com")
//!     .subject("Welcome")
//!     .text("Thanks for signing up.")
//!     .build();
//!
//! let result = client.send_single(&message).await?;
//! println!("{}: {:?}", result.status, result.error);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod rate_limit;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::{ClientConfig, EmailClient};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use response::process_response;
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.mailwire.dev";

/// Default per-attempt request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
