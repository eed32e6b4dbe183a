//! Test infrastructure for mailwire.
//!
//! Provides a wiremock-backed stand-in for the send API, a scripted
//! [`Transport`](mailwire_client::Transport) for driving the retry loop
//! without a network, and fixtures for messages and webhook payloads.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod http;
pub mod transport;

pub use fixtures::{
    batch_payload, invalid_message, mixed_batch, signature_header, valid_message,
    EventPayloadBuilder,
};
pub use http::{MockApi, TEST_TOKEN};
pub use mailwire_core::TestClock;
pub use transport::ScriptedTransport;
