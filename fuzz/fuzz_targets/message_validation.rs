#![no_main]

//! Fuzz target for outbound message validation.
//!
//! Any JSON that deserializes into a message must validate without
//! panicking, and address parsing must accept only what validation accepts.

use libfuzzer_sys::fuzz_target;
use mailwire_core::{validation::validate_email, Address, Message};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = serde_json::from_slice::<Message>(data) {
        let _ = message.validate();
        let _ = message.to_wire();
    }

    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(address) = text.parse::<Address>() {
            assert!(validate_email(&address.email).is_ok());
        }
    }
});
