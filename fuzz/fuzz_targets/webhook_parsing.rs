#![no_main]

//! Fuzz target for webhook payload parsing.
//!
//! Arbitrary bytes must never panic the parser. Anything that parses must
//! survive a round trip through its JSON form with the same kind.

use libfuzzer_sys::fuzz_target;
use mailwire_webhook::{WebhookEvent, WebhookHandler};

fuzz_target!(|data: &[u8]| {
    let handler = WebhookHandler::new();

    let Ok(parsed) = handler.parse(data) else {
        return;
    };

    for event in parsed.into_events() {
        let reparsed = WebhookEvent::from_json(&event.to_json());
        assert!(matches!(reparsed, Ok(ref again) if again.kind() == event.kind()));
    }
});
