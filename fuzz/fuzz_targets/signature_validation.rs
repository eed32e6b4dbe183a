#![no_main]

//! Fuzz target for webhook signature validation.
//!
//! The first byte splits the input into a secret, a payload and a candidate
//! signature. Verification must never panic, must accept the payload's own
//! signature, and must reject a candidate that differs from it.

use libfuzzer_sys::fuzz_target;
use mailwire_webhook::{generate_signature, verify_signature, SIGNATURE_PREFIX};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let (secret, rest) = rest.split_at(usize::from(split).min(rest.len()));
    let Ok(secret) = std::str::from_utf8(secret) else {
        return;
    };
    let (payload, candidate) = rest.split_at(rest.len() / 2);
    let candidate = String::from_utf8_lossy(candidate);

    let Ok(signature) = generate_signature(payload, secret) else {
        assert!(!verify_signature(payload, &candidate, secret));
        return;
    };

    assert!(verify_signature(payload, &signature, secret));
    assert!(verify_signature(payload, &format!("{SIGNATURE_PREFIX}{signature}"), secret));

    let normalized = candidate.trim();
    let normalized = normalized.strip_prefix(SIGNATURE_PREFIX).unwrap_or(normalized);
    if normalized != signature {
        assert!(!verify_signature(payload, &candidate, secret));
    }
});
