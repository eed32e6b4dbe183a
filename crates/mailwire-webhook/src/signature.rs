//! HMAC-SHA256 webhook signatures.
//!
//! The signature is the lowercase hex HMAC-SHA256 of the raw request body,
//! keyed with the shared webhook secret. The header may carry it bare or
//! with a `sha256=` prefix.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// Optional prefix on the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Header the API sends the signature in.
pub const SIGNATURE_HEADER: &str = "X-Mailwire-Signature";

/// Generates the hex signature for `payload`.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSecret` if the secret cannot key the MAC.
pub fn generate_signature(payload: &[u8], secret: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSecret)?;

    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `signature` against the HMAC of `payload` under `secret`.
///
/// The comparison runs in constant time for equal-length inputs.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let provided = signature.trim();
    let provided = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);

    match generate_signature(payload, secret) {
        Ok(expected) => timing_safe_eq(provided.as_bytes(), expected.as_bytes()),
        Err(_) => false,
    }
}

fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
