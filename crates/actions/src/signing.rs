//! HMAC-SHA256 signing of outgoing webhook payloads.
//!
//! The signature covers `{timestamp}.{body}` and is sent hex-encoded as
//! `X-Webhook-Signature: sha256=<hex>` next to `X-Webhook-Timestamp`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Hex-encoded HMAC-SHA256 of `{timestamp}.{body}`.
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    hex::encode(mac_for(secret, timestamp, body).finalize().into_bytes())
}

/// The `X-Webhook-Signature` header value.
pub fn signature_header(secret: &str, timestamp: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", compute_signature(secret, timestamp, body))
}

/// Constant-time check of a received header value (with or without the
/// `sha256=` prefix).
pub fn verify_signature(header: &str, secret: &str, timestamp: &str, body: &[u8]) -> bool {
    let hex_part = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);
    match hex::decode(hex_part) {
        Ok(expected) => mac_for(secret, timestamp, body).verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
