//! Webhook signature scheme: HMAC-SHA256 over the canonical JSON event
//! body, Base64-encoded.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the Base64-encoded HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify a Base64 signature against `payload`.
///
/// Invalid Base64 is compared against zeros so decoding failures take the
/// same constant-time path as a wrong MAC.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);

    let expected = BASE64.decode(signature).unwrap_or_else(|_| vec![0u8; 32]);

    mac.verify_slice(&expected).is_ok()
}
