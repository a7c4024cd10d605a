//! HMAC-SHA256 webhook signature verification.
//!
//! Verification recomputes the signature over the EXACT raw bytes received
//! on the wire. Re-serializing the parsed payload before verifying breaks
//! matching whenever key ordering or whitespace differs, so callers must
//! pass the untouched request body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a hex-encoded HMAC-SHA256 signature over `raw_body`.
///
/// Comparison happens inside `verify_slice`, which is constant-time.
/// Returns `false` for malformed hex or any length mismatch.
pub fn verify(secret: &[u8], raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&signature).is_ok()
}

/// Compute the hex signature for a body (used by tests and the outbound
/// tenant re-delivery path).
pub fn sign(secret: &[u8], raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
