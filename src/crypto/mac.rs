//! Webhook body signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the raw request body
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

fn keyed(secret: &[u8]) -> CryptoResult<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|_| CryptoError::InvalidKey)
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`
///
/// # Errors
/// Returns error if the secret is unusable as a key
pub fn sign_body(secret: &[u8], body: &[u8]) -> CryptoResult<String> {
    let mut mac = keyed(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header value against the raw body in constant time.
/// A `sha256=` prefix is tolerated.
///
/// # Errors
/// Returns error if the signature is malformed or does not match
pub fn verify_body(secret: &[u8], body: &[u8], signature: &str) -> CryptoResult<()> {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected =
        hex::decode(signature).map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

    let mut mac = keyed(secret)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| CryptoError::InvalidSignature)
}
