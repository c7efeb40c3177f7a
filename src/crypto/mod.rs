//! Cryptographic primitives for the ledger's trust boundaries.
//!
//! - HMAC-SHA256 over raw webhook bodies (shared-secret authenticity)
//! - HMAC-signed bearer session tokens for user actions
//! - Random referral codes

mod code;
mod mac;
mod session;

pub use code::{generate_referral_code, is_well_formed_code, REFERRAL_CODE_LEN};
pub use mac::{sign_body, verify_body, SIGNATURE_HEADER};
pub use session::SessionKeys;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Signature does not match
    #[error("invalid signature")]
    InvalidSignature,
    /// Signature header is not hex
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    /// Session token cannot be parsed
    #[error("malformed session token")]
    MalformedToken,
    /// Secret unusable as an HMAC key
    #[error("invalid key")]
    InvalidKey,
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
