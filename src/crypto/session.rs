//! Stateless bearer session tokens: `<user uuid>.<hex hmac(user uuid)>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{CryptoError, CryptoResult};
use crate::types::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks session tokens
#[derive(Clone)]
pub struct SessionKeys {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// Create from a secret
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac_for(&self, user_id: &UserId) -> CryptoResult<HmacSha256> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| CryptoError::InvalidKey)?;
        mac.update(user_id.as_hyphenated().to_string().as_bytes());
        Ok(mac)
    }

    /// Issue a token for `user_id`
    ///
    /// # Errors
    /// Returns error if the secret is unusable as a key
    pub fn issue(&self, user_id: &UserId) -> CryptoResult<String> {
        let tag = self.mac_for(user_id)?.finalize().into_bytes();
        Ok(format!("{}.{}", user_id.as_hyphenated(), hex::encode(tag)))
    }

    /// Verify a token and return the user it was issued for
    ///
    /// # Errors
    /// Returns error if the token is malformed or forged
    pub fn verify(&self, token: &str) -> CryptoResult<UserId> {
        let (user, tag) = token.split_once('.').ok_or(CryptoError::MalformedToken)?;
        let user_id: UserId = user.parse().map_err(|_| CryptoError::MalformedToken)?;
        let tag = hex::decode(tag).map_err(|_| CryptoError::MalformedToken)?;

        self.mac_for(&user_id)?
            .verify_slice(&tag)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(user_id)
    }
}
