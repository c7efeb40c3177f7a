//! Referral code generation.

use rand::Rng;

/// Length of generated referral codes
pub const REFERRAL_CODE_LEN: usize = 8;

// No 0/O/1/I so codes survive being read aloud.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Draw a fresh referral code. Uniqueness is enforced by the store.
#[must_use]
pub fn generate_referral_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..REFERRAL_CODE_LEN)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// Cheap shape check before touching the store
#[must_use]
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == REFERRAL_CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}
