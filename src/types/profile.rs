//! The per-user profile row.

use serde::{Deserialize, Serialize};

use super::{Timestamp, TokenAmount, UserId};

/// Where a profile sits in the mining cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimState {
    /// Timer running, not yet eligible
    Mining,
    /// Timer elapsed, claim available
    Ready,
}

/// One record per user: balances, timestamps and one-shot flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile id
    pub id: UserId,
    /// Point balance
    pub points: u64,
    /// Token balance
    pub tokens: TokenAmount,
    /// Start of the current mining cycle, unset until first activity
    pub mining_started_at: Option<Timestamp>,
    /// Last successful claim
    pub last_claim_at: Option<Timestamp>,
    /// Unique, immutable referral code
    pub referral_code: String,
    /// Wallet-connect bonus already paid
    pub wallet_bonus_claimed: bool,
    /// All-one-time-tasks bonus already paid
    pub task_completion_bonus_awarded: bool,
    /// Presale early-bird bonus already paid
    pub presale_bonus_claimed: bool,
    /// Holds (or recently held) an auto-claim booster
    pub has_auto_claim: bool,
    /// Bound wallet address
    pub wallet_address: Option<String>,
    /// Avatar reference
    pub avatar_url: Option<String>,
    /// Account creation time
    pub created_at: Timestamp,
}

impl Profile {
    /// Create a fresh profile with zero balances
    #[must_use]
    pub fn new(id: UserId, referral_code: String, created_at: Timestamp) -> Self {
        Self {
            id,
            points: 0,
            tokens: TokenAmount::ZERO,
            mining_started_at: None,
            last_claim_at: None,
            referral_code,
            wallet_bonus_claimed: false,
            task_completion_bonus_awarded: false,
            presale_bonus_claimed: false,
            has_auto_claim: false,
            wallet_address: None,
            avatar_url: None,
            created_at,
        }
    }

    /// Credit points
    pub fn credit_points(&mut self, amount: u64) {
        self.points = self.points.saturating_add(amount);
    }

    /// Debit points
    ///
    /// # Errors
    /// Returns error if the balance would go negative
    pub fn debit_points(&mut self, amount: u64) -> Result<(), BalanceError> {
        self.points = self
            .points
            .checked_sub(amount)
            .ok_or(BalanceError::InsufficientPoints {
                have: self.points,
                need: amount,
            })?;
        Ok(())
    }

    /// Credit tokens
    pub fn credit_tokens(&mut self, amount: TokenAmount) {
        self.tokens = self.tokens.saturating_add(amount);
    }

    /// Debit tokens
    ///
    /// # Errors
    /// Returns error if the balance would go negative
    pub fn debit_tokens(&mut self, amount: TokenAmount) -> Result<(), BalanceError> {
        self.tokens = self
            .tokens
            .checked_sub(amount)
            .ok_or(BalanceError::InsufficientTokens {
                have: self.tokens,
                need: amount,
            })?;
        Ok(())
    }

    /// When the current cycle becomes claimable
    #[must_use]
    pub fn eligible_at(&self, interval_ms: i64) -> Option<Timestamp> {
        self.mining_started_at.map(|start| start + interval_ms)
    }

    /// Claim state at `now`; a profile whose timer never started is mining
    #[must_use]
    pub fn claim_state(&self, now: Timestamp, interval_ms: i64) -> ClaimState {
        match self.eligible_at(interval_ms) {
            Some(at) if now >= at => ClaimState::Ready,
            _ => ClaimState::Mining,
        }
    }
}

/// Balance guard failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    /// Not enough points
    #[error("insufficient points: have {have}, need {need}")]
    InsufficientPoints {
        /// Current balance
        have: u64,
        /// Amount needed
        need: u64,
    },
    /// Not enough tokens
    #[error("insufficient tokens: have {have}, need {need}")]
    InsufficientTokens {
        /// Current balance
        have: TokenAmount,
        /// Amount needed
        need: TokenAmount,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HOUR_MS;

    fn profile() -> Profile {
        Profile::new(UserId::new_v4(), "ABCD1234".into(), 0)
    }

    #[test]
    fn test_point_credit_and_debit() {
        let mut p = profile();
        p.credit_points(100);
        p.debit_points(30).unwrap();
        assert_eq!(p.points, 70);
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut p = profile();
        p.credit_points(10);
        assert!(matches!(
            p.debit_points(11),
            Err(BalanceError::InsufficientPoints { have: 10, need: 11 })
        ));
        assert_eq!(p.points, 10);

        assert!(p.debit_tokens(TokenAmount::from_tokens(1)).is_err());
        assert!(p.tokens.is_zero());
    }

    #[test]
    fn test_claim_state() {
        let mut p = profile();
        assert_eq!(p.claim_state(0, 4 * HOUR_MS), ClaimState::Mining);

        p.mining_started_at = Some(1_000);
        assert_eq!(p.claim_state(1_000 + 4 * HOUR_MS - 1, 4 * HOUR_MS), ClaimState::Mining);
        assert_eq!(p.claim_state(1_000 + 4 * HOUR_MS, 4 * HOUR_MS), ClaimState::Ready);
    }
}
