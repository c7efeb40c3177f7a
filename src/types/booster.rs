//! Purchasable boosters and the time-limited grants they produce.

use serde::{Deserialize, Serialize};

use super::{Lamports, Timestamp, UserId, HOUR_MS};

/// A booster offered for sale
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterDefinition {
    /// Booster id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Claim payout multiplier (1 = no multiplier)
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Claims fire automatically while active
    #[serde(default)]
    pub auto_claim: bool,
    /// How long a purchase stays active
    pub duration_hours: u32,
    /// Canonical price
    pub price: Lamports,
    /// Inactive boosters cannot be purchased
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_multiplier() -> u32 {
    1
}

const fn default_active() -> bool {
    true
}

impl BoosterDefinition {
    /// Build the grant for a purchase confirmed at `now`
    #[must_use]
    pub fn grant(&self, user_id: UserId, now: Timestamp, source_key: String) -> ActiveBoosterGrant {
        ActiveBoosterGrant {
            user_id,
            booster_id: self.id.clone(),
            multiplier: self.multiplier.max(1),
            auto_claim: self.auto_claim,
            granted_at: now,
            expires_at: now + i64::from(self.duration_hours) * HOUR_MS,
            source_key,
        }
    }
}

/// A purchased booster, active until `expires_at`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBoosterGrant {
    /// Owner
    pub user_id: UserId,
    /// Booster that was bought
    pub booster_id: String,
    /// Multiplier value at purchase time
    pub multiplier: u32,
    /// Enables auto-claim
    pub auto_claim: bool,
    /// Purchase confirmation time
    pub granted_at: Timestamp,
    /// Expiry
    pub expires_at: Timestamp,
    /// Dedup key of the payment that produced it
    pub source_key: String,
}

impl ActiveBoosterGrant {
    /// Grants expire by timestamp comparison only
    #[must_use]
    pub const fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_expiry() {
        let booster = BoosterDefinition {
            id: "x2-day".into(),
            name: "2x for a day".into(),
            multiplier: 2,
            auto_claim: false,
            duration_hours: 24,
            price: Lamports::from_whole_sol(1),
            active: true,
        };
        let grant = booster.grant(UserId::new_v4(), 1_000, "tx".into());

        assert_eq!(grant.expires_at, 1_000 + 24 * HOUR_MS);
        assert!(grant.is_active(1_000 + 24 * HOUR_MS - 1));
        assert!(!grant.is_active(1_000 + 24 * HOUR_MS));
    }
}
