//! Append-only audit records: referrals, external events, conversions.

use serde::{Deserialize, Serialize};

use super::{Lamports, Timestamp, TokenAmount, UserId};

/// Records that `referred_id` joined through `referrer_id`'s code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    /// Owner of the redeemed code
    pub referrer_id: UserId,
    /// The new user
    pub referred_id: UserId,
    /// Points paid to each side
    pub bonus_points: u64,
    /// Creation time
    pub created_at: Timestamp,
}

/// What an external event did
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Booster payment
    BoosterPurchase {
        /// Booster bought
        booster_id: String,
        /// Amount paid
        paid: Lamports,
    },
    /// Presale token purchase
    PresalePurchase {
        /// Amount paid
        paid: Lamports,
        /// Tokens credited for the purchase
        tokens: TokenAmount,
        /// Early-bird bonus credited alongside, if any
        bonus: TokenAmount,
    },
    /// Task completed on a partner platform
    ExternalTask {
        /// Partner task identifier
        task_identifier: String,
        /// Points credited
        points: u64,
    },
}

/// One applied external event. The key it is stored under is the dedup key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEventRecord {
    /// Dedup key (transaction hash, payment id, or composite)
    pub dedup_key: String,
    /// Beneficiary
    pub user_id: UserId,
    /// Event details
    pub kind: EventKind,
    /// Provider-reported status
    pub status: String,
    /// When the ledger applied it
    pub processed_at: Timestamp,
}

/// Conversion outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    /// Balances were updated
    Completed,
}

/// Audit row for one scheduled points-to-token conversion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Converted user
    pub user_id: UserId,
    /// Points removed
    pub points_converted: u64,
    /// Tokens received before the fee
    pub tokens_received: TokenAmount,
    /// Flat fee charged
    pub fee: TokenAmount,
    /// Token balance after conversion
    pub token_balance_after: TokenAmount,
    /// Outcome
    pub status: ConversionStatus,
    /// Scheduled instant that triggered the batch
    pub batch_instant: Timestamp,
    /// When the row was written
    pub created_at: Timestamp,
}
