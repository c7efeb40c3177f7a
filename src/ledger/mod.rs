//! The points and rewards ledger.
//!
//! Every balance change flows through the award engine inside a store
//! transaction, together with the record that justifies it:
//!
//! - **Claim gate**: 4-hour mining cycle, booster multipliers, auto-claim
//! - **Task policy**: one-time vs daily tasks, all-tasks bonus
//! - **Referrals**: one edge per referred user, both sides paid
//! - **Reconciler**: payment and partner webhooks, deduplicated
//! - **Conversion**: scheduled points-to-token batch

mod award;
mod claim;
mod conversion;
mod guard;
mod reconcile;
mod referral;
mod tasks;

pub use award::{Award, BonusFlag, Cause};
pub use claim::{ClaimReceipt, ClaimStatus};
pub use conversion::{ConversionPlan, ConversionSummary};
pub use guard::DedupKey;
pub use reconcile::{
    BoosterPurchase, ExternalTaskClaim, PresalePurchase, PresaleReceipt, WalletConnection,
    WalletReceipt,
};
pub use referral::ReferralReceipt;
pub use tasks::{TaskBoardEntry, TaskOutcome};

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use sled::transaction::ConflictableTransactionError;
use tracing::info;

use crate::crypto::generate_referral_code;
use crate::state::{StateError, Store, Tx, TxResult};
use crate::types::{
    BalanceError, Clock, Lamports, Profile, Timestamp, TokenAmount, UserId, HOUR_MS,
};

/// Ledger tunables
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Length of one mining cycle
    pub mining_interval_ms: i64,
    /// Points paid per claim before multipliers
    pub base_claim_points: u64,
    /// Points paid to each side of a referral
    pub referral_bonus_points: u64,
    /// One-time bonus for completing every one-time task
    pub all_tasks_bonus_points: u64,
    /// Points consumed per conversion unit
    pub conversion_unit_points: u64,
    /// Whole tokens produced per conversion unit
    pub tokens_per_conversion_unit: u64,
    /// Minimum token balance to be eligible for conversion
    pub conversion_min_tokens: TokenAmount,
    /// Flat fee charged per conversion
    pub conversion_fee: TokenAmount,
    /// Tokens credited for the first wallet connection
    pub wallet_bonus_tokens: TokenAmount,
    /// Smallest presale purchase accepted
    pub presale_min: Lamports,
    /// Whole tokens sold per SOL
    pub presale_tokens_per_sol: u64,
    /// Early-bird bonus on a user's first presale purchase
    pub presale_bonus_percent: u8,
    /// Early-bird window end; `None` keeps it open
    pub presale_early_bird_until: Option<Timestamp>,
    /// Allowed deviation between reported and canonical prices
    pub price_tolerance_percent: u8,
    /// Sanity bound on any reported payment
    pub max_payment: Lamports,
    /// Upper bound on partner-reported task points
    pub external_task_max_points: u64,
    /// Allowed clock skew on partner-reported timestamps
    pub external_task_max_skew_ms: i64,
    /// Offset used to decide the calendar day for daily tasks
    pub daily_reset_offset: FixedOffset,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mining_interval_ms: 4 * HOUR_MS,
            base_claim_points: 4_000,
            referral_bonus_points: 500,
            all_tasks_bonus_points: 10_000,
            conversion_unit_points: 10_000,
            tokens_per_conversion_unit: 250,
            conversion_min_tokens: TokenAmount::from_tokens(350),
            conversion_fee: TokenAmount::from_tokens(50),
            wallet_bonus_tokens: TokenAmount::from_tokens(100),
            presale_min: Lamports(100_000_000), // 0.1 SOL
            presale_tokens_per_sol: 10_000,
            presale_bonus_percent: 10,
            presale_early_bird_until: None,
            price_tolerance_percent: 1,
            max_payment: Lamports::from_whole_sol(1_000),
            external_task_max_points: 10_000,
            external_task_max_skew_ms: 24 * HOUR_MS,
            daily_reset_offset: Utc.fix(),
        }
    }
}

/// Shared handle to the ledger. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    store: Store,
    clock: Arc<dyn Clock>,
    config: Arc<LedgerConfig>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create a ledger over `store`
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            config: Arc::new(config),
        }
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current time per the injected clock
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `f` in one store transaction aborting with [`LedgerError`]
    pub(crate) fn transact<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: Fn(&Tx<'_, LedgerError>) -> TxResult<T, LedgerError>,
    {
        self.store.transaction(f)
    }

    /// Load a profile or fail with `NotFound`
    ///
    /// # Errors
    /// Returns error if the profile does not exist or on storage failure
    pub fn profile(&self, user: &UserId) -> Result<Profile, LedgerError> {
        self.store
            .profile(user)?
            .ok_or_else(|| LedgerError::profile_not_found(user))
    }

    /// Create a profile with zero balances and a fresh referral code
    ///
    /// # Errors
    /// Returns error on storage failure or if no free code could be drawn
    pub fn create_profile(&self) -> Result<Profile, LedgerError> {
        const ATTEMPTS: usize = 8;

        let mut rng = rand::thread_rng();
        let codes = std::iter::repeat_with(|| generate_referral_code(&mut rng)).take(ATTEMPTS);
        self.create_profile_from(codes)
    }

    fn create_profile_from<I>(&self, codes: I) -> Result<Profile, LedgerError>
    where
        I: IntoIterator<Item = String>,
    {
        let id = UserId::new_v4();
        let now = self.now();

        for code in codes {
            let profile = Profile::new(id, code, now);

            let created = self.transact(|tx| {
                if tx.referral_code_owner(&profile.referral_code)?.is_some() {
                    return Ok(false);
                }
                tx.put_referral_code(&profile.referral_code, &profile.id)?;
                tx.put_profile(&profile)?;
                Ok(true)
            })?;

            if created {
                info!(user_id = %id, referral_code = %profile.referral_code, "profile created");
                return Ok(profile);
            }
        }

        Err(LedgerError::Internal(
            "could not allocate a unique referral code".into(),
        ))
    }
}

/// A benign refusal: nothing changed, and the caller gets a reason
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Claim attempted before the timer elapsed
    StillMining {
        /// When the claim opens
        eligible_at: Timestamp,
    },
    /// Task inactive or unknown
    TaskUnavailable,
    /// One-time task already done
    TaskAlreadyCompleted,
    /// Daily task already done today
    DailyTaskAlreadyCompleted,
    /// User already redeemed a referral code
    AlreadyReferred,
    /// User tried their own code
    SelfReferral,
    /// No profile owns the code
    UnknownReferralCode,
    /// A one-shot bonus flag is already set
    BonusAlreadyAwarded,
}

impl Rejection {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StillMining { .. } => "STILL_MINING",
            Self::TaskUnavailable => "TASK_UNAVAILABLE",
            Self::TaskAlreadyCompleted => "TASK_ALREADY_COMPLETED",
            Self::DailyTaskAlreadyCompleted => "DAILY_TASK_ALREADY_COMPLETED",
            Self::AlreadyReferred => "ALREADY_REFERRED",
            Self::SelfReferral => "SELF_REFERRAL",
            Self::UnknownReferralCode => "UNKNOWN_REFERRAL_CODE",
            Self::BonusAlreadyAwarded => "BONUS_ALREADY_AWARDED",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StillMining { eligible_at } => {
                let at = crate::types::timestamp_to_datetime(*eligible_at)
                    .map_or_else(|| eligible_at.to_string(), |dt| dt.to_rfc3339());
                write!(f, "Mining in progress. Your next claim opens at {at}.")
            }
            Self::TaskUnavailable => f.write_str("This task is not available."),
            Self::TaskAlreadyCompleted => f.write_str("Task already completed."),
            Self::DailyTaskAlreadyCompleted => {
                f.write_str("Daily task already completed today. Come back tomorrow!")
            }
            Self::AlreadyReferred => f.write_str("You have already used a referral code."),
            Self::SelfReferral => f.write_str("You cannot use your own referral code."),
            Self::UnknownReferralCode => f.write_str("Invalid referral code."),
            Self::BonusAlreadyAwarded => f.write_str("Bonus already awarded."),
        }
    }
}

/// Result shape for externally triggered events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Balances and records were updated
    Applied(T),
    /// Same dedup key seen before; nothing changed
    AlreadyProcessed,
    /// Event acknowledged but not applicable (e.g. pending payment)
    Ignored(String),
}

impl<T> Outcome<T> {
    /// Was anything written
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or out-of-range input
    #[error("validation failed: {0}")]
    Validation(String),
    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },
    /// Benign refusal
    #[error("{0}")]
    Rejected(Rejection),
    /// Guarded debit would go negative
    #[error(transparent)]
    Balance(#[from] BalanceError),
    /// Storage failure
    #[error("storage failure: {0}")]
    Store(#[from] StateError),
    /// Server-side failure unrelated to the input
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub(crate) fn profile_not_found(user: &UserId) -> Self {
        Self::NotFound {
            entity: "profile",
            id: user.to_string(),
        }
    }
}

/// Abort the surrounding transaction with `err`
pub(crate) fn abort<T>(err: LedgerError) -> TxResult<T, LedgerError> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Abort the surrounding transaction with a rejection
pub(crate) fn reject<T>(rejection: Rejection) -> TxResult<T, LedgerError> {
    abort(LedgerError::Rejected(rejection))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_create_profile() {
        let (ledger, _) = ledger();
        let profile = ledger.create_profile().unwrap();

        assert_eq!(profile.points, 0);
        assert!(profile.tokens.is_zero());
        assert!(profile.mining_started_at.is_none());
        assert_eq!(profile.created_at, T0);
        assert_eq!(
            ledger.store().user_by_referral_code(&profile.referral_code).unwrap(),
            Some(profile.id)
        );
    }

    #[test]
    fn test_referral_codes_unique() {
        let (ledger, _) = ledger();
        let mut codes: Vec<String> = (0..50)
            .map(|_| ledger.create_profile().unwrap().referral_code)
            .collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 50);
    }

    #[test]
    fn test_code_exhaustion_is_internal() {
        let (ledger, _) = ledger();
        let taken = ledger.create_profile().unwrap().referral_code;

        let result = ledger.create_profile_from(std::iter::repeat(taken).take(3));
        assert!(matches!(result, Err(LedgerError::Internal(_))));
    }

    #[test]
    fn test_missing_profile() {
        let (ledger, _) = ledger();
        assert!(matches!(
            ledger.profile(&UserId::new_v4()),
            Err(LedgerError::NotFound { entity: "profile", .. })
        ));
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            Rejection::DailyTaskAlreadyCompleted.to_string(),
            "Daily task already completed today. Come back tomorrow!"
        );
        assert_eq!(Rejection::SelfReferral.code(), "SELF_REFERRAL");
    }
}
