//! Award engine: the only path that credits balances.
//!
//! A credit and its causal record are written in the same transaction.
//! If either write fails, or the profile vanished mid-operation, the
//! transaction aborts and neither exists.

use tracing::debug;

use super::{abort, reject, Ledger, LedgerError, Rejection};
use crate::state::{Tx, TxResult};
use crate::types::{
    ExternalEventRecord, Profile, ReferralEdge, TaskCompletionRecord, TokenAmount, UserId,
};

/// Amount to credit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Award {
    /// Points to add
    pub points: u64,
    /// Tokens to add
    pub tokens: TokenAmount,
}

impl Award {
    /// Points only
    #[must_use]
    pub const fn points(points: u64) -> Self {
        Self {
            points,
            tokens: TokenAmount::ZERO,
        }
    }

    /// Tokens only
    #[must_use]
    pub const fn tokens(tokens: TokenAmount) -> Self {
        Self { points: 0, tokens }
    }
}

/// One-shot profile flags whose unset-to-set transition guards a bonus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BonusFlag {
    /// All one-time tasks completed
    AllTasks,
    /// First wallet connection
    WalletConnect,
    /// First presale purchase
    PresaleEarlyBird,
}

impl BonusFlag {
    fn slot(self, profile: &mut Profile) -> &mut bool {
        match self {
            Self::AllTasks => &mut profile.task_completion_bonus_awarded,
            Self::WalletConnect => &mut profile.wallet_bonus_claimed,
            Self::PresaleEarlyBird => &mut profile.presale_bonus_claimed,
        }
    }
}

/// Why a credit happens; determines the record written with it
#[derive(Clone, Copy, Debug)]
pub enum Cause<'a> {
    /// Mining claim; the profile's claim timestamps are the record
    MiningClaim,
    /// Task completion stored under `key`
    TaskCompletion {
        /// Completion key
        key: &'a str,
        /// Record to write
        record: &'a TaskCompletionRecord,
    },
    /// Referred side of a referral; writes the edge
    Referral(&'a ReferralEdge),
    /// Referrer side; the edge is written by the referred side in the same
    /// transaction
    ReferrerReward(&'a ReferralEdge),
    /// Deduplicated external event
    ExternalEvent(&'a ExternalEventRecord),
    /// One-shot bonus guarded by a profile flag
    Bonus(BonusFlag),
}

/// Credit `award` to `user` inside `tx`, writing the causal record first.
///
/// Returns the updated profile as written.
pub(crate) fn apply(
    tx: &Tx<'_, LedgerError>,
    user: &UserId,
    award: Award,
    cause: Cause<'_>,
) -> TxResult<Profile, LedgerError> {
    let Some(mut profile) = tx.profile(user)? else {
        return abort(LedgerError::profile_not_found(user));
    };

    match cause {
        Cause::MiningClaim | Cause::ReferrerReward(_) => {}
        Cause::TaskCompletion { key, record } => tx.put_completion(key, record)?,
        Cause::Referral(edge) => tx.put_referral(edge)?,
        Cause::ExternalEvent(record) => tx.put_event(record)?,
        Cause::Bonus(flag) => {
            let slot = flag.slot(&mut profile);
            if *slot {
                return reject(Rejection::BonusAlreadyAwarded);
            }
            *slot = true;
        }
    }

    profile.credit_points(award.points);
    profile.credit_tokens(award.tokens);
    tx.put_profile(&profile)?;

    Ok(profile)
}

impl Ledger {
    /// Atomically credit `award` to `user` and record `cause`.
    ///
    /// # Errors
    /// Returns error if the profile does not exist, a bonus flag is already
    /// set, or on storage failure; nothing is written in any of these cases
    pub fn award(&self, user: &UserId, award: Award, cause: Cause<'_>) -> Result<Profile, LedgerError> {
        let profile = self.transact(|tx| apply(tx, user, award, cause))?;
        debug!(
            user_id = %user,
            points = award.points,
            tokens = %award.tokens,
            ?cause,
            "award applied"
        );
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::types::{calendar_day, EventKind};

    #[test]
    fn test_award_credits_and_records() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;
        let day = calendar_day(T0, ledger.config().daily_reset_offset);
        let record = TaskCompletionRecord {
            user_id: user,
            task_id: "follow".into(),
            completed_on: day,
            completed_at: T0,
            points_awarded: 700,
            is_daily: false,
        };
        let key = crate::state::completion_key(&user, "follow", None);

        let profile = ledger
            .award(&user, Award::points(700), Cause::TaskCompletion { key: &key, record: &record })
            .unwrap();

        assert_eq!(profile.points, 700);
        assert_eq!(ledger.store().completions(&user).unwrap(), vec![record]);
    }

    #[test]
    fn test_award_to_missing_profile_writes_nothing() {
        let (ledger, _) = ledger();
        let ghost = UserId::new_v4();
        let record = ExternalEventRecord {
            dedup_key: "tx:abc".into(),
            user_id: ghost,
            kind: EventKind::ExternalTask {
                task_identifier: "quest".into(),
                points: 10,
            },
            status: "completed".into(),
            processed_at: T0,
        };

        let result = ledger.award(&ghost, Award::points(10), Cause::ExternalEvent(&record));

        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
        assert!(ledger.store().event("tx:abc").unwrap().is_none());
    }

    #[test]
    fn test_bonus_flag_is_one_shot() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;

        let first = ledger
            .award(&user, Award::tokens(TokenAmount::from_tokens(100)), Cause::Bonus(BonusFlag::WalletConnect))
            .unwrap();
        assert!(first.wallet_bonus_claimed);

        let second = ledger.award(
            &user,
            Award::tokens(TokenAmount::from_tokens(100)),
            Cause::Bonus(BonusFlag::WalletConnect),
        );
        assert!(matches!(
            second,
            Err(LedgerError::Rejected(Rejection::BonusAlreadyAwarded))
        ));
        assert_eq!(ledger.profile(&user).unwrap().tokens.whole_tokens(), 100);
    }

    #[test]
    fn test_concurrent_awards_do_not_lose_updates() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        ledger.award(&user, Award::points(1), Cause::MiningClaim).unwrap();
                    }
                });
            }
        });

        assert_eq!(ledger.profile(&user).unwrap().points, 200);
    }
}
