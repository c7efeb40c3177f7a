//! Scheduled points-to-token conversion.
//!
//! Each user converts in their own transaction, and the conversion record is
//! written in that same transaction under `(user, batch instant)`. A batch
//! re-run after a crash therefore skips users already converted.

use tracing::{info, warn};

use super::{abort, Ledger, LedgerConfig, LedgerError};
use crate::state::conversion_key;
use crate::types::{ConversionRecord, ConversionStatus, Profile, Timestamp, TokenAmount};

/// What one conversion does to a profile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionPlan {
    /// Whole conversion units
    pub units: u64,
    /// Points removed
    pub points_converted: u64,
    /// Tokens added before the fee
    pub tokens_gained: TokenAmount,
    /// Flat fee
    pub fee: TokenAmount,
}

impl ConversionPlan {
    /// Plan for the given balances, or `None` if the user is not eligible
    #[must_use]
    pub fn for_balances(points: u64, tokens: TokenAmount, config: &LedgerConfig) -> Option<Self> {
        if config.conversion_unit_points == 0
            || tokens < config.conversion_min_tokens
            || points < config.conversion_unit_points
        {
            return None;
        }
        let units = points / config.conversion_unit_points;
        Some(Self {
            units,
            points_converted: units * config.conversion_unit_points,
            tokens_gained: TokenAmount::from_tokens(
                units.saturating_mul(config.tokens_per_conversion_unit),
            ),
            fee: config.conversion_fee,
        })
    }

    fn apply(&self, profile: &mut Profile) -> Result<(), LedgerError> {
        profile.debit_points(self.points_converted)?;
        profile.credit_tokens(self.tokens_gained);
        profile.debit_tokens(self.fee)?;
        Ok(())
    }
}

/// Totals for one batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Scheduled instant of the batch
    pub batch_instant: Timestamp,
    /// Users converted by this run
    pub converted: usize,
    /// Users below threshold
    pub skipped: usize,
    /// Users converted by an earlier run of the same batch
    pub already_converted: usize,
    /// Users whose conversion errored
    pub failed: usize,
    /// Points removed across all users
    pub points_converted: u64,
}

enum UserResult {
    Converted(u64),
    Ineligible,
    AlreadyConverted,
}

impl Ledger {
    /// Convert every eligible user for the batch at `batch_instant`.
    ///
    /// Per-user failures are logged and counted; the batch continues.
    ///
    /// # Errors
    /// Returns error if the profile list cannot be read
    pub fn run_conversion(&self, batch_instant: Timestamp) -> Result<ConversionSummary, LedgerError> {
        let mut summary = ConversionSummary {
            batch_instant,
            ..ConversionSummary::default()
        };

        for profile in self.store().profiles()? {
            if ConversionPlan::for_balances(profile.points, profile.tokens, self.config()).is_none() {
                summary.skipped += 1;
                continue;
            }
            match self.convert_user(&profile, batch_instant) {
                Ok(UserResult::Converted(points)) => {
                    summary.converted += 1;
                    summary.points_converted += points;
                }
                Ok(UserResult::Ineligible) => summary.skipped += 1,
                Ok(UserResult::AlreadyConverted) => summary.already_converted += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(user_id = %profile.id, error = %e, batch_instant, "conversion failed");
                }
            }
        }

        info!(
            batch_instant,
            converted = summary.converted,
            skipped = summary.skipped,
            already_converted = summary.already_converted,
            failed = summary.failed,
            points = summary.points_converted,
            "conversion batch finished"
        );
        Ok(summary)
    }

    fn convert_user(&self, snapshot: &Profile, batch_instant: Timestamp) -> Result<UserResult, LedgerError> {
        let user = &snapshot.id;
        let key = conversion_key(user, batch_instant);
        let now = self.now();

        self.transact(|tx| {
            if tx.has_conversion(&key)? {
                return Ok(UserResult::AlreadyConverted);
            }
            let Some(mut profile) = tx.profile(user)? else {
                return abort(LedgerError::profile_not_found(user));
            };
            // balances may have moved since the scan
            let Some(plan) = ConversionPlan::for_balances(profile.points, profile.tokens, self.config())
            else {
                return Ok(UserResult::Ineligible);
            };
            if let Err(e) = plan.apply(&mut profile) {
                return abort(e);
            }

            tx.put_conversion(&ConversionRecord {
                user_id: *user,
                points_converted: plan.points_converted,
                tokens_received: plan.tokens_gained,
                fee: plan.fee,
                token_balance_after: profile.tokens,
                status: ConversionStatus::Completed,
                batch_instant,
                created_at: now,
            })?;
            tx.put_profile(&profile)?;
            Ok(UserResult::Converted(plan.points_converted))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::award::{Award, Cause};
    use super::super::testing::*;
    use super::*;
    use crate::types::UserId;

    fn funded(ledger: &Ledger, points: u64, tokens: u64) -> UserId {
        let user = ledger.create_profile().unwrap().id;
        ledger
            .award(
                &user,
                Award {
                    points,
                    tokens: TokenAmount::from_tokens(tokens),
                },
                Cause::MiningClaim,
            )
            .unwrap();
        user
    }

    #[test]
    fn test_conversion_arithmetic() {
        let (ledger, _) = ledger();
        let rich = funded(&ledger, 25_000, 400);
        let poor = funded(&ledger, 90_000, 300);

        let summary = ledger.run_conversion(T0).unwrap();
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.points_converted, 20_000);

        let profile = ledger.profile(&rich).unwrap();
        assert_eq!(profile.points, 5_000);
        assert_eq!(profile.tokens, TokenAmount::from_tokens(850));

        let records = ledger.store().conversions(&rich).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].points_converted, 20_000);
        assert_eq!(records[0].tokens_received, TokenAmount::from_tokens(500));
        assert_eq!(records[0].fee, TokenAmount::from_tokens(50));
        assert_eq!(records[0].token_balance_after, TokenAmount::from_tokens(850));
        assert_eq!(records[0].status, ConversionStatus::Completed);

        let untouched = ledger.profile(&poor).unwrap();
        assert_eq!(untouched.points, 90_000);
        assert!(ledger.store().conversions(&poor).unwrap().is_empty());
    }

    #[test]
    fn test_rerun_of_same_batch_is_noop() {
        let (ledger, _) = ledger();
        let user = funded(&ledger, 30_000, 1_000);

        ledger.run_conversion(T0).unwrap();
        // still eligible on points alone, but the batch already ran for them
        ledger.award(&user, Award::points(20_000), Cause::MiningClaim).unwrap();
        let rerun = ledger.run_conversion(T0).unwrap();

        assert_eq!(rerun.converted, 0);
        assert_eq!(rerun.already_converted, 1);
        assert_eq!(ledger.profile(&user).unwrap().points, 20_000);
        assert_eq!(ledger.store().conversions(&user).unwrap().len(), 1);
    }

    #[test]
    fn test_points_below_one_unit_skipped() {
        let (ledger, _) = ledger();
        let user = funded(&ledger, 9_999, 5_000);

        let summary = ledger.run_conversion(T0).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(ledger.profile(&user).unwrap().points, 9_999);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_plan_never_overdraws(points in 0u64..10_000_000, tokens in 0u64..100_000) {
                let config = LedgerConfig::default();
                let balance = TokenAmount::from_tokens(tokens);
                if let Some(plan) = ConversionPlan::for_balances(points, balance, &config) {
                    prop_assert!(plan.points_converted <= points);
                    prop_assert_eq!(points - plan.points_converted, points % 10_000);
                    prop_assert!(balance.saturating_add(plan.tokens_gained) >= plan.fee);
                } else {
                    prop_assert!(points < 10_000 || tokens < 350);
                }
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn prop_awards_and_conversions_keep_balances_consistent(
                ops in proptest::collection::vec((0u64..30_000, 0u64..500, any::<bool>()), 1..12)
            ) {
                let (ledger, _) = ledger();
                let user = ledger.create_profile().unwrap().id;
                let (mut points, mut tokens) = (0u64, 0u64);

                for (batch, (p, t, convert)) in ops.into_iter().enumerate() {
                    ledger
                        .award(&user, Award { points: p, tokens: TokenAmount::from_tokens(t) }, Cause::MiningClaim)
                        .unwrap();
                    points += p;
                    tokens += t;

                    if convert {
                        let summary = ledger.run_conversion(T0 + batch as i64).unwrap();
                        prop_assert_eq!(summary.failed, 0);
                        if points >= 10_000 && tokens >= 350 {
                            let units = points / 10_000;
                            points -= units * 10_000;
                            tokens = tokens + units * 250 - 50;
                        }
                    }

                    let profile = ledger.profile(&user).unwrap();
                    prop_assert_eq!(profile.points, points);
                    prop_assert_eq!(profile.tokens, TokenAmount::from_tokens(tokens));
                }
            }
        }
    }
}
