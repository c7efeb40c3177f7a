//! Claim gate: the repeating mining cycle.
//!
//! `MINING` until `mining_started_at + interval`, then `READY`. A claim in
//! `READY` pays `base × best active multiplier` and restarts the cycle at
//! the claim instant. Eligibility is always recomputed from the stored
//! profile; nothing the client reports is trusted.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::award::{self, Award, Cause};
use super::{abort, reject, Ledger, LedgerError, Rejection};
use crate::types::{ActiveBoosterGrant, ClaimState, Profile, Timestamp, UserId};

/// Snapshot of a user's mining cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatus {
    /// Current state
    pub state: ClaimState,
    /// Start of the running cycle
    pub mining_started_at: Option<Timestamp>,
    /// When the claim opens
    pub eligible_at: Option<Timestamp>,
    /// Best active multiplier
    pub multiplier: u32,
    /// Points the next claim would pay
    pub next_payout: u64,
    /// An auto-claim booster is active
    pub auto_claim: bool,
}

/// Result of a successful claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    /// Points credited
    pub points_awarded: u64,
    /// Multiplier applied
    pub multiplier: u32,
    /// Point balance after the claim
    pub new_balance: u64,
    /// When the next claim opens
    pub next_eligible_at: Timestamp,
    /// Fired by the auto-claim policy
    pub automatic: bool,
}

/// Highest multiplier among active grants, 1 if none
#[must_use]
pub(crate) fn best_multiplier(grants: &[ActiveBoosterGrant]) -> u32 {
    grants.iter().map(|g| g.multiplier).max().unwrap_or(1).max(1)
}

enum Step {
    TimerStarted(Timestamp),
    Claimed(Profile),
}

impl Ledger {
    /// Non-expired booster grants of `user`
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn active_grants(&self, user: &UserId) -> Result<Vec<ActiveBoosterGrant>, LedgerError> {
        let now = self.now();
        Ok(self
            .store()
            .grants(user)?
            .into_iter()
            .filter(|g| g.is_active(now))
            .collect())
    }

    /// Start the mining timer on first activity; no-op afterwards
    ///
    /// # Errors
    /// Returns error if the profile does not exist or on storage failure
    pub fn touch(&self, user: &UserId) -> Result<Profile, LedgerError> {
        let now = self.now();
        self.transact(|tx| {
            let Some(mut profile) = tx.profile(user)? else {
                return abort(LedgerError::profile_not_found(user));
            };
            if profile.mining_started_at.is_none() {
                profile.mining_started_at = Some(now);
                tx.put_profile(&profile)?;
            }
            Ok(profile)
        })
    }

    /// Current cycle state. Starts the timer on first activity and fires
    /// auto-claim when it is due.
    ///
    /// # Errors
    /// Returns error if the profile does not exist or on storage failure
    pub fn claim_status(&self, user: &UserId) -> Result<ClaimStatus, LedgerError> {
        self.touch(user)?;
        if let Some(receipt) = self.auto_claim_if_due(user)? {
            debug!(user_id = %user, points = receipt.points_awarded, "auto-claim fired on read");
        }

        let now = self.now();
        let interval = self.config().mining_interval_ms;
        let profile = self.profile(user)?;
        let grants = self.active_grants(user)?;
        let multiplier = best_multiplier(&grants);

        Ok(ClaimStatus {
            state: profile.claim_state(now, interval),
            mining_started_at: profile.mining_started_at,
            eligible_at: profile.eligible_at(interval),
            multiplier,
            next_payout: self.config().base_claim_points.saturating_mul(u64::from(multiplier)),
            auto_claim: grants.iter().any(|g| g.auto_claim),
        })
    }

    /// Claim mined points. Rejected while still mining.
    ///
    /// # Errors
    /// Returns `Rejected(StillMining)` before the timer elapses, or error if
    /// the profile does not exist or on storage failure
    pub fn claim(&self, user: &UserId) -> Result<ClaimReceipt, LedgerError> {
        self.claim_inner(user, false)
    }

    fn claim_inner(&self, user: &UserId, automatic: bool) -> Result<ClaimReceipt, LedgerError> {
        let now = self.now();
        let interval = self.config().mining_interval_ms;
        let multiplier = best_multiplier(&self.active_grants(user)?);
        let payout = self
            .config()
            .base_claim_points
            .saturating_mul(u64::from(multiplier));

        let step = self.transact(|tx| {
            let Some(mut profile) = tx.profile(user)? else {
                return abort(LedgerError::profile_not_found(user));
            };

            match profile.mining_started_at {
                None => {
                    profile.mining_started_at = Some(now);
                    tx.put_profile(&profile)?;
                    return Ok(Step::TimerStarted(now + interval));
                }
                Some(start) if now < start + interval => {
                    return reject(Rejection::StillMining {
                        eligible_at: start + interval,
                    });
                }
                Some(_) => {}
            }

            let mut profile = award::apply(tx, user, Award::points(payout), Cause::MiningClaim)?;
            profile.mining_started_at = Some(now);
            profile.last_claim_at = Some(now);
            tx.put_profile(&profile)?;
            Ok(Step::Claimed(profile))
        })?;

        match step {
            Step::TimerStarted(eligible_at) => {
                Err(LedgerError::Rejected(Rejection::StillMining { eligible_at }))
            }
            Step::Claimed(profile) => {
                info!(
                    user_id = %user,
                    points = payout,
                    multiplier,
                    automatic,
                    balance = profile.points,
                    "claim paid"
                );
                Ok(ClaimReceipt {
                    points_awarded: payout,
                    multiplier,
                    new_balance: profile.points,
                    next_eligible_at: now + interval,
                    automatic,
                })
            }
        }
    }

    /// Claim on the user's behalf if they hold an active auto-claim grant
    /// and the timer has elapsed.
    ///
    /// # Errors
    /// Returns error if the profile does not exist or on storage failure
    pub fn auto_claim_if_due(&self, user: &UserId) -> Result<Option<ClaimReceipt>, LedgerError> {
        if !self.active_grants(user)?.iter().any(|g| g.auto_claim) {
            return Ok(None);
        }
        let profile = self.profile(user)?;
        if profile.claim_state(self.now(), self.config().mining_interval_ms) != ClaimState::Ready {
            return Ok(None);
        }

        match self.claim_inner(user, true) {
            Ok(receipt) => Ok(Some(receipt)),
            // a manual claim won the race
            Err(LedgerError::Rejected(Rejection::StillMining { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run the auto-claim policy for every flagged profile. Returns the
    /// number of claims made; per-user failures are logged and skipped.
    ///
    /// # Errors
    /// Returns error if the profile list cannot be read
    pub fn sweep_auto_claims(&self) -> Result<usize, LedgerError> {
        let mut claimed = 0;
        for profile in self.store().profiles()? {
            if !profile.has_auto_claim {
                continue;
            }
            match self.auto_claim_if_due(&profile.id) {
                Ok(Some(_)) => claimed += 1,
                Ok(None) | Err(LedgerError::NotFound { .. }) => {}
                Err(e) => warn!(user_id = %profile.id, error = %e, "auto-claim failed"),
            }
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::types::{Clock, HOUR_MS};

    const FOUR_HOURS: i64 = 4 * HOUR_MS;

    fn grant(user: UserId, multiplier: u32, auto_claim: bool, expires_at: Timestamp) -> ActiveBoosterGrant {
        ActiveBoosterGrant {
            user_id: user,
            booster_id: format!("x{multiplier}"),
            multiplier,
            auto_claim,
            granted_at: T0 - 1,
            expires_at,
            source_key: format!("tx:{multiplier}-{expires_at}"),
        }
    }

    fn put_grant(ledger: &Ledger, g: &ActiveBoosterGrant) {
        ledger.transact(|tx| tx.put_grant(g)).unwrap();
    }

    #[test]
    fn test_first_activity_starts_timer() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;

        let status = ledger.claim_status(&user).unwrap();
        assert_eq!(status.state, ClaimState::Mining);
        assert_eq!(status.mining_started_at, Some(T0));
        assert_eq!(status.eligible_at, Some(T0 + FOUR_HOURS));
    }

    #[test]
    fn test_claim_before_eligible_changes_nothing() {
        let (ledger, clock) = ledger();
        let user = ledger.create_profile().unwrap().id;
        ledger.touch(&user).unwrap();

        clock.advance(FOUR_HOURS - 1);
        let before = ledger.profile(&user).unwrap();
        let result = ledger.claim(&user);

        assert!(matches!(
            result,
            Err(LedgerError::Rejected(Rejection::StillMining { eligible_at })) if eligible_at == T0 + FOUR_HOURS
        ));
        assert_eq!(ledger.profile(&user).unwrap(), before);
    }

    #[test]
    fn test_claim_without_timer_starts_it() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;

        assert!(matches!(
            ledger.claim(&user),
            Err(LedgerError::Rejected(Rejection::StillMining { .. }))
        ));
        let profile = ledger.profile(&user).unwrap();
        assert_eq!(profile.mining_started_at, Some(T0));
        assert_eq!(profile.points, 0);
    }

    #[test]
    fn test_claim_when_ready_pays_and_restarts() {
        let (ledger, clock) = ledger();
        let user = ledger.create_profile().unwrap().id;
        ledger.touch(&user).unwrap();

        clock.advance(FOUR_HOURS + 90_000);
        let claimed_at = clock.now();
        let receipt = ledger.claim(&user).unwrap();

        assert_eq!(receipt.points_awarded, 4_000);
        assert_eq!(receipt.multiplier, 1);
        assert_eq!(receipt.next_eligible_at, claimed_at + FOUR_HOURS);

        let profile = ledger.profile(&user).unwrap();
        assert_eq!(profile.points, 4_000);
        assert_eq!(profile.mining_started_at, Some(claimed_at));
        assert_eq!(profile.last_claim_at, Some(claimed_at));
        assert_eq!(profile.claim_state(clock.now(), FOUR_HOURS), ClaimState::Mining);

        // immediately again: rejected
        assert!(ledger.claim(&user).is_err());
        assert_eq!(ledger.profile(&user).unwrap().points, 4_000);
    }

    #[test]
    fn test_expired_booster_ignored() {
        let (ledger, clock) = ledger();
        let user = ledger.create_profile().unwrap().id;
        ledger.touch(&user).unwrap();
        clock.advance(FOUR_HOURS);

        put_grant(&ledger, &grant(user, 2, false, clock.now() + HOUR_MS));
        put_grant(&ledger, &grant(user, 5, false, clock.now() - 1));

        let receipt = ledger.claim(&user).unwrap();
        assert_eq!(receipt.multiplier, 2);
        assert_eq!(receipt.points_awarded, 8_000);
    }

    #[test]
    fn test_concurrent_claims_pay_once() {
        let (ledger, clock) = ledger();
        let user = ledger.create_profile().unwrap().id;
        ledger.touch(&user).unwrap();
        clock.advance(FOUR_HOURS);

        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..6).map(|_| s.spawn(|| ledger.claim(&user).is_ok())).collect();
            handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
        });

        assert_eq!(successes, 1);
        assert_eq!(ledger.profile(&user).unwrap().points, 4_000);
    }

    #[test]
    fn test_auto_claim_fires_on_ready() {
        let (ledger, clock) = ledger();
        let user = ledger.create_profile().unwrap().id;
        ledger.touch(&user).unwrap();
        put_grant(&ledger, &grant(user, 1, true, T0 + 48 * HOUR_MS));

        assert!(ledger.auto_claim_if_due(&user).unwrap().is_none());

        clock.advance(FOUR_HOURS);
        let status = ledger.claim_status(&user).unwrap();
        assert_eq!(status.state, ClaimState::Mining);
        assert!(status.auto_claim);
        assert_eq!(ledger.profile(&user).unwrap().points, 4_000);
    }

    #[test]
    fn test_sweep_only_claims_flagged_users() {
        let (ledger, clock) = ledger();
        let auto_user = ledger.create_profile().unwrap().id;
        let manual_user = ledger.create_profile().unwrap().id;
        ledger.touch(&auto_user).unwrap();
        ledger.touch(&manual_user).unwrap();

        put_grant(&ledger, &grant(auto_user, 3, true, T0 + 48 * HOUR_MS));
        ledger
            .transact(|tx| {
                let mut p = tx.profile(&auto_user)?.unwrap();
                p.has_auto_claim = true;
                tx.put_profile(&p)
            })
            .unwrap();

        clock.advance(FOUR_HOURS);
        assert_eq!(ledger.sweep_auto_claims().unwrap(), 1);
        assert_eq!(ledger.profile(&auto_user).unwrap().points, 12_000);
        assert_eq!(ledger.profile(&manual_user).unwrap().points, 0);

        // expired grant: flag stays but nothing is claimed
        clock.set(T0 + 60 * HOUR_MS);
        assert_eq!(ledger.sweep_auto_claims().unwrap(), 0);
    }
}
