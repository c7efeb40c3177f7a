//! Referral processing.
//!
//! The edge keyed by the referred user is the dedup mechanism: once it
//! exists, no other code can ever be redeemed for that user.

use serde::Serialize;
use tracing::info;

use super::award::{self, Award, Cause};
use super::{reject, Ledger, LedgerError, Rejection};
use crate::crypto::is_well_formed_code;
use crate::types::{ReferralEdge, UserId};

/// Successful referral
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReceipt {
    /// Owner of the redeemed code
    pub referrer_id: UserId,
    /// Points paid to each side
    pub bonus_points: u64,
    /// Referred user's new balance
    pub new_balance: u64,
}

impl Ledger {
    /// Redeem `code` for `new_user`, paying both sides.
    ///
    /// # Errors
    /// Returns `Validation` for a malformed code, `Rejected` if the user was
    /// already referred, the code is unknown, or it is the user's own, and
    /// error if `new_user` has no profile or on storage failure
    pub fn process_referral(&self, new_user: &UserId, code: &str) -> Result<ReferralReceipt, LedgerError> {
        let code = code.trim().to_ascii_uppercase();
        if !is_well_formed_code(&code) {
            return Err(LedgerError::Validation(format!(
                "malformed referral code: {code:?}"
            )));
        }

        let bonus = self.config().referral_bonus_points;
        let now = self.now();

        let (edge, referred) = self.transact(|tx| {
            if tx.referral_of(new_user)?.is_some() {
                return reject(Rejection::AlreadyReferred);
            }
            let Some(referrer_id) = tx.referral_code_owner(&code)? else {
                return reject(Rejection::UnknownReferralCode);
            };
            if referrer_id == *new_user {
                return reject(Rejection::SelfReferral);
            }
            if tx.profile(&referrer_id)?.is_none() {
                return reject(Rejection::UnknownReferralCode);
            }

            let edge = ReferralEdge {
                referrer_id,
                referred_id: *new_user,
                bonus_points: bonus,
                created_at: now,
            };
            let referred = award::apply(tx, new_user, Award::points(bonus), Cause::Referral(&edge))?;
            award::apply(tx, &referrer_id, Award::points(bonus), Cause::ReferrerReward(&edge))?;
            Ok((edge, referred))
        })?;

        info!(
            referrer_id = %edge.referrer_id,
            referred_id = %edge.referred_id,
            points = bonus,
            "referral processed"
        );

        Ok(ReferralReceipt {
            referrer_id: edge.referrer_id,
            bonus_points: bonus,
            new_balance: referred.points,
        })
    }
}
