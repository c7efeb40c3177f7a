//! Idempotency guard for externally triggered events.
//!
//! The dedup key is checked and recorded inside the same store transaction
//! as the balance change it protects, so of two racing deliveries exactly
//! one commits and the other re-runs, sees the key, and becomes a no-op.

use std::fmt;

use chrono::NaiveDate;

use super::{Ledger, LedgerError};
use crate::state::{Tx, TxResult};
use crate::types::UserId;

const MAX_KEY_LEN: usize = 128;

/// A natural dedup key for one external event
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// On-chain transaction signature or provider payment id.
    ///
    /// # Errors
    /// Returns error if the id is empty, too long, or has unexpected characters
    pub fn payment(id: &str) -> Result<Self, LedgerError> {
        let id = id.trim();
        let well_formed = !id.is_empty()
            && id.len() <= MAX_KEY_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(LedgerError::Validation(format!(
                "malformed transaction id: {id:?}"
            )));
        }
        Ok(Self(format!("tx:{id}")))
    }

    /// First present of transaction hash, wallet transaction hash, payment id
    ///
    /// # Errors
    /// Returns error if none is present or the chosen one is malformed
    pub fn first_of(candidates: &[Option<&str>]) -> Result<Self, LedgerError> {
        candidates
            .iter()
            .flatten()
            .find(|c| !c.trim().is_empty())
            .map_or_else(
                || {
                    Err(LedgerError::Validation(
                        "transactionHash or paymentId is required".into(),
                    ))
                },
                |id| Self::payment(id),
            )
    }

    /// Partner task claim, once per user, task and calendar day
    #[must_use]
    pub fn external_task(user: &UserId, task_identifier: &str, day: NaiveDate) -> Self {
        Self(format!(
            "ext:{user}:{task_identifier}:{}",
            day.format("%Y-%m-%d")
        ))
    }

    /// Key as stored
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inside a transaction: has the key already been recorded?
///
/// Reading the key registers it with the transaction, so a concurrent
/// commit of the same key forces this transaction to re-run.
pub(crate) fn is_recorded(tx: &Tx<'_, LedgerError>, key: &DedupKey) -> TxResult<bool, LedgerError> {
    tx.has_event(key.as_str())
}

impl Ledger {
    /// Committed-state check, used as a fast path before validation work.
    /// Correctness never depends on it; the transactional check does.
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn has_been_processed(&self, key: &DedupKey) -> Result<bool, LedgerError> {
        Ok(self.store().event(key.as_str())?.is_some())
    }
}
