//! Core data types for the rewards ledger.

mod amount;
mod booster;
mod profile;
mod records;
mod task;

pub use amount::{AmountError, Lamports, TokenAmount, DECIMALS, LAMPORTS_PER_SOL, ONE_TOKEN};
pub use booster::{ActiveBoosterGrant, BoosterDefinition};
pub use profile::{BalanceError, ClaimState, Profile};
pub use records::{ConversionRecord, ConversionStatus, EventKind, ExternalEventRecord, ReferralEdge};
pub use task::{is_valid_task_id, TaskCompletionRecord, TaskDefinition};

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Profile identifier
pub type UserId = uuid::Uuid;

/// Unix timestamp in milliseconds
pub type Timestamp = i64;

/// One hour in milliseconds
pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// Get current timestamp in milliseconds
#[must_use]
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Convert timestamp to `DateTime`
#[must_use]
pub fn timestamp_to_datetime(ts: Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts)
}

/// The calendar day containing `ts`, as seen from a fixed UTC offset.
#[must_use]
pub fn calendar_day(ts: Timestamp, offset: FixedOffset) -> NaiveDate {
    timestamp_to_datetime(ts)
        .unwrap_or_default()
        .with_timezone(&offset)
        .date_naive()
}

/// Source of wall-clock time for every ledger decision.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds
    fn now(&self) -> Timestamp;
}

/// Reads the system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now_millis()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    /// Create a clock frozen at `ts`
    #[must_use]
    pub const fn new(ts: Timestamp) -> Self {
        Self(AtomicI64::new(ts))
    }

    /// Jump to `ts`
    pub fn set(&self, ts: Timestamp) {
        self.0.store(ts, Ordering::SeqCst);
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}
