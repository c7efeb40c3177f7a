//! Task catalogue entries and completion records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Timestamp, UserId};

/// A task users can complete for points
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    /// Task id (slug)
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Points awarded per completion
    pub reward: u64,
    /// Completable once per calendar day instead of once ever
    #[serde(default)]
    pub is_daily_repeatable: bool,
    /// Inactive tasks cannot be completed
    #[serde(default = "default_active")]
    pub active: bool,
    /// External action link shown by the UI
    #[serde(default)]
    pub action_url: Option<String>,
}

const fn default_active() -> bool {
    true
}

/// Task identifiers (ours and partners') are embedded in composite store
/// keys and must not contain the separator.
#[must_use]
pub fn is_valid_task_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl TaskDefinition {
    /// See [`is_valid_task_id`]
    #[must_use]
    pub fn has_valid_id(&self) -> bool {
        is_valid_task_id(&self.id)
    }
}

/// Proof that a user completed a task (on a given day for daily tasks)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletionRecord {
    /// Who completed it
    pub user_id: UserId,
    /// Which task
    pub task_id: String,
    /// Calendar day of completion
    pub completed_on: NaiveDate,
    /// Exact completion time
    pub completed_at: Timestamp,
    /// Points paid for this completion
    pub points_awarded: u64,
    /// Copied from the task at completion time
    pub is_daily: bool,
}
