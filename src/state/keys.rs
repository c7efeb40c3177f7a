//! Composite key layouts. Per-user rows start with `<uuid>:` so a prefix
//! scan enumerates them; numeric parts are zero-padded to sort in time order.

use chrono::NaiveDate;

use crate::types::{ActiveBoosterGrant, Timestamp, UserId};

/// Prefix shared by all of a user's rows
#[must_use]
pub fn user_prefix(user: &UserId) -> String {
    format!("{user}:")
}

/// Completion key: `(user, task)` for one-time tasks,
/// `(user, task, day)` for daily-repeatable ones
#[must_use]
pub fn completion_key(user: &UserId, task_id: &str, daily_on: Option<NaiveDate>) -> String {
    match daily_on {
        Some(day) => format!("{user}:{task_id}:{}", day.format("%Y-%m-%d")),
        None => format!("{user}:{task_id}"),
    }
}

/// Grant key, ordered by grant time
#[must_use]
pub fn grant_key(grant: &ActiveBoosterGrant) -> String {
    format!(
        "{}:{:020}:{}",
        grant.user_id, grant.granted_at, grant.source_key
    )
}

/// One conversion per user per scheduled batch
#[must_use]
pub fn conversion_key(user: &UserId, batch_instant: Timestamp) -> String {
    format!("{user}:{batch_instant:020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_keys_differ_by_day() {
        let user = UserId::new_v4();
        let d1 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let d2 = d1.succ_opt().unwrap();

        let once = completion_key(&user, "follow", None);
        assert_eq!(once, format!("{user}:follow"));
        assert_ne!(
            completion_key(&user, "checkin", Some(d1)),
            completion_key(&user, "checkin", Some(d2))
        );
        assert!(once.starts_with(&user_prefix(&user)));
    }
}
