//! Task completion policy.
//!
//! The completion record is the only source of truth for "already done":
//! keyed by `(user, task)` for one-time tasks and `(user, task, day)` for
//! daily ones. Record and points commit together.

use serde::Serialize;
use tracing::info;

use super::award::{self, Award, BonusFlag, Cause};
use super::{abort, reject, Ledger, LedgerError, Rejection};
use crate::state::{completion_key, Tx, TxResult};
use crate::types::{calendar_day, TaskCompletionRecord, TaskDefinition, UserId};

/// Result of a successful completion
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    /// Points for the task itself
    pub points_awarded: u64,
    /// Task resets daily
    pub is_daily: bool,
    /// Every active one-time task is now done
    pub all_tasks_completed: bool,
    /// This completion paid the all-tasks bonus
    pub bonus_awarded: bool,
}

/// A task plus the caller's progress on it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBoardEntry {
    /// The task
    #[serde(flatten)]
    pub task: TaskDefinition,
    /// Completed (ever for one-time, today for daily)
    pub completed: bool,
}

impl Ledger {
    /// Complete a task for `user`.
    ///
    /// # Errors
    /// Returns `Rejected` if the task is unavailable or already completed
    /// (today, for daily tasks), or error if the profile does not exist or
    /// on storage failure
    pub fn complete_task(&self, user: &UserId, task_id: &str) -> Result<TaskOutcome, LedgerError> {
        let task = match self.store().task(task_id)? {
            Some(task) if task.active => task,
            _ => return Err(LedgerError::Rejected(Rejection::TaskUnavailable)),
        };

        let now = self.now();
        let today = calendar_day(now, self.config().daily_reset_offset);
        let is_daily = task.is_daily_repeatable;
        let key = completion_key(user, &task.id, is_daily.then_some(today));
        let record = TaskCompletionRecord {
            user_id: *user,
            task_id: task.id.clone(),
            completed_on: today,
            completed_at: now,
            points_awarded: task.reward,
            is_daily,
        };

        let one_time = if is_daily {
            Vec::new()
        } else {
            self.active_one_time_task_ids()?
        };
        let bonus = self.config().all_tasks_bonus_points;

        let (all_tasks_completed, bonus_awarded) = self.transact(|tx| {
            if tx.has_completion(&key)? {
                return reject(if is_daily {
                    Rejection::DailyTaskAlreadyCompleted
                } else {
                    Rejection::TaskAlreadyCompleted
                });
            }
            award::apply(
                tx,
                user,
                Award::points(task.reward),
                Cause::TaskCompletion {
                    key: &key,
                    record: &record,
                },
            )?;
            pay_all_tasks_bonus(tx, user, &one_time, bonus)
        })?;

        info!(user_id = %user, task_id = %task.id, points = task.reward, is_daily, "task completed");
        if bonus_awarded {
            info!(user_id = %user, points = bonus, "all-tasks bonus awarded");
        }

        Ok(TaskOutcome {
            points_awarded: task.reward,
            is_daily,
            all_tasks_completed,
            bonus_awarded,
        })
    }

    fn active_one_time_task_ids(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self
            .store()
            .tasks()?
            .into_iter()
            .filter(|t| t.active && !t.is_daily_repeatable)
            .map(|t| t.id)
            .collect())
    }

    /// Pay the all-tasks bonus if `user` has completed every active one-time
    /// task without receiving it, e.g. after a task was retired.
    ///
    /// # Errors
    /// Returns error if the profile does not exist or on storage failure
    pub fn settle_all_tasks_bonus(&self, user: &UserId) -> Result<bool, LedgerError> {
        if self.profile(user)?.task_completion_bonus_awarded {
            return Ok(false);
        }
        let one_time = self.active_one_time_task_ids()?;
        let bonus = self.config().all_tasks_bonus_points;

        let (_, paid) = self.transact(|tx| pay_all_tasks_bonus(tx, user, &one_time, bonus))?;
        if paid {
            info!(user_id = %user, points = bonus, "all-tasks bonus settled");
        }
        Ok(paid)
    }

    /// Active tasks with the caller's completion state
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn task_board(&self, user: &UserId) -> Result<Vec<TaskBoardEntry>, LedgerError> {
        self.settle_all_tasks_bonus(user)?;
        let today = calendar_day(self.now(), self.config().daily_reset_offset);
        let completions = self.store().completions(user)?;

        Ok(self
            .store()
            .tasks()?
            .into_iter()
            .filter(|t| t.active)
            .map(|task| {
                let completed = completions.iter().any(|c| {
                    c.task_id == task.id && (!task.is_daily_repeatable || c.completed_on == today)
                });
                TaskBoardEntry { task, completed }
            })
            .collect())
    }
}

/// Inside the caller's transaction: `(all done, bonus paid now)`.
///
/// Completion keys and the profile flag are read through `tx`, so racing
/// final completions conflict and exactly one of them pays.
fn pay_all_tasks_bonus(
    tx: &Tx<'_, LedgerError>,
    user: &UserId,
    one_time: &[String],
    bonus: u64,
) -> TxResult<(bool, bool), LedgerError> {
    if one_time.is_empty() {
        return Ok((false, false));
    }
    for task_id in one_time {
        if !tx.has_completion(&completion_key(user, task_id, None))? {
            return Ok((false, false));
        }
    }
    let Some(profile) = tx.profile(user)? else {
        return abort(LedgerError::profile_not_found(user));
    };
    if profile.task_completion_bonus_awarded {
        return Ok((true, false));
    }
    award::apply(tx, user, Award::points(bonus), Cause::Bonus(BonusFlag::AllTasks))?;
    Ok((true, true))
}
