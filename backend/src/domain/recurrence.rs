//! Recurrence evaluation: decides whether a completed task's occurrence is
//! due to reopen.

use chrono::{DateTime, Duration, Months, Utc};
use shared::{RecurrenceType, Task};

/// Decide whether a task should be reset to todo at `now`.
///
/// The sweep only calls this for tasks that are done and carry a recurrence
/// policy, but the `None` arm keeps the function total: a non-recurring task
/// never resets.
///
/// Daily compares calendar dates rather than a rolling 24h window, so a task
/// finished at 23:00 reopens at the next midnight. Weekly and monthly use
/// rolling windows from the last reset instant, which tolerates irregular
/// sweep cadence. A task that has never been reset (`last_reset` null) is
/// always due, otherwise a newly recurring task would stay done forever.
pub fn should_reset(task: &Task, now: DateTime<Utc>) -> bool {
    match task.recurrence_type {
        RecurrenceType::None => false,
        RecurrenceType::Daily => match task.last_reset {
            None => true,
            Some(last) => last.date_naive() < now.date_naive(),
        },
        RecurrenceType::Weekly => match task.last_reset {
            None => true,
            Some(last) => last < now - Duration::days(7),
        },
        RecurrenceType::Monthly => match task.last_reset {
            None => true,
            Some(last) => match now.checked_sub_months(Months::new(1)) {
                Some(cutoff) => last < cutoff,
                None => false,
            },
        },
        RecurrenceType::OnDate => match task.recurrence_date {
            Some(date) => date <= now.date_naive(),
            None => false,
        },
    }
}
