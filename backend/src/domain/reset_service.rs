//! The reset sweep: one pass over all completed recurring tasks, reopening
//! the ones whose recurrence window has elapsed.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::recurrence::should_reset;
use crate::storage::{ResetStore, TaskRepository};

/// Result of one sweep. `affected_children` holds the distinct owners of
/// tasks that were actually reset. The publication fan-out is one state
/// publish per entry, not per task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub reset_count: usize,
    pub failed_count: usize,
    pub affected_children: BTreeSet<i64>,
}

/// Service running the periodic reset sweep
#[derive(Clone)]
pub struct ResetService {
    tasks: Arc<dyn ResetStore>,
}

impl ResetService {
    pub fn new(tasks: TaskRepository) -> Self {
        Self { tasks: Arc::new(tasks) }
    }

    #[cfg(test)]
    fn with_store(tasks: Arc<dyn ResetStore>) -> Self {
        Self { tasks }
    }

    /// Run one sweep at `now`.
    ///
    /// Each reset attempt is independent: a store failure on one task is
    /// logged and counted but never aborts the remainder. Failed resets stay
    /// due, so the next sweep retries them naturally. Running the sweep
    /// twice with the same `now` resets nothing the second time, since
    /// `last_reset` was just stamped and the tasks are back in todo.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> anyhow::Result<SweepOutcome> {
        let candidates = self.tasks.list_done_recurring().await?;
        let mut outcome = SweepOutcome::default();

        for task in candidates {
            if !should_reset(&task, now) {
                continue;
            }

            match self.tasks.reset_task(task.id, now).await {
                Ok(Some(_)) => {
                    info!("Reset task {}: {}", task.id, task.title);
                    outcome.reset_count += 1;
                    outcome.affected_children.insert(task.child_id);
                }
                Ok(None) => {
                    // Deleted between the candidate read and the reset write
                    warn!("Task {} vanished before reset", task.id);
                }
                Err(e) => {
                    error!("Failed to reset task {}: {:#}", task.id, e);
                    outcome.failed_count += 1;
                }
            }
        }

        if outcome.reset_count > 0 || outcome.failed_count > 0 {
            info!(
                "Sweep reset {} task(s) across {} child(ren), {} failure(s)",
                outcome.reset_count,
                outcome.affected_children.len(),
                outcome.failed_count
            );
        }

        Ok(outcome)
    }
}
