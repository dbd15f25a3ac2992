//! Periodic trigger for the reset sweep.
//!
//! Fires hourly on the hour. An in-flight flag guards against overlapping
//! sweeps; a tick that arrives while a sweep is still running is skipped
//! rather than queued; sweeps are idempotent and the next tick catches up.

use chrono::{DateTime, Timelike, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::{ResetService, SweepOutcome};
use crate::publish::PublishHandle;

#[derive(Clone)]
pub struct Scheduler {
    reset: ResetService,
    publish: PublishHandle,
    in_flight: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(reset: ResetService, publish: PublishHandle) -> Self {
        Self {
            reset,
            publish,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the hourly loop.
    pub fn spawn(self) {
        tokio::spawn(async move {
            info!("Scheduler started - checking for tasks to reset every hour");
            loop {
                tokio::time::sleep(until_next_hour(Utc::now())).await;
                self.tick(Utc::now()).await;
            }
        });
    }

    /// Run one firing: sweep, then queue one state publish per affected
    /// child. Returns `None` when skipped because a sweep is in flight.
    /// Failure is logged, never escalated. Undone resets stay due and the
    /// next tick retries them.
    pub async fn tick(&self, now: DateTime<Utc>) -> Option<SweepOutcome> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("Skipping sweep tick - previous sweep still running");
            return None;
        }

        info!("Running scheduled task reset check");
        let outcome = match self.reset.run_sweep(now).await {
            Ok(outcome) => {
                for child_id in &outcome.affected_children {
                    self.publish.child_state(*child_id);
                }
                Some(outcome)
            }
            Err(e) => {
                error!("Error during scheduled task reset: {:#}", e);
                None
            }
        };

        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }
}

/// Time until the next top of the hour.
fn until_next_hour(now: DateTime<Utc>) -> Duration {
    let elapsed = u64::from(now.minute()) * 60 + u64::from(now.second());
    Duration::from_secs((3600 - elapsed).max(1))
}
