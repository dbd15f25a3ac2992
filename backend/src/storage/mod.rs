//! Storage layer: repositories over the shared SQLite pool.
//!
//! Row decoding is strict: enum columns holding a string the application
//! does not recognize are surfaced as errors instead of being mapped to a
//! default.

pub mod child_repository;
pub mod task_repository;

pub use child_repository::ChildRepository;
pub use task_repository::{NewTask, TaskPatch, TaskRepository};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::Task;

/// The slice of the task store the reset sweep depends on.
#[async_trait]
pub trait ResetStore: Send + Sync {
    /// Completed tasks that carry a recurrence policy.
    async fn list_done_recurring(&self) -> Result<Vec<Task>>;

    /// Reopen one task, stamping its last reset. `None` when the task no
    /// longer exists.
    async fn reset_task(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Task>>;
}

#[async_trait]
impl ResetStore for TaskRepository {
    async fn list_done_recurring(&self) -> Result<Vec<Task>> {
        TaskRepository::list_done_recurring(self).await
    }

    async fn reset_task(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Task>> {
        TaskRepository::reset_task(self, id, now).await
    }
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid {} timestamp: {}", column, value))
}

/// Parse a YYYY-MM-DD date column.
pub(crate) fn parse_date(value: &str, column: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid {} date: {}", column, value))
}
