use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use shared::{RecurrenceType, Task, TaskStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbConnection;
use crate::storage::{parse_date, parse_timestamp};

/// Fields for a new task record. Status always starts at `todo` and
/// `last_reset` at null.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub child_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub recurrence_type: RecurrenceType,
    pub recurrence_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
}

/// Editable fields for a full task update. Status is excluded; it only
/// changes via `update_status` or `reset_task`.
#[derive(Debug, Clone)]
pub struct TaskPatch {
    pub title: String,
    pub description: Option<String>,
    pub recurrence_type: RecurrenceType,
    pub recurrence_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
}

/// Repository for task records
#[derive(Clone)]
pub struct TaskRepository {
    db: DbConnection,
}

impl TaskRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Insert a new task and return the stored record
    pub async fn store_task(&self, new_task: &NewTask, now: DateTime<Utc>) -> Result<Task> {
        let id = sqlx::query(
            r#"
            INSERT INTO tasks (child_id, title, description, status, recurrence_type,
                               recurrence_date, scheduled_time, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_task.child_id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .bind(TaskStatus::Todo.as_str())
        .bind(new_task.recurrence_type.as_str())
        .bind(new_task.recurrence_date.map(|d| d.to_string()))
        .bind(&new_task.scheduled_time)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.db.pool())
        .await?
        .last_insert_rowid();

        self.get_task(id)
            .await?
            .ok_or_else(|| anyhow!("task {} missing after insert", id))
    }

    /// Retrieve a task by ID
    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// List all tasks, newest first
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC, id DESC")
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// List all tasks for one child, newest first
    pub async fn list_tasks_for_child(&self, child_id: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE child_id = ? ORDER BY created_at DESC, id DESC")
            .bind(child_id)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// List completed tasks with a recurrence policy. This is the reset sweep's
    /// candidate set.
    pub async fn list_done_recurring(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = ? AND recurrence_type != ?")
            .bind(TaskStatus::Done.as_str())
            .bind(RecurrenceType::None.as_str())
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Update a task's editable fields. Returns the updated record, or
    /// `None` if no task with that ID exists.
    pub async fn update_task(&self, id: i64, patch: &TaskPatch, now: DateTime<Utc>) -> Result<Option<Task>> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, recurrence_type = ?, recurrence_date = ?,
                scheduled_time = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.recurrence_type.as_str())
        .bind(patch.recurrence_date.map(|d| d.to_string()))
        .bind(&patch.scheduled_time)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    /// Move a task to a new workflow state
    pub async fn update_status(&self, id: i64, status: TaskStatus, now: DateTime<Utc>) -> Result<Option<Task>> {
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    /// Reopen a completed recurring task: status back to todo, last reset
    /// stamped with the sweep's `now`.
    pub async fn reset_task(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Task>> {
        let result = sqlx::query("UPDATE tasks SET status = ?, last_reset = ?, updated_at = ? WHERE id = ?")
            .bind(TaskStatus::Todo.as_str())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    /// Delete a task. Returns false if no task with that ID exists.
    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let status: String = row.try_get("status")?;
    let status = TaskStatus::parse(&status).ok_or_else(|| anyhow!("unknown task status: {}", status))?;

    let recurrence_type: String = row.try_get("recurrence_type")?;
    let recurrence_type = RecurrenceType::parse(&recurrence_type)
        .ok_or_else(|| anyhow!("unknown recurrence type: {}", recurrence_type))?;

    let recurrence_date: Option<String> = row.try_get("recurrence_date")?;
    let last_reset: Option<String> = row.try_get("last_reset")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Task {
        id: row.try_get("id")?,
        child_id: row.try_get("child_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status,
        recurrence_type,
        recurrence_date: recurrence_date
            .as_deref()
            .map(|d| parse_date(d, "recurrence_date"))
            .transpose()?,
        scheduled_time: row.try_get("scheduled_time")?,
        last_reset: last_reset
            .as_deref()
            .map(|t| parse_timestamp(t, "last_reset"))
            .transpose()?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ChildRepository;

    async fn setup_test() -> (ChildRepository, TaskRepository) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        (ChildRepository::new(db.clone()), TaskRepository::new(db))
    }

    fn new_task(child_id: i64, title: &str, recurrence_type: RecurrenceType) -> NewTask {
        NewTask {
            child_id,
            title: title.to_string(),
            description: None,
            recurrence_type,
            recurrence_date: None,
            scheduled_time: None,
        }
    }

    #[tokio::test]
    async fn test_store_task_defaults() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        let task = tasks
            .store_task(&new_task(child.id, "Make bed", RecurrenceType::Daily), Utc::now())
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.recurrence_type, RecurrenceType::Daily);
        assert!(task.last_reset.is_none());
        assert!(task.recurrence_date.is_none());
    }

    #[tokio::test]
    async fn test_update_status() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        let task = tasks
            .store_task(&new_task(child.id, "Make bed", RecurrenceType::None), Utc::now())
            .await
            .unwrap();

        let later = task.created_at + chrono::Duration::minutes(5);
        let updated = tasks
            .update_status(task.id, TaskStatus::Done, later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.updated_at, later);

        assert!(tasks.update_status(999, TaskStatus::Done, later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_task_stamps_last_reset() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        let task = tasks
            .store_task(&new_task(child.id, "Make bed", RecurrenceType::Daily), Utc::now())
            .await
            .unwrap();
        tasks.update_status(task.id, TaskStatus::Done, Utc::now()).await.unwrap();

        let now = Utc::now();
        let reset = tasks.reset_task(task.id, now).await.unwrap().unwrap();
        assert_eq!(reset.status, TaskStatus::Todo);
        assert_eq!(reset.last_reset.unwrap().to_rfc3339(), now.to_rfc3339());

        assert!(tasks.reset_task(999, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_done_recurring_excludes_none_and_open() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        let daily_done = tasks
            .store_task(&new_task(child.id, "Make bed", RecurrenceType::Daily), Utc::now())
            .await
            .unwrap();
        let none_done = tasks
            .store_task(&new_task(child.id, "One-off", RecurrenceType::None), Utc::now())
            .await
            .unwrap();
        let weekly_open = tasks
            .store_task(&new_task(child.id, "Vacuum", RecurrenceType::Weekly), Utc::now())
            .await
            .unwrap();

        tasks.update_status(daily_done.id, TaskStatus::Done, Utc::now()).await.unwrap();
        tasks.update_status(none_done.id, TaskStatus::Done, Utc::now()).await.unwrap();
        let _ = weekly_open;

        let candidates = tasks.list_done_recurring().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, daily_done.id);
    }

    #[tokio::test]
    async fn test_cascade_delete_with_child() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        let task = tasks
            .store_task(&new_task(child.id, "Make bed", RecurrenceType::None), Utc::now())
            .await
            .unwrap();

        children.delete_child(child.id).await.unwrap();
        assert!(tasks.get_task(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_status_rejected_on_read() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        let task = tasks
            .store_task(&new_task(child.id, "Make bed", RecurrenceType::None), Utc::now())
            .await
            .unwrap();

        // Bypass the repository to plant a value the application never writes
        sqlx::query("UPDATE tasks SET status = 'finished' WHERE id = ?")
            .bind(task.id)
            .execute(tasks.db.pool())
            .await
            .unwrap();

        assert!(tasks.get_task(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_recurrence_date_round_trip() {
        let (children, tasks) = setup_test().await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        let mut draft = new_task(child.id, "Dentist prep", RecurrenceType::OnDate);
        draft.recurrence_date = Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let task = tasks.store_task(&draft, Utc::now()).await.unwrap();
        assert_eq!(task.recurrence_date, draft.recurrence_date);
    }
}
