use chrono::{NaiveDate, Utc};
use shared::{CreateTaskRequest, RecurrenceType, Task, TaskStatus, UpdateTaskRequest};
use tracing::{info, warn};

use crate::domain::error::{ServiceError, ServiceResult};
use crate::publish::PublishHandle;
use crate::storage::{ChildRepository, NewTask, TaskPatch, TaskRepository};

const MAX_TITLE_LEN: usize = 200;

/// Service for managing tasks and their workflow state
#[derive(Clone)]
pub struct TaskService {
    tasks: TaskRepository,
    children: ChildRepository,
    publish: PublishHandle,
}

impl TaskService {
    pub fn new(tasks: TaskRepository, children: ChildRepository, publish: PublishHandle) -> Self {
        Self { tasks, children, publish }
    }

    /// Create a new task for a child. Status starts at todo.
    pub async fn create_task(&self, request: CreateTaskRequest) -> ServiceResult<Task> {
        info!("Creating task: child_id={}, title={}", request.child_id, request.title);

        let title = validate_title(&request.title)?;
        let recurrence_type = request.recurrence_type.unwrap_or(RecurrenceType::None);
        let recurrence_date = validate_recurrence(recurrence_type, request.recurrence_date)?;

        if self.children.get_child(request.child_id).await?.is_none() {
            return Err(ServiceError::not_found("child", request.child_id));
        }

        let task = self
            .tasks
            .store_task(
                &NewTask {
                    child_id: request.child_id,
                    title,
                    description: clean_description(request.description),
                    recurrence_type,
                    recurrence_date,
                    scheduled_time: request.scheduled_time,
                },
                Utc::now(),
            )
            .await?;

        info!("Created task: {} with ID: {}", task.title, task.id);
        self.publish.child_state(task.child_id);

        Ok(task)
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: i64) -> ServiceResult<Task> {
        self.tasks
            .get_task(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("task", id))
    }

    /// List all tasks
    pub async fn list_tasks(&self) -> ServiceResult<Vec<Task>> {
        Ok(self.tasks.list_tasks().await?)
    }

    /// List all tasks for one child
    pub async fn list_tasks_for_child(&self, child_id: i64) -> ServiceResult<Vec<Task>> {
        Ok(self.tasks.list_tasks_for_child(child_id).await?)
    }

    /// Update a task's editable fields (not its status)
    pub async fn update_task(&self, id: i64, request: UpdateTaskRequest) -> ServiceResult<Task> {
        info!("Updating task: {}", id);

        let title = validate_title(&request.title)?;
        let recurrence_type = request.recurrence_type.unwrap_or(RecurrenceType::None);
        let recurrence_date = validate_recurrence(recurrence_type, request.recurrence_date)?;

        let task = self
            .tasks
            .update_task(
                id,
                &TaskPatch {
                    title,
                    description: clean_description(request.description),
                    recurrence_type,
                    recurrence_date,
                    scheduled_time: request.scheduled_time,
                },
                Utc::now(),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("task", id))?;

        info!("Updated task: {} with ID: {}", task.title, task.id);
        self.publish.child_state(task.child_id);

        Ok(task)
    }

    /// Move a task to a new workflow state and publish the child's updated
    /// aggregate
    pub async fn update_status(&self, id: i64, status: TaskStatus) -> ServiceResult<Task> {
        info!("Updating task status: id={}, status={}", id, status);

        let task = self
            .tasks
            .update_status(id, status, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::not_found("task", id))?;

        self.publish.child_state(task.child_id);

        Ok(task)
    }

    /// Delete a task
    pub async fn delete_task(&self, id: i64) -> ServiceResult<()> {
        info!("Deleting task: {}", id);

        let task = self.get_task(id).await?;
        if !self.tasks.delete_task(id).await? {
            warn!("Task disappeared during delete: {}", id);
            return Err(ServiceError::not_found("task", id));
        }

        self.publish.child_state(task.child_id);

        Ok(())
    }
}

fn validate_title(title: &str) -> ServiceResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation("Task title cannot be empty"));
    }
    if trimmed.len() > MAX_TITLE_LEN {
        return Err(ServiceError::validation(format!(
            "Task title cannot exceed {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Enforce the cross-field rule the store does not: a target date is
/// required for on-date recurrence and dropped for every other policy.
fn validate_recurrence(
    recurrence_type: RecurrenceType,
    recurrence_date: Option<NaiveDate>,
) -> ServiceResult<Option<NaiveDate>> {
    match recurrence_type {
        RecurrenceType::OnDate => match recurrence_date {
            Some(date) => Ok(Some(date)),
            None => Err(ServiceError::validation(
                "A recurrence date is required for on-date recurrence",
            )),
        },
        _ => Ok(None),
    }
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}
