//! Per-child task aggregates mirrored to the home-automation integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Task, TaskStatus};

/// Summary of one child's task set at a single point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAggregate {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub todo: usize,
    /// True only when every task is done and at least one task exists.
    pub all_done: bool,
    /// Rounded percentage of done tasks; 0 for an empty task set.
    pub completion_percentage: u32,
}

impl TaskAggregate {
    /// Compute the aggregate from one consistent read of a child's tasks.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
        let in_progress = tasks.iter().filter(|t| t.status == TaskStatus::InProgress).count();
        let todo = tasks.iter().filter(|t| t.status == TaskStatus::Todo).count();

        let completion_percentage = if total > 0 {
            ((done as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };

        Self {
            total,
            done,
            in_progress,
            todo,
            all_done: done == total && total > 0,
            completion_percentage,
        }
    }
}

/// One line of the per-task detail listing published alongside the counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub title: String,
    pub status: TaskStatus,
    pub recurrence: shared::RecurrenceType,
}

/// Attribute payload published to the child's attributes topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildStateAttributes {
    pub total_tasks: usize,
    pub done_tasks: usize,
    pub in_progress_tasks: usize,
    pub todo_tasks: usize,
    pub completion_percentage: u32,
    pub task_list: Vec<TaskDetail>,
    pub last_updated: DateTime<Utc>,
}

impl ChildStateAttributes {
    pub fn new(aggregate: &TaskAggregate, tasks: &[Task], now: DateTime<Utc>) -> Self {
        Self {
            total_tasks: aggregate.total,
            done_tasks: aggregate.done,
            in_progress_tasks: aggregate.in_progress,
            todo_tasks: aggregate.todo,
            completion_percentage: aggregate.completion_percentage,
            task_list: tasks
                .iter()
                .map(|t| TaskDetail {
                    title: t.title.clone(),
                    status: t.status,
                    recurrence: t.recurrence_type,
                })
                .collect(),
            last_updated: now,
        }
    }
}
