use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow state of a task on the board.
///
/// The storage layer persists the snake_case string form; unknown strings are
/// rejected on read rather than mapped to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    /// String form used in storage and on MQTT payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Parse the storage string form. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurrence policy deciding whether a completed task reopens, and on what
/// cadence. `OnDate` carries its target date in the separate
/// `recurrence_date` field of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    None,
    Daily,
    Weekly,
    Monthly,
    OnDate,
}

impl RecurrenceType {
    /// String form used in storage and on MQTT payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::None => "none",
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Monthly => "monthly",
            RecurrenceType::OnDate => "on_date",
        }
    }

    /// Parse the storage string form. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(RecurrenceType::None),
            "daily" => Some(RecurrenceType::Daily),
            "weekly" => Some(RecurrenceType::Weekly),
            "monthly" => Some(RecurrenceType::Monthly),
            "on_date" => Some(RecurrenceType::OnDate),
            _ => None,
        }
    }
}

impl fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child on the task board. Deleting a child cascades to its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: i64,
    pub name: String,
    /// Display color for the board, e.g. "#4CAF50".
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// A task belonging to a child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    /// ID of the child this task belongs to (immutable after creation).
    pub child_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub recurrence_type: RecurrenceType,
    /// Target date; populated only when `recurrence_type` is `OnDate`.
    pub recurrence_date: Option<NaiveDate>,
    /// Optional "HH:MM" display hint. Presentation only, never consulted by
    /// reset logic.
    pub scheduled_time: Option<String>,
    /// Set the first time the reset sweep reopens this task; never moves
    /// backward after that.
    pub last_reset: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    /// Defaults to "#4CAF50" when omitted.
    pub color: Option<String>,
}

/// Request to update a child's name and color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateChildRequest {
    pub name: String,
    pub color: Option<String>,
}

/// Request to create a task under a child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub child_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Defaults to `none` when omitted.
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
}

/// Request to update a task's editable fields (status changes via the
/// dedicated status endpoint)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
}

/// Request to move a task to a new workflow state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
}

/// Response from the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// "connected" when the MQTT sink is up, otherwise "disabled".
    pub mqtt: String,
}

/// Response from the force-sweep endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResponse {
    pub reset_count: usize,
    pub failed_count: usize,
    pub affected_children: Vec<i64>,
}
