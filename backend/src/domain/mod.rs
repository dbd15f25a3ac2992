//! Domain layer: services and the recurring-task lifecycle rules.

pub mod aggregate;
pub mod child_service;
pub mod error;
pub mod recurrence;
pub mod reset_service;
pub mod task_service;

pub use child_service::ChildService;
pub use error::{ServiceError, ServiceResult};
pub use reset_service::{ResetService, SweepOutcome};
pub use task_service::TaskService;
