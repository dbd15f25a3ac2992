use chrono::Utc;
use shared::{Child, CreateChildRequest, UpdateChildRequest};
use tracing::{info, warn};

use crate::domain::error::{ServiceError, ServiceResult};
use crate::publish::PublishHandle;
use crate::storage::ChildRepository;

const DEFAULT_COLOR: &str = "#4CAF50";
const MAX_NAME_LEN: usize = 100;

/// Service for managing children on the task board
#[derive(Clone)]
pub struct ChildService {
    children: ChildRepository,
    publish: PublishHandle,
}

impl ChildService {
    pub fn new(children: ChildRepository, publish: PublishHandle) -> Self {
        Self { children, publish }
    }

    /// Create a new child and register it with the discovery mechanism
    pub async fn create_child(&self, request: CreateChildRequest) -> ServiceResult<Child> {
        info!("Creating child: name={}", request.name);

        let name = validate_name(&request.name)?;
        let color = request.color.unwrap_or_else(|| DEFAULT_COLOR.to_string());

        let child = self.children.store_child(&name, &color, Utc::now()).await?;

        info!("Created child: {} with ID: {}", child.name, child.id);
        self.publish.discovery(child.clone());

        Ok(child)
    }

    /// Get a child by ID
    pub async fn get_child(&self, id: i64) -> ServiceResult<Child> {
        self.children
            .get_child(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("child", id))
    }

    /// List all children
    pub async fn list_children(&self) -> ServiceResult<Vec<Child>> {
        Ok(self.children.list_children().await?)
    }

    /// Update a child's name and color. A rename re-registers discovery so
    /// the external integration picks up the new display name.
    pub async fn update_child(&self, id: i64, request: UpdateChildRequest) -> ServiceResult<Child> {
        info!("Updating child: {}", id);

        let name = validate_name(&request.name)?;
        let existing = self.get_child(id).await?;
        let color = request.color.unwrap_or(existing.color);

        let child = self
            .children
            .update_child(id, &name, &color)
            .await?
            .ok_or_else(|| ServiceError::not_found("child", id))?;

        info!("Updated child: {} with ID: {}", child.name, child.id);
        self.publish.discovery(child.clone());

        Ok(child)
    }

    /// Delete a child and all its tasks (cascade), then deregister its
    /// discovery channels. No state publish, since the child no longer exists.
    pub async fn delete_child(&self, id: i64) -> ServiceResult<()> {
        info!("Deleting child: {}", id);

        if !self.children.delete_child(id).await? {
            warn!("Child not found for delete: {}", id);
            return Err(ServiceError::not_found("child", id));
        }

        info!("Deleted child: {}", id);
        self.publish.retract_discovery(id);

        Ok(())
    }
}

fn validate_name(name: &str) -> ServiceResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation("Child name cannot be empty"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(ServiceError::validation(format!(
            "Child name cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}
