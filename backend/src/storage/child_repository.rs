use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use shared::Child;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbConnection;
use crate::storage::parse_timestamp;

/// Repository for child records
#[derive(Clone)]
pub struct ChildRepository {
    db: DbConnection,
}

impl ChildRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Insert a new child and return the stored record
    pub async fn store_child(&self, name: &str, color: &str, now: DateTime<Utc>) -> Result<Child> {
        let id = sqlx::query("INSERT INTO children (name, color, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(color)
            .bind(now.to_rfc3339())
            .execute(self.db.pool())
            .await?
            .last_insert_rowid();

        self.get_child(id)
            .await?
            .ok_or_else(|| anyhow!("child {} missing after insert", id))
    }

    /// Retrieve a child by ID
    pub async fn get_child(&self, id: i64) -> Result<Option<Child>> {
        let row = sqlx::query("SELECT * FROM children WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(child_from_row).transpose()
    }

    /// List all children, oldest first
    pub async fn list_children(&self) -> Result<Vec<Child>> {
        let rows = sqlx::query("SELECT * FROM children ORDER BY created_at ASC, id ASC")
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(child_from_row).collect()
    }

    /// Update a child's name and color. Returns the updated record, or
    /// `None` if no child with that ID exists.
    pub async fn update_child(&self, id: i64, name: &str, color: &str) -> Result<Option<Child>> {
        let result = sqlx::query("UPDATE children SET name = ?, color = ? WHERE id = ?")
            .bind(name)
            .bind(color)
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_child(id).await
    }

    /// Delete a child. Tasks cascade via the foreign key. Returns false if
    /// no child with that ID exists.
    pub async fn delete_child(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM children WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn child_from_row(row: &SqliteRow) -> Result<Child> {
    let created_at: String = row.try_get("created_at")?;

    Ok(Child {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        color: row.try_get("color")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test() -> ChildRepository {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        ChildRepository::new(db)
    }

    #[tokio::test]
    async fn test_store_and_get_child() {
        let repo = setup_test().await;

        let child = repo.store_child("Emma", "#FF5722", Utc::now()).await.unwrap();
        assert_eq!(child.name, "Emma");
        assert_eq!(child.color, "#FF5722");

        let fetched = repo.get_child(child.id).await.unwrap().unwrap();
        assert_eq!(fetched, child);
    }

    #[tokio::test]
    async fn test_get_nonexistent_child() {
        let repo = setup_test().await;
        assert!(repo.get_child(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_children_oldest_first() {
        let repo = setup_test().await;

        let first = repo
            .store_child("Emma", "#4CAF50", "2024-01-01T10:00:00Z".parse().unwrap())
            .await
            .unwrap();
        let second = repo
            .store_child("Noah", "#2196F3", "2024-01-02T10:00:00Z".parse().unwrap())
            .await
            .unwrap();

        let children = repo.list_children().await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, first.id);
        assert_eq!(children[1].id, second.id);
    }

    #[tokio::test]
    async fn test_update_child() {
        let repo = setup_test().await;
        let child = repo.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        let updated = repo.update_child(child.id, "Emilia", "#9C27B0").await.unwrap().unwrap();
        assert_eq!(updated.name, "Emilia");
        assert_eq!(updated.color, "#9C27B0");
        assert_eq!(updated.created_at, child.created_at);

        assert!(repo.update_child(999, "Nobody", "#000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_child() {
        let repo = setup_test().await;
        let child = repo.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        assert!(repo.delete_child(child.id).await.unwrap());
        assert!(repo.get_child(child.id).await.unwrap().is_none());
        assert!(!repo.delete_child(child.id).await.unwrap());
    }
}
