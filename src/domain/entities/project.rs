//! Project entity and repository trait.
//!
//! Project CRUD is owned by another module; the chat core only consults the
//! "project exists" check when opening a project room.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// A project, as visible to the chat subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Project name, shown on project room views
    pub name: String,

    /// Timestamp when the project was created
    pub created_at: DateTime<Utc>,
}

/// Repository trait for project lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Find a project by ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Project>, AppError>;

    /// Whether a project with this ID exists.
    async fn exists(&self, id: i64) -> Result<bool, AppError>;
}
