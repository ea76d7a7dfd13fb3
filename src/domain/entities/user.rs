//! User entity and repository trait.
//!
//! Identity and authentication live outside this core; the chat service only
//! needs existence checks and display fields for response shaping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// A platform user, as visible to the chat subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Display name shown next to messages
    pub full_name: String,

    /// Profile photo URL, if set
    pub avatar_url: Option<String>,

    /// Timestamp when the account was created
    pub created_at: DateTime<Utc>,
}

/// Repository trait for user lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Whether a user with this ID exists.
    async fn exists(&self, id: i64) -> Result<bool, AppError>;
}
