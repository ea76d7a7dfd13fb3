//! Chat message entity and repository trait.
//!
//! Maps to the `chat_messages` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Maximum message content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// Represents a message in a chat room.
///
/// Messages are immutable once created except for the `is_read` flag, which
/// only ever transitions false -> true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Owning room
    pub room_id: i64,

    /// Author user ID
    pub sender_id: i64,

    /// Trimmed message text
    pub content: String,

    /// Read flag, set in bulk when a non-sender participant opens the room
    pub is_read: bool,

    /// Timestamp when the message was sent
    pub created_at: DateTime<Utc>,
}

/// A message joined with its sender's display fields.
#[derive(Debug, Clone)]
pub struct MessageWithSender {
    pub message: ChatMessage,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
}

/// Repository trait for message data access.
///
/// Paging is newest-first, ordered by `(created_at, id)` descending; snowflake
/// ids keep the tie-break stable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// One page of a room's messages, newest first. `page` is 1-based.
    async fn find_by_room(
        &self,
        room_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<MessageWithSender>, AppError>;

    /// Total number of messages in a room.
    async fn count_by_room(&self, room_id: i64) -> Result<i64, AppError>;

    /// The most recent message in a room, if any.
    async fn find_last(&self, room_id: i64) -> Result<Option<MessageWithSender>, AppError>;

    /// Unread messages in a room that were not authored by `user_id`.
    async fn count_unread(&self, room_id: i64, user_id: i64) -> Result<i64, AppError>;

    /// Persist a new message. The store stamps `created_at` itself.
    async fn create(&self, message: &ChatMessage) -> Result<ChatMessage, AppError>;

    /// Flip `is_read` on every unread message in the room not authored by
    /// `user_id`. Returns the number of rows touched; calling again is a no-op.
    async fn mark_room_read(&self, room_id: i64, user_id: i64) -> Result<u64, AppError>;
}
