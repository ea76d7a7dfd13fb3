//! Message Repository Implementation
//!
//! PostgreSQL implementation of message operations: newest-first offset
//! pagination, unread counting, and the bulk read-flag update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{ChatMessage, MessageRepository, MessageWithSender};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries joined with sender display fields.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: String,
    is_read: bool,
    created_at: DateTime<Utc>,
    sender_name: String,
    sender_avatar_url: Option<String>,
}

impl MessageRow {
    fn into_message(self) -> MessageWithSender {
        MessageWithSender {
            message: ChatMessage {
                id: self.id,
                room_id: self.room_id,
                sender_id: self.sender_id,
                content: self.content,
                is_read: self.is_read,
                created_at: self.created_at,
            },
            sender_name: self.sender_name,
            sender_avatar_url: self.sender_avatar_url,
        }
    }
}

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.room_id, m.sender_id, m.content, m.is_read, m.created_at,
           u.full_name AS sender_name, u.avatar_url AS sender_avatar_url
    FROM chat_messages m
    JOIN users u ON u.id = m.sender_id
"#;

#[async_trait]
impl MessageRepository for PgMessageRepository {
    /// One page, newest first. Ordered by `(created_at, id)` descending so
    /// equal timestamps still page deterministically.
    async fn find_by_room(
        &self,
        room_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<MessageWithSender>, AppError> {
        let offset = (page - 1) * page_size;

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"{}
            WHERE m.room_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $2 OFFSET $3
            "#,
            MESSAGE_SELECT
        ))
        .bind(room_id)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn count_by_room(&self, room_id: i64) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_messages WHERE room_id = $1")
                .bind(room_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn find_last(&self, room_id: i64) -> Result<Option<MessageWithSender>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"{}
            WHERE m.room_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT 1
            "#,
            MESSAGE_SELECT
        ))
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }

    async fn count_unread(&self, room_id: i64, user_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM chat_messages
            WHERE room_id = $1 AND sender_id <> $2 AND NOT is_read
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// The message ID is a pre-generated snowflake from the application
    /// layer; `created_at` is stamped by the store.
    async fn create(&self, message: &ChatMessage) -> Result<ChatMessage, AppError> {
        let row = sqlx::query_as::<_, CreatedMessageRow>(
            r#"
            INSERT INTO chat_messages (id, room_id, sender_id, content, is_read)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING id, room_id, sender_id, content, is_read, created_at
            "#,
        )
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_message())
    }

    /// Bulk false -> true flip; re-running matches zero rows.
    async fn mark_room_read(&self, room_id: i64, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE chat_messages
            SET is_read = TRUE
            WHERE room_id = $1 AND sender_id <> $2 AND NOT is_read
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Row type for the insert RETURNING clause (no sender join needed).
#[derive(Debug, sqlx::FromRow)]
struct CreatedMessageRow {
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl CreatedMessageRow {
    fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            content: self.content,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}
