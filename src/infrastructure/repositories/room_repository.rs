//! Room Repository Implementation
//!
//! PostgreSQL implementation of room and participant operations. Room
//! creation is transactional so a room never exists without its initial
//! roster, and uniqueness violations surface as `AppError::Conflict` for the
//! service's get-or-create race handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    direct_room_key, Participant, Room, RoomRepository, RoomType, RoomWithParticipants,
};
use crate::shared::error::AppError;

/// PostgreSQL room repository implementation.
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    /// Creates a new PgRoomRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_participants(&self, room_id: i64) -> Result<Vec<Participant>, AppError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT cp.user_id, u.full_name, u.avatar_url, cp.joined_at
            FROM chat_participants cp
            JOIN users u ON u.id = cp.user_id
            WHERE cp.room_id = $1
            ORDER BY cp.joined_at ASC, cp.user_id ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_participant()).collect())
    }

    async fn attach_participants(
        &self,
        row: RoomRow,
    ) -> Result<RoomWithParticipants, AppError> {
        let participants = self.load_participants(row.id).await?;
        let project_name = row.project_name.clone();
        Ok(RoomWithParticipants {
            room: row.into_room(),
            project_name,
            participants,
        })
    }
}

/// Internal row type for room queries, with the project name joined in.
#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: i64,
    room_type: String, // PostgreSQL enum maps to string
    project_id: Option<i64>,
    project_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_room(self) -> Room {
        Room {
            id: self.id,
            room_type: RoomType::from_str(&self.room_type),
            project_id: self.project_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    user_id: i64,
    full_name: String,
    avatar_url: Option<String>,
    joined_at: DateTime<Utc>,
}

impl ParticipantRow {
    fn into_participant(self) -> Participant {
        Participant {
            user_id: self.user_id,
            full_name: self.full_name,
            avatar_url: self.avatar_url,
            joined_at: self.joined_at,
        }
    }
}

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.room_type::text AS room_type, r.project_id,
           p.name AS project_name, r.created_at
    FROM chat_rooms r
    LEFT JOIN projects p ON p.id = r.project_id
"#;

/// Translate an insert failure, mapping duplicate-key rejections to
/// `Conflict` so the caller can re-read the winning row.
fn map_insert_err(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Room already exists".into())
        }
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Room>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!("{} WHERE r.id = $1", ROOM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_room()))
    }

    async fn find_with_participants(
        &self,
        id: i64,
    ) -> Result<Option<RoomWithParticipants>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!("{} WHERE r.id = $1", ROOM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.attach_participants(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_direct_room(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Option<RoomWithParticipants>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "{} WHERE r.room_type = 'direct' AND r.direct_key = $1",
            ROOM_SELECT
        ))
        .bind(direct_room_key(user_a, user_b))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.attach_participants(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_project_room(
        &self,
        project_id: i64,
    ) -> Result<Option<RoomWithParticipants>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "{} WHERE r.room_type = 'project' AND r.project_id = $1",
            ROOM_SELECT
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.attach_participants(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_rooms_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<RoomWithParticipants>, AppError> {
        let rows = sqlx::query_as::<_, RoomRow>(&format!(
            r#"{}
            WHERE EXISTS (
                SELECT 1 FROM chat_participants cp
                WHERE cp.room_id = r.id AND cp.user_id = $1
            )
            ORDER BY r.created_at DESC
            "#,
            ROOM_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut rooms = Vec::with_capacity(rows.len());
        for row in rows {
            rooms.push(self.attach_participants(row).await?);
        }
        Ok(rooms)
    }

    /// Insert the room and both participant rows in one transaction, so a
    /// direct room never exists half-populated.
    async fn create_direct_room(
        &self,
        room_id: i64,
        user_a: i64,
        user_b: i64,
    ) -> Result<Room, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            INSERT INTO chat_rooms (id, room_type, direct_key)
            VALUES ($1, 'direct', $2)
            RETURNING id, room_type::text AS room_type, project_id,
                      NULL::text AS project_name, created_at
            "#,
        )
        .bind(room_id)
        .bind(direct_room_key(user_a, user_b))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        sqlx::query(
            r#"
            INSERT INTO chat_participants (room_id, user_id)
            VALUES ($1, $2), ($1, $3)
            "#,
        )
        .bind(room_id)
        .bind(user_a)
        .bind(user_b)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_room())
    }

    async fn create_project_room(
        &self,
        room_id: i64,
        project_id: i64,
        user_id: i64,
    ) -> Result<Room, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            INSERT INTO chat_rooms (id, room_type, project_id)
            VALUES ($1, 'project', $2)
            RETURNING id, room_type::text AS room_type, project_id,
                      NULL::text AS project_name, created_at
            "#,
        )
        .bind(room_id)
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        sqlx::query("INSERT INTO chat_participants (room_id, user_id) VALUES ($1, $2)")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into_room())
    }

    /// Idempotent: re-adding an existing participant is a no-op.
    async fn add_participant(&self, room_id: i64, user_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_participants (room_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_participant(&self, room_id: i64, user_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM chat_participants
                WHERE room_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn participant_ids(&self, room_id: i64) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_participants WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
