//! Chat room entity, participant roster, and repository trait.
//!
//! Maps to the `chat_rooms` and `chat_participants` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Room kinds matching the PostgreSQL ENUM `room_type`.
///
/// Database definition:
/// ```sql
/// CREATE TYPE room_type AS ENUM ('direct', 'project');
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    /// One-to-one chat between exactly two users
    Direct,
    /// Group chat attached to a project, one per project
    Project,
}

impl RoomType {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "project" => Self::Project,
            _ => Self::Direct,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Project => "project",
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a persistent chat room.
///
/// Invariants:
/// - a Direct room has exactly two distinct participants and is unique per
///   unordered user pair (enforced by the `direct_key` UNIQUE constraint)
/// - a Project room is unique per project (partial unique index on
///   `project_id`)
/// - `project_id` is set iff `room_type` is Project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Kind of room
    pub room_type: RoomType,

    /// Owning project, for project rooms only
    pub project_id: Option<i64>,

    /// Timestamp when the room was created
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn is_direct(&self) -> bool {
        self.room_type == RoomType::Direct
    }
}

/// Durable membership record linking a user to a room, with display fields
/// joined from the users table.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: i64,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// A room together with its full participant roster and, for project rooms,
/// the project name.
#[derive(Debug, Clone)]
pub struct RoomWithParticipants {
    pub room: Room,
    pub project_name: Option<String>,
    pub participants: Vec<Participant>,
}

/// Builds the canonical uniqueness key for a direct room.
///
/// The key is order-independent so (a, b) and (b, a) collide on the same row.
pub fn direct_room_key(user_a: i64, user_b: i64) -> String {
    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}:{}", lo, hi)
}

/// Repository trait for room and participant data access.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Find a room by its ID, without the roster.
    async fn find_by_id(&self, id: i64) -> Result<Option<Room>, AppError>;

    /// Find a room by its ID, with roster and project name.
    async fn find_with_participants(&self, id: i64)
        -> Result<Option<RoomWithParticipants>, AppError>;

    /// Find the direct room whose participants are exactly {user_a, user_b}.
    async fn find_direct_room(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Option<RoomWithParticipants>, AppError>;

    /// Find the project room for a project, if one exists.
    async fn find_project_room(
        &self,
        project_id: i64,
    ) -> Result<Option<RoomWithParticipants>, AppError>;

    /// Every room the user participates in, with rosters.
    async fn find_rooms_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<RoomWithParticipants>, AppError>;

    /// Create a direct room and both participant rows in one transaction.
    ///
    /// Returns `AppError::Conflict` if a room for this pair already exists,
    /// including when a concurrent caller won the insert race.
    async fn create_direct_room(
        &self,
        room_id: i64,
        user_a: i64,
        user_b: i64,
    ) -> Result<Room, AppError>;

    /// Create a project room and its first participant in one transaction.
    ///
    /// Returns `AppError::Conflict` if the project already has a room.
    async fn create_project_room(
        &self,
        room_id: i64,
        project_id: i64,
        user_id: i64,
    ) -> Result<Room, AppError>;

    /// Add a participant to a room. Adding an existing participant is a no-op.
    async fn add_participant(&self, room_id: i64, user_id: i64) -> Result<(), AppError>;

    /// Pure membership check.
    async fn is_participant(&self, room_id: i64, user_id: i64) -> Result<bool, AppError>;

    /// User IDs of every durable participant of a room.
    async fn participant_ids(&self, room_id: i64) -> Result<Vec<i64>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_room_key_is_order_independent() {
        assert_eq!(direct_room_key(1, 2), direct_room_key(2, 1));
        assert_eq!(direct_room_key(7, 3), "3:7");
    }

    #[test]
    fn test_room_type_round_trip() {
        assert_eq!(RoomType::from_str("direct"), RoomType::Direct);
        assert_eq!(RoomType::from_str("project"), RoomType::Project);
        assert_eq!(RoomType::Project.as_str(), "project");
    }
}
