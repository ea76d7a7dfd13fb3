//! Chat Service
//!
//! Orchestrates room creation/lookup, message validation and persistence,
//! read-tracking, and response shaping. This is the only component with chat
//! business rules; broadcasting is the caller's responsibility.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::dto::response::{
    ChatMessageResponse, ChatRoomResponse, PagedMessagesResponse,
};
use crate::domain::{
    ChatMessage, MessageRepository, MessageWithSender, ProjectRepository, RoomRepository,
    RoomType, RoomWithParticipants, UserRepository, MAX_CONTENT_LENGTH,
};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// Chat service errors
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    fn internal(e: AppError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Chat service trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Get the existing direct room for {user_a, user_b} or create it with
    /// both participants. Safe under concurrent calls for the same pair.
    async fn get_or_create_direct_room(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<ChatRoomResponse, ChatError>;

    /// Get the project's room, creating it with `user_id` as sole participant
    /// if absent, or adding `user_id` to the roster if not yet a member.
    async fn get_or_create_project_room(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> Result<ChatRoomResponse, ChatError>;

    /// One room with its roster, shaped for the requesting participant.
    async fn get_room(
        &self,
        room_id: i64,
        requester_id: i64,
    ) -> Result<ChatRoomResponse, ChatError>;

    /// Validate and persist a message, returning the enriched view.
    async fn send_message(
        &self,
        room_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<ChatMessageResponse, ChatError>;

    /// One newest-first page of a room's messages plus pagination metadata.
    /// `page` is 1-based; `page_size` is expected pre-clamped to [1, 100].
    async fn get_messages(
        &self,
        room_id: i64,
        requester_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<PagedMessagesResponse, ChatError>;

    /// Mark every message in the room not authored by `user_id` as read.
    /// Idempotent.
    async fn mark_read(&self, room_id: i64, user_id: i64) -> Result<(), ChatError>;

    /// Every room the user participates in, enriched and ordered by most
    /// recent activity (last message time, else room creation time).
    async fn list_user_rooms(&self, user_id: i64) -> Result<Vec<ChatRoomResponse>, ChatError>;

    /// Pure membership check, used as the authorization guard by the gateway.
    async fn is_participant(&self, room_id: i64, user_id: i64) -> Result<bool, ChatError>;

    /// Durable roster of a room as user IDs, used to pull every member's live
    /// connections into the broadcast group before a broadcast.
    async fn room_member_ids(&self, room_id: i64) -> Result<Vec<i64>, ChatError>;
}

/// ChatService implementation over the four repository contracts.
pub struct ChatServiceImpl<R, M, U, P>
where
    R: RoomRepository,
    M: MessageRepository,
    U: UserRepository,
    P: ProjectRepository,
{
    room_repo: Arc<R>,
    message_repo: Arc<M>,
    user_repo: Arc<U>,
    project_repo: Arc<P>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<R, M, U, P> ChatServiceImpl<R, M, U, P>
where
    R: RoomRepository,
    M: MessageRepository,
    U: UserRepository,
    P: ProjectRepository,
{
    pub fn new(
        room_repo: Arc<R>,
        message_repo: Arc<M>,
        user_repo: Arc<U>,
        project_repo: Arc<P>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            room_repo,
            message_repo,
            user_repo,
            project_repo,
            id_generator,
        }
    }

    /// Shape a room into the viewer's response: roster, latest message, and
    /// the viewer's unread count.
    async fn shape_room(
        &self,
        room: RoomWithParticipants,
        viewer_id: i64,
    ) -> Result<ChatRoomResponse, ChatError> {
        let last_message = self
            .message_repo
            .find_last(room.room.id)
            .await
            .map_err(ChatError::internal)?
            .map(ChatMessageResponse::from);

        let unread_count = self
            .message_repo
            .count_unread(room.room.id, viewer_id)
            .await
            .map_err(ChatError::internal)?;

        Ok(ChatRoomResponse::from_room(room, last_message, unread_count))
    }

    async fn load_room(&self, room_id: i64) -> Result<RoomWithParticipants, ChatError> {
        self.room_repo
            .find_with_participants(room_id)
            .await
            .map_err(ChatError::internal)?
            .ok_or_else(|| ChatError::NotFound(format!("Chat room {} not found", room_id)))
    }

    async fn require_participant(&self, room_id: i64, user_id: i64) -> Result<(), ChatError> {
        let is_participant = self
            .room_repo
            .is_participant(room_id, user_id)
            .await
            .map_err(ChatError::internal)?;

        if !is_participant {
            return Err(ChatError::Unauthorized(
                "User is not a participant of this chat room".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<R, M, U, P> ChatService for ChatServiceImpl<R, M, U, P>
where
    R: RoomRepository + 'static,
    M: MessageRepository + 'static,
    U: UserRepository + 'static,
    P: ProjectRepository + 'static,
{
    async fn get_or_create_direct_room(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<ChatRoomResponse, ChatError> {
        if user_a == user_b {
            return Err(ChatError::InvalidArgument(
                "Cannot create a chat with yourself".into(),
            ));
        }

        let a_exists = self.user_repo.exists(user_a).await.map_err(ChatError::internal)?;
        let b_exists = self.user_repo.exists(user_b).await.map_err(ChatError::internal)?;
        if !a_exists || !b_exists {
            return Err(ChatError::NotFound("One or both users not found".into()));
        }

        if let Some(existing) = self
            .room_repo
            .find_direct_room(user_a, user_b)
            .await
            .map_err(ChatError::internal)?
        {
            return self.shape_room(existing, user_a).await;
        }

        let room_id = self.id_generator.generate();
        match self
            .room_repo
            .create_direct_room(room_id, user_a, user_b)
            .await
        {
            Ok(_) => {
                tracing::info!(room_id, user_a, user_b, "Direct chat room created");
            }
            // Lost the creation race: the winning row satisfies this call.
            Err(ref e) if e.is_unique_violation() => {
                tracing::debug!(user_a, user_b, "Direct room already created concurrently");
                let winner = self
                    .room_repo
                    .find_direct_room(user_a, user_b)
                    .await
                    .map_err(ChatError::internal)?
                    .ok_or_else(|| {
                        ChatError::Internal("Direct room vanished after conflict".into())
                    })?;
                return self.shape_room(winner, user_a).await;
            }
            Err(e) => return Err(ChatError::internal(e)),
        }

        let created = self.load_room(room_id).await?;
        self.shape_room(created, user_a).await
    }

    async fn get_or_create_project_room(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> Result<ChatRoomResponse, ChatError> {
        if !self
            .project_repo
            .exists(project_id)
            .await
            .map_err(ChatError::internal)?
        {
            return Err(ChatError::NotFound(format!(
                "Project {} not found",
                project_id
            )));
        }
        if !self.user_repo.exists(user_id).await.map_err(ChatError::internal)? {
            return Err(ChatError::NotFound(format!("User {} not found", user_id)));
        }

        if let Some(existing) = self
            .room_repo
            .find_project_room(project_id)
            .await
            .map_err(ChatError::internal)?
        {
            return self.join_project_room(existing, user_id).await;
        }

        let room_id = self.id_generator.generate();
        match self
            .room_repo
            .create_project_room(room_id, project_id, user_id)
            .await
        {
            Ok(_) => {
                tracing::info!(room_id, project_id, user_id, "Project chat room created");
            }
            // Another participant opened the room first; join theirs.
            Err(ref e) if e.is_unique_violation() => {
                let winner = self
                    .room_repo
                    .find_project_room(project_id)
                    .await
                    .map_err(ChatError::internal)?
                    .ok_or_else(|| {
                        ChatError::Internal("Project room vanished after conflict".into())
                    })?;
                return self.join_project_room(winner, user_id).await;
            }
            Err(e) => return Err(ChatError::internal(e)),
        }

        let created = self.load_room(room_id).await?;
        self.shape_room(created, user_id).await
    }

    async fn get_room(
        &self,
        room_id: i64,
        requester_id: i64,
    ) -> Result<ChatRoomResponse, ChatError> {
        let room = self.load_room(room_id).await?;
        self.require_participant(room_id, requester_id).await?;
        self.shape_room(room, requester_id).await
    }

    async fn send_message(
        &self,
        room_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<ChatMessageResponse, ChatError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ChatError::InvalidArgument(
                "Message content cannot be empty".into(),
            ));
        }
        if trimmed.chars().count() > MAX_CONTENT_LENGTH {
            return Err(ChatError::InvalidArgument(format!(
                "Message content exceeds {} characters",
                MAX_CONTENT_LENGTH
            )));
        }

        let room = self
            .room_repo
            .find_by_id(room_id)
            .await
            .map_err(ChatError::internal)?;
        if room.is_none() {
            return Err(ChatError::NotFound(format!(
                "Chat room {} not found",
                room_id
            )));
        }

        self.require_participant(room_id, sender_id).await?;

        let sender = self
            .user_repo
            .find_by_id(sender_id)
            .await
            .map_err(ChatError::internal)?
            .ok_or_else(|| ChatError::NotFound(format!("User {} not found", sender_id)))?;

        let message = ChatMessage {
            id: self.id_generator.generate(),
            room_id,
            sender_id,
            content: trimmed.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };

        let created = self
            .message_repo
            .create(&message)
            .await
            .map_err(ChatError::internal)?;

        tracing::debug!(room_id, sender_id, message_id = created.id, "Message persisted");

        Ok(ChatMessageResponse::from(MessageWithSender {
            message: created,
            sender_name: sender.full_name,
            sender_avatar_url: sender.avatar_url,
        }))
    }

    async fn get_messages(
        &self,
        room_id: i64,
        requester_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<PagedMessagesResponse, ChatError> {
        let room = self
            .room_repo
            .find_by_id(room_id)
            .await
            .map_err(ChatError::internal)?;
        if room.is_none() {
            return Err(ChatError::NotFound(format!(
                "Chat room {} not found",
                room_id
            )));
        }

        self.require_participant(room_id, requester_id).await?;

        let items = self
            .message_repo
            .find_by_room(room_id, page, page_size)
            .await
            .map_err(ChatError::internal)?
            .into_iter()
            .map(ChatMessageResponse::from)
            .collect();

        let total_count = self
            .message_repo
            .count_by_room(room_id)
            .await
            .map_err(ChatError::internal)?;

        Ok(PagedMessagesResponse::new(items, page, page_size, total_count))
    }

    async fn mark_read(&self, room_id: i64, user_id: i64) -> Result<(), ChatError> {
        self.require_participant(room_id, user_id).await?;

        let updated = self
            .message_repo
            .mark_room_read(room_id, user_id)
            .await
            .map_err(ChatError::internal)?;

        if updated > 0 {
            tracing::debug!(room_id, user_id, updated, "Messages marked read");
        }
        Ok(())
    }

    async fn list_user_rooms(&self, user_id: i64) -> Result<Vec<ChatRoomResponse>, ChatError> {
        if !self.user_repo.exists(user_id).await.map_err(ChatError::internal)? {
            return Err(ChatError::NotFound(format!("User {} not found", user_id)));
        }

        let rooms = self
            .room_repo
            .find_rooms_for_user(user_id)
            .await
            .map_err(ChatError::internal)?;

        // Shaped sequentially; rooms-per-user is small and the stores are the
        // suspension points.
        let mut shaped: Vec<(DateTime<Utc>, ChatRoomResponse)> = Vec::with_capacity(rooms.len());
        for room in rooms {
            let last_activity = room.room.created_at;
            let response = self.shape_room(room, user_id).await?;
            let activity = response
                .last_message
                .as_ref()
                .and_then(|m| DateTime::parse_from_rfc3339(&m.created_at).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(last_activity);
            shaped.push((activity, response));
        }

        shaped.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(shaped.into_iter().map(|(_, r)| r).collect())
    }

    async fn is_participant(&self, room_id: i64, user_id: i64) -> Result<bool, ChatError> {
        self.room_repo
            .is_participant(room_id, user_id)
            .await
            .map_err(ChatError::internal)
    }

    async fn room_member_ids(&self, room_id: i64) -> Result<Vec<i64>, ChatError> {
        self.room_repo
            .participant_ids(room_id)
            .await
            .map_err(ChatError::internal)
    }
}

impl<R, M, U, P> ChatServiceImpl<R, M, U, P>
where
    R: RoomRepository + 'static,
    M: MessageRepository + 'static,
    U: UserRepository + 'static,
    P: ProjectRepository + 'static,
{
    /// Ensure `user_id` is on the roster of an existing project room, then
    /// shape the (possibly refreshed) room for them.
    async fn join_project_room(
        &self,
        room: RoomWithParticipants,
        user_id: i64,
    ) -> Result<ChatRoomResponse, ChatError> {
        debug_assert_eq!(room.room.room_type, RoomType::Project);

        let already_member = room.participants.iter().any(|p| p.user_id == user_id);
        if already_member {
            return self.shape_room(room, user_id).await;
        }

        self.room_repo
            .add_participant(room.room.id, user_id)
            .await
            .map_err(ChatError::internal)?;
        tracing::info!(room_id = room.room.id, user_id, "Joined project chat room");

        let refreshed = self.load_room(room.room.id).await?;
        self.shape_room(refreshed, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    use crate::domain::{
        MockMessageRepository, MockProjectRepository, MockRoomRepository, MockUserRepository,
        Participant, Room,
    };

    type TestService = ChatServiceImpl<
        MockRoomRepository,
        MockMessageRepository,
        MockUserRepository,
        MockProjectRepository,
    >;

    fn service(
        room_repo: MockRoomRepository,
        message_repo: MockMessageRepository,
        user_repo: MockUserRepository,
        project_repo: MockProjectRepository,
    ) -> TestService {
        ChatServiceImpl::new(
            Arc::new(room_repo),
            Arc::new(message_repo),
            Arc::new(user_repo),
            Arc::new(project_repo),
            Arc::new(SnowflakeGenerator::new(1, 0)),
        )
    }

    fn direct_room(id: i64, users: &[i64]) -> RoomWithParticipants {
        room_of(id, RoomType::Direct, None, users)
    }

    fn room_of(id: i64, room_type: RoomType, project_id: Option<i64>, users: &[i64]) -> RoomWithParticipants {
        RoomWithParticipants {
            room: Room {
                id,
                room_type,
                project_id,
                created_at: Utc::now(),
            },
            project_name: project_id.map(|_| "Test Project".to_string()),
            participants: users
                .iter()
                .map(|&user_id| Participant {
                    user_id,
                    full_name: format!("User {}", user_id),
                    avatar_url: None,
                    joined_at: Utc::now(),
                })
                .collect(),
        }
    }

    fn user(id: i64) -> crate::domain::User {
        crate::domain::User {
            id,
            full_name: format!("User {}", id),
            avatar_url: Some("https://example.com/a.png".into()),
            created_at: Utc::now(),
        }
    }

    fn message(id: i64, room_id: i64, sender_id: i64, content: &str) -> MessageWithSender {
        MessageWithSender {
            message: ChatMessage {
                id,
                room_id,
                sender_id,
                content: content.to_string(),
                is_read: false,
                created_at: Utc::now(),
            },
            sender_name: format!("User {}", sender_id),
            sender_avatar_url: None,
        }
    }

    /// Expectations for shaping one room view (last message + unread count).
    fn expect_shape(message_repo: &mut MockMessageRepository, room_id: i64, unread: i64) {
        message_repo
            .expect_find_last()
            .with(eq(room_id))
            .returning(|_| Ok(None));
        message_repo
            .expect_count_unread()
            .with(eq(room_id), mockall::predicate::always())
            .returning(move |_, _| Ok(unread));
    }

    #[tokio::test]
    async fn direct_room_with_self_is_rejected() {
        let svc = service(
            MockRoomRepository::new(),
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let err = svc.get_or_create_direct_room(7, 7).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn direct_room_requires_both_users() {
        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().with(eq(1)).returning(|_| Ok(true));
        user_repo.expect_exists().with(eq(2)).returning(|_| Ok(false));

        let svc = service(
            MockRoomRepository::new(),
            MockMessageRepository::new(),
            user_repo,
            MockProjectRepository::new(),
        );

        let err = svc.get_or_create_direct_room(1, 2).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn direct_room_returns_existing() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_direct_room()
            .with(eq(1), eq(2))
            .returning(|_, _| Ok(Some(direct_room(42, &[1, 2]))));
        room_repo.expect_create_direct_room().never();

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        expect_shape(&mut message_repo, 42, 0);

        let svc = service(room_repo, message_repo, user_repo, MockProjectRepository::new());

        let room = svc.get_or_create_direct_room(1, 2).await.unwrap();
        assert_eq!(room.id, "42");
        assert_eq!(room.participants.len(), 2);
    }

    #[tokio::test]
    async fn direct_room_is_created_when_absent() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_direct_room()
            .returning(|_, _| Ok(None));
        room_repo
            .expect_create_direct_room()
            .withf(|_, a, b| (*a, *b) == (1, 2))
            .returning(|room_id, _, _| {
                Ok(Room {
                    id: room_id,
                    room_type: RoomType::Direct,
                    project_id: None,
                    created_at: Utc::now(),
                })
            });
        room_repo
            .expect_find_with_participants()
            .returning(|id| Ok(Some(direct_room(id, &[1, 2]))));

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        message_repo.expect_find_last().returning(|_| Ok(None));
        message_repo.expect_count_unread().returning(|_, _| Ok(0));

        let svc = service(room_repo, message_repo, user_repo, MockProjectRepository::new());

        let room = svc.get_or_create_direct_room(1, 2).await.unwrap();
        assert_eq!(room.room_type, "direct");
        assert_eq!(room.participants.len(), 2);
        assert!(room.last_message.is_none());
    }

    #[tokio::test]
    async fn direct_room_conflict_collapses_to_winner() {
        let mut seq = Sequence::new();
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_direct_room()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        room_repo
            .expect_create_direct_room()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(AppError::Conflict("duplicate direct room".into())));
        room_repo
            .expect_find_direct_room()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(direct_room(99, &[1, 2]))));

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        expect_shape(&mut message_repo, 99, 0);

        let svc = service(room_repo, message_repo, user_repo, MockProjectRepository::new());

        let room = svc.get_or_create_direct_room(1, 2).await.unwrap();
        assert_eq!(room.id, "99");
    }

    #[tokio::test]
    async fn project_room_requires_project() {
        let mut project_repo = MockProjectRepository::new();
        project_repo.expect_exists().returning(|_| Ok(false));

        let svc = service(
            MockRoomRepository::new(),
            MockMessageRepository::new(),
            MockUserRepository::new(),
            project_repo,
        );

        let err = svc.get_or_create_project_room(5, 1).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn project_room_created_with_sole_participant() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_project_room()
            .with(eq(5))
            .returning(|_| Ok(None));
        room_repo
            .expect_create_project_room()
            .withf(|_, project_id, user_id| (*project_id, *user_id) == (5, 1))
            .returning(|room_id, project_id, _| {
                Ok(Room {
                    id: room_id,
                    room_type: RoomType::Project,
                    project_id: Some(project_id),
                    created_at: Utc::now(),
                })
            });
        room_repo
            .expect_find_with_participants()
            .returning(|id| Ok(Some(room_of(id, RoomType::Project, Some(5), &[1]))));

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));
        let mut project_repo = MockProjectRepository::new();
        project_repo.expect_exists().returning(|_| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        message_repo.expect_find_last().returning(|_| Ok(None));
        message_repo.expect_count_unread().returning(|_, _| Ok(0));

        let svc = service(room_repo, message_repo, user_repo, project_repo);

        let room = svc.get_or_create_project_room(5, 1).await.unwrap();
        assert_eq!(room.room_type, "project");
        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.project_name.as_deref(), Some("Test Project"));
    }

    #[tokio::test]
    async fn project_room_adds_new_participant() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_project_room()
            .returning(|_| Ok(Some(room_of(77, RoomType::Project, Some(5), &[1]))));
        room_repo
            .expect_add_participant()
            .with(eq(77), eq(2))
            .times(1)
            .returning(|_, _| Ok(()));
        room_repo
            .expect_find_with_participants()
            .returning(|id| Ok(Some(room_of(id, RoomType::Project, Some(5), &[1, 2]))));

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));
        let mut project_repo = MockProjectRepository::new();
        project_repo.expect_exists().returning(|_| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        expect_shape(&mut message_repo, 77, 0);

        let svc = service(room_repo, message_repo, user_repo, project_repo);

        let room = svc.get_or_create_project_room(5, 2).await.unwrap();
        assert_eq!(room.id, "77");
        assert_eq!(room.participants.len(), 2);
    }

    #[tokio::test]
    async fn project_room_rejoin_is_a_noop() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_project_room()
            .returning(|_| Ok(Some(room_of(77, RoomType::Project, Some(5), &[1, 2]))));
        room_repo.expect_add_participant().never();

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));
        let mut project_repo = MockProjectRepository::new();
        project_repo.expect_exists().returning(|_| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        expect_shape(&mut message_repo, 77, 0);

        let svc = service(room_repo, message_repo, user_repo, project_repo);

        let room = svc.get_or_create_project_room(5, 2).await.unwrap();
        assert_eq!(room.participants.len(), 2);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_store_access() {
        // No expectations are set: any repository call would panic the test.
        let svc = service(
            MockRoomRepository::new(),
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        for content in ["", "   ", "\n\t "] {
            let err = svc.send_message(1, 2, content).await.unwrap_err();
            assert!(matches!(err, ChatError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let svc = service(
            MockRoomRepository::new(),
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let content = "x".repeat(MAX_CONTENT_LENGTH + 1);
        let err = svc.send_message(1, 2, &content).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn send_to_unknown_room_is_not_found() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_by_id().returning(|_| Ok(None));

        let svc = service(
            room_repo,
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let err = svc.send_message(1, 2, "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn send_by_non_participant_persists_nothing() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_by_id().returning(|id| {
            Ok(Some(Room {
                id,
                room_type: RoomType::Direct,
                project_id: None,
                created_at: Utc::now(),
            }))
        });
        room_repo.expect_is_participant().returning(|_, _| Ok(false));

        let mut message_repo = MockMessageRepository::new();
        message_repo.expect_create().never();

        let svc = service(
            room_repo,
            message_repo,
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let err = svc.send_message(1, 2, "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn send_trims_and_returns_enriched_view() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_by_id().returning(|id| {
            Ok(Some(Room {
                id,
                room_type: RoomType::Direct,
                project_id: None,
                created_at: Utc::now(),
            }))
        });
        room_repo.expect_is_participant().returning(|_, _| Ok(true));

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_find_by_id()
            .with(eq(2))
            .returning(|id| Ok(Some(user(id))));

        let mut message_repo = MockMessageRepository::new();
        message_repo
            .expect_create()
            .withf(|m| m.content == "hi" && !m.is_read)
            .returning(|m| Ok(m.clone()));

        let svc = service(room_repo, message_repo, user_repo, MockProjectRepository::new());

        let response = svc.send_message(1, 2, "  hi  ").await.unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.sender_name, "User 2");
        assert!(!response.is_read);
    }

    #[tokio::test]
    async fn get_room_rejects_non_participant() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_with_participants()
            .returning(|id| Ok(Some(direct_room(id, &[1, 2]))));
        room_repo.expect_is_participant().returning(|_, _| Ok(false));

        let svc = service(
            room_repo,
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let err = svc.get_room(42, 9).await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn get_room_shapes_for_requester() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_with_participants()
            .returning(|id| Ok(Some(direct_room(id, &[1, 2]))));
        room_repo.expect_is_participant().returning(|_, _| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        expect_shape(&mut message_repo, 42, 2);

        let svc = service(
            room_repo,
            message_repo,
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let room = svc.get_room(42, 1).await.unwrap();
        assert_eq!(room.id, "42");
        assert_eq!(room.unread_count, 2);
    }

    #[tokio::test]
    async fn get_messages_rejects_non_participant() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_by_id().returning(|id| {
            Ok(Some(Room {
                id,
                room_type: RoomType::Direct,
                project_id: None,
                created_at: Utc::now(),
            }))
        });
        room_repo.expect_is_participant().returning(|_, _| Ok(false));

        let svc = service(
            room_repo,
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let err = svc.get_messages(1, 2, 1, 50).await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn get_messages_returns_page_with_metadata() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_by_id().returning(|id| {
            Ok(Some(Room {
                id,
                room_type: RoomType::Direct,
                project_id: None,
                created_at: Utc::now(),
            }))
        });
        room_repo.expect_is_participant().returning(|_, _| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        message_repo
            .expect_find_by_room()
            .with(eq(1), eq(3), eq(50))
            .returning(|room_id, _, _| {
                Ok((0..20).map(|i| message(i, room_id, 2, "hi")).collect())
            });
        message_repo.expect_count_by_room().returning(|_| Ok(120));

        let svc = service(
            room_repo,
            message_repo,
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let page = svc.get_messages(1, 2, 3, 50).await.unwrap();
        assert_eq!(page.items.len(), 20);
        assert_eq!(page.total_count, 120);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_previous);
        assert!(!page.has_next);
    }

    #[tokio::test]
    async fn mark_read_requires_participation() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_is_participant().returning(|_, _| Ok(false));

        let mut message_repo = MockMessageRepository::new();
        message_repo.expect_mark_room_read().never();

        let svc = service(
            room_repo,
            message_repo,
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        let err = svc.mark_read(1, 2).await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_is_participant().returning(|_, _| Ok(true));

        let mut message_repo = MockMessageRepository::new();
        let mut seq = Sequence::new();
        message_repo
            .expect_mark_room_read()
            .with(eq(1), eq(2))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(3));
        message_repo
            .expect_mark_room_read()
            .with(eq(1), eq(2))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(0));

        let svc = service(
            room_repo,
            message_repo,
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        svc.mark_read(1, 2).await.unwrap();
        svc.mark_read(1, 2).await.unwrap();
    }

    #[tokio::test]
    async fn list_user_rooms_orders_by_recent_activity() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_rooms_for_user().returning(|_| {
            Ok(vec![direct_room(10, &[1, 2]), direct_room(20, &[1, 3])])
        });

        let mut user_repo = MockUserRepository::new();
        user_repo.expect_exists().returning(|_| Ok(true));

        // Room 10 is quiet; room 20 has a fresh message and must sort first.
        let mut message_repo = MockMessageRepository::new();
        message_repo
            .expect_find_last()
            .with(eq(10))
            .returning(|_| Ok(None));
        message_repo
            .expect_find_last()
            .with(eq(20))
            .returning(|room_id| Ok(Some(message(1, room_id, 3, "newest"))));
        message_repo.expect_count_unread().returning(|_, _| Ok(1));

        let svc = service(room_repo, message_repo, user_repo, MockProjectRepository::new());

        let rooms = svc.list_user_rooms(1).await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, "20");
        assert_eq!(rooms[1].id, "10");
        assert_eq!(rooms[0].unread_count, 1);
    }

    #[tokio::test]
    async fn is_participant_delegates_to_store() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_is_participant()
            .with(eq(1), eq(2))
            .returning(|_, _| Ok(true));

        let svc = service(
            room_repo,
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        assert!(svc.is_participant(1, 2).await.unwrap());
    }

    #[tokio::test]
    async fn room_member_ids_returns_the_durable_roster() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_participant_ids()
            .with(eq(7))
            .returning(|_| Ok(vec![1, 2, 3]));

        let svc = service(
            room_repo,
            MockMessageRepository::new(),
            MockUserRepository::new(),
            MockProjectRepository::new(),
        );

        assert_eq!(svc.room_member_ids(7).await.unwrap(), vec![1, 2, 3]);
    }
}
