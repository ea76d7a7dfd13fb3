//! Response DTOs
//!
//! Data structures for API response bodies and gateway event payloads.
//! Snowflake IDs serialize as strings.

use serde::{Deserialize, Serialize};

use crate::domain::{MessageWithSender, Participant, RoomWithParticipants};

/// A message enriched with sender display fields.
///
/// This is both the REST response shape and the `MESSAGE_CREATE` gateway
/// event payload, so both ingress paths deliver identical views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
    pub content: String,
    pub created_at: String,
    pub is_read: bool,
}

impl From<MessageWithSender> for ChatMessageResponse {
    fn from(m: MessageWithSender) -> Self {
        Self {
            id: m.message.id.to_string(),
            room_id: m.message.room_id.to_string(),
            sender_id: m.message.sender_id.to_string(),
            sender_name: m.sender_name,
            sender_avatar_url: m.sender_avatar_url,
            content: m.message.content,
            created_at: m.message.created_at.to_rfc3339(),
            is_read: m.message.is_read,
        }
    }
}

/// One entry of a room's participant roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatParticipantResponse {
    pub user_id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub joined_at: String,
}

impl From<Participant> for ChatParticipantResponse {
    fn from(p: Participant) -> Self {
        Self {
            user_id: p.user_id.to_string(),
            full_name: p.full_name,
            avatar_url: p.avatar_url,
            joined_at: p.joined_at.to_rfc3339(),
        }
    }
}

/// A room as seen by one participant: roster, latest message, unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoomResponse {
    pub id: String,
    pub room_type: String,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub created_at: String,
    pub participants: Vec<ChatParticipantResponse>,
    pub last_message: Option<ChatMessageResponse>,
    pub unread_count: i64,
}

impl ChatRoomResponse {
    pub fn from_room(
        room: RoomWithParticipants,
        last_message: Option<ChatMessageResponse>,
        unread_count: i64,
    ) -> Self {
        Self {
            id: room.room.id.to_string(),
            room_type: room.room.room_type.as_str().to_string(),
            project_id: room.room.project_id.map(|id| id.to_string()),
            project_name: room.project_name,
            created_at: room.room.created_at.to_rfc3339(),
            participants: room
                .participants
                .into_iter()
                .map(ChatParticipantResponse::from)
                .collect(),
            last_message,
            unread_count,
        }
    }
}

/// One page of a room's messages with pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedMessagesResponse {
    pub items: Vec<ChatMessageResponse>,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PagedMessagesResponse {
    pub fn new(items: Vec<ChatMessageResponse>, page: i64, page_size: i64, total_count: i64) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + page_size - 1) / page_size
        };
        Self {
            items,
            page,
            page_size,
            total_count,
            total_pages,
            has_previous: page > 1,
            has_next: page < total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_metadata() {
        let paged = PagedMessagesResponse::new(Vec::new(), 3, 50, 120);
        assert_eq!(paged.total_pages, 3);
        assert!(paged.has_previous);
        assert!(!paged.has_next);

        let first = PagedMessagesResponse::new(Vec::new(), 1, 50, 120);
        assert!(!first.has_previous);
        assert!(first.has_next);
    }

    #[test]
    fn test_paged_metadata_empty_room() {
        let paged = PagedMessagesResponse::new(Vec::new(), 1, 50, 0);
        assert_eq!(paged.total_pages, 0);
        assert!(!paged.has_next);
    }
}
