//! Request and response data transfer objects.

pub mod request;
pub mod response;

pub use request::{
    CreateDirectChatRequest, CreateProjectChatRequest, MessagePageQuery, SendMessageRequest,
};
pub use response::{
    ChatMessageResponse, ChatParticipantResponse, ChatRoomResponse, PagedMessagesResponse,
};
