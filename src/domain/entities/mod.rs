//! Core domain entities and repository traits.

pub mod message;
pub mod project;
pub mod room;
pub mod user;

pub use message::{ChatMessage, MessageRepository, MessageWithSender, MAX_CONTENT_LENGTH};
pub use project::{Project, ProjectRepository};
pub use room::{
    direct_room_key, Participant, Room, RoomRepository, RoomType, RoomWithParticipants,
};
pub use user::{User, UserRepository};

#[cfg(test)]
pub use message::MockMessageRepository;
#[cfg(test)]
pub use project::MockProjectRepository;
#[cfg(test)]
pub use room::MockRoomRepository;
#[cfg(test)]
pub use user::MockUserRepository;
