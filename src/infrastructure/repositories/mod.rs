//! PostgreSQL repository implementations.

pub mod message_repository;
pub mod project_repository;
pub mod room_repository;
pub mod user_repository;

pub use message_repository::PgMessageRepository;
pub use project_repository::PgProjectRepository;
pub use room_repository::PgRoomRepository;
pub use user_repository::PgUserRepository;
