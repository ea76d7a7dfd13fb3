//! Application services.

pub mod chat_service;

pub use chat_service::{ChatError, ChatService, ChatServiceImpl};

#[cfg(test)]
pub use chat_service::MockChatService;
