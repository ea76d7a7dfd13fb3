//! Request DTOs
//!
//! Data structures for API request bodies.

use serde::Deserialize;
use validator::Validate;

/// Open (or fetch) a direct chat with another user
#[derive(Debug, Deserialize)]
pub struct CreateDirectChatRequest {
    pub other_user_id: i64,
}

/// Open (or fetch) the chat room of a project
#[derive(Debug, Deserialize)]
pub struct CreateProjectChatRequest {
    pub project_id: i64,
}

/// Send a message to a room (REST fallback body)
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000, message = "Content must be 1-4000 characters"))]
    pub content: String,
}

/// Message pagination query parameters
#[derive(Debug, Deserialize)]
pub struct MessagePageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}
