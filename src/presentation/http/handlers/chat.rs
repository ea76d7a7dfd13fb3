//! Chat Handlers
//!
//! REST surface over the chat service. Room creation is idempotent, and the
//! REST send path persists and broadcasts with the same semantics as the
//! gateway's SEND_MESSAGE, so clients without a socket lose nothing.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::application::dto::request::{
    CreateDirectChatRequest, CreateProjectChatRequest, MessagePageQuery, SendMessageRequest,
};
use crate::application::dto::response::{
    ChatMessageResponse, ChatRoomResponse, PagedMessagesResponse,
};
use crate::application::services::{ChatError, ChatService};
use crate::infrastructure::metrics;
use crate::presentation::middleware::AuthUser;
use crate::presentation::websocket::messages::GatewaySend;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Default and maximum page sizes for message history
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

fn map_chat_error(e: ChatError) -> AppError {
    match e {
        ChatError::InvalidArgument(msg) => AppError::BadRequest(msg),
        ChatError::NotFound(msg) => AppError::NotFound(msg),
        ChatError::Unauthorized(msg) => AppError::Forbidden(msg),
        ChatError::Internal(msg) => AppError::Internal(msg),
    }
}

/// Roster user IDs of a shaped room, parsed back to connection targets.
fn participant_ids(room: &ChatRoomResponse) -> Vec<i64> {
    room.participants
        .iter()
        .filter_map(|p| p.user_id.parse().ok())
        .collect()
}

fn parse_room_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("Invalid room ID".into()))
}

/// List the caller's rooms, most recently active first
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ChatRoomResponse>>, AppError> {
    let service = state.chat_service();
    let rooms = service
        .list_user_rooms(auth.user_id)
        .await
        .map_err(map_chat_error)?;
    Ok(Json(rooms))
}

/// Open (or fetch) the caller's direct room with another user
pub async fn create_direct_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateDirectChatRequest>,
) -> Result<Json<ChatRoomResponse>, AppError> {
    let service = state.chat_service();
    let room = service
        .get_or_create_direct_room(auth.user_id, body.other_user_id)
        .await
        .map_err(map_chat_error)?;

    // Live connections of both participants join the broadcast group now, so
    // the first message arrives without a reconnect.
    if let Ok(room_id) = room.id.parse::<i64>() {
        state.gateway.add_users_to_room(room_id, &participant_ids(&room));
    }

    Ok(Json(room))
}

/// Open (or fetch) the project's room, joining the caller to it
pub async fn create_project_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateProjectChatRequest>,
) -> Result<Json<ChatRoomResponse>, AppError> {
    let service = state.chat_service();
    let room = service
        .get_or_create_project_room(body.project_id, auth.user_id)
        .await
        .map_err(map_chat_error)?;

    if let Ok(room_id) = room.id.parse::<i64>() {
        state.gateway.add_users_to_room(room_id, &participant_ids(&room));
    }

    Ok(Json(room))
}

/// Room detail with roster, latest message, and the caller's unread count
pub async fn get_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<ChatRoomResponse>, AppError> {
    let room_id = parse_room_id(&room_id)?;

    let service = state.chat_service();
    let room = service
        .get_room(room_id, auth.user_id)
        .await
        .map_err(map_chat_error)?;
    Ok(Json(room))
}

/// One newest-first page of a room's message history
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagePageQuery>,
) -> Result<Json<PagedMessagesResponse>, AppError> {
    let room_id = parse_room_id(&room_id)?;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let service = state.chat_service();
    let messages = service
        .get_messages(room_id, auth.user_id, page, page_size)
        .await
        .map_err(map_chat_error)?;
    Ok(Json(messages))
}

/// REST fallback send: persist, then broadcast to the room group
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessageResponse>), AppError> {
    let room_id = parse_room_id(&room_id)?;

    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = state.chat_service();
    let message = service
        .send_message(room_id, auth.user_id, &body.content)
        .await
        .map_err(map_chat_error)?;

    metrics::record_message("rest");

    // Pull live connections of every durable participant into the group
    // before broadcasting, so a connection that never subscribed (its user
    // was added to the room through another path) still gets this event.
    match service.room_member_ids(room_id).await {
        Ok(ids) => state.gateway.add_users_to_room(room_id, &ids),
        Err(e) => tracing::warn!(room_id, error = %e, "Failed to refresh room group"),
    }

    state
        .gateway
        .send_to_room(room_id, GatewaySend::message_create(&message));

    Ok((StatusCode::CREATED, Json(message)))
}

/// Flag every message the caller has not authored as read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let room_id = parse_room_id(&room_id)?;

    let service = state.chat_service();
    service
        .mark_read(room_id, auth.user_id)
        .await
        .map_err(map_chat_error)?;
    Ok(StatusCode::NO_CONTENT)
}
