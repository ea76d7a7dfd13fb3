//! WebSocket Message Types
//!
//! Gateway frame formats. Every frame is a JSON envelope `{op, t, d}`;
//! domain traffic travels as op 0 dispatches with an event name in `t`.

use serde::{Deserialize, Serialize};

use crate::application::dto::response::{ChatMessageResponse, ChatRoomResponse};

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch (both directions)
    Dispatch = 0,
    /// Heartbeat
    Heartbeat = 1,
    /// Identify
    Identify = 2,
    /// Invalid session
    InvalidSession = 9,
    /// Hello
    Hello = 10,
    /// Heartbeat ACK
    HeartbeatAck = 11,
}

/// Client-to-server event names
pub const CMD_JOIN_ROOM: &str = "JOIN_ROOM";
pub const CMD_LEAVE_ROOM: &str = "LEAVE_ROOM";
pub const CMD_SEND_MESSAGE: &str = "SEND_MESSAGE";

/// Server-to-client event names
pub const EVENT_READY: &str = "READY";
pub const EVENT_MESSAGE_CREATE: &str = "MESSAGE_CREATE";
pub const EVENT_ERROR: &str = "ERROR";

/// Incoming gateway frame
#[derive(Debug, Deserialize)]
pub struct GatewayReceive {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub t: Option<String>,
}

/// Outgoing gateway frame
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewaySend {
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self {
            op: OpCode::Hello as u8,
            d: serde_json::to_value(HelloPayload { heartbeat_interval }).ok(),
            t: None,
        }
    }

    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck as u8,
            d: None,
            t: None,
        }
    }

    pub fn invalid_session() -> Self {
        Self {
            op: OpCode::InvalidSession as u8,
            d: Some(serde_json::json!(false)),
            t: None,
        }
    }

    pub fn dispatch<T: Serialize>(event: &str, payload: &T) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: serde_json::to_value(payload).ok(),
            t: Some(event.to_string()),
        }
    }

    /// Caller-only error event; never broadcast.
    pub fn error(reason: &str) -> Self {
        Self::dispatch(EVENT_ERROR, &ErrorPayload {
            message: reason.to_string(),
        })
    }

    /// New-message event carrying the full message view.
    pub fn message_create(message: &ChatMessageResponse) -> Self {
        Self::dispatch(EVENT_MESSAGE_CREATE, message)
    }
}

/// Hello payload (op 10)
#[derive(Debug, Serialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

/// Ready payload (dispatch READY)
#[derive(Debug, Serialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub user_id: String,
    pub rooms: Vec<ChatRoomResponse>,
}

/// Error payload (dispatch ERROR)
#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// JOIN_ROOM / LEAVE_ROOM payload
#[derive(Debug, Deserialize)]
pub struct RoomCommandPayload {
    pub room_id: String,
}

/// SEND_MESSAGE payload
#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    pub room_id: String,
    pub content: String,
}
