//! WebSocket Connection Handler
//!
//! Drives one connection through its lifecycle: Hello, Identify (with
//! timeout), READY with the user's rooms, then the dispatch loop. On any exit
//! path after identification the session is unregistered from the gateway, so
//! a dropped connection never lingers in any broadcast group.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use super::gateway::ChatGateway;
use super::messages::{
    GatewayReceive, GatewaySend, IdentifyPayload, OpCode, ReadyPayload, RoomCommandPayload,
    SendMessagePayload, CMD_JOIN_ROOM, CMD_LEAVE_ROOM, CMD_SEND_MESSAGE, EVENT_READY,
};
use super::session::SessionState;
use crate::application::services::{ChatError, ChatService};
use crate::infrastructure::metrics;
use crate::presentation::middleware::auth::decode_user_id;
use crate::startup::AppState;

/// Extra slack on top of the heartbeat interval before a silent connection
/// is considered dead.
const HEARTBEAT_GRACE_MS: u64 = 10_000;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let mut session_state = SessionState::new(session_id.clone());

    tracing::debug!(session_id = %session_id, "New WebSocket connection");
    metrics::connection_opened("connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewaySend>();

    let hello = GatewaySend::hello(state.settings.websocket.heartbeat_interval_ms);
    let hello_text = match serde_json::to_string(&hello) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to serialize Hello: {}", e);
            metrics::connection_closed("connected");
            return;
        }
    };
    if let Err(e) = sender.send(Message::Text(hello_text.into())).await {
        tracing::error!("Failed to send Hello: {}", e);
        metrics::connection_closed("connected");
        return;
    }

    // Forward queued frames to the socket until the queue or socket closes.
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let identify_result = timeout(identify_timeout, await_identify(&mut receiver)).await;

    let identify = match identify_result {
        Ok(Some(identify)) => identify,
        Ok(None) => {
            tracing::debug!(session_id = %session_id, "Connection closed before Identify");
            metrics::connection_closed("connected");
            sender_task.abort();
            return;
        }
        Err(_) => {
            tracing::debug!(session_id = %session_id, "Identify timeout");
            let _ = tx.send(GatewaySend::invalid_session());
            tokio::time::sleep(Duration::from_millis(100)).await;
            metrics::connection_closed("connected");
            sender_task.abort();
            return;
        }
    };

    // An invalid token never touches the registry or any group.
    let user_id = match decode_user_id(&identify.token, &state.settings.jwt.secret) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Invalid token");
            let _ = tx.send(GatewaySend::invalid_session());
            tokio::time::sleep(Duration::from_millis(100)).await;
            metrics::connection_closed("connected");
            sender_task.abort();
            return;
        }
    };

    let service = state.chat_service();

    // Rooms the user durably belongs to; each becomes an auto-subscription.
    let rooms = match service.list_user_rooms(user_id).await {
        Ok(rooms) => rooms,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Failed to load rooms");
            let _ = tx.send(GatewaySend::invalid_session());
            tokio::time::sleep(Duration::from_millis(100)).await;
            metrics::connection_closed("connected");
            sender_task.abort();
            return;
        }
    };

    session_state.user_id = user_id;
    session_state.identified = true;

    state.gateway.register_session(&session_id, user_id, tx.clone());
    metrics::connection_opened("identified");

    for room in &rooms {
        if let Ok(room_id) = room.id.parse::<i64>() {
            state.gateway.subscribe_to_room(&session_id, room_id);
        }
    }

    let ready = GatewaySend::dispatch(
        EVENT_READY,
        &ReadyPayload {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            rooms,
        },
    );
    if tx.send(ready).is_err() {
        state.gateway.unregister_session(&session_id);
        metrics::connection_closed("identified");
        metrics::connection_closed("connected");
        sender_task.abort();
        return;
    }

    tracing::info!(
        user_id = user_id,
        session_id = %session_id,
        "User connected and identified"
    );

    let heartbeat_interval_ms = state.settings.websocket.heartbeat_interval_ms;
    let timeout_ms = heartbeat_interval_ms + HEARTBEAT_GRACE_MS;
    let mut heartbeat_check = interval(Duration::from_millis(timeout_ms));
    heartbeat_check.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&text, &mut session_state, &tx, &service, &state.gateway)
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = %session_id, "Connection closed");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled automatically by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = heartbeat_check.tick() => {
                if !session_state.is_alive(timeout_ms) {
                    tracing::info!(
                        session_id = %session_id,
                        "Heartbeat timeout, closing connection"
                    );
                    break;
                }
            }
        }
    }

    // Cleanup is unconditional whatever ended the loop.
    state.gateway.unregister_session(&session_id);
    metrics::connection_closed("identified");
    metrics::connection_closed("connected");
    sender_task.abort();

    tracing::info!(
        user_id = user_id,
        session_id = %session_id,
        "User disconnected"
    );
}

/// Read frames until an Identify arrives or the stream ends.
async fn await_identify(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<IdentifyPayload> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(frame) = serde_json::from_str::<GatewayReceive>(&text) {
                    if frame.op == OpCode::Identify as u8 {
                        if let Some(d) = frame.d {
                            if let Ok(identify) = serde_json::from_value::<IdentifyPayload>(d) {
                                return Some(identify);
                            }
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => return None,
            Err(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Handle one incoming frame after identification.
async fn handle_message(
    text: &str,
    session_state: &mut SessionState,
    tx: &mpsc::UnboundedSender<GatewaySend>,
    service: &impl ChatService,
    gateway: &ChatGateway,
) {
    let frame: GatewayReceive = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(
                session_id = %session_state.session_id,
                error = %e,
                "Malformed frame"
            );
            let _ = tx.send(GatewaySend::error("Malformed gateway frame"));
            return;
        }
    };

    match frame.op {
        op if op == OpCode::Heartbeat as u8 => {
            session_state.heartbeat();
            let _ = tx.send(GatewaySend::heartbeat_ack());
            tracing::trace!(session_id = %session_state.session_id, "Heartbeat received");
        }

        op if op == OpCode::Dispatch as u8 => {
            let event = frame.t.as_deref().unwrap_or("");
            match event {
                CMD_JOIN_ROOM => {
                    handle_join_room(frame.d, session_state, tx, service, gateway).await;
                }
                CMD_LEAVE_ROOM => {
                    handle_leave_room(frame.d, session_state, tx, gateway);
                }
                CMD_SEND_MESSAGE => {
                    handle_send_message(frame.d, session_state, tx, service, gateway).await;
                }
                other => {
                    tracing::debug!(
                        session_id = %session_state.session_id,
                        event = other,
                        "Unknown dispatch event"
                    );
                    let _ = tx.send(GatewaySend::error("Unknown event"));
                }
            }
        }

        op => {
            tracing::debug!(
                session_id = %session_state.session_id,
                op = op,
                "Unknown opcode"
            );
        }
    }
}

/// JOIN_ROOM: membership-gated subscription, then reads are flagged.
async fn handle_join_room(
    payload: Option<serde_json::Value>,
    session_state: &SessionState,
    tx: &mpsc::UnboundedSender<GatewaySend>,
    service: &impl ChatService,
    gateway: &ChatGateway,
) {
    let Some(room_id) = parse_room_command(payload) else {
        let _ = tx.send(GatewaySend::error("Invalid JOIN_ROOM payload"));
        return;
    };

    match service.is_participant(room_id, session_state.user_id).await {
        Ok(true) => {
            gateway.subscribe_to_room(&session_state.session_id, room_id);

            // Opening a room means the user has seen its backlog. The
            // subscription stands either way; only the caller hears about a
            // failed read flag.
            if let Err(e) = service.mark_read(room_id, session_state.user_id).await {
                tracing::warn!(
                    room_id,
                    user_id = session_state.user_id,
                    error = %e,
                    "Failed to mark messages read on join"
                );
                let _ = tx.send(GatewaySend::error("Failed to mark messages as read"));
            }
        }
        Ok(false) => {
            let _ = tx.send(GatewaySend::error(
                "You are not a participant of this chat room",
            ));
        }
        Err(e) => {
            tracing::error!(room_id, error = %e, "Participation check failed");
            let _ = tx.send(GatewaySend::error("Failed to join room"));
        }
    }
}

/// LEAVE_ROOM: unconditional unsubscribe, no membership check.
fn handle_leave_room(
    payload: Option<serde_json::Value>,
    session_state: &SessionState,
    tx: &mpsc::UnboundedSender<GatewaySend>,
    gateway: &ChatGateway,
) {
    let Some(room_id) = parse_room_command(payload) else {
        let _ = tx.send(GatewaySend::error("Invalid LEAVE_ROOM payload"));
        return;
    };

    gateway.unsubscribe_from_room(&session_state.session_id, room_id);
}

/// SEND_MESSAGE: persist first, then broadcast to the room group. Failures
/// go back to the caller only.
async fn handle_send_message(
    payload: Option<serde_json::Value>,
    session_state: &SessionState,
    tx: &mpsc::UnboundedSender<GatewaySend>,
    service: &impl ChatService,
    gateway: &ChatGateway,
) {
    let parsed = payload.and_then(|d| serde_json::from_value::<SendMessagePayload>(d).ok());
    let Some(payload) = parsed else {
        let _ = tx.send(GatewaySend::error("Invalid SEND_MESSAGE payload"));
        return;
    };
    let Ok(room_id) = payload.room_id.parse::<i64>() else {
        let _ = tx.send(GatewaySend::error("Invalid room ID"));
        return;
    };

    match service
        .send_message(room_id, session_state.user_id, &payload.content)
        .await
    {
        Ok(message) => {
            metrics::record_message("gateway");
            gateway.send_to_room(room_id, GatewaySend::message_create(&message));
        }
        Err(e) => {
            if matches!(e, ChatError::Internal(_)) {
                tracing::error!(room_id, error = %e, "Failed to send message");
                let _ = tx.send(GatewaySend::error("Failed to send message"));
            } else {
                let _ = tx.send(GatewaySend::error(&e.to_string()));
            }
        }
    }
}

fn parse_room_command(payload: Option<serde_json::Value>) -> Option<i64> {
    payload
        .and_then(|d| serde_json::from_value::<RoomCommandPayload>(d).ok())
        .and_then(|cmd| cmd.room_id.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::messages::EVENT_ERROR;
    use super::super::registry::ConnectionRegistry;
    use super::*;
    use crate::application::services::MockChatService;

    #[tokio::test]
    async fn join_room_failed_read_flag_is_reported_to_the_caller() {
        let gateway = ChatGateway::new(Arc::new(ConnectionRegistry::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        gateway.register_session("s-1", 5, tx.clone());

        let mut session = SessionState::new("s-1".into());
        session.user_id = 5;
        session.identified = true;

        let mut service = MockChatService::new();
        service.expect_is_participant().returning(|_, _| Ok(true));
        service
            .expect_mark_read()
            .returning(|_, _| Err(ChatError::Internal("store down".into())));

        handle_join_room(
            Some(serde_json::json!({"room_id": "7"})),
            &session,
            &tx,
            &service,
            &gateway,
        )
        .await;

        // The subscription stands even though the read flag failed.
        assert_eq!(gateway.session_rooms("s-1"), vec![7]);

        let mut saw_error = false;
        while let Ok(frame) = rx.try_recv() {
            if frame.t.as_deref() == Some(EVENT_ERROR) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn test_parse_room_command() {
        let payload = serde_json::json!({"room_id": "77"});
        assert_eq!(parse_room_command(Some(payload)), Some(77));
        assert_eq!(parse_room_command(None), None);
        assert_eq!(
            parse_room_command(Some(serde_json::json!({"room_id": "abc"}))),
            None
        );
    }
}
