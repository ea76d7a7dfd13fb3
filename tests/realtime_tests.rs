//! Realtime Delivery Tests
//!
//! Exercises the connection registry and room broadcast groups end to end,
//! without a database: sessions are registered with plain channels standing
//! in for sockets, and the tests assert exactly what each connection sees.

use std::sync::Arc;

use tokio::sync::mpsc;

use platform_chat::application::dto::response::ChatMessageResponse;
use platform_chat::presentation::websocket::messages::{GatewaySend, EVENT_MESSAGE_CREATE};
use platform_chat::presentation::websocket::{ChatGateway, ConnectionRegistry};

struct TestConnection {
    session_id: String,
    rx: mpsc::UnboundedReceiver<GatewaySend>,
}

impl TestConnection {
    /// Drain everything queued so far.
    fn drain(&mut self) -> Vec<GatewaySend> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn message_create_count(&mut self) -> usize {
        self.drain()
            .iter()
            .filter(|f| f.t.as_deref() == Some(EVENT_MESSAGE_CREATE))
            .count()
    }
}

fn gateway() -> Arc<ChatGateway> {
    Arc::new(ChatGateway::new(Arc::new(ConnectionRegistry::new())))
}

fn connect(gateway: &ChatGateway, session_id: &str, user_id: i64) -> TestConnection {
    let (tx, rx) = mpsc::unbounded_channel();
    gateway.register_session(session_id, user_id, tx);
    TestConnection {
        session_id: session_id.to_string(),
        rx,
    }
}

fn sample_message(room_id: i64, sender_id: i64, content: &str) -> ChatMessageResponse {
    ChatMessageResponse {
        id: "1001".into(),
        room_id: room_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_name: format!("User {}", sender_id),
        sender_avatar_url: None,
        content: content.into(),
        created_at: chrono::Utc::now().to_rfc3339(),
        is_read: false,
    }
}

#[tokio::test]
async fn broadcast_reaches_every_subscribed_connection_once() {
    let gw = gateway();

    // User 1 on two devices, user 2 on one; all in room 7.
    let mut alice_phone = connect(&gw, "alice-phone", 1);
    let mut alice_laptop = connect(&gw, "alice-laptop", 1);
    let mut bob = connect(&gw, "bob", 2);
    for conn in [&alice_phone, &alice_laptop, &bob] {
        gw.subscribe_to_room(&conn.session_id, 7);
    }

    gw.send_to_room(7, GatewaySend::message_create(&sample_message(7, 1, "hi")));

    // The sender's other device gets the event too.
    assert_eq!(alice_phone.message_create_count(), 1);
    assert_eq!(alice_laptop.message_create_count(), 1);
    assert_eq!(bob.message_create_count(), 1);
}

#[tokio::test]
async fn offline_participants_are_silently_skipped() {
    let gw = gateway();

    let mut alice = connect(&gw, "alice", 1);
    gw.subscribe_to_room(&alice.session_id, 7);
    // User 2 never connects.

    gw.send_to_room(7, GatewaySend::message_create(&sample_message(7, 1, "hi")));

    let frames = alice.drain();
    assert_eq!(frames.len(), 1);
    // No error frame is generated for the absent participant.
    assert!(frames.iter().all(|f| f.t.as_deref() == Some(EVENT_MESSAGE_CREATE)));
}

#[tokio::test]
async fn duplicate_subscription_does_not_double_deliver() {
    let gw = gateway();

    let mut alice = connect(&gw, "alice", 1);
    gw.subscribe_to_room(&alice.session_id, 7);
    gw.subscribe_to_room(&alice.session_id, 7);

    gw.send_to_room(7, GatewaySend::message_create(&sample_message(7, 2, "hi")));

    assert_eq!(alice.message_create_count(), 1);
    assert_eq!(gw.room_group_size(7), 1);
}

#[tokio::test]
async fn add_users_to_room_subscribes_all_live_devices() {
    let gw = gateway();

    let mut alice_phone = connect(&gw, "alice-phone", 1);
    let mut alice_laptop = connect(&gw, "alice-laptop", 1);
    let mut bob = connect(&gw, "bob", 2);
    let mut carol = connect(&gw, "carol", 3);

    // Room 9 was just created for users 1 and 2; user 3 is not on it.
    gw.add_users_to_room(9, &[1, 2]);

    gw.send_to_room(9, GatewaySend::message_create(&sample_message(9, 1, "hi")));

    assert_eq!(alice_phone.message_create_count(), 1);
    assert_eq!(alice_laptop.message_create_count(), 1);
    assert_eq!(bob.message_create_count(), 1);
    assert_eq!(carol.message_create_count(), 0);
}

#[tokio::test]
async fn unsubscribed_connection_stops_receiving() {
    let gw = gateway();

    let mut alice = connect(&gw, "alice", 1);
    let mut bob = connect(&gw, "bob", 2);
    gw.subscribe_to_room(&alice.session_id, 7);
    gw.subscribe_to_room(&bob.session_id, 7);

    gw.unsubscribe_from_room(&bob.session_id, 7);

    gw.send_to_room(7, GatewaySend::message_create(&sample_message(7, 1, "hi")));

    assert_eq!(alice.message_create_count(), 1);
    assert_eq!(bob.message_create_count(), 0);
}

#[tokio::test]
async fn disconnect_cleans_up_groups_and_registry() {
    let gw = gateway();

    let alice = connect(&gw, "alice", 1);
    let mut bob = connect(&gw, "bob", 2);
    gw.subscribe_to_room(&alice.session_id, 7);
    gw.subscribe_to_room(&alice.session_id, 8);
    gw.subscribe_to_room(&bob.session_id, 7);

    gw.unregister_session(&alice.session_id);

    assert!(!gw.registry().is_online(1));
    assert!(gw.registry().is_online(2));
    assert_eq!(gw.room_group_size(7), 1);
    assert_eq!(gw.room_group_size(8), 0);
    assert_eq!(gw.session_count(), 1);

    // Remaining subscriber is unaffected.
    gw.send_to_room(7, GatewaySend::message_create(&sample_message(7, 2, "hi")));
    assert_eq!(bob.message_create_count(), 1);
}

#[tokio::test]
async fn multi_device_user_stays_online_until_last_disconnect() {
    let gw = gateway();

    let phone = connect(&gw, "alice-phone", 1);
    let laptop = connect(&gw, "alice-laptop", 1);

    gw.unregister_session(&phone.session_id);
    assert!(gw.registry().is_online(1));

    gw.unregister_session(&laptop.session_id);
    assert!(!gw.registry().is_online(1));
    assert_eq!(gw.registry().online_user_count(), 0);
}

#[tokio::test]
async fn send_to_unknown_session_reports_failure() {
    let gw = gateway();

    assert!(!gw.send_to_session("ghost", GatewaySend::heartbeat_ack()));

    let mut alice = connect(&gw, "alice", 1);
    assert!(gw.send_to_session(&alice.session_id, GatewaySend::heartbeat_ack()));
    assert_eq!(alice.drain().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_churn_and_broadcast_both_complete() {
    let gw = gateway();

    let mut seed = connect(&gw, "seed", 1);
    gw.subscribe_to_room(&seed.session_id, 7);

    // Broadcasts, connect-time subscriptions, and disconnect cleanup all
    // running at once must not wedge on the gateway's internal maps.
    let broadcaster = {
        let gw = Arc::clone(&gw);
        tokio::task::spawn_blocking(move || {
            let message = sample_message(7, 1, "hi");
            for _ in 0..2_000 {
                gw.send_to_room(7, GatewaySend::message_create(&message));
            }
        })
    };
    let churner = {
        let gw = Arc::clone(&gw);
        tokio::task::spawn_blocking(move || {
            for i in 0..2_000 {
                let session_id = format!("churn-{i}");
                let (tx, _rx) = mpsc::unbounded_channel();
                gw.register_session(&session_id, 2, tx);
                gw.subscribe_to_room(&session_id, 7);
                gw.unregister_session(&session_id);
            }
        })
    };

    broadcaster.await.unwrap();
    churner.await.unwrap();

    // The persistent subscriber saw every broadcast exactly once.
    assert_eq!(seed.message_create_count(), 2_000);
    assert_eq!(gw.room_group_size(7), 1);
    assert_eq!(gw.session_count(), 1);
}

#[tokio::test]
async fn broadcast_to_room_without_group_is_a_noop() {
    let gw = gateway();
    let mut alice = connect(&gw, "alice", 1);

    gw.send_to_room(404, GatewaySend::message_create(&sample_message(404, 1, "hi")));

    assert_eq!(alice.message_create_count(), 0);
}
