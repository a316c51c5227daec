//! Sending and receiving envelopes through a live session

mod common;

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use chat_client_v1::{message_type, ClientError, ConnectionState, JoinOutcome, User};

use common::{client, Plan, ScriptedTransport};

const SELF_JOIN: &str = r#"{"self":"true","joinedUserId":"u1","joinedUserName":"Alice"}"#;

fn wire(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_incoming_messages_are_published() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    let mut messages = client.subscribe_messages();
    client.join("lobby", None, None).await.unwrap();

    let server = transport.server(0);
    server.push_envelope(message_type::MESSAGE, "hello", None);
    server.push_envelope("reaction_added", "+1", Some(r#"{"target":"srv-0"}"#));

    let first = messages.recv().await.unwrap();
    assert!(first.is_kind(message_type::MESSAGE));
    assert_eq!(first.message, "hello");
    assert_eq!(first.user, User::new("u2", "Bob"));

    let custom = messages.recv().await.unwrap();
    assert_eq!(custom.kind, "reaction_added");
    assert_eq!(custom.info("target"), Some("srv-0"));
}

#[tokio::test(start_paused = true)]
async fn test_self_identity_updates_current_user_only() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    let mut messages = client.subscribe_messages();
    let mut users = client.subscribe_current_user();
    assert_eq!(users.next().await, Some(None));
    client.join("lobby", Some("Alice"), None).await.unwrap();

    let server = transport.server(0);
    server.push_envelope(message_type::SYSTEM, "Alice joined", Some(SELF_JOIN));
    server.push_envelope(
        message_type::SYSTEM,
        "Alice joined",
        Some(r#"{"joinedUserId":"u1","joinedUserName":"Alice"}"#),
    );

    assert_eq!(users.next().await, Some(Some(User::new("u1", "Alice"))));

    let forwarded = messages.recv().await.unwrap();
    assert!(forwarded.info("self").is_none());
    assert!(messages.try_recv().is_none());
    assert_eq!(client.current_user(), Some(User::new("u1", "Alice")));

    client.disconnect().await;
    assert_eq!(users.next().await, Some(None));
    assert!(client.current_user().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_does_not_interrupt_delivery() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    let mut messages = client.subscribe_messages();
    client.join("lobby", None, None).await.unwrap();
    let mut states = client.subscribe_connection_state();
    assert_eq!(states.next().await, Some(ConnectionState::Connected));

    let server = transport.server(0);
    server.push_envelope(message_type::MESSAGE, "before", None);
    server.push_text(r#"{"type":"message","message":"#);
    server.push_envelope(message_type::MESSAGE, "after", None);

    assert_eq!(messages.recv().await.unwrap().message, "before");
    assert_eq!(messages.recv().await.unwrap().message, "after");
    assert_eq!(states.try_next(), None);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_send_message_wire_format() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    client.join("lobby", None, None).await.unwrap();

    let mut info = HashMap::new();
    info.insert("replyTo".to_string(), "srv-0".to_string());
    assert!(client.send_message("hi there", None).await);
    assert!(client.send_message("threaded", Some(info)).await);

    let sent = transport.server(0).sent();
    assert_eq!(wire(&sent[0]), json!({"type": "message", "message": "hi there"}));
    assert_eq!(
        wire(&sent[1]),
        json!({"type": "message", "message": "threaded", "additionalInfo": {"replyTo": "srv-0"}})
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_image_wire_format() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    client.join("lobby", None, None).await.unwrap();

    let bytes = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    let mut info = HashMap::new();
    info.insert("caption".to_string(), "x".to_string());
    assert!(client.send_image(&bytes, "image/png", Some(info)).await);

    let sent = transport.server(0).sent();
    assert_eq!(
        wire(&sent[0]),
        json!({
            "type": "image",
            "message": STANDARD.encode(bytes),
            "additionalInfo": {"caption": "x", "mimeType": "image/png"}
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_typing_events() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    client.join("lobby", None, None).await.unwrap();

    assert!(client.send_typing().await);
    assert!(client.send_stopped_typing().await);
    assert!(client.send_event("poll_vote", "2", None).await);

    let sent: Vec<Value> = transport.server(0).sent().iter().map(|s| wire(s)).collect();
    assert_eq!(
        sent,
        vec![
            json!({"type": "user_typing", "message": ""}),
            json!({"type": "user_stopped_typing", "message": ""}),
            json!({"type": "poll_vote", "message": "2"}),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_without_session_returns_false() {
    let transport = ScriptedTransport::new([Plan::Refuse; 0]);
    let client = client(&transport);

    assert!(!client.send_message("hello", None).await);
    assert!(!client.send_typing().await);
    assert_eq!(client.connection_state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_ends_session() {
    let transport = ScriptedTransport::new([Plan::Accept, Plan::Accept]);
    let client = client(&transport);
    client.join("lobby", None, None).await.unwrap();

    transport.server(0).fail_sends();
    assert!(!client.send_message("lost", None).await);

    assert!(matches!(
        client.connection_state().cause(),
        Some(ClientError::Transport(_))
    ));
    assert!(!client.is_connected());
    assert!(!client.send_message("still lost", None).await);

    assert_eq!(
        client.join("lobby", None, None).await.unwrap(),
        JoinOutcome::Connected
    );
    assert!(client.send_message("delivered", None).await);
    assert_eq!(transport.server(1).sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_ends_subscriptions() {
    let transport = ScriptedTransport::new([Plan::Accept]);
    let client = client(&transport);
    let mut messages = client.subscribe_messages();
    client.join("lobby", None, None).await.unwrap();

    drop(client);

    assert!(messages.recv().await.is_none());
}
