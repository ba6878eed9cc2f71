// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: real sockets, two gateway instances, one shared bus.
//!
//! Each test creates an isolated TestHarness with a temp SQLite database.
//! Tests are independent and order-insensitive.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tandem_core::{ChatStore, SessionId, SessionStatus, UserId};
use tandem_test_utils::TestHarness;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn paired_harness() -> TestHarness {
    TestHarness::builder()
        .with_user("alice", "Alice", 40.7128, -74.0060)
        .with_user("bob", "Bob", 40.3, -74.2)
        .build()
        .await
        .unwrap()
}

async fn connect(
    addr: SocketAddr,
    session: &SessionId,
    user: &str,
) -> Result<Socket, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}/api/chat/ws?session_id={session}")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("x-user-id", HeaderValue::from_str(user).unwrap());
    let (socket, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(socket)
}

/// Next text frame, skipping pings.
async fn next_frame(socket: &mut Socket) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, frame: &str) {
    socket.send(Message::Text(frame.into())).await.unwrap();
}

/// Wait until the room on `state`'s hub has `expected` connections.
async fn wait_for_room(state: &tandem_gateway::GatewayState, session: &SessionId, expected: usize) {
    for _ in 0..100 {
        if state.chat.hub().room_size(session.clone()).await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {session} never reached {expected} connections");
}

#[tokio::test]
async fn messages_cross_instances_exactly_once() {
    let harness = paired_harness().await;
    let addr_a = harness.start_server().await.unwrap();
    let state_b = harness.instance("hub-test-b").await.unwrap();
    let addr_b = harness.serve(state_b.clone()).await.unwrap();

    let matched = harness
        .matcher()
        .find_or_create_match(&"alice".into())
        .await
        .unwrap();
    let session = matched.session_id;

    let mut alice = connect(addr_a, &session, "alice").await.unwrap();
    let mut bob = connect(addr_b, &session, "bob").await.unwrap();
    wait_for_room(&harness.state(), &session, 1).await;
    wait_for_room(&state_b, &session, 1).await;

    send(&mut alice, r#"{"type": "message", "content": "hello from A"}"#).await;

    let echoed = next_frame(&mut alice).await;
    assert_eq!(echoed["content"], "hello from A");

    let received = next_frame(&mut bob).await;
    assert_eq!(received["type"], "message");
    assert_eq!(received["content"], "hello from A");
    assert_eq!(received["sender_id"], "alice");
    assert_eq!(received["session_id"], session.as_str());

    // No duplicate from the relay path.
    let extra = tokio::time::timeout(Duration::from_millis(200), bob.next()).await;
    assert!(extra.is_err(), "bob received a second frame: {extra:?}");

    let history = harness.store().get_messages(&session).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_id, UserId::from("alice"));
}

#[tokio::test]
async fn ending_a_chat_closes_both_sockets() {
    let harness = paired_harness().await;
    let addr_a = harness.start_server().await.unwrap();
    let state_b = harness.instance("hub-test-b").await.unwrap();
    let addr_b = harness.serve(state_b.clone()).await.unwrap();

    let session = harness
        .matcher()
        .find_or_create_match(&"bob".into())
        .await
        .unwrap()
        .session_id;

    let mut alice = connect(addr_a, &session, "alice").await.unwrap();
    let mut bob = connect(addr_b, &session, "bob").await.unwrap();
    wait_for_room(&harness.state(), &session, 1).await;
    wait_for_room(&state_b, &session, 1).await;

    state_b.chat.end_chat(&session, &"bob".into()).await.unwrap();

    for socket in [&mut alice, &mut bob] {
        let ended = next_frame(socket).await;
        assert_eq!(ended["type"], "chat_ended");
        assert_eq!(ended["sender_id"], "bob");

        let closed = tokio::time::timeout(WAIT, async {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "socket was not closed after chat_ended");
    }

    let stored = harness.store().get_session(&session).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::EndedByUser);

    // Ended sessions refuse new connections.
    assert!(connect(addr_a, &session, "alice").await.is_err());
}

#[tokio::test]
async fn strangers_cannot_join_a_room() {
    let harness = TestHarness::builder()
        .with_user("alice", "Alice", 40.7128, -74.0060)
        .with_user("bob", "Bob", 40.3, -74.2)
        .with_user("mallory", "Mallory", 51.5074, -0.1278)
        .build()
        .await
        .unwrap();
    let addr = harness.start_server().await.unwrap();
    let session = harness
        .matcher()
        .find_or_create_match(&"alice".into())
        .await
        .unwrap()
        .session_id;

    assert!(connect(addr, &session, "mallory").await.is_err());
    assert!(connect(addr, &SessionId::from("missing"), "alice").await.is_err());
}

#[tokio::test]
async fn daily_cycle_pairs_then_scores() {
    let harness = TestHarness::builder()
        .with_user("alice", "Alice", 40.7128, -74.0060)
        .with_user("bob", "Bob", 40.3, -74.2)
        .with_user("carol", "Carol", 40.73, -73.99)
        .with_user("dave", "Dave", 40.35, -74.25)
        .build()
        .await
        .unwrap();

    let report = harness.matcher().run_batch_matching().await.unwrap();
    assert_eq!(report.eligible_users, 4);
    assert_eq!(report.sessions_created, 2);

    let alice_match = harness
        .matcher()
        .today_match(&"alice".into())
        .await
        .unwrap()
        .expect("alice is matched");

    let addr = harness.start_server().await.unwrap();
    let mut alice = connect(addr, &alice_match.session_id, "alice").await.unwrap();
    wait_for_room(&harness.state(), &alice_match.session_id, 1).await;
    send(&mut alice, r#"{"type": "message", "content": "anyone there?"}"#).await;
    next_frame(&mut alice).await;

    let cleanup = harness.scheduler().midnight_cleanup().await.unwrap();
    assert_eq!(cleanup.sessions_ended, 2);

    let store = harness.store();
    let alice_score = store.get_engagement(&"alice".into()).await.unwrap().unwrap();
    let partner = alice_match.partner_id.clone();
    let partner_score = store.get_engagement(&partner).await.unwrap().unwrap();
    // One message sent: +0.5. The silent partner: -10.
    assert_eq!(alice_score.score, 50.5);
    assert_eq!(partner_score.score, 40.0);

    let stored = store.get_session(&alice_match.session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::EndedBySystem);

    // Cleanup already scored every session; a manual rescore is a no-op.
    let rescored = harness
        .scoring()
        .scheduled_score_update(tandem_core::clock::today())
        .await;
    assert_eq!(rescored, 0);
    let after = store.get_engagement(&"alice".into()).await.unwrap().unwrap();
    assert_eq!(after.score, 50.5);
    assert_eq!(after.total_chats, 1);
}
