// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tandem_core::{ChatStore, Envelope};
use tandem_gateway::{Client, Hub, next_client_id};
use tandem_test_utils::{MockBus, TestHarness};

#[tokio::test]
async fn harness_seeds_users() {
    let harness = TestHarness::builder()
        .with_user("ann", "Ann", 40.0, -74.0)
        .with_unlocated_user("ned", "Ned")
        .build()
        .await
        .unwrap();

    let ann = harness.store().get_user(&"ann".into()).await.unwrap().unwrap();
    assert_eq!(ann.display_name, "Ann");
    assert!(ann.location.is_some());
    let ned = harness.store().get_user(&"ned".into()).await.unwrap().unwrap();
    assert!(ned.location.is_none());
    assert_eq!(harness.state().chat.hub().instance_id(), "hub-test-a");
}

#[tokio::test]
async fn hub_relays_only_foreign_envelopes() {
    let bus = MockBus::new();
    let cancel = CancellationToken::new();
    let (hub, _task) = Hub::spawn("hub-self", Arc::new(bus.clone()), cancel.clone())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    hub.register(Client {
        id: next_client_id(),
        user_id: "ann".into(),
        session_id: "s-1".into(),
        sender: tx,
    })
    .await
    .unwrap();
    // Registration is processed before anything the bus delivers next.
    assert_eq!(hub.room_size("s-1".into()).await.unwrap(), 1);

    let envelope = |data: &str, origin: &str| Envelope {
        session_id: "s-1".into(),
        data: data.to_string(),
        sender_id: "bob".into(),
        origin_instance_id: Some(origin.to_string()),
    };
    bus.inject(envelope("echo", "hub-self")).await;
    bus.inject(envelope("from-peer", "hub-peer")).await;

    let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, "from-peer");
    assert!(rx.try_recv().is_err());
    cancel.cancel();
}

#[tokio::test]
async fn local_broadcast_is_published_with_origin() {
    let bus = MockBus::new();
    let cancel = CancellationToken::new();
    let (hub, _task) = Hub::spawn("hub-self", Arc::new(bus.clone()), cancel.clone())
        .await
        .unwrap();

    hub.broadcast("s-9".into(), "ann".into(), "hello".into())
        .await
        .unwrap();

    let mut published = Vec::new();
    for _ in 0..50 {
        published = bus.published().await;
        if !published.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].origin_instance_id.as_deref(), Some("hub-self"));
    assert_eq!(published[0].data, "hello");
    cancel.cancel();
}

#[tokio::test]
async fn publish_failures_do_not_stop_local_delivery() {
    let bus = MockBus::new();
    bus.fail_publishes(true);
    let cancel = CancellationToken::new();
    let (hub, _task) = Hub::spawn("hub-self", Arc::new(bus.clone()), cancel.clone())
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    hub.register(Client {
        id: next_client_id(),
        user_id: "ann".into(),
        session_id: "s-1".into(),
        sender: tx,
    })
    .await
    .unwrap();

    for i in 0..3 {
        hub.broadcast("s-1".into(), "ann".into(), format!("m{i}"))
            .await
            .unwrap();
    }
    for i in 0..3 {
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(format!("m{i}")));
    }
    assert!(bus.published().await.is_empty());
    cancel.cancel();
}
