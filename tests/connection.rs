mod common;

use std::time::Duration;

use serde_json::json;

use common::{frame, FakeTransport};
use partychat::api::events::MESSAGE_NEW;
use partychat::{ConnectionManager, ReconnectPolicy};

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy { initial_delay_ms: 10, max_delay_ms: 10, max_attempts: 0 }
}

#[tokio::test]
async fn opens_once_per_identity() {
    let (transport, mut opened) = FakeTransport::new();
    let (mut manager, _events) = ConnectionManager::new(transport, fast_policy());

    assert!(manager.set_identity(Some("u1".into())).await);
    let (user, _feed) = opened.recv().await.unwrap();
    assert_eq!(user, "u1");
    assert_eq!(manager.current_user(), Some("u1"));

    assert!(!manager.set_identity(Some("u1".into())).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(opened.try_recv().is_err());
}

#[tokio::test]
async fn switching_identity_closes_the_old_connection_first() {
    let (transport, mut opened) = FakeTransport::new();
    let (mut manager, mut events) = ConnectionManager::new(transport, fast_policy());

    manager.set_identity(Some("u1".into())).await;
    let (_, old_feed) = opened.recv().await.unwrap();
    let first_generation = manager.generation().unwrap();

    manager.set_identity(Some("u2".into())).await;
    let (user, new_feed) = opened.recv().await.unwrap();
    assert_eq!(user, "u2");
    assert!(manager.generation().unwrap() > first_generation);

    // The old connection task is gone, so its stream receiver has been dropped.
    assert!(old_feed.is_closed());

    new_feed.send(frame(MESSAGE_NEW, json!({"id": "m1"}))).unwrap();
    let tagged = events.recv().await.unwrap();
    assert!(manager.is_current(&tagged));
    assert_eq!(tagged.event.event, MESSAGE_NEW);
}

#[tokio::test]
async fn events_buffered_before_a_switch_are_stale() {
    let (transport, mut opened) = FakeTransport::new();
    let (mut manager, mut events) = ConnectionManager::new(transport, fast_policy());

    manager.set_identity(Some("u1".into())).await;
    let (_, feed) = opened.recv().await.unwrap();
    feed.send(frame(MESSAGE_NEW, json!({"id": "late"}))).unwrap();
    let stale = events.recv().await.unwrap();
    assert!(manager.is_current(&stale));

    manager.set_identity(Some("u2".into())).await;
    assert!(!manager.is_current(&stale));

    manager.set_identity(None).await;
    assert_eq!(manager.current_user(), None);
    assert_eq!(manager.generation(), None);
}

#[tokio::test]
async fn ended_stream_is_reopened_for_the_same_user() {
    let (transport, mut opened) = FakeTransport::new();
    let (mut manager, mut events) = ConnectionManager::new(transport, fast_policy());

    manager.set_identity(Some("u1".into())).await;
    let generation = manager.generation();
    let (_, feed) = opened.recv().await.unwrap();
    drop(feed);

    let (user, feed) = tokio::time::timeout(Duration::from_secs(2), opened.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user, "u1");
    assert_eq!(manager.generation(), generation);

    feed.send(frame(MESSAGE_NEW, json!({"id": "m2"}))).unwrap();
    assert!(manager.is_current(&events.recv().await.unwrap()));
}

#[tokio::test]
async fn undecodable_frames_do_not_drop_the_connection() {
    let (transport, mut opened) = FakeTransport::new();
    let (mut manager, mut events) = ConnectionManager::new(transport, fast_policy());

    manager.set_identity(Some("u1".into())).await;
    let (_, feed) = opened.recv().await.unwrap();
    let garbage = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    feed.send(Err(garbage.into())).unwrap();
    feed.send(frame(MESSAGE_NEW, json!({"id": "m3"}))).unwrap();

    let tagged = events.recv().await.unwrap();
    assert_eq!(tagged.event.data["id"], "m3");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(opened.try_recv().is_err());
}
