// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Payload hydration and zone moves.

use trailsync_core::{Activity, Config, SyncError, make_id, payload_key, to_record};
use trailsync_remote::{ErrorCode, ZoneId};

use crate::common::{harness, harness_with, remote_activity, test_config, test_draft};

const TRACK: &[u8] = b"<gpx>compressed track</gpx>";

#[tokio::test]
async fn unsynced_activity_hydrates_from_local_blob() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("with track", 0), Some(TRACK.to_vec())).await.unwrap();

    // Act
    let hydrated = h.engine.hydrate(&activity.id).await.unwrap();

    // Assert
    assert_eq!(hydrated.activity, activity);
    assert_eq!(hydrated.track.as_deref(), Some(TRACK));
    assert!(h.store.get(&activity.id).is_none());
}

#[tokio::test]
async fn remote_activity_hydrates_once_per_session() {
    // Arrange
    let h = harness().await;
    let zone = h.zone();
    let activity = Activity::new(make_id(&zone, Some("remote")), test_draft("remote", 0), true);
    h.store.insert(to_record(&activity, Some(TRACK)));

    // Act
    let first = h.engine.hydrate(&activity.id).await.unwrap();
    h.store.remove(&activity.id);
    let cached = h.engine.hydrate(&activity.id).await.unwrap();

    // Assert
    assert_eq!(first.track.as_deref(), Some(TRACK));
    assert_eq!(cached, first);
    let blob = h.blobs.read_blob(&payload_key(&activity.id)).await.unwrap();
    assert_eq!(blob.as_deref(), Some(TRACK));
}

#[tokio::test]
async fn cleared_payload_cache_falls_back_to_remote() {
    // Arrange
    let h = harness().await;
    let zone = h.zone();
    h.store.insert(remote_activity(&zone, "plain", 0));
    let id = make_id(&zone, Some("plain"));
    h.engine.hydrate(&id).await.unwrap();

    // Act
    h.engine.clear_payload_cache();
    h.store.remove(&id);
    let err = h.engine.hydrate(&id).await.unwrap_err();

    // Assert
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn payload_cache_is_bounded() {
    // Arrange
    let h = harness_with(Config {
        payload_cache_capacity: 1,
        ..test_config()
    })
    .await;
    let zone = h.zone();
    for name in ["one", "two"] {
        h.store.insert(remote_activity(&zone, name, 0));
    }
    let one = make_id(&zone, Some("one"));
    let two = make_id(&zone, Some("two"));

    // Act
    h.engine.hydrate(&one).await.unwrap();
    h.engine.hydrate(&two).await.unwrap();
    h.store.remove(&one);
    h.store.remove(&two);

    // Assert
    assert!(h.engine.hydrate(&two).await.is_ok());
    assert!(matches!(h.engine.hydrate(&one).await, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn synced_activity_moves_to_another_zone() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("move me", 0), Some(TRACK.to_vec())).await.unwrap();
    h.engine.flush().await;
    let archive = ZoneId::from("archive");

    // Act
    let moved = h.engine.move_to_zone(&activity.id, &archive).await.unwrap();

    // Assert
    assert_eq!(moved.zone(), &archive);
    assert_eq!(moved.name(), activity.id.name());
    assert!(h.store.get(&activity.id).is_none());
    let stored = h.store.get(&moved).unwrap();
    assert_eq!(stored.field("name").and_then(|v| v.as_str()), Some("move me"));
    assert!(h.engine.get(&activity.id).await.is_none());
}

#[tokio::test]
async fn unsynced_activity_cannot_move() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("pending", 0), None).await.unwrap();

    // Act
    let err = h
        .engine
        .move_to_zone(&activity.id, &ZoneId::from("archive"))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, SyncError::Unsynced(_)));
    assert_eq!(h.store.modify_calls(), 0);
}

#[tokio::test]
async fn failed_move_changes_nothing() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("stuck", 0), None).await.unwrap();
    h.engine.flush().await;
    h.store.fail_item(activity.id.clone(), ErrorCode::ZoneBusy);

    // Act
    let err = h
        .engine
        .move_to_zone(&activity.id, &ZoneId::from("archive"))
        .await
        .unwrap_err();

    // Assert
    assert!(err.is_transient());
    assert!(h.store.get(&activity.id).is_some());
    assert!(h.engine.get(&activity.id).await.is_some());
    assert_eq!(h.store.len(), 1);
}
