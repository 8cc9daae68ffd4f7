// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Crash safety of the local cache snapshot.

use std::sync::Arc;

use trailsync_core::{BlobStore, Config, Pending, StorageKind, SyncEngine, SyncError, SyncResult};
use trailsync_remote::MemoryRemoteStore;

use crate::common::{FlakyBlobStore, harness, test_config, test_draft};

#[tokio::test]
async fn restart_restores_pending_work() {
    // Arrange
    let h = harness().await;
    let kept = h.engine.add(test_draft("kept", 1), None).await.unwrap();
    let synced = h.engine.add(test_draft("synced", 0), None).await.unwrap();
    h.engine.flush().await;
    h.engine.mark_for_delete(&synced.id).await.unwrap();
    let fresh = h.engine.add(test_draft("fresh", 2), None).await.unwrap();

    // Act
    let restarted = h.restart().await;

    // Assert
    let entries = restarted.activities().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(restarted.get(&fresh.id).await.unwrap().pending, Pending::Save);
    assert_eq!(restarted.get(&kept.id).await.unwrap().pending, Pending::None);
    assert!(restarted.get(&synced.id).await.is_none());
    assert_eq!(restarted.status().pending_uploads, 2);

    assert_eq!(restarted.flush().await, SyncResult::NewData);
    assert!(h.store.get(&fresh.id).is_some());
    assert!(h.store.get(&synced.id).is_none());
    assert_eq!(h.store.save_calls(&kept.id), 1);
}

#[tokio::test]
async fn failed_snapshot_write_raises_warning() {
    // Arrange
    let store = Arc::new(MemoryRemoteStore::new());
    let blobs = Arc::new(FlakyBlobStore::new());
    let engine = SyncEngine::with_storage(test_config(), store, blobs.clone())
        .await
        .unwrap();
    blobs.set_fail_writes(true);

    // Act
    engine.add(test_draft("lost", 0), None).await.unwrap();

    // Assert
    assert!(engine.status().persistence_warning);
    assert_eq!(blobs.failed_writes(), 2);
    assert!(engine.subscribe().borrow().status.persistence_warning);

    blobs.set_fail_writes(false);
    engine.add(test_draft("saved", 1), None).await.unwrap();
    assert!(!engine.status().persistence_warning);
}

#[tokio::test]
async fn track_write_failure_rejects_add() {
    // Arrange
    let store = Arc::new(MemoryRemoteStore::new());
    let blobs = Arc::new(FlakyBlobStore::new());
    let engine = SyncEngine::with_storage(test_config(), store, blobs.clone())
        .await
        .unwrap();
    blobs.set_fail_writes(true);

    // Act
    let err = engine
        .add(test_draft("with track", 0), Some(b"track".to_vec()))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, SyncError::LocalPersistenceFailure(_)));
    assert!(engine.activities().await.is_empty());
}

#[tokio::test]
async fn corrupt_snapshot_fails_to_open() {
    // Arrange
    let store = Arc::new(MemoryRemoteStore::new());
    let blobs = Arc::new(FlakyBlobStore::new());
    let config = test_config();
    let key = format!("cache-snapshot/{}", config.zone);
    blobs.write_blob(&key, b"{ not json").await.unwrap();

    // Act
    let result = SyncEngine::with_storage(config, store, blobs).await;

    // Assert
    assert!(matches!(result, Err(SyncError::LocalPersistenceFailure(_))));
}

#[tokio::test]
async fn file_storage_survives_restart() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        storage: StorageKind::Files,
        state_dir: Some(dir.path().to_path_buf()),
        ..test_config()
    };
    let store = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::open(config.clone(), store.clone()).await.unwrap();
    let activity = engine
        .add(test_draft("on disk", 0), Some(b"<gpx/>".to_vec()))
        .await
        .unwrap();
    drop(engine);

    // Act
    let reopened = SyncEngine::open(config, store.clone()).await.unwrap();
    let hydrated = reopened.hydrate(&activity.id).await.unwrap();

    // Assert
    assert_eq!(reopened.get(&activity.id).await.unwrap().pending, Pending::Save);
    assert_eq!(hydrated.track.as_deref(), Some(&b"<gpx/>"[..]));
    assert_eq!(store.len(), 0);
}
