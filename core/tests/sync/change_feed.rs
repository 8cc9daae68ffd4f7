// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Incremental sync through the change feed.

use std::sync::{Arc, Mutex};

use trailsync_core::{BlobStore, ChangeTokenStore, FnHandler, SyncResult};
use trailsync_remote::{
    ChangeToken, ErrorCode, Executor, Operation, Record, RecordId, RemoteStore,
};

use crate::common::{harness, remote_activity, test_draft};

fn gear(zone: &trailsync_remote::ZoneId, name: &str) -> Record {
    Record::new("Gear", RecordId::new(zone.clone(), name)).with_field("model", name)
}

/// Registers a "Gear" handler recording every event it receives.
fn record_gear(engine: &trailsync_core::SyncEngine) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let changes = seen.clone();
    let deletes = seen.clone();
    engine.register(
        "Gear",
        Arc::new(FnHandler::new(
            move |r: &Record| changes.lock().unwrap().push(format!("+{}", r.id().name())),
            move |id: &RecordId| deletes.lock().unwrap().push(format!("-{}", id.name())),
        )),
    );
    seen
}

#[tokio::test]
async fn token_resumes_after_crash_between_pages() {
    // Arrange: three pages of one record each.
    let h = harness().await;
    let zone = h.zone();
    h.store.set_change_page_size(1);
    for name in ["g1", "g2", "g3"] {
        h.store.insert(gear(&zone, name));
    }
    let store: Arc<dyn RemoteStore> = h.store.clone();
    let executor = Executor::new(store, 10);
    let tokens = ChangeTokenStore::new(h.blobs.clone());

    // Act: apply two pages, persisting each token, then "crash".
    let mut token: Option<ChangeToken> = None;
    for _ in 0..2 {
        let page = executor.fetch_changes(&zone, token.as_ref()).await.unwrap();
        assert!(page.more_coming);
        tokens.write(&zone, &page.token).await;
        token = Some(page.token);
    }
    drop(tokens);

    let restarted = ChangeTokenStore::new(h.blobs.clone());
    let resumed = restarted.read(&zone).await;
    let last = executor.fetch_changes(&zone, resumed.as_ref()).await.unwrap();

    // Assert
    let names: Vec<&str> = last.changed.iter().map(|r| r.id().name()).collect();
    assert_eq!(names, ["g3"]);
    assert!(!last.more_coming);
}

#[tokio::test]
async fn engine_resumes_from_persisted_token_after_restart() {
    // Arrange
    let h = harness().await;
    let zone = h.zone();
    h.store.set_change_page_size(1);
    for name in ["g1", "g2", "g3"] {
        h.store.insert(gear(&zone, name));
    }
    let seen = record_gear(&h.engine);
    assert_eq!(h.engine.pull_changes().await, SyncResult::NewData);
    assert_eq!(*seen.lock().unwrap(), ["+g1", "+g2", "+g3"]);

    // Act
    h.store.insert(gear(&zone, "g4"));
    h.store.remove(&RecordId::new(zone.clone(), "g1"));
    let engine = h.restart().await;
    let after_restart = record_gear(&engine);
    let result = engine.pull_changes().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(*after_restart.lock().unwrap(), ["+g4", "-g1"]);
    assert_eq!(h.store.fetch_changes_calls(), 5);
}

#[tokio::test]
async fn remote_changes_reach_the_local_cache() {
    // Arrange
    let h = harness().await;
    let zone = h.zone();
    h.store.insert(remote_activity(&zone, "a", 1));
    h.store.insert(remote_activity(&zone, "b", 2));

    // Act
    let first = h.engine.handle_notification("sub-activities").await;
    let id = RecordId::new(zone.clone(), "a");
    h.store.remove(&id);
    let second = h.engine.handle_notification("sub-activities").await;
    let third = h.engine.handle_notification("sub-activities").await;

    // Assert
    assert_eq!(first, SyncResult::NewData);
    assert_eq!(second, SyncResult::NewData);
    assert_eq!(third, SyncResult::NoData);
    let activities = h.engine.activities().await;
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].activity.id.name(), "b");
}

#[tokio::test]
async fn local_changes_win_over_remote_versions() {
    // Arrange
    let h = harness().await;
    let mut activity = h.engine.add(test_draft("mine", 0), None).await.unwrap();
    h.engine.flush().await;
    activity.draft.name = "edited offline".to_string();
    h.engine.update(activity.clone()).await.unwrap();

    // Act: the server reports the earlier version back.
    let result = h.engine.pull_changes().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    let cached = h.engine.get(&activity.id).await.unwrap();
    assert_eq!(cached.activity.draft.name, "edited offline");
}

#[tokio::test]
async fn expired_token_restarts_from_the_beginning() {
    // Arrange: a token far ahead of the server history.
    let h = harness().await;
    let zone = h.zone();
    h.store.insert(remote_activity(&zone, "a", 1));
    let bogus = ChangeToken::new(u64::MAX.to_be_bytes().to_vec());
    h.blobs
        .write_blob(&format!("change-token/{zone}"), bogus.as_bytes())
        .await
        .unwrap();

    // Act
    let result = h.engine.pull_changes().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(h.engine.activities().await.len(), 1);
    let saved = ChangeTokenStore::new(h.blobs.clone()).read(&zone).await;
    assert_ne!(saved, Some(bogus));
}

#[tokio::test]
async fn failed_change_feed_keeps_token() {
    // Arrange
    let h = harness().await;
    let zone = h.zone();
    h.store.insert(remote_activity(&zone, "a", 1));
    h.engine.pull_changes().await;
    let tokens = ChangeTokenStore::new(h.blobs.clone());
    let before = tokens.read(&zone).await;
    h.store.insert(remote_activity(&zone, "b", 2));
    h.store.fail_next(Operation::FetchChanges, ErrorCode::NetworkFailure);

    // Act
    let result = h.engine.pull_changes().await;

    // Assert
    assert_eq!(result, SyncResult::Failed);
    assert_eq!(tokens.read(&zone).await, before);
    assert_eq!(h.engine.activities().await.len(), 1);
}

#[tokio::test]
async fn unregistered_record_types_are_skipped() {
    // Arrange
    let h = harness().await;
    h.store.insert(gear(&h.zone(), "g1"));

    // Act
    let result = h.engine.pull_changes().await;

    // Assert
    assert_eq!(result, SyncResult::NoData);
    assert!(ChangeTokenStore::new(h.blobs.clone()).read(&h.zone()).await.is_some());
}
