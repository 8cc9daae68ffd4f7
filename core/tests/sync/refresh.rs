// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Windowed fetches: refresh and load-more.

use trailsync_core::{Config, Pending, SyncResult};
use trailsync_remote::{ErrorCode, Operation};

use crate::common::{Harness, harness, harness_with, remote_activity, test_config, test_draft};

/// Seeds the remote with `count` activities, one hour apart.
fn seed(h: &Harness, count: i64) {
    let zone = h.zone();
    for i in 0..count {
        h.store.insert(remote_activity(&zone, &format!("r{i}"), i));
    }
}

fn names(activities: &[trailsync_core::CachedActivity]) -> Vec<&str> {
    activities.iter().map(|e| e.activity.id.name()).collect()
}

#[tokio::test]
async fn refresh_loads_freshest_page() {
    // Arrange
    let h = harness().await;
    seed(&h, 5);

    // Act
    let result = h.engine.refresh().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    let activities = h.engine.activities().await;
    assert_eq!(names(&activities), ["r4", "r3", "r2"]);
    assert!(activities.iter().all(|e| e.on_remote && e.pending == Pending::None));
    assert!(!h.engine.status().end_of_data);
}

#[tokio::test]
async fn refresh_without_remote_changes_reports_no_data() {
    // Arrange
    let h = harness().await;
    seed(&h, 2);
    h.engine.refresh().await;

    // Act
    let result = h.engine.refresh().await;

    // Assert
    assert_eq!(result, SyncResult::NoData);
    assert!(h.engine.status().end_of_data);
}

#[tokio::test]
async fn load_more_pages_until_end_of_data() {
    // Arrange
    let h = harness().await;
    seed(&h, 5);
    h.engine.refresh().await;

    // Act
    let more = h.engine.load_more().await;
    let queries = h.store.query_calls();
    let done = h.engine.load_more().await;

    // Assert
    assert_eq!(more, SyncResult::NewData);
    assert_eq!(done, SyncResult::NoData);
    assert_eq!(h.store.query_calls(), queries, "no query after end of data");
    assert!(h.engine.status().end_of_data);
    let activities = h.engine.activities().await;
    assert_eq!(names(&activities), ["r4", "r3", "r2", "r1", "r0"]);
}

#[tokio::test]
async fn old_local_activity_does_not_move_paging() {
    // Arrange
    let h = harness().await;
    seed(&h, 6);
    h.engine.refresh().await;
    let local = h.engine.add(test_draft("old-local", -100), None).await.unwrap();

    // Act
    let more = h.engine.load_more().await;
    let status = h.engine.status();
    let done = h.engine.load_more().await;

    // Assert
    assert_eq!(more, SyncResult::NewData);
    assert!(!status.end_of_data);
    assert_eq!(done, SyncResult::NoData);
    assert!(h.engine.status().end_of_data);
    let activities = h.engine.activities().await;
    assert_eq!(activities[0].activity.id, local.id);
    assert_eq!(names(&activities[1..]), ["r5", "r4", "r3", "r2", "r1", "r0"]);
}

#[tokio::test]
async fn paging_stays_within_capacity() {
    // Arrange
    let h = harness_with(Config {
        cache_capacity: 3,
        ..test_config()
    })
    .await;
    seed(&h, 9);
    h.engine.refresh().await;

    // Act
    let first = h.engine.load_more().await;
    let second = h.engine.load_more().await;

    // Assert
    assert_eq!(first, SyncResult::NewData);
    assert_eq!(second, SyncResult::NewData);
    assert_eq!(h.store.query_calls(), 3);
    assert_eq!(names(&h.engine.activities().await), ["r8", "r7", "r6"]);
    assert_eq!(h.engine.status().pending_uploads, 0);
}

#[tokio::test]
async fn refresh_clears_end_of_data() {
    // Arrange
    let h = harness().await;
    seed(&h, 4);
    h.engine.refresh().await;
    h.engine.load_more().await;
    assert!(h.engine.status().end_of_data);

    // Act
    let zone = h.zone();
    for i in 10..13 {
        h.store.insert(remote_activity(&zone, &format!("n{i}"), i));
    }
    h.engine.refresh().await;

    // Assert
    assert!(!h.engine.status().end_of_data);
    assert_eq!(names(&h.engine.activities().await), ["n12", "n11", "n10"]);
}

#[tokio::test]
async fn dirty_cache_flushes_instead_of_fetching() {
    // Arrange
    let h = harness().await;
    seed(&h, 3);
    let local = h.engine.add(test_draft("local", 100), None).await.unwrap();

    // Act
    let result = h.engine.refresh().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(h.store.query_calls(), 0);
    assert!(h.store.get(&local.id).is_some());
    assert_eq!(names(&h.engine.activities().await), ["local"]);

    // The next refresh sees a clean cache and fetches.
    h.engine.refresh().await;
    assert_eq!(h.store.query_calls(), 1);
    assert_eq!(h.engine.activities().await.len(), 3);
}

#[tokio::test]
async fn failed_refresh_keeps_local_state() {
    // Arrange
    let h = harness().await;
    seed(&h, 3);
    h.engine.refresh().await;
    let before = h.engine.activities().await;
    h.store.insert(remote_activity(&h.zone(), "late", 50));
    h.store.fail_next(Operation::Query, ErrorCode::ServiceUnavailable);

    // Act
    let result = h.engine.refresh().await;

    // Assert
    assert_eq!(result, SyncResult::Failed);
    assert_eq!(h.engine.activities().await, before);
    assert_eq!(h.engine.status().last_result, Some(SyncResult::Failed));
}

#[tokio::test]
async fn refresh_keeps_pending_delete_hidden() {
    // Arrange
    let h = harness().await;
    seed(&h, 2);
    h.engine.refresh().await;
    let victim = h.engine.activities().await[0].activity.id.clone();
    h.store.fail_item(victim.clone(), ErrorCode::ZoneBusy);
    h.engine.mark_for_delete(&victim).await.unwrap();

    // Act
    let result = h.engine.refresh().await;

    // Assert
    assert_eq!(result, SyncResult::Failed);
    assert!(h.engine.get(&victim).await.is_none());
    assert_eq!(h.engine.status().pending_uploads, 1);
}
