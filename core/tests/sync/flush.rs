// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Flush cycle: batching, per-item outcomes and the cycle guard.

use std::time::Duration;

use trailsync_core::{Config, DeleteOutcome, Pending, SyncResult};
use trailsync_remote::{ErrorCode, Operation};

use crate::common::{harness, harness_with, test_config, test_draft};

#[tokio::test]
async fn flush_twice_saves_each_activity_once() {
    // Arrange
    let h = harness().await;
    let mut ids = Vec::new();
    for i in 0..3 {
        let activity = h.engine.add(test_draft(&format!("run {i}"), i), None).await.unwrap();
        ids.push(activity.id);
    }

    // Act
    let first = h.engine.flush().await;
    let second = h.engine.flush().await;

    // Assert
    assert_eq!(first, SyncResult::NewData);
    assert_eq!(second, SyncResult::NoData);
    for id in &ids {
        assert_eq!(h.store.save_calls(id), 1, "{id}");
        assert!(h.store.get(id).is_some());
    }
    assert_eq!(h.engine.status().pending_uploads, 0);
}

#[tokio::test]
async fn flush_while_flushing_is_a_no_op() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("slow", 0), None).await.unwrap();
    h.store.set_latency(Duration::from_millis(100));

    // Act
    let (a, b) = tokio::join!(h.engine.flush(), h.engine.flush());

    // Assert
    let mut results = [a, b];
    results.sort_by_key(|r| *r == SyncResult::NewData);
    assert_eq!(results, [SyncResult::NoData, SyncResult::NewData]);
    assert_eq!(h.store.save_calls(&activity.id), 1);
}

#[tokio::test]
async fn delete_before_first_save_never_reaches_remote() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("oops", 0), None).await.unwrap();

    // Act
    let outcome = h.engine.mark_for_delete(&activity.id).await.unwrap();
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(outcome, DeleteOutcome::RemovedLocally);
    assert_eq!(result, SyncResult::NoData);
    assert_eq!(h.store.save_calls(&activity.id), 0);
    assert_eq!(h.store.delete_calls(&activity.id), 0);
    assert!(h.engine.activities().await.is_empty());
}

#[tokio::test]
async fn delete_of_saved_activity_is_sent_once() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("done", 0), None).await.unwrap();
    h.engine.flush().await;

    // Act
    let outcome = h.engine.mark_for_delete(&activity.id).await.unwrap();
    let hidden = h.engine.get(&activity.id).await;
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(outcome, DeleteOutcome::Pending);
    assert!(hidden.is_none());
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(h.store.delete_calls(&activity.id), 1);
    assert!(h.store.get(&activity.id).is_none());
    assert_eq!(h.engine.flush().await, SyncResult::NoData);
}

#[tokio::test]
async fn delete_of_record_gone_remotely_counts_as_done() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("gone", 0), None).await.unwrap();
    h.engine.flush().await;
    h.store.remove(&activity.id);

    // Act
    h.engine.mark_for_delete(&activity.id).await.unwrap();
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(h.engine.status().pending_uploads, 0);
}

#[tokio::test]
async fn transient_failure_keeps_change_pending() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("retry", 0), None).await.unwrap();
    h.store.fail_item(activity.id.clone(), ErrorCode::ZoneBusy);

    // Act
    let failed = h.engine.flush().await;
    let pending = h.engine.get(&activity.id).await.unwrap().pending;
    h.store.clear_failures();
    let retried = h.engine.flush().await;

    // Assert
    assert_eq!(failed, SyncResult::Failed);
    assert_eq!(pending, Pending::Save);
    assert_eq!(retried, SyncResult::NewData);
    assert_eq!(h.store.save_calls(&activity.id), 2);
    assert!(h.store.get(&activity.id).is_some());
}

#[tokio::test]
async fn whole_batch_failure_keeps_everything_pending() {
    // Arrange
    let h = harness().await;
    h.engine.add(test_draft("a", 0), None).await.unwrap();
    h.engine.add(test_draft("b", 1), None).await.unwrap();
    h.store.fail_next(Operation::Save, ErrorCode::NetworkUnavailable);

    // Act
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(result, SyncResult::Failed);
    assert_eq!(h.engine.status().pending_uploads, 2);
    assert_eq!(h.engine.status().last_result, Some(SyncResult::Failed));
}

#[tokio::test]
async fn conflict_on_save_is_treated_as_success() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("conflict", 0), None).await.unwrap();
    h.store.fail_item(activity.id.clone(), ErrorCode::ServerRecordChanged);

    // Act
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    let entry = h.engine.get(&activity.id).await.unwrap();
    assert_eq!(entry.pending, Pending::None);
    assert!(entry.on_remote);
}

#[tokio::test]
async fn permanent_failure_drops_change() {
    // Arrange
    let h = harness().await;
    let activity = h.engine.add(test_draft("invalid", 0), None).await.unwrap();
    h.store.fail_item(activity.id.clone(), ErrorCode::InvalidArguments);

    // Act
    let result = h.engine.flush().await;
    let again = h.engine.flush().await;

    // Assert
    assert_eq!(result, SyncResult::Failed);
    assert_eq!(again, SyncResult::NoData);
    assert_eq!(h.store.save_calls(&activity.id), 1);
    let entry = h.engine.get(&activity.id).await.unwrap();
    assert_eq!(entry.pending, Pending::None);
    assert!(!entry.on_remote);
}

#[tokio::test]
async fn mixed_batch_resolves_every_item() {
    // Arrange
    let h = harness().await;
    let ok = h.engine.add(test_draft("ok", 0), None).await.unwrap();
    let busy = h.engine.add(test_draft("busy", 1), None).await.unwrap();
    let bad = h.engine.add(test_draft("bad", 2), None).await.unwrap();
    h.store.fail_item(busy.id.clone(), ErrorCode::RequestRateLimited);
    h.store.fail_item(bad.id.clone(), ErrorCode::InvalidArguments);

    // Act
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(h.engine.get(&ok.id).await.unwrap().pending, Pending::None);
    assert_eq!(h.engine.get(&busy.id).await.unwrap().pending, Pending::Save);
    assert_eq!(h.engine.get(&bad.id).await.unwrap().pending, Pending::None);
    assert_eq!(h.engine.status().pending_uploads, 1);
}

#[tokio::test]
async fn capacity_two_scenario() {
    // Arrange
    let h = harness_with(Config {
        cache_capacity: 2,
        ..test_config()
    })
    .await;
    let a = h.engine.add_with_token(Some("a1"), test_draft("A", 0), None).await.unwrap();
    let b = h.engine.add_with_token(Some("b1"), test_draft("B", 1), None).await.unwrap();
    let c = h.engine.add_with_token(Some("c1"), test_draft("C", 2), None).await.unwrap();
    assert_eq!(h.engine.activities().await.len(), 3);

    // Act
    h.store.fail_item(c.id.clone(), ErrorCode::ServiceUnavailable);
    h.engine.flush().await;
    let d = h.engine.add_with_token(Some("d1"), test_draft("D", 3), None).await.unwrap();

    // Assert
    let cached = h.engine.activities().await;
    let names: Vec<&str> = cached.iter().map(|e| e.activity.id.name()).collect();
    assert_eq!(names, ["d1", "c1", "b1"]);
    assert!(h.engine.get(&a.id).await.is_none());
    assert_eq!(h.engine.get(&b.id).await.unwrap().pending, Pending::None);
    assert_eq!(h.engine.get(&c.id).await.unwrap().pending, Pending::Save);
    assert_eq!(h.engine.get(&d.id).await.unwrap().pending, Pending::Save);
}

#[tokio::test]
async fn flush_deadline_releases_the_guard() {
    // Arrange
    let h = harness_with(Config {
        cycle_timeout: Duration::from_millis(50),
        ..test_config()
    })
    .await;
    let activity = h.engine.add(test_draft("hung", 0), None).await.unwrap();
    h.store.set_latency(Duration::from_millis(500));

    // Act
    let timed_out = h.engine.flush().await;
    let status = h.engine.status();
    h.store.set_latency(Duration::ZERO);
    let retried = h.engine.flush().await;

    // Assert
    assert_eq!(timed_out, SyncResult::Failed);
    assert!(!status.flushing);
    assert_eq!(status.pending_uploads, 1);
    assert_eq!(retried, SyncResult::NewData);
    assert_eq!(h.engine.get(&activity.id).await.unwrap().pending, Pending::None);
}

#[tokio::test]
async fn add_flushes_in_background_when_enabled() {
    // Arrange
    let h = harness_with(Config {
        auto_flush: true,
        ..test_config()
    })
    .await;

    // Act
    let activity = h.engine.add(test_draft("auto", 0), None).await.unwrap();
    h.engine.idle().await;

    // Assert
    assert!(h.store.get(&activity.id).is_some());
    assert_eq!(h.engine.status().pending_uploads, 0);
}

#[tokio::test]
async fn update_is_saved_with_new_fields() {
    // Arrange
    let h = harness().await;
    let mut activity = h.engine.add(test_draft("before", 0), None).await.unwrap();
    h.engine.flush().await;

    // Act
    activity.draft.name = "after".to_string();
    h.engine.update(activity.clone()).await.unwrap();
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(result, SyncResult::NewData);
    let stored = h.store.get(&activity.id).unwrap();
    let (remote, _) = trailsync_core::from_record(&stored).unwrap();
    assert_eq!(remote.draft.name, "after");
}
