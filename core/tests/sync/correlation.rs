// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Save-or-update by external id.

use trailsync_core::{
    EXTERNAL_ID_FIELD, Pending, SyncError, SyncResult, from_record,
};
use trailsync_remote::{ErrorCode, FieldValue, Operation, Record};

use crate::common::{Harness, harness, remote_activity, test_draft};

fn with_external_id(record: Record, key: i64) -> Record {
    record.with_field(EXTERNAL_ID_FIELD, key)
}

fn remote_with_key(h: &Harness, key: i64) -> Vec<Record> {
    h.store
        .records_of_type("Activity")
        .into_iter()
        .filter(|r| r.field(EXTERNAL_ID_FIELD).and_then(FieldValue::as_i64) == Some(key))
        .collect()
}

#[tokio::test]
async fn saving_twice_leaves_one_remote_record() {
    // Arrange
    let h = harness().await;
    let mut draft = test_draft("imported", 0);
    draft.external_id = Some(42);

    // Act
    let first = h.engine.save_or_update(draft.clone(), None).await.unwrap();
    draft.name = "imported again".to_string();
    let second = h.engine.save_or_update(draft, None).await.unwrap();
    h.engine.flush().await;

    // Assert
    assert_eq!(first.id, second.id);
    let remote = remote_with_key(&h, 42);
    assert_eq!(remote.len(), 1);
    let (activity, _) = from_record(&remote[0]).unwrap();
    assert_eq!(activity.draft.name, "imported again");
}

#[tokio::test]
async fn interleaved_saves_leave_one_remote_record() {
    // Arrange
    let h = harness().await;
    let mut a = test_draft("from watch", 0);
    a.external_id = Some(42);
    let mut b = test_draft("from platform", 0);
    b.external_id = Some(42);

    // Act
    let (ra, rb) = tokio::join!(
        h.engine.save_or_update(a, None),
        h.engine.save_or_update(b, None)
    );
    h.engine.flush().await;
    let again = h.engine.save_or_update(test_draft_with_key("third", 42), None).await.unwrap();
    h.engine.flush().await;

    // Assert
    assert_eq!(ra.unwrap().id, rb.unwrap().id);
    assert_eq!(remote_with_key(&h, 42).len(), 1);
    assert_eq!(remote_with_key(&h, 42)[0].id(), &again.id);
}

fn test_draft_with_key(name: &str, key: i64) -> trailsync_core::ActivityDraft {
    let mut draft = test_draft(name, 0);
    draft.external_id = Some(key);
    draft
}

#[tokio::test]
async fn existing_remote_record_is_adopted() {
    // Arrange
    let h = harness().await;
    let existing = with_external_id(remote_activity(&h.zone(), "server-side", 0), 7)
        .with_field("device", "chest strap");
    h.store.insert(existing.clone());

    // Act
    let adopted = h
        .engine
        .save_or_update(test_draft_with_key("renamed", 7), None)
        .await
        .unwrap();

    // Assert
    assert_eq!(&adopted.id, existing.id());
    assert_eq!(remote_with_key(&h, 7).len(), 1);
    let stored = h.store.get(existing.id()).unwrap();
    assert_eq!(stored.field("name").and_then(FieldValue::as_str), Some("renamed"));
    assert_eq!(stored.field("device").and_then(FieldValue::as_str), Some("chest strap"));

    let cached = h.engine.get(&adopted.id).await.unwrap();
    assert_eq!(cached.pending, Pending::None);
    assert!(cached.on_remote);
    assert_eq!(cached.activity.draft.device.as_deref(), Some("chest strap"));
    assert_eq!(h.engine.flush().await, SyncResult::NoData);
}

#[tokio::test]
async fn adopted_record_receives_all_local_fields() {
    // Arrange
    let h = harness().await;
    let existing = with_external_id(remote_activity(&h.zone(), "server-side", 0), 7);
    h.store.insert(existing.clone());
    let mut draft = test_draft_with_key("renamed", 7);
    draft.avg_heart_rate = Some(150);
    draft.device = Some("watch".to_string());

    // Act
    let adopted = h.engine.save_or_update(draft, None).await.unwrap();
    let pending = h.engine.get(&adopted.id).await.unwrap().pending;
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(pending, Pending::Save);
    assert_eq!(result, SyncResult::NewData);
    let cached = h.engine.get(&adopted.id).await.unwrap();
    assert_eq!(cached.pending, Pending::None);
    let (remote, _) = from_record(&h.store.get(existing.id()).unwrap()).unwrap();
    assert_eq!(remote.draft.avg_heart_rate, Some(150));
    assert_eq!(remote.draft.device.as_deref(), Some("watch"));
    assert_eq!(remote.draft, cached.activity.draft);
}

#[tokio::test]
async fn adoption_retries_later_when_update_fails_transiently() {
    // Arrange
    let h = harness().await;
    let existing = with_external_id(remote_activity(&h.zone(), "server-side", 0), 8);
    h.store.insert(existing.clone());
    h.store.fail_next(Operation::Save, ErrorCode::ZoneBusy);

    // Act
    let adopted = h
        .engine
        .save_or_update(test_draft_with_key("renamed", 8), None)
        .await
        .unwrap();
    let pending = h.engine.get(&adopted.id).await.unwrap().pending;
    let result = h.engine.flush().await;

    // Assert
    assert_eq!(pending, Pending::Save);
    assert_eq!(result, SyncResult::NewData);
    assert_eq!(remote_with_key(&h, 8).len(), 1);
}

#[tokio::test]
async fn duplicate_remote_keys_are_reported() {
    // Arrange
    let h = harness().await;
    let zone = h.zone();
    h.store.insert(with_external_id(remote_activity(&zone, "dup-1", 0), 9));
    h.store.insert(with_external_id(remote_activity(&zone, "dup-2", 1), 9));

    // Act
    let err = h
        .engine
        .save_or_update(test_draft_with_key("third", 9), None)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, SyncError::CorrelationAmbiguous { key: 9, matches: 2 }));
    assert!(h.engine.activities().await.is_empty());
}

#[tokio::test]
async fn failed_lookup_is_transient() {
    // Arrange
    let h = harness().await;
    h.store.fail_next(Operation::Query, ErrorCode::NetworkUnavailable);

    // Act
    let err = h
        .engine
        .save_or_update(test_draft_with_key("offline", 3), None)
        .await
        .unwrap_err();

    // Assert
    assert!(err.is_transient());
    assert!(h.engine.activities().await.is_empty());
}

#[tokio::test]
async fn activity_without_key_is_added() {
    // Arrange
    let h = harness().await;

    // Act
    let activity = h.engine.save_or_update(test_draft("plain", 0), None).await.unwrap();

    // Assert
    assert_eq!(h.store.query_calls(), 0);
    assert_eq!(h.engine.get(&activity.id).await.unwrap().pending, Pending::Save);
}
