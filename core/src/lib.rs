// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Offline-first sync core: a bounded local cache of workout activities kept
//! in step with a remote record store.

mod activity;
mod cache;
mod config;
mod engine;
mod error;
mod payload_cache;
mod registry;
mod storage;
mod token_store;

pub use crate::activity::{
    ACTIVITY_RECORD_TYPE, Activity, ActivityDraft, EXTERNAL_ID_FIELD, HAS_TRACK_FIELD,
    START_FIELD, SUMMARY_FIELDS, Sport, from_record, make_id, payload_key, to_minimal_record,
    to_record,
};
pub use crate::cache::{
    CachedActivity, DeleteOutcome, FlushPlan, LocalCache, Merged, Pending, RemoteApply,
};
pub use crate::config::{
    APP_NAME, Config, StorageKind, expand_path, get_config_dir, parse_duration,
};
pub use crate::engine::{HydratedActivity, SyncEngine, SyncResult, SyncStatus, SyncView};
pub use crate::error::SyncError;
pub use crate::payload_cache::PayloadCache;
pub use crate::registry::{FnHandler, HandlerRegistry, RecordHandler};
pub use crate::storage::{BlobStore, FsBlobStore, SqliteBlobStore, StorageError, open_blob_store};
pub use crate::token_store::ChangeTokenStore;
