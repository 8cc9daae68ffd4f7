// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Test data factories for integration tests.

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use trailsync_core::{
    Activity, ActivityDraft, BlobStore, Config, SqliteBlobStore, Sport, SyncEngine, make_id,
    to_record,
};
use trailsync_remote::{MemoryRemoteStore, Record, ZoneId};

/// An engine wired to an in-memory remote store and blob store.
#[derive(Debug)]
pub struct Harness {
    pub engine: SyncEngine,
    pub store: Arc<MemoryRemoteStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Harness {
    /// Opens a second engine on the same storage and remote, as after a restart.
    pub async fn restart(&self) -> SyncEngine {
        SyncEngine::with_storage(
            self.engine.config().clone(),
            self.store.clone(),
            self.blobs.clone(),
        )
        .await
        .unwrap()
    }

    /// The zone the engine mirrors.
    pub fn zone(&self) -> ZoneId {
        self.engine.zone().clone()
    }
}

/// Creates a test configuration: small pages, no background flushes, short
/// cycle deadline.
#[must_use]
pub fn test_config() -> Config {
    Config {
        cache_capacity: 10,
        page_size: 3,
        cycle_timeout: Duration::from_secs(5),
        auto_flush: false,
        ..Config::default()
    }
}

/// Opens a harness with [`test_config`].
pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

/// Opens a harness with the given configuration.
pub async fn harness_with(config: Config) -> Harness {
    let store = Arc::new(MemoryRemoteStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::open(None).await.unwrap());
    let engine = SyncEngine::with_storage(config, store.clone(), blobs.clone())
        .await
        .unwrap();
    Harness {
        engine,
        store,
        blobs,
    }
}

/// A timestamp `hours` hours after a fixed base.
#[must_use]
pub fn timestamp(hours: i64) -> Timestamp {
    Timestamp::from_second(1_700_000_000 + hours * 3600).unwrap()
}

/// Creates a run draft starting `hours` after the base timestamp.
#[must_use]
pub fn test_draft(name: &str, hours: i64) -> ActivityDraft {
    let mut draft = ActivityDraft::new(name, Sport::Run, timestamp(hours));
    draft.duration_secs = 1800;
    draft.distance_m = 5000.0;
    draft
}

/// Creates the remote record of an activity named `name` in `zone`.
#[must_use]
pub fn remote_activity(zone: &ZoneId, name: &str, hours: i64) -> Record {
    let activity = Activity::new(make_id(zone, Some(name)), test_draft(name, hours), false);
    to_record(&activity, None)
}
