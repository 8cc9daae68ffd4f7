// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Sync reconciler.
//!
//! [`SyncEngine`] owns the local mutation cache and drives it against the remote
//! store: flushing pending work, replacing the visible window on refresh,
//! paging older entries, following the change feed and correlating records by
//! their external id. Cache state is only touched under a short-lived lock that
//! is never held across network I/O.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use trailsync_remote::{
    BatchEvent, ChangeSet, ErrorClass, ErrorCode, Executor, Failure, FieldValue, Predicate, Query,
    QueryPriority, Record, RecordId, RemoteStore, SortDescriptor, ZoneId,
};

use crate::activity::{
    ACTIVITY_RECORD_TYPE, Activity, ActivityDraft, EXTERNAL_ID_FIELD, HAS_TRACK_FIELD,
    START_FIELD, SUMMARY_FIELDS, from_record, make_id, payload_key, to_minimal_record, to_record,
};
use crate::cache::{CachedActivity, DeleteOutcome, FlushPlan, LocalCache, Pending, RemoteApply};
use crate::config::Config;
use crate::error::SyncError;
use crate::payload_cache::PayloadCache;
use crate::registry::{HandlerRegistry, RecordHandler, dispatch_change, dispatch_delete};
use crate::storage::{BlobStore, open_blob_store};
use crate::token_store::ChangeTokenStore;

/// Outcome of one sync cycle, in the vocabulary of background-fetch handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    /// The cycle changed local or remote state.
    NewData,
    /// Nothing to do, or the cycle was skipped.
    NoData,
    /// The cycle failed; local state is unchanged or will be retried.
    Failed,
}

/// Sync state shown next to the activity list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Entities with local work the remote has not confirmed.
    pub pending_uploads: usize,
    /// The last snapshot write failed; changes may not survive a restart.
    pub persistence_warning: bool,
    /// Paging reached the oldest remote activity.
    pub end_of_data: bool,
    /// A refresh, page or change-feed cycle is running.
    pub fetching: bool,
    /// A flush cycle is running.
    pub flushing: bool,
    /// Result of the last finished cycle.
    pub last_result: Option<SyncResult>,
}

/// Visible projection published after every state change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncView {
    /// Visible activities, newest first.
    pub activities: Vec<CachedActivity>,
    /// Sync status.
    pub status: SyncStatus,
}

/// An activity together with its track payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedActivity {
    /// The activity.
    pub activity: Activity,
    /// The track payload, if the activity has one.
    pub track: Option<Vec<u8>>,
}

fn snapshot_key(zone: &ZoneId) -> String {
    format!("cache-snapshot/{zone}")
}

/// One page of a windowed fetch.
struct Window {
    activities: Vec<Activity>,
    /// Records returned, malformed ones included.
    records: usize,
    /// Sort key of the oldest returned record, where the next page starts.
    last_start: Option<Timestamp>,
}

/// Offline-first sync engine for one zone.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Config,
    shared: Arc<Shared>,
    executor: Executor,
    tokens: ChangeTokenStore,
    registry: RwLock<HandlerRegistry>,
    correlate: Mutex<()>,
    tasks: StdMutex<JoinSet<()>>,
}

/// State reachable from record handlers.
#[derive(Debug)]
struct Shared {
    zone: ZoneId,
    blobs: Arc<dyn BlobStore>,
    cache: Mutex<LocalCache>,
    payloads: StdMutex<PayloadCache<HydratedActivity>>,
    view: watch::Sender<SyncView>,
    last_result: StdMutex<Option<SyncResult>>,
    persistence_warning: AtomicBool,
    end_of_data: AtomicBool,
    /// Start of the oldest record loaded by refresh or paging.
    cursor: StdMutex<Option<Timestamp>>,
    fetching: AtomicBool,
    flushing: AtomicBool,
}

impl SyncEngine {
    /// Opens the engine with the storage backend selected by the configuration.
    pub async fn open(mut config: Config, store: Arc<dyn RemoteStore>) -> Result<Self, Box<dyn Error>> {
        config.normalize()?;
        let blobs = open_blob_store(&config)
            .await
            .map_err(|e| format!("Failed to open local storage: {e}"))?;

        Ok(Self::with_storage(config, store, blobs).await?)
    }

    /// Opens the engine on an explicit blob store. The cache snapshot is read
    /// back completely before anything else happens.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalPersistenceFailure`] if the snapshot exists but
    /// cannot be read or decoded.
    pub async fn with_storage(
        config: Config,
        store: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, SyncError> {
        let zone = ZoneId::from(config.zone.as_str());
        let cache = match blobs.read_blob(&snapshot_key(&zone)).await {
            Ok(Some(bytes)) => LocalCache::from_snapshot(zone.clone(), config.cache_capacity, &bytes)
                .map_err(|e| SyncError::LocalPersistenceFailure(format!("corrupt cache snapshot: {e}")))?,
            Ok(None) => LocalCache::new(zone.clone(), config.cache_capacity),
            Err(e) => {
                return Err(SyncError::LocalPersistenceFailure(format!(
                    "failed to read cache snapshot: {e}"
                )));
            }
        };
        tracing::info!(%zone, entries = cache.len(), pending = cache.pending_count(), "local cache loaded");

        let (view, _) = watch::channel(SyncView::default());
        let shared = Arc::new(Shared {
            zone,
            blobs: blobs.clone(),
            cache: Mutex::new(cache),
            payloads: StdMutex::new(PayloadCache::new(config.payload_cache_capacity)),
            view,
            last_result: StdMutex::new(None),
            persistence_warning: AtomicBool::new(false),
            end_of_data: AtomicBool::new(false),
            cursor: StdMutex::new(None),
            fetching: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
        });
        shared.publish(&*shared.cache.lock().await);

        let mut registry = HandlerRegistry::new();
        registry.register(
            ACTIVITY_RECORD_TYPE,
            Arc::new(ActivityHandler {
                shared: shared.clone(),
            }),
        );

        let executor = Executor::new(store, config.batch_size);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                shared,
                executor,
                tokens: ChangeTokenStore::new(blobs),
                registry: RwLock::new(registry),
                correlate: Mutex::new(()),
                tasks: StdMutex::new(JoinSet::new()),
            }),
        })
    }

    /// The configuration the engine runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The mirrored zone.
    #[must_use]
    pub fn zone(&self) -> &ZoneId {
        &self.inner.shared.zone
    }

    /// Subscribes to the visible projection.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncView> {
        self.inner.shared.view.subscribe()
    }

    /// Current sync status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.shared.view.borrow().status.clone()
    }

    /// Visible activities, newest first.
    pub async fn activities(&self) -> Vec<CachedActivity> {
        self.inner.shared.cache.lock().await.visible().cloned().collect()
    }

    /// Looks up a visible activity.
    pub async fn get(&self, id: &RecordId) -> Option<CachedActivity> {
        let cache = self.inner.shared.cache.lock().await;
        cache.get(id).filter(|e| e.is_visible()).cloned()
    }

    /// Registers the change-feed handler of a record type.
    pub fn register(&self, record_type: impl Into<String>, handler: Arc<dyn RecordHandler>) {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(record_type, handler);
    }

    /// Adds a new activity with a freshly generated id.
    pub async fn add(&self, draft: ActivityDraft, track: Option<Vec<u8>>) -> Result<Activity, SyncError> {
        self.add_with_token(None, draft, track).await
    }

    /// Adds an activity, using `token` as its record name when it is valid.
    /// Re-adding an existing id replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalPersistenceFailure`] if the track cannot be stored.
    #[tracing::instrument(skip(self, draft, track), fields(name = %draft.name))]
    pub async fn add_with_token(
        &self,
        token: Option<&str>,
        draft: ActivityDraft,
        track: Option<Vec<u8>>,
    ) -> Result<Activity, SyncError> {
        let shared = &self.inner.shared;
        let activity = Activity::new(make_id(&shared.zone, token), draft, track.is_some());
        if let Some(bytes) = &track {
            shared.store_track(&activity.id, bytes).await?;
        }

        let evicted = {
            let mut cache = shared.cache.lock().await;
            let evicted = cache.add(activity.clone());
            shared.commit(&cache).await;
            evicted
        };
        shared.forget_payload(&activity.id, false).await;
        if let Some(evicted) = evicted {
            shared.forget_payload(&evicted.id, true).await;
        }

        tracing::info!(id = %activity.id, "activity added");
        self.schedule_flush();
        Ok(activity)
    }

    /// Replaces the fields of a visible activity and schedules a save.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the activity is absent or pending delete.
    #[tracing::instrument(skip_all, fields(id = %activity.id))]
    pub async fn update(&self, activity: Activity) -> Result<(), SyncError> {
        let shared = &self.inner.shared;
        {
            let mut cache = shared.cache.lock().await;
            cache.update(activity.clone())?;
            shared.commit(&cache).await;
        }
        shared.forget_payload(&activity.id, false).await;

        tracing::info!("activity updated");
        self.schedule_flush();
        Ok(())
    }

    /// Hides an activity and schedules its remote delete. An activity that
    /// never reached the remote is removed without any remote call.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the activity is absent or already pending delete.
    #[tracing::instrument(skip(self))]
    pub async fn mark_for_delete(&self, id: &RecordId) -> Result<DeleteOutcome, SyncError> {
        let shared = &self.inner.shared;
        let outcome = {
            let mut cache = shared.cache.lock().await;
            let outcome = cache.mark_for_delete(id)?;
            shared.commit(&cache).await;
            outcome
        };

        match outcome {
            DeleteOutcome::RemovedLocally => {
                tracing::debug!("activity never reached the remote, removed locally");
                shared.forget_payload(id, true).await;
            }
            DeleteOutcome::Pending => {
                shared.forget_payload(id, false).await;
                self.schedule_flush();
            }
        }
        Ok(outcome)
    }

    /// Saves an activity, reusing the remote record that already carries its
    /// external id instead of creating a duplicate. Activities without an
    /// external id are simply added.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CorrelationAmbiguous`] if several remote records
    /// carry the key, or the classified error of the lookup or update.
    #[tracing::instrument(skip(self, draft, track), fields(external_id = ?draft.external_id))]
    pub async fn save_or_update(
        &self,
        draft: ActivityDraft,
        track: Option<Vec<u8>>,
    ) -> Result<Activity, SyncError> {
        let Some(key) = draft.external_id else {
            return self.add(draft, track).await;
        };
        let _serial = self.inner.correlate.lock().await;

        let local = self.inner.shared.cache.lock().await.find_by_external_id(key).cloned();
        if let Some(existing) = local {
            tracing::debug!(id = %existing.activity.id, "matched local activity");
            let has_track = existing.activity.has_track || track.is_some();
            let activity = Activity::new(existing.activity.id, draft, has_track);
            if let Some(bytes) = &track {
                self.inner.shared.store_track(&activity.id, bytes).await?;
            }
            self.update(activity.clone()).await?;
            return Ok(activity);
        }

        let query = Query::new(ACTIVITY_RECORD_TYPE, 2)
            .filter(Predicate::equals(EXTERNAL_ID_FIELD, key))
            .fields(&[EXTERNAL_ID_FIELD, HAS_TRACK_FIELD])
            .priority(QueryPriority::UserInitiated);
        let fetch = self.inner.executor.block_fetch(&query, |_| {}).await;
        if let Some(failure) = fetch.failure {
            return Err(failure.into());
        }

        match fetch.records.as_slice() {
            [] => self.add(draft, track).await,
            [record] => self.adopt(record, draft, track).await,
            records => {
                tracing::error!(key, matches = records.len(), "external id is not unique remotely");
                Err(SyncError::CorrelationAmbiguous {
                    key,
                    matches: records.len(),
                })
            }
        }
    }

    /// Takes over an existing remote record with a minimal-field update.
    async fn adopt(
        &self,
        record: &Record,
        draft: ActivityDraft,
        track: Option<Vec<u8>>,
    ) -> Result<Activity, SyncError> {
        let shared = &self.inner.shared;
        let remote_track = record
            .field(HAS_TRACK_FIELD)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false);
        let mut activity = Activity::new(record.id().clone(), draft, remote_track || track.is_some());
        tracing::info!(id = %activity.id, "adopting existing remote record");

        if let Some(bytes) = &track {
            shared.store_track(&activity.id, bytes).await?;
        }

        // The minimal update carries neither the track nor the extended
        // fields; whatever the server lacks goes up with the next flush.
        let mut pending = if track.is_some() { Pending::Save } else { Pending::None };
        match self.inner.executor.force_update(to_minimal_record(&activity)).await {
            Ok(saved) => match from_record(&saved) {
                Ok((server, _)) => {
                    activity.has_track |= server.has_track;
                    if activity.draft.merge_unset(&server.draft) {
                        pending = Pending::Save;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "unreadable update response, saving the full record");
                    pending = Pending::Save;
                }
            },
            Err(failure) if failure.class == ErrorClass::Conflict => {
                tracing::warn!(%failure, "minimal update conflicted, treated as success");
                if activity.draft.has_extended_fields() {
                    pending = Pending::Save;
                }
            }
            Err(failure) if failure.is_transient() => {
                tracing::warn!(%failure, "minimal update failed, will retry with the next flush");
                pending = Pending::Save;
            }
            Err(failure) => return Err(failure.into()),
        }

        let evicted = {
            let mut cache = shared.cache.lock().await;
            let evicted = cache.insert_synced(activity.clone(), pending);
            shared.commit(&cache).await;
            evicted
        };
        shared.forget_payload(&activity.id, false).await;
        if let Some(evicted) = evicted {
            shared.forget_payload(&evicted.id, true).await;
        }

        if pending == Pending::Save {
            self.schedule_flush();
        }
        Ok(activity)
    }

    /// Submits all pending work as one batch and applies every per-item
    /// outcome as it arrives. A flush while another one runs is skipped.
    #[tracing::instrument(skip(self), fields(zone = %self.inner.shared.zone))]
    pub async fn flush(&self) -> SyncResult {
        let shared = &self.inner.shared;
        let Some(_guard) = CycleGuard::enter(shared, &shared.flushing) else {
            tracing::debug!("flush already in progress, skipping");
            return SyncResult::NoData;
        };

        let plan = shared.cache.lock().await.begin_flush();
        if plan.is_empty() {
            tracing::debug!("nothing to flush");
            return shared.finish(SyncResult::NoData);
        }

        let ids: Vec<RecordId> = plan.ids().cloned().collect();
        tracing::info!(saves = plan.saves.len(), deletes = plan.deletes.len(), "flushing local changes");
        let timeout = self.inner.config.cycle_timeout;
        let result = match tokio::time::timeout(timeout, self.run_flush(plan)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?timeout, "flush timed out, pending work stays queued");
                SyncResult::Failed
            }
        };

        // Anything the batch did not resolve is retried by a later flush.
        {
            let mut cache = shared.cache.lock().await;
            for id in &ids {
                cache.release(id);
            }
            shared.publish(&cache);
        }
        shared.finish(result)
    }

    async fn run_flush(&self, plan: FlushPlan) -> SyncResult {
        let shared = &self.inner.shared;
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        let mut saves = Vec::with_capacity(plan.saves.len());
        for activity in &plan.saves {
            match self.load_track(activity).await {
                Ok(track) => saves.push(to_record(activity, track.as_deref())),
                Err(e) => {
                    tracing::warn!(id = %activity.id, err = %e, "track unavailable, save postponed");
                    shared.cache.lock().await.release(&activity.id);
                    failed += 1;
                }
            }
        }

        let mut deleted = Vec::new();
        let mut events = self.inner.executor.save_and_delete(saves, plan.deletes);
        while let Some(event) = events.recv().await {
            let mut cache = shared.cache.lock().await;
            let ok = match event {
                BatchEvent::Saved { id, result } => resolve_save(&mut cache, &id, result),
                BatchEvent::Deleted { id, result } => {
                    let ok = resolve_delete(&mut cache, &id, result);
                    if ok {
                        deleted.push(id);
                    }
                    ok
                }
                BatchEvent::Completed(summary) => {
                    tracing::debug!(?summary, "batch resolved");
                    break;
                }
            };
            if ok {
                succeeded += 1;
            } else {
                failed += 1;
            }
            shared.commit(&cache).await;
        }

        for id in &deleted {
            shared.forget_payload(id, true).await;
        }

        match (succeeded, failed) {
            (0, 0) => SyncResult::NoData,
            (0, _) => SyncResult::Failed,
            _ => SyncResult::NewData,
        }
    }

    /// Reads the track of a pending save from the local blob, falling back to
    /// the remote copy when only the remote has it.
    async fn load_track(&self, activity: &Activity) -> Result<Option<Vec<u8>>, SyncError> {
        let shared = &self.inner.shared;
        if !activity.has_track {
            return Ok(None);
        }
        if let Some(track) = shared.read_track(&activity.id).await {
            return Ok(Some(track));
        }

        match self.inner.executor.fetch_record(&activity.id).await {
            Ok(record) => {
                let track = from_record(&record).ok().and_then(|(_, track)| track);
                if let Some(bytes) = &track {
                    shared.cache_track(&activity.id, bytes).await;
                }
                Ok(track)
            }
            Err(failure) if failure.class == ErrorClass::NotFound => {
                tracing::warn!(id = %activity.id, "track missing locally and remotely, saving without it");
                Ok(None)
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Pull-to-refresh. With local changes pending only a flush runs; otherwise
    /// the freshest page replaces the settled part of the cache. A failed fetch
    /// leaves the cache untouched.
    #[tracing::instrument(skip(self), fields(zone = %self.inner.shared.zone))]
    pub async fn refresh(&self) -> SyncResult {
        let shared = &self.inner.shared;
        if shared.cache.lock().await.is_dirty() {
            tracing::info!("local changes pending, flushing instead of fetching");
            return self.flush().await;
        }

        let Some(_guard) = CycleGuard::enter(shared, &shared.fetching) else {
            tracing::debug!("fetch already in progress, skipping refresh");
            return SyncResult::NoData;
        };

        let Some(window) = self.fetch_window(None).await else {
            return shared.finish(SyncResult::Failed);
        };
        let count = window.records;
        let merged = {
            let mut cache = shared.cache.lock().await;
            let merged = cache.replace_with(window.activities);
            *shared.cursor() = window.last_start;
            shared
                .end_of_data
                .store(count < self.inner.config.page_size, Ordering::Release);
            shared.commit(&cache).await;
            merged
        };
        shared.forget_evicted(&merged.evicted).await;

        tracing::info!(count, changed = merged.changed, evicted = merged.evicted.len(), "refresh finished");
        shared.finish(if merged.changed {
            SyncResult::NewData
        } else {
            SyncResult::NoData
        })
    }

    /// Fetches the page of activities older than the last page loaded by
    /// [`refresh`](Self::refresh) or by this method. Local adds and change-feed
    /// inserts never move that position. Once a page comes back short, further
    /// calls do nothing until the next refresh.
    #[tracing::instrument(skip(self), fields(zone = %self.inner.shared.zone))]
    pub async fn load_more(&self) -> SyncResult {
        let shared = &self.inner.shared;
        if shared.end_of_data.load(Ordering::Acquire) {
            tracing::debug!("end of data reached");
            return shared.finish(SyncResult::NoData);
        }

        let Some(_guard) = CycleGuard::enter(shared, &shared.fetching) else {
            tracing::debug!("fetch already in progress, skipping");
            return SyncResult::NoData;
        };

        let cursor = *shared.cursor();
        let Some(window) = self.fetch_window(cursor).await else {
            return shared.finish(SyncResult::Failed);
        };
        let count = window.records;
        let merged = {
            let mut cache = shared.cache.lock().await;
            let merged = cache.append_older(window.activities);
            if window.last_start.is_some() {
                *shared.cursor() = window.last_start;
            }
            shared
                .end_of_data
                .store(count < self.inner.config.page_size, Ordering::Release);
            shared.commit(&cache).await;
            merged
        };
        shared.forget_evicted(&merged.evicted).await;

        tracing::info!(count, added = merged.added, evicted = merged.evicted.len(), "page loaded");
        shared.finish(if merged.added > 0 {
            SyncResult::NewData
        } else {
            SyncResult::NoData
        })
    }

    /// One windowed fetch, newest first, strictly older than `before`.
    async fn fetch_window(&self, before: Option<Timestamp>) -> Option<Window> {
        let mut query = Query::new(ACTIVITY_RECORD_TYPE, self.inner.config.page_size)
            .sort_by(SortDescriptor::descending(START_FIELD))
            .fields(SUMMARY_FIELDS)
            .priority(QueryPriority::UserInitiated);
        if let Some(before) = before {
            query = query.filter(Predicate::less_than(START_FIELD, before));
        }

        let timeout = self.inner.config.cycle_timeout;
        let fetch = match tokio::time::timeout(timeout, self.inner.executor.block_fetch(&query, |_| {})).await {
            Ok(fetch) => fetch,
            Err(_) => {
                tracing::warn!(?timeout, "fetch timed out, keeping local state");
                return None;
            }
        };
        if let Some(failure) = fetch.failure {
            tracing::warn!(%failure, "fetch failed, keeping local state");
            return None;
        }

        let last_start = fetch
            .records
            .iter()
            .rev()
            .find_map(|record| record.field(START_FIELD).and_then(FieldValue::as_timestamp));
        let activities = fetch
            .records
            .iter()
            .filter_map(|record| match from_record(record) {
                Ok((activity, _)) => Some(activity),
                Err(e) => {
                    tracing::warn!(err = %e, "skipping malformed record");
                    None
                }
            })
            .collect();
        Some(Window {
            activities,
            records: fetch.records.len(),
            last_start,
        })
    }

    /// Entry point for push notifications: follows the change feed.
    pub async fn handle_notification(&self, subscription_id: &str) -> SyncResult {
        tracing::info!(subscription_id, "change notification received");
        self.pull_changes().await
    }

    /// Follows the change feed from the persisted token until the server has
    /// nothing more, dispatching every page to the registered handlers before
    /// saving its token.
    #[tracing::instrument(skip(self), fields(zone = %self.inner.shared.zone))]
    pub async fn pull_changes(&self) -> SyncResult {
        let shared = &self.inner.shared;
        let Some(_guard) = CycleGuard::enter(shared, &shared.fetching) else {
            tracing::debug!("fetch already in progress, skipping change feed");
            return SyncResult::NoData;
        };

        let timeout = self.inner.config.cycle_timeout;
        let result = match tokio::time::timeout(timeout, self.run_change_feed()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?timeout, "change feed timed out, resuming from the last saved token next time");
                SyncResult::Failed
            }
        };
        shared.finish(result)
    }

    async fn run_change_feed(&self) -> SyncResult {
        let zone = &self.inner.shared.zone;
        let tokens = &self.inner.tokens;

        let mut token = tokens.read(zone).await;
        let mut reset = false;
        let mut handled = 0usize;
        loop {
            let changes = match self.inner.executor.fetch_changes(zone, token.as_ref()).await {
                Ok(changes) => changes,
                Err(failure) if is_token_expired(&failure) && !reset => {
                    tracing::warn!("change token expired, fetching the zone from the beginning");
                    tokens.clear(zone).await;
                    token = None;
                    reset = true;
                    continue;
                }
                Err(failure) => {
                    tracing::warn!(%failure, "change feed failed");
                    return SyncResult::Failed;
                }
            };

            handled += self.dispatch(&changes).await;
            tokens.write(zone, &changes.token).await;
            tracing::debug!(
                changed = changes.changed.len(),
                deleted = changes.deleted.len(),
                more_coming = changes.more_coming,
                "change page applied"
            );
            if !changes.more_coming {
                break;
            }
            token = Some(changes.token);
        }

        if handled > 0 {
            SyncResult::NewData
        } else {
            SyncResult::NoData
        }
    }

    async fn dispatch(&self, changes: &ChangeSet) -> usize {
        let registry = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut handled = 0;
        for record in &changes.changed {
            if dispatch_change(registry.get(record.record_type()), record).await {
                handled += 1;
            }
        }
        for deleted in &changes.deleted {
            if dispatch_delete(registry.get(&deleted.record_type), deleted).await {
                handled += 1;
            }
        }
        handled
    }

    /// Returns an activity with its track, from the payload cache, the local
    /// blob or a remote full fetch, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the activity exists nowhere, or the
    /// classified error of the remote fetch.
    #[tracing::instrument(skip(self))]
    pub async fn hydrate(&self, id: &RecordId) -> Result<HydratedActivity, SyncError> {
        let shared = &self.inner.shared;
        let hit = shared.payloads().get(id).cloned();
        if let Some(hit) = hit {
            tracing::trace!("payload cache hit");
            return Ok(hit);
        }

        let local = shared.cache.lock().await.get(id).filter(|e| e.is_visible()).cloned();
        let hydrated = match local {
            Some(entry) if !entry.activity.has_track => HydratedActivity {
                activity: entry.activity,
                track: None,
            },
            Some(entry) => {
                let track = match shared.read_track(id).await {
                    Some(track) => Some(track),
                    None => self.fetch_full(id).await?.track,
                };
                HydratedActivity {
                    activity: entry.activity,
                    track,
                }
            }
            None => self.fetch_full(id).await?,
        };

        shared.payloads().put(id.clone(), hydrated.clone());
        Ok(hydrated)
    }

    async fn fetch_full(&self, id: &RecordId) -> Result<HydratedActivity, SyncError> {
        let record = self.inner.executor.fetch_record(id).await?;
        let (activity, track) = from_record(&record)?;
        if let Some(bytes) = &track {
            self.inner.shared.cache_track(id, bytes).await;
        }
        Ok(HydratedActivity { activity, track })
    }

    /// Drops every hydrated payload, e.g. under memory pressure.
    pub fn clear_payload_cache(&self) {
        self.inner.shared.payloads().clear();
    }

    /// Moves a synced activity to another zone with one atomic save and
    /// delete. Returns the new id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Unsynced`] while the activity has local work
    /// pending, [`SyncError::NotFound`] if it is not cached, or the classified
    /// error of the remote operations.
    #[tracing::instrument(skip(self))]
    pub async fn move_to_zone(&self, id: &RecordId, zone: &ZoneId) -> Result<RecordId, SyncError> {
        let shared = &self.inner.shared;
        {
            let cache = shared.cache.lock().await;
            let entry = cache
                .get(id)
                .filter(|e| e.is_visible())
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            if entry.pending != Pending::None || !entry.on_remote || cache.is_in_flight(id) {
                return Err(SyncError::Unsynced(id.to_string()));
            }
        }
        if id.zone() == zone {
            return Ok(id.clone());
        }

        let record = self.inner.executor.fetch_record(id).await?;
        let new_id = RecordId::new(zone.clone(), id.name());
        self.inner
            .executor
            .save_and_delete_atomic(vec![record.with_id(new_id.clone())], vec![id.clone()])
            .await?;

        {
            let mut cache = shared.cache.lock().await;
            cache.remove(id);
            shared.commit(&cache).await;
        }
        shared.forget_payload(id, true).await;

        tracing::info!(to = %new_id, "activity moved");
        Ok(new_id)
    }

    /// Waits until every background flush has finished.
    pub async fn idle(&self) {
        loop {
            let mut tasks = std::mem::take(
                &mut *self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    tracing::error!(%err, "background sync task failed");
                }
            }
        }
    }

    fn schedule_flush(&self) {
        if !self.inner.config.auto_flush {
            return;
        }
        let engine = self.clone();
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            engine.flush().await;
        });
    }
}

fn resolve_save(cache: &mut LocalCache, id: &RecordId, result: Result<Record, Failure>) -> bool {
    let failure = match result {
        Ok(_) => {
            cache.saved(id);
            return true;
        }
        Err(failure) => failure,
    };

    match failure.class {
        ErrorClass::Transient => {
            tracing::warn!(%id, %failure, "save failed, will retry");
            cache.release(id);
            false
        }
        ErrorClass::Conflict => {
            tracing::warn!(%id, %failure, "save conflicted, treated as success");
            cache.saved(id);
            true
        }
        ErrorClass::NotFound | ErrorClass::Permanent => {
            tracing::error!(
                %id,
                op = %failure.op,
                field = failure.error.field(),
                err = %failure.error,
                "save failed permanently, dropping change"
            );
            cache.abandon(id);
            false
        }
    }
}

fn resolve_delete(cache: &mut LocalCache, id: &RecordId, result: Result<(), Failure>) -> bool {
    let failure = match result {
        Ok(()) => {
            cache.deleted(id);
            return true;
        }
        Err(failure) => failure,
    };

    match failure.class {
        ErrorClass::NotFound => {
            tracing::debug!(%id, "already deleted remotely");
            cache.deleted(id);
            true
        }
        ErrorClass::Transient => {
            tracing::warn!(%id, %failure, "delete failed, will retry");
            cache.release(id);
            false
        }
        ErrorClass::Conflict | ErrorClass::Permanent => {
            tracing::error!(
                %id,
                op = %failure.op,
                field = failure.error.field(),
                err = %failure.error,
                "delete failed permanently, dropping change"
            );
            cache.abandon(id);
            false
        }
    }
}

fn is_token_expired(failure: &Failure) -> bool {
    failure.error.code() == ErrorCode::ChangeTokenExpired
}

impl Shared {
    fn payloads(&self) -> MutexGuard<'_, PayloadCache<HydratedActivity>> {
        self.payloads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cursor(&self) -> MutexGuard<'_, Option<Timestamp>> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn forget_evicted(&self, evicted: &[Activity]) {
        for activity in evicted {
            self.forget_payload(&activity.id, true).await;
        }
    }

    /// Persists the cache snapshot and publishes the view. A failed write is
    /// retried once before the persistence warning is raised.
    async fn commit(&self, cache: &LocalCache) {
        let key = snapshot_key(&self.zone);
        let written = match cache.to_snapshot() {
            Ok(bytes) => match self.blobs.write_blob(&key, &bytes).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(err = %e, "snapshot write failed, retrying");
                    match self.blobs.write_blob(&key, &bytes).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::error!(err = %e, "snapshot write failed again, changes may not survive a restart");
                            false
                        }
                    }
                }
            },
            Err(e) => {
                tracing::error!(err = %e, "failed to encode snapshot");
                false
            }
        };

        self.persistence_warning.store(!written, Ordering::Release);
        self.publish(cache);
    }

    fn flags(&self, status: &mut SyncStatus) {
        status.persistence_warning = self.persistence_warning.load(Ordering::Acquire);
        status.end_of_data = self.end_of_data.load(Ordering::Acquire);
        status.fetching = self.fetching.load(Ordering::Acquire);
        status.flushing = self.flushing.load(Ordering::Acquire);
        status.last_result = *self.last_result.lock().unwrap_or_else(PoisonError::into_inner);
    }

    fn publish(&self, cache: &LocalCache) {
        let mut status = SyncStatus {
            pending_uploads: cache.pending_count(),
            ..SyncStatus::default()
        };
        self.flags(&mut status);
        self.view.send_replace(SyncView {
            activities: cache.visible().cloned().collect(),
            status,
        });
    }

    fn publish_status(&self) {
        self.view.send_modify(|view| self.flags(&mut view.status));
    }

    fn finish(&self, result: SyncResult) -> SyncResult {
        *self.last_result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.publish_status();
        result
    }

    async fn store_track(&self, id: &RecordId, bytes: &[u8]) -> Result<(), SyncError> {
        self.blobs
            .write_blob(&payload_key(id), bytes)
            .await
            .map_err(|e| SyncError::LocalPersistenceFailure(format!("failed to store track: {e}")))
    }

    /// Keeps a downloaded track locally; failures only cost a later re-download.
    async fn cache_track(&self, id: &RecordId, bytes: &[u8]) {
        if let Err(e) = self.blobs.write_blob(&payload_key(id), bytes).await {
            tracing::debug!(%id, err = %e, "failed to keep track locally");
        }
    }

    async fn read_track(&self, id: &RecordId) -> Option<Vec<u8>> {
        match self.blobs.read_blob(&payload_key(id)).await {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!(%id, err = %e, "failed to read local track");
                None
            }
        }
    }

    /// Drops the hydrated copy of an entity, and its local track when `blob` is set.
    async fn forget_payload(&self, id: &RecordId, blob: bool) {
        self.payloads().remove(id);
        if blob {
            if let Err(e) = self.blobs.delete_blob(&payload_key(id)).await {
                tracing::debug!(%id, err = %e, "failed to delete local track");
            }
        }
    }
}

/// Marks a cycle as running for as long as it lives.
struct CycleGuard<'a> {
    shared: &'a Shared,
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn enter(shared: &'a Shared, flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        shared.publish_status();
        Some(Self { shared, flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.shared.publish_status();
    }
}

/// Applies change-feed activities to the local cache.
#[derive(Debug)]
struct ActivityHandler {
    shared: Arc<Shared>,
}

#[async_trait]
impl RecordHandler for ActivityHandler {
    async fn on_change(&self, record: &Record) -> Result<(), SyncError> {
        let (activity, track) = from_record(record)?;
        let id = activity.id.clone();

        let evicted = {
            let mut cache = self.shared.cache.lock().await;
            let evicted = match cache.apply_remote(activity) {
                RemoteApply::Skipped => {
                    tracing::debug!(%id, "local changes pending, ignoring remote version");
                    return Ok(());
                }
                RemoteApply::Updated => None,
                RemoteApply::Inserted { evicted } => evicted,
            };
            self.shared.commit(&cache).await;
            evicted
        };

        self.shared.forget_payload(&id, false).await;
        if let Some(bytes) = &track {
            self.shared.cache_track(&id, bytes).await;
        }
        if let Some(evicted) = evicted {
            self.shared.forget_payload(&evicted.id, true).await;
        }
        Ok(())
    }

    async fn on_delete(&self, id: &RecordId) -> Result<(), SyncError> {
        let removed = {
            let mut cache = self.shared.cache.lock().await;
            let removed = cache.remove_remote(id);
            if removed.is_some() {
                self.shared.commit(&cache).await;
            }
            removed
        };

        match removed {
            Some(_) => self.shared.forget_payload(id, true).await,
            None => tracing::debug!(%id, "deleted remotely, nothing to remove locally"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trailsync_remote::{MemoryRemoteStore, Operation};

    use super::*;
    use crate::activity::Sport;
    use crate::storage::SqliteBlobStore;

    async fn engine() -> (SyncEngine, Arc<MemoryRemoteStore>) {
        let store = Arc::new(MemoryRemoteStore::new());
        let blobs = Arc::new(SqliteBlobStore::open(None).await.unwrap());
        let config = Config {
            auto_flush: false,
            ..Config::default()
        };
        let engine = SyncEngine::with_storage(config, store.clone(), blobs).await.unwrap();
        (engine, store)
    }

    fn draft(name: &str) -> ActivityDraft {
        ActivityDraft::new(name, Sport::Ride, Timestamp::from_second(1_700_000_000).unwrap())
    }

    #[tokio::test]
    async fn view_tracks_pending_uploads() {
        let (engine, _store) = engine().await;
        let view = engine.subscribe();

        engine.add(draft("a"), None).await.unwrap();
        assert_eq!(view.borrow().activities.len(), 1);
        assert_eq!(view.borrow().status.pending_uploads, 1);

        assert_eq!(engine.flush().await, SyncResult::NewData);
        let status = engine.status();
        assert_eq!(status.pending_uploads, 0);
        assert_eq!(status.last_result, Some(SyncResult::NewData));
        assert!(!status.flushing);
    }

    #[tokio::test]
    async fn flush_with_nothing_pending_is_no_data() {
        let (engine, store) = engine().await;
        assert_eq!(engine.flush().await, SyncResult::NoData);
        assert_eq!(store.modify_calls(), 0);
    }

    #[tokio::test]
    async fn hydrate_without_track_uses_local_entry() {
        let (engine, store) = engine().await;
        let activity = engine.add(draft("a"), None).await.unwrap();

        let hydrated = engine.hydrate(&activity.id).await.unwrap();
        assert_eq!(hydrated.activity, activity);
        assert!(hydrated.track.is_none());
        assert!(store.get(&activity.id).is_none());
    }

    #[tokio::test]
    async fn change_feed_expired_token_resets_zone() {
        let (engine, store) = engine().await;
        let zone = engine.zone().clone();
        store.insert(to_record(&Activity::new(make_id(&zone, Some("r1")), draft("remote"), false), None));
        store.fail_next(Operation::FetchChanges, ErrorCode::ChangeTokenExpired);

        assert_eq!(engine.pull_changes().await, SyncResult::NewData);
        assert_eq!(engine.activities().await.len(), 1);
    }
}
