// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Local mutation cache: the ordered, bounded list of activities together with
//! the remote work each of them still owes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use trailsync_remote::{RecordId, ZoneId};

use crate::activity::{Activity, ActivityDraft};
use crate::error::SyncError;

const SNAPSHOT_VERSION: u32 = 1;

/// Remote work an entity still owes. At most one kind is pending at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pending {
    /// In sync with the remote, as far as the cache knows.
    #[default]
    None,
    /// Must be saved remotely.
    Save,
    /// Must be deleted remotely; hidden from every visible projection.
    Delete,
}

/// An activity and its sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedActivity {
    /// The activity.
    pub activity: Activity,
    /// Outstanding remote work.
    pub pending: Pending,
    /// A save of this entity was confirmed by the remote at least once.
    pub on_remote: bool,
}

impl CachedActivity {
    /// Whether the entity shows up in visible projections.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.pending != Pending::Delete
    }

    /// The entity has local changes the remote has not confirmed yet.
    #[must_use]
    pub fn is_pending_upload(&self) -> bool {
        self.pending == Pending::Save
    }
}

/// Result of [`LocalCache::mark_for_delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The entity never reached the remote and was dropped locally.
    RemovedLocally,
    /// The entity is hidden and waits for a remote delete.
    Pending,
}

/// Result of applying a remote change to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteApply {
    /// The entity has local work in progress; the remote version was ignored.
    Skipped,
    /// An existing entity was replaced.
    Updated,
    /// A new entity was inserted, possibly evicting another one.
    Inserted {
        /// The evicted entity.
        evicted: Option<Activity>,
    },
}

/// Work collected by [`LocalCache::begin_flush`].
#[derive(Debug, Clone, Default)]
pub struct FlushPlan {
    /// Entities to save.
    pub saves: Vec<Activity>,
    /// Entities to delete.
    pub deletes: Vec<RecordId>,
}

impl FlushPlan {
    /// Whether there is nothing to submit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    /// Every id in the plan.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.saves.iter().map(|a| &a.id).chain(self.deletes.iter())
    }
}

/// Outcome of merging a fetched window into the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    /// Entities that were not cached before.
    pub added: usize,
    /// Whether the cached entities changed.
    pub changed: bool,
    /// Settled entities evicted to stay within capacity.
    pub evicted: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq)]
enum InFlight {
    Save(Activity),
    Delete,
}

/// Ordered, newest-first, soft-bounded collection of activities.
///
/// Entities with pending or in-flight remote work are never evicted, so the
/// cache may exceed its capacity until that work settles.
#[derive(Debug, Clone)]
pub struct LocalCache {
    zone: ZoneId,
    capacity: usize,
    entries: Vec<CachedActivity>,
    in_flight: HashMap<RecordId, InFlight>,
}

impl LocalCache {
    /// Creates an empty cache for a zone.
    #[must_use]
    pub fn new(zone: ZoneId, capacity: usize) -> Self {
        Self {
            zone,
            capacity,
            entries: Vec::new(),
            in_flight: HashMap::new(),
        }
    }

    /// The mirrored zone.
    #[must_use]
    pub const fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// The soft capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entities, including hidden ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entity, newest first.
    #[must_use]
    pub fn entries(&self) -> &[CachedActivity] {
        &self.entries
    }

    /// Entities not pending delete, newest first.
    pub fn visible(&self) -> impl Iterator<Item = &CachedActivity> {
        self.entries.iter().filter(|e| e.is_visible())
    }

    /// Looks up an entity, hidden ones included.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&CachedActivity> {
        self.entries.iter().find(|e| &e.activity.id == id)
    }

    /// Looks up a visible entity by its correlating key.
    #[must_use]
    pub fn find_by_external_id(&self, key: i64) -> Option<&CachedActivity> {
        self.visible()
            .find(|e| e.activity.draft.external_id == Some(key))
    }

    /// Whether any entity has pending remote work.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.entries.iter().any(|e| e.pending != Pending::None)
    }

    /// Number of entities with pending remote work.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.pending != Pending::None)
            .count()
    }

    /// Whether remote work for the entity is currently submitted.
    #[must_use]
    pub fn is_in_flight(&self, id: &RecordId) -> bool {
        self.in_flight.contains_key(id)
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.entries.iter().position(|e| &e.activity.id == id)
    }

    fn is_settled(&self, e: &CachedActivity) -> bool {
        e.pending == Pending::None && !self.in_flight.contains_key(&e.activity.id)
    }

    /// Inserts a new or re-added entity at the front, marked for saving.
    /// Returns the entity evicted to make room, if any.
    pub fn add(&mut self, activity: Activity) -> Option<Activity> {
        let on_remote = match self.position(&activity.id) {
            Some(pos) => self.entries.remove(pos).on_remote,
            None => false,
        };
        self.entries.insert(
            0,
            CachedActivity {
                activity,
                pending: Pending::Save,
                on_remote,
            },
        );
        self.evict_one()
    }

    /// Replaces the fields of a visible entity and marks it for saving.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the entity is absent or pending delete.
    pub fn update(&mut self, activity: Activity) -> Result<(), SyncError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.activity.id == activity.id && e.is_visible())
            .ok_or_else(|| SyncError::NotFound(activity.id.to_string()))?;
        entry.activity = activity;
        entry.pending = Pending::Save;
        Ok(())
    }

    /// Inserts an entity the remote already holds, e.g. one adopted by its
    /// correlating key.
    pub fn insert_synced(&mut self, activity: Activity, pending: Pending) -> Option<Activity> {
        if let Some(pos) = self.position(&activity.id) {
            self.entries.remove(pos);
        }
        self.entries.insert(
            0,
            CachedActivity {
                activity,
                pending,
                on_remote: true,
            },
        );
        self.evict_one()
    }

    /// Marks a visible entity for deletion.
    ///
    /// An entity that never reached the remote and has no save in flight is
    /// removed right away without any remote call.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the entity is absent or already pending delete.
    pub fn mark_for_delete(&mut self, id: &RecordId) -> Result<DeleteOutcome, SyncError> {
        let pos = self
            .position(id)
            .filter(|&pos| self.entries[pos].is_visible())
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        if !self.entries[pos].on_remote && !self.in_flight.contains_key(id) {
            self.entries.remove(pos);
            return Ok(DeleteOutcome::RemovedLocally);
        }

        self.entries[pos].pending = Pending::Delete;
        Ok(DeleteOutcome::Pending)
    }

    /// Collects pending work not yet in flight and marks it in flight.
    pub fn begin_flush(&mut self) -> FlushPlan {
        let mut plan = FlushPlan::default();
        for e in &self.entries {
            if self.in_flight.contains_key(&e.activity.id) {
                continue;
            }
            match e.pending {
                Pending::Save => plan.saves.push(e.activity.clone()),
                Pending::Delete => plan.deletes.push(e.activity.id.clone()),
                Pending::None => {}
            }
        }

        for a in &plan.saves {
            self.in_flight.insert(a.id.clone(), InFlight::Save(a.clone()));
        }
        for id in &plan.deletes {
            self.in_flight.insert(id.clone(), InFlight::Delete);
        }
        plan
    }

    /// Records a confirmed save. The pending flag is cleared only when the
    /// entity was not changed while the save was in flight.
    pub fn saved(&mut self, id: &RecordId) {
        let sent = match self.in_flight.remove(id) {
            Some(InFlight::Save(sent)) => Some(sent),
            _ => None,
        };
        if let Some(e) = self.entries.iter_mut().find(|e| &e.activity.id == id) {
            e.on_remote = true;
            if e.pending == Pending::Save && sent.as_ref() == Some(&e.activity) {
                e.pending = Pending::None;
            }
        }
    }

    /// Records a confirmed delete and drops the entity.
    pub fn deleted(&mut self, id: &RecordId) {
        self.in_flight.remove(id);
        if let Some(pos) = self.position(id) {
            if self.entries[pos].pending != Pending::Save {
                self.entries.remove(pos);
            }
        }
    }

    /// Returns in-flight work to the pending state for a later flush.
    pub fn release(&mut self, id: &RecordId) {
        self.in_flight.remove(id);
    }

    /// Drops in-flight work that can never succeed by clearing its pending flag.
    pub fn abandon(&mut self, id: &RecordId) {
        let Some(flight) = self.in_flight.remove(id) else {
            return;
        };
        if let Some(e) = self.entries.iter_mut().find(|e| &e.activity.id == id) {
            let matches = match flight {
                InFlight::Save(sent) => e.pending == Pending::Save && sent == e.activity,
                InFlight::Delete => e.pending == Pending::Delete,
            };
            if matches {
                e.pending = Pending::None;
            }
        }
    }

    /// Replaces the settled entities with a freshly fetched window. Entities
    /// with pending or in-flight work are kept in front.
    pub fn replace_with(&mut self, fetched: Vec<Activity>) -> Merged {
        let before = self.entries.clone();
        let mut entries: Vec<CachedActivity> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| !self.is_settled(e))
            .collect();

        let mut added = 0;
        for activity in fetched {
            if entries.iter().all(|e| e.activity.id != activity.id) {
                entries.push(CachedActivity {
                    activity,
                    pending: Pending::None,
                    on_remote: true,
                });
                added += 1;
            }
        }

        self.entries = entries;
        let evicted = self.evict_to_capacity();
        Merged {
            added,
            changed: self.entries != before,
            evicted,
        }
    }

    /// Appends older entities fetched by a continuation page.
    pub fn append_older(&mut self, fetched: Vec<Activity>) -> Merged {
        let mut added = 0;
        for activity in fetched {
            if self.position(&activity.id).is_none() {
                self.entries.push(CachedActivity {
                    activity,
                    pending: Pending::None,
                    on_remote: true,
                });
                added += 1;
            }
        }

        let evicted = self.evict_to_capacity();
        Merged {
            added,
            changed: added > 0,
            evicted,
        }
    }

    /// Applies a remote create or update. Local work in progress wins.
    pub fn apply_remote(&mut self, activity: Activity) -> RemoteApply {
        if let Some(pos) = self.position(&activity.id) {
            if !self.is_settled(&self.entries[pos]) {
                return RemoteApply::Skipped;
            }
            self.entries[pos].activity = activity;
            self.entries[pos].on_remote = true;
            return RemoteApply::Updated;
        }

        let start = activity.draft.start;
        let pos = self
            .entries
            .iter()
            .position(|e| e.activity.draft.start < start)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            CachedActivity {
                activity,
                pending: Pending::None,
                on_remote: true,
            },
        );
        RemoteApply::Inserted {
            evicted: self.evict_one(),
        }
    }

    /// Applies a remote delete. Returns `None` when the entity is absent or
    /// has local work in progress.
    pub fn remove_remote(&mut self, id: &RecordId) -> Option<Activity> {
        let pos = self.position(id)?;
        if !self.is_settled(&self.entries[pos]) {
            return None;
        }
        Some(self.entries.remove(pos).activity)
    }

    /// Removes an entity unconditionally, e.g. after it moved to another zone.
    pub fn remove(&mut self, id: &RecordId) -> Option<Activity> {
        self.in_flight.remove(id);
        let pos = self.position(id)?;
        Some(self.entries.remove(pos).activity)
    }

    /// Evicts the oldest settled entity when over capacity.
    fn evict_one(&mut self) -> Option<Activity> {
        if self.entries.len() <= self.capacity {
            return None;
        }
        let pos = self.entries.iter().rposition(|e| self.is_settled(e))?;
        let evicted = self.entries.remove(pos).activity;
        tracing::debug!(id = %evicted.id, "evicted from local cache");
        Some(evicted)
    }

    /// Evicts settled entities from the back until the capacity holds or
    /// only pending work is left.
    fn evict_to_capacity(&mut self) -> Vec<Activity> {
        let mut evicted = Vec::new();
        while let Some(activity) = self.evict_one() {
            evicted.push(activity);
        }
        evicted
    }

    /// Serializes the cache. In-flight state is not part of the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if an activity cannot be encoded.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, serde_json::Error> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|e| SnapshotEntry {
                    record_name: e.activity.id.name().to_string(),
                    draft: e.activity.draft.clone(),
                    has_track: e.activity.has_track,
                    pending: e.pending,
                    on_remote: e.on_remote,
                })
                .collect(),
        };
        serde_json::to_vec(&snapshot)
    }

    /// Restores a cache from a snapshot. Record ids are rebuilt from the
    /// stored record names and the given zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be decoded.
    pub fn from_snapshot(zone: ZoneId, capacity: usize, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(version = snapshot.version, "unexpected snapshot version, reading anyway");
        }

        let entries = snapshot
            .entries
            .into_iter()
            .map(|e| CachedActivity {
                activity: Activity::new(RecordId::new(zone.clone(), e.record_name), e.draft, e.has_track),
                pending: e.pending,
                on_remote: e.on_remote,
            })
            .collect();

        Ok(Self {
            zone,
            capacity,
            entries,
            in_flight: HashMap::new(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    version: u32,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEntry {
    record_name: String,
    #[serde(flatten)]
    draft: ActivityDraft,
    #[serde(default)]
    has_track: bool,
    #[serde(default)]
    pending: Pending,
    #[serde(default)]
    on_remote: bool,
}
