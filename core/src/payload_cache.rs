// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use trailsync_remote::RecordId;

/// Fixed-capacity most-recently-used cache of fully hydrated entities.
///
/// Lookups and insertions promote to the front; eviction drops from the back.
/// Everything in it is re-derivable, so it may be cleared at any time.
#[derive(Debug, Clone)]
pub struct PayloadCache<V> {
    capacity: usize,
    entries: VecDeque<(RecordId, V)>,
}

impl<V> PayloadCache<V> {
    /// Creates an empty cache. A capacity of zero caches nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Looks up an entry, promoting it on hit.
    pub fn get(&mut self, id: &RecordId) -> Option<&V> {
        let pos = self.entries.iter().position(|(k, _)| k == id)?;
        if pos != 0 {
            let entry = self.entries.remove(pos)?;
            self.entries.push_front(entry);
        }
        self.entries.front().map(|(_, v)| v)
    }

    /// Inserts or replaces an entry at the front, evicting from the back when full.
    pub fn put(&mut self, id: RecordId, value: V) {
        if self.capacity == 0 {
            return;
        }
        self.remove(&id);
        self.entries.push_front((id, value));
        self.entries.truncate(self.capacity);
    }

    /// Removes an entry.
    pub fn remove(&mut self, id: &RecordId) -> Option<V> {
        let pos = self.entries.iter().position(|(k, _)| k == id)?;
        self.entries.remove(pos).map(|(_, v)| v)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in most-recently-used order.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.entries.iter().map(|(k, _)| k)
    }
}
