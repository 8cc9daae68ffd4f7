// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use trailsync_remote::{ChangeToken, ZoneId};

use crate::storage::BlobStore;

/// Persists one opaque change token per zone.
///
/// Storage failures are logged and degrade to "no token", which makes the next
/// change-feed fetch start from the beginning.
#[derive(Debug, Clone)]
pub struct ChangeTokenStore {
    blobs: Arc<dyn BlobStore>,
}

impl ChangeTokenStore {
    /// Creates a token store on top of a blob store.
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    fn key(zone: &ZoneId) -> String {
        format!("change-token/{zone}")
    }

    /// Returns the persisted token of a zone.
    pub async fn read(&self, zone: &ZoneId) -> Option<ChangeToken> {
        match self.blobs.read_blob(&Self::key(zone)).await {
            Ok(bytes) => bytes.map(ChangeToken::new),
            Err(e) => {
                tracing::warn!(%zone, err = %e, "failed to read change token, fetching from the beginning");
                None
            }
        }
    }

    /// Persists the token of a zone. Returns whether the write succeeded.
    pub async fn write(&self, zone: &ZoneId, token: &ChangeToken) -> bool {
        match self.blobs.write_blob(&Self::key(zone), token.as_bytes()).await {
            Ok(()) => {
                tracing::trace!(%zone, ?token, "change token saved");
                true
            }
            Err(e) => {
                tracing::warn!(%zone, err = %e, "failed to persist change token");
                false
            }
        }
    }

    /// Forgets the token of a zone.
    pub async fn clear(&self, zone: &ZoneId) {
        if let Err(e) = self.blobs.delete_blob(&Self::key(zone)).await {
            tracing::warn!(%zone, err = %e, "failed to clear change token");
        }
    }
}
