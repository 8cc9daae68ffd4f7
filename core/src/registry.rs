// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Record-type dispatch table for the change feed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use trailsync_remote::{DeletedRecord, Record, RecordId};

use crate::error::SyncError;

/// Receives change-feed events for one record type.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// A record was created or modified remotely.
    async fn on_change(&self, record: &Record) -> Result<(), SyncError>;

    /// A record was deleted remotely.
    async fn on_delete(&self, id: &RecordId) -> Result<(), SyncError>;
}

/// Adapts a pair of closures into a [`RecordHandler`].
pub struct FnHandler<C, D> {
    on_change: C,
    on_delete: D,
}

impl<C, D> FnHandler<C, D>
where
    C: Fn(&Record) + Send + Sync,
    D: Fn(&RecordId) + Send + Sync,
{
    /// Creates a handler from closures.
    pub const fn new(on_change: C, on_delete: D) -> Self {
        Self {
            on_change,
            on_delete,
        }
    }
}

#[async_trait]
impl<C, D> RecordHandler for FnHandler<C, D>
where
    C: Fn(&Record) + Send + Sync,
    D: Fn(&RecordId) + Send + Sync,
{
    async fn on_change(&self, record: &Record) -> Result<(), SyncError> {
        (self.on_change)(record);
        Ok(())
    }

    async fn on_delete(&self, id: &RecordId) -> Result<(), SyncError> {
        (self.on_delete)(id);
        Ok(())
    }
}

/// Maps record types to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn RecordHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler of a record type, replacing any previous one.
    pub fn register(&mut self, record_type: impl Into<String>, handler: Arc<dyn RecordHandler>) {
        let record_type = record_type.into();
        tracing::debug!(%record_type, "registering change handler");
        self.handlers.insert(record_type, handler);
    }

    /// Returns the handler of a record type.
    #[must_use]
    pub fn get(&self, record_type: &str) -> Option<Arc<dyn RecordHandler>> {
        self.handlers.get(record_type).cloned()
    }
}

/// Dispatches a changed record. Returns whether a handler accepted it.
pub async fn dispatch_change(handler: Option<Arc<dyn RecordHandler>>, record: &Record) -> bool {
    let Some(handler) = handler else {
        tracing::debug!(id = %record.id(), record_type = record.record_type(), "no handler for record type");
        return false;
    };
    match handler.on_change(record).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(id = %record.id(), err = %e, "change handler failed, skipping record");
            false
        }
    }
}

/// Dispatches a deleted record. Returns whether a handler accepted it.
pub async fn dispatch_delete(handler: Option<Arc<dyn RecordHandler>>, deleted: &DeletedRecord) -> bool {
    let Some(handler) = handler else {
        tracing::debug!(id = %deleted.id, record_type = %deleted.record_type, "no handler for record type");
        return false;
    };
    match handler.on_delete(&deleted.id).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(id = %deleted.id, err = %e, "delete handler failed, skipping record");
            false
        }
    }
}
