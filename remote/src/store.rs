// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Driver boundary of the remote store.

use std::fmt;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::query::{Query, QueryCursor, QueryPage};
use crate::types::{ChangeToken, Record, RecordId, ZoneId};

/// A record reported as deleted by the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    /// Id of the deleted record.
    pub id: RecordId,
    /// Type tag the record had.
    pub record_type: String,
}

/// One page of the incremental change feed.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Records created or modified since the previous token.
    pub changed: Vec<Record>,
    /// Records deleted since the previous token.
    pub deleted: Vec<DeletedRecord>,
    /// Token marking the end of this page.
    pub token: ChangeToken,
    /// The server has more changes after this page.
    pub more_coming: bool,
}

/// A batch of upserts and deletes submitted together.
#[derive(Debug, Clone, Default)]
pub struct ModifyRequest {
    /// Records to create or overwrite.
    pub saves: Vec<Record>,
    /// Records to delete.
    pub deletes: Vec<RecordId>,
    /// All-or-nothing semantics.
    pub atomic: bool,
}

/// Per-item outcome of a [`ModifyRequest`].
#[derive(Debug, Clone, Default)]
pub struct ModifyResponse {
    /// Result of every save, keyed by the id that was submitted.
    pub saved: Vec<(RecordId, Result<Record, RemoteError>)>,
    /// Result of every delete.
    pub deleted: Vec<(RecordId, Result<(), RemoteError>)>,
}

/// A remote document store.
///
/// Implementations perform the raw I/O of one request each and report failures
/// with an [`crate::ErrorCode`]; paging, fan-out and classification live in
/// [`crate::Executor`].
#[async_trait]
pub trait RemoteStore: fmt::Debug + Send + Sync {
    /// Returns up to `limit` records matching the query, continuing from `cursor`.
    async fn query(
        &self,
        query: &Query,
        cursor: Option<&QueryCursor>,
        limit: usize,
    ) -> Result<QueryPage, RemoteError>;

    /// Returns the next page of changes in a zone after `token`, or from the
    /// beginning of history when `token` is `None`.
    async fn fetch_changes(
        &self,
        zone: &ZoneId,
        token: Option<&ChangeToken>,
    ) -> Result<ChangeSet, RemoteError>;

    /// Applies saves and deletes. A batch-level `Err` means no item was applied.
    async fn modify(&self, request: ModifyRequest) -> Result<ModifyResponse, RemoteError>;

    /// Fetches one record with all of its fields.
    async fn fetch(&self, id: &RecordId) -> Result<Record, RemoteError>;

    /// Saves the record's fields unconditionally, ignoring the server version.
    /// Fields absent from `record` keep their server values.
    async fn overwrite(&self, record: Record) -> Result<Record, RemoteError>;
}
