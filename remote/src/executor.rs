// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Remote operation executor.
//!
//! The executor turns raw driver calls into the four operation shapes used by the
//! sync engine: paged block fetches, change-feed pages, partial-failure tolerant
//! save-and-delete batches, and single-record fetch or overwrite. Every failure
//! is classified; nothing is retried here.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::{ErrorClass, ErrorCode, Operation, RemoteError};
use crate::query::Query;
use crate::store::{ChangeSet, ModifyRequest, ModifyResponse, RemoteStore};
use crate::types::{ChangeToken, Record, RecordId, ZoneId};

/// A classified failure.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The underlying error.
    pub error: RemoteError,
    /// Operation the failure happened in.
    pub op: Operation,
    /// Retry policy class.
    pub class: ErrorClass,
}

impl Failure {
    /// Classifies an error for an operation.
    #[must_use]
    pub fn new(error: RemoteError, op: Operation) -> Self {
        let class = error.classify(op);
        Self { error, op, class }
    }

    /// Shorthand for `self.class == ErrorClass::Transient`.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({:?}): {}", self.op, self.class, self.error)
    }
}

impl std::error::Error for Failure {}

/// Result of a block fetch: every record received before completion or failure.
#[derive(Debug, Clone, Default)]
pub struct BlockFetch {
    /// Matched records in server order.
    pub records: Vec<Record>,
    /// Set when the fetch stopped early.
    pub failure: Option<Failure>,
}

/// Event emitted while a save-and-delete batch resolves.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Terminal outcome of one save.
    Saved {
        /// Id that was submitted.
        id: RecordId,
        /// Stored record or failure.
        result: Result<Record, Failure>,
    },
    /// Terminal outcome of one delete.
    Deleted {
        /// Id that was submitted.
        id: RecordId,
        /// Unit or failure.
        result: Result<(), Failure>,
    },
    /// Every item has resolved. Always the last event.
    Completed(BatchSummary),
}

/// Counts of a resolved batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Successful saves.
    pub saved: usize,
    /// Successful deletes.
    pub deleted: usize,
    /// Failed items.
    pub failed: usize,
}

/// Issues operations against one injected [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct Executor {
    store: Arc<dyn RemoteStore>,
    batch_size: usize,
}

impl Executor {
    /// Creates an executor; batches larger than `batch_size` items are split
    /// into concurrently submitted chunks.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Pages through a query until `results_limit` records have been received or
    /// the server has no more, calling `on_record` for each match.
    #[tracing::instrument(skip_all, fields(record_type = %query.record_type, limit = query.results_limit))]
    pub async fn block_fetch<F>(&self, query: &Query, mut on_record: F) -> BlockFetch
    where
        F: FnMut(&Record) + Send,
    {
        let mut fetch = BlockFetch::default();
        let mut cursor = None;
        while fetch.records.len() < query.results_limit {
            let remaining = query.results_limit - fetch.records.len();
            let page = match self.store.query(query, cursor.as_ref(), remaining).await {
                Ok(page) => page,
                Err(e) => {
                    let failure = Failure::new(e, Operation::Query);
                    tracing::warn!(%failure, received = fetch.records.len(), "block fetch stopped");
                    fetch.failure = Some(failure);
                    break;
                }
            };

            let got = page.records.len();
            for record in page.records.into_iter().take(remaining) {
                on_record(&record);
                fetch.records.push(record);
            }

            match page.cursor {
                Some(next) if got > 0 => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = fetch.records.len(), "block fetch finished");
        fetch
    }

    /// Fetches one page of the change feed.
    #[tracing::instrument(skip(self, token), fields(has_token = token.is_some()))]
    pub async fn fetch_changes(
        &self,
        zone: &ZoneId,
        token: Option<&ChangeToken>,
    ) -> Result<ChangeSet, Failure> {
        self.store
            .fetch_changes(zone, token)
            .await
            .map_err(|e| Failure::new(e, Operation::FetchChanges))
    }

    /// Submits saves and deletes as one non-atomic batch.
    ///
    /// The returned receiver yields exactly one terminal event per submitted
    /// item, in no particular order, followed by [`BatchEvent::Completed`].
    /// Items the driver never answers for resolve as transient failures.
    pub fn save_and_delete(
        &self,
        saves: Vec<Record>,
        deletes: Vec<RecordId>,
    ) -> mpsc::UnboundedReceiver<BatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.store.clone();
        let chunks = chunk(saves, deletes, self.batch_size);

        tokio::spawn(async move {
            let mut open_saves: HashSet<RecordId> = HashSet::new();
            let mut open_deletes: HashSet<RecordId> = HashSet::new();
            let mut tasks = JoinSet::new();
            for request in chunks {
                open_saves.extend(request.saves.iter().map(|r| r.id().clone()));
                open_deletes.extend(request.deletes.iter().cloned());

                let store = store.clone();
                tasks.spawn(async move {
                    let save_ids: Vec<_> = request.saves.iter().map(|r| r.id().clone()).collect();
                    let delete_ids = request.deletes.clone();
                    let response = store.modify(request).await;
                    (save_ids, delete_ids, response)
                });
            }

            let mut summary = BatchSummary::default();
            let emit = |event: BatchEvent, summary: &mut BatchSummary| {
                match &event {
                    BatchEvent::Saved { result: Ok(_), .. } => summary.saved += 1,
                    BatchEvent::Deleted { result: Ok(()), .. } => summary.deleted += 1,
                    _ => summary.failed += 1,
                }
                // The receiver may be gone; the batch still runs to completion.
                let _ = tx.send(event);
            };

            while let Some(joined) = tasks.join_next().await {
                let (save_ids, delete_ids, response) = match joined {
                    Ok(a) => a,
                    Err(err) => {
                        tracing::error!(%err, "batch chunk task failed");
                        continue;
                    }
                };

                let response = match response {
                    Ok(response) => response,
                    Err(e) => fail_all(&save_ids, &delete_ids, &e),
                };

                for (id, result) in response.saved {
                    if !open_saves.remove(&id) {
                        tracing::warn!(%id, "ignoring duplicate or unknown save result");
                        continue;
                    }
                    let result = result.map_err(|e| Failure::new(e, Operation::Save));
                    emit(BatchEvent::Saved { id, result }, &mut summary);
                }
                for (id, result) in response.deleted {
                    if !open_deletes.remove(&id) {
                        tracing::warn!(%id, "ignoring duplicate or unknown delete result");
                        continue;
                    }
                    let result = result.map_err(|e| Failure::new(e, Operation::Delete));
                    emit(BatchEvent::Deleted { id, result }, &mut summary);
                }
            }

            let missing =
                RemoteError::server(ErrorCode::NetworkFailure, "no result reported for item");
            for id in open_saves {
                let result = Err(Failure::new(missing.clone(), Operation::Save));
                emit(BatchEvent::Saved { id, result }, &mut summary);
            }
            for id in open_deletes {
                let result = Err(Failure::new(missing.clone(), Operation::Delete));
                emit(BatchEvent::Deleted { id, result }, &mut summary);
            }

            tracing::debug!(?summary, "batch completed");
            let _ = tx.send(BatchEvent::Completed(summary));
        });

        rx
    }

    /// Submits saves and deletes atomically: either all apply or none.
    #[tracing::instrument(skip_all, fields(saves = saves.len(), deletes = deletes.len()))]
    pub async fn save_and_delete_atomic(
        &self,
        saves: Vec<Record>,
        deletes: Vec<RecordId>,
    ) -> Result<Vec<Record>, Failure> {
        let request = ModifyRequest {
            saves,
            deletes,
            atomic: true,
        };
        let response = self
            .store
            .modify(request)
            .await
            .map_err(|e| Failure::new(e, Operation::Save))?;

        let mut saved = Vec::with_capacity(response.saved.len());
        for (_, result) in response.saved {
            saved.push(result.map_err(|e| Failure::new(e, Operation::Save))?);
        }
        for (_, result) in response.deleted {
            result.map_err(|e| Failure::new(e, Operation::Delete))?;
        }
        Ok(saved)
    }

    /// Fetches one record with all fields.
    pub async fn fetch_record(&self, id: &RecordId) -> Result<Record, Failure> {
        self.store
            .fetch(id)
            .await
            .map_err(|e| Failure::new(e, Operation::Fetch))
    }

    /// Overwrites one record on the server.
    pub async fn force_update(&self, record: Record) -> Result<Record, Failure> {
        self.store
            .overwrite(record)
            .await
            .map_err(|e| Failure::new(e, Operation::Save))
    }
}

fn chunk(saves: Vec<Record>, deletes: Vec<RecordId>, size: usize) -> Vec<ModifyRequest> {
    let mut chunks = Vec::new();
    let mut current = ModifyRequest::default();
    let mut push = |current: &mut ModifyRequest| {
        if current.saves.len() + current.deletes.len() >= size {
            chunks.push(std::mem::take(current));
        }
    };

    for record in saves {
        current.saves.push(record);
        push(&mut current);
    }
    for id in deletes {
        current.deletes.push(id);
        push(&mut current);
    }
    if !current.saves.is_empty() || !current.deletes.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn fail_all(save_ids: &[RecordId], delete_ids: &[RecordId], e: &RemoteError) -> ModifyResponse {
    ModifyResponse {
        saved: save_ids.iter().map(|id| (id.clone(), Err(e.clone()))).collect(),
        deleted: delete_ids
            .iter()
            .map(|id| (id.clone(), Err(e.clone())))
            .collect(),
    }
}
