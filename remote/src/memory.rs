// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! In-process remote store.
//!
//! Keeps records in memory with an ordered change log, pages the change feed,
//! and can inject failures. Used for offline operation, demos and tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ErrorCode, Operation, RemoteError};
use crate::query::{Query, QueryCursor, QueryPage};
use crate::store::{ChangeSet, DeletedRecord, ModifyRequest, ModifyResponse, RemoteStore};
use crate::types::{ChangeToken, Record, RecordId, ZoneId};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Remote store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<RecordId, Record>,
    log: Vec<LogEntry>,
    seq: u64,
    change_page_size: Option<usize>,
    query_page_size: Option<usize>,
    latency: Option<Duration>,
    next_failures: VecDeque<(Operation, ErrorCode)>,
    item_failures: HashMap<RecordId, ErrorCode>,
    calls: Calls,
}

#[derive(Debug, Default)]
struct Calls {
    query: usize,
    fetch_changes: usize,
    modify: usize,
    saves: HashMap<RecordId, usize>,
    deletes: HashMap<RecordId, usize>,
}

#[derive(Debug, Clone)]
struct LogEntry {
    seq: u64,
    id: RecordId,
    change: Change,
}

#[derive(Debug, Clone)]
enum Change {
    Saved,
    Deleted { record_type: String },
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, recording the change in the feed.
    pub fn insert(&self, record: Record) {
        self.lock().save(record);
    }

    /// Removes a record, recording the deletion in the feed.
    pub fn remove(&self, id: &RecordId) -> Option<Record> {
        self.lock().delete(id)
    }

    /// Returns a stored record.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.lock().records.get(id).cloned()
    }

    /// Returns every stored record of a type.
    #[must_use]
    pub fn records_of_type(&self, record_type: &str) -> Vec<Record> {
        self.lock()
            .records
            .values()
            .filter(|r| r.record_type() == record_type)
            .cloned()
            .collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Limits the number of log entries per change-feed page.
    pub fn set_change_page_size(&self, size: usize) {
        self.lock().change_page_size = Some(size.max(1));
    }

    /// Limits the number of records per query page.
    pub fn set_query_page_size(&self, size: usize) {
        self.lock().query_page_size = Some(size.max(1));
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Fails the next call of `op` as a whole with `code`.
    pub fn fail_next(&self, op: Operation, code: ErrorCode) {
        self.lock().next_failures.push_back((op, code));
    }

    /// Fails every save or delete of `id` with `code` until cleared.
    pub fn fail_item(&self, id: RecordId, code: ErrorCode) {
        self.lock().item_failures.insert(id, code);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.next_failures.clear();
        state.item_failures.clear();
    }

    /// How many times `id` was submitted for saving.
    #[must_use]
    pub fn save_calls(&self, id: &RecordId) -> usize {
        self.lock().calls.saves.get(id).copied().unwrap_or(0)
    }

    /// How many times `id` was submitted for deletion.
    #[must_use]
    pub fn delete_calls(&self, id: &RecordId) -> usize {
        self.lock().calls.deletes.get(id).copied().unwrap_or(0)
    }

    /// Number of `modify` requests received.
    #[must_use]
    pub fn modify_calls(&self) -> usize {
        self.lock().calls.modify
    }

    /// Number of `query` requests received.
    #[must_use]
    pub fn query_calls(&self) -> usize {
        self.lock().calls.query
    }

    /// Number of `fetch_changes` requests received.
    #[must_use]
    pub fn fetch_changes_calls(&self) -> usize {
        self.lock().calls.fetch_changes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn enter(&self, op: Operation) -> Result<(), RemoteError> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let pos = state.next_failures.iter().position(|(o, _)| *o == op);
        match pos.and_then(|i| state.next_failures.remove(i)) {
            Some((_, code)) => Err(RemoteError::server(code, format!("injected {op} failure"))),
            None => Ok(()),
        }
    }
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn save(&mut self, record: Record) -> Record {
        let seq = self.next_seq();
        let id = record.id().clone();
        self.records.insert(id.clone(), record.clone());
        self.log.push(LogEntry {
            seq,
            id,
            change: Change::Saved,
        });
        record
    }

    fn delete(&mut self, id: &RecordId) -> Option<Record> {
        let removed = self.records.remove(id)?;
        let seq = self.next_seq();
        self.log.push(LogEntry {
            seq,
            id: id.clone(),
            change: Change::Deleted {
                record_type: removed.record_type().to_string(),
            },
        });
        Some(removed)
    }

    fn check_item(&self, id: &RecordId) -> Result<(), RemoteError> {
        match self.item_failures.get(id) {
            Some(code) => Err(RemoteError::server(*code, format!("injected failure for {id}"))),
            None => Ok(()),
        }
    }
}

fn encode_token(seq: u64) -> ChangeToken {
    ChangeToken::new(seq.to_be_bytes().to_vec())
}

fn decode_token(token: &ChangeToken) -> Result<u64, RemoteError> {
    let bytes: [u8; 8] = token.as_bytes().try_into().map_err(|_| {
        RemoteError::server(ErrorCode::ChangeTokenExpired, "change token not recognized")
    })?;
    Ok(u64::from_be_bytes(bytes))
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn query(
        &self,
        query: &Query,
        cursor: Option<&QueryCursor>,
        limit: usize,
    ) -> Result<QueryPage, RemoteError> {
        self.enter(Operation::Query).await?;
        let mut state = self.lock();
        state.calls.query += 1;

        let offset = match cursor {
            Some(c) => c
                .as_str()
                .parse::<usize>()
                .map_err(|_| RemoteError::server(ErrorCode::InvalidArguments, "bad cursor"))?,
            None => 0,
        };

        let mut matched: Vec<&Record> = state.records.values().filter(|r| query.matches(r)).collect();
        matched.sort_by(|a, b| query.compare(a, b));

        let page_size = limit.min(state.query_page_size.unwrap_or(DEFAULT_PAGE_SIZE));
        let records: Vec<Record> = matched
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|r| match &query.desired_fields {
                Some(fields) => r.project(fields),
                None => (*r).clone(),
            })
            .collect();

        let next = offset + records.len();
        let cursor = (next < matched.len() && !records.is_empty())
            .then(|| QueryCursor::new(next.to_string()));
        Ok(QueryPage { records, cursor })
    }

    async fn fetch_changes(
        &self,
        zone: &ZoneId,
        token: Option<&ChangeToken>,
    ) -> Result<ChangeSet, RemoteError> {
        self.enter(Operation::FetchChanges).await?;
        let from = token.map(decode_token).transpose()?.unwrap_or(0);

        let mut state = self.lock();
        state.calls.fetch_changes += 1;
        if from > state.seq {
            return Err(RemoteError::server(
                ErrorCode::ChangeTokenExpired,
                "change token is ahead of history",
            ));
        }

        let page_size = state.change_page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let pending: Vec<&LogEntry> = state
            .log
            .iter()
            .filter(|e| e.seq > from && e.id.zone() == zone)
            .collect();
        let page: Vec<&LogEntry> = pending.iter().take(page_size).copied().collect();
        let more_coming = pending.len() > page.len();
        let last = page.last().map_or(from, |e| e.seq);

        // The latest entry per id within the page decides its reported state.
        let mut latest: Vec<&LogEntry> = Vec::new();
        for entry in page.iter().rev() {
            if !latest.iter().any(|e| e.id == entry.id) {
                latest.push(entry);
            }
        }
        latest.reverse();

        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for entry in latest {
            match &entry.change {
                Change::Saved => {
                    if let Some(record) = state.records.get(&entry.id) {
                        changed.push(record.clone());
                    }
                }
                Change::Deleted { record_type } => deleted.push(DeletedRecord {
                    id: entry.id.clone(),
                    record_type: record_type.clone(),
                }),
            }
        }

        Ok(ChangeSet {
            changed,
            deleted,
            token: encode_token(last),
            more_coming,
        })
    }

    async fn modify(&self, request: ModifyRequest) -> Result<ModifyResponse, RemoteError> {
        let op = if request.saves.is_empty() {
            Operation::Delete
        } else {
            Operation::Save
        };
        self.enter(op).await?;

        let mut state = self.lock();
        state.calls.modify += 1;
        for r in &request.saves {
            *state.calls.saves.entry(r.id().clone()).or_default() += 1;
        }
        for id in &request.deletes {
            *state.calls.deletes.entry(id.clone()).or_default() += 1;
        }

        if request.atomic {
            let failure = request
                .saves
                .iter()
                .map(Record::id)
                .chain(request.deletes.iter())
                .find_map(|id| state.check_item(id).err())
                .or_else(|| {
                    request
                        .deletes
                        .iter()
                        .find(|id| !state.records.contains_key(*id))
                        .map(|id| RemoteError::server(ErrorCode::UnknownItem, format!("{id} not found")))
                });
            if let Some(err) = failure {
                return Err(err);
            }
        }

        let mut response = ModifyResponse::default();
        for record in request.saves {
            let id = record.id().clone();
            let result = state.check_item(&id).map(|()| state.save(record));
            response.saved.push((id, result));
        }
        for id in request.deletes {
            let result = state.check_item(&id).and_then(|()| {
                state
                    .delete(&id)
                    .map(|_| ())
                    .ok_or_else(|| RemoteError::server(ErrorCode::UnknownItem, format!("{id} not found")))
            });
            response.deleted.push((id, result));
        }
        Ok(response)
    }

    async fn fetch(&self, id: &RecordId) -> Result<Record, RemoteError> {
        self.enter(Operation::Fetch).await?;
        self.lock()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::server(ErrorCode::UnknownItem, format!("{id} not found")))
    }

    async fn overwrite(&self, record: Record) -> Result<Record, RemoteError> {
        self.enter(Operation::Save).await?;
        let mut state = self.lock();
        *state.calls.saves.entry(record.id().clone()).or_default() += 1;
        state.check_item(record.id())?;
        let mut merged = match state.records.get(record.id()) {
            Some(existing) => existing.clone(),
            None => Record::new(record.record_type(), record.id().clone()),
        };
        for (name, value) in record.fields() {
            merged = merged.with_field(name, value.clone());
        }
        Ok(state.save(merged))
    }
}
