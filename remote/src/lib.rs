// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Remote record store access: typed records, classified errors and an
//! executor for paged fetches, change feeds and partial-failure batches.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::single_match_else
)]

mod client;
mod config;
mod error;
mod executor;
mod http;
mod memory;
mod query;
mod store;
mod types;

pub use crate::client::HttpRemoteStore;
pub use crate::config::{AuthMethod, RemoteConfig};
pub use crate::error::{ErrorClass, ErrorCode, Operation, RemoteError, classify};
pub use crate::executor::{BatchEvent, BatchSummary, BlockFetch, Executor, Failure};
pub use crate::memory::MemoryRemoteStore;
pub use crate::query::{Predicate, Query, QueryCursor, QueryPage, QueryPriority, SortDescriptor};
pub use crate::store::{ChangeSet, DeletedRecord, ModifyRequest, ModifyResponse, RemoteStore};
pub use crate::types::{ChangeToken, FieldValue, Record, RecordId, ZoneId};
