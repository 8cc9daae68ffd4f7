// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end sync tests for the trailsync-core crate.
//!
//! Every test drives a real [`trailsync_core::SyncEngine`] against the in-memory
//! remote store, injecting failures where needed.

mod change_feed;
mod correlation;
mod flush;
mod hydrate;
mod persistence;
mod refresh;
