// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - Engine harnesses over the in-memory remote store
//! - Activity and record factories
//! - A blob store whose writes can be switched off

mod blobs;
mod fixtures;

#[allow(unused_imports)]
pub use blobs::FlakyBlobStore;
#[allow(unused_imports)]
pub use fixtures::{
    Harness, harness, harness_with, remote_activity, test_config, test_draft, timestamp,
};
