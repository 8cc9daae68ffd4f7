// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Command-line interface of trailsync.

mod activity_formatter;
mod arg;
mod cli;
mod cmd_activity;
mod cmd_sync;
mod config;
mod table;
mod util;

pub use crate::cli::{Cli, Commands, run};
pub use crate::cmd_activity::{CmdAdd, CmdDelete, CmdEdit, CmdList, CmdShow};
pub use crate::cmd_sync::{CmdFlush, CmdMore, CmdPull, CmdRefresh, CmdStatus};
pub use crate::config::{Config, parse_config};
pub use crate::util::OutputFormat;
