// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use clap::{ArgMatches, Command, arg};
use colored::Colorize;
use trailsync_core::{SyncEngine, SyncResult, SyncStatus};

use crate::activity_formatter::ActivityFormatter;
use crate::arg::CommonArgs;
use crate::util::OutputFormat;

/// Activities shown below the status.
const STATUS_RECENT: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct CmdStatus;

impl CmdStatus {
    pub const NAME: &str = "status";

    pub fn command() -> Command {
        Command::new(Self::NAME).about("Show the sync status and the most recent activities")
    }

    pub fn from(_matches: &ArgMatches) -> Self {
        Self
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "showing status...");
        let status = engine.status();
        let activities = engine.activities().await;

        println!("🏃 {} {}", "Zone".bold(), engine.zone());
        println!("{}", describe_status(&status, activities.len()));
        if status.persistence_warning {
            println!(
                "{} local changes could not be written to disk and may be lost",
                "Warning:".yellow()
            );
        }
        println!();

        if activities.is_empty() {
            println!("{}", "No activities".italic());
        } else {
            let recent = &activities[..activities.len().min(STATUS_RECENT)];
            let formatter = ActivityFormatter::new(jiff::tz::TimeZone::system(), OutputFormat::Table);
            print!("{}", formatter.format(recent));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CmdRefresh {
    pub output_format: OutputFormat,
}

impl CmdRefresh {
    pub const NAME: &str = "refresh";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Reload the newest page of activities from the remote store")
            .long_about(
                "\
Reload the newest page of activities from the remote store. While local changes are \
waiting for upload, they are flushed instead and nothing is fetched.",
            )
            .arg(CommonArgs::output_format())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            output_format: CommonArgs::get_output_format(matches),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "refreshing...");
        let result = engine.refresh().await;
        report(result)?;
        let formatter = ActivityFormatter::new(jiff::tz::TimeZone::system(), self.output_format);
        print!("{}", formatter.format(&engine.activities().await));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CmdMore;

impl CmdMore {
    pub const NAME: &str = "more";

    pub fn command() -> Command {
        Command::new(Self::NAME).about("Load the next page of older activities")
    }

    pub fn from(_matches: &ArgMatches) -> Self {
        Self
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "loading older activities...");
        let before = engine.activities().await.len();
        report(engine.load_more().await)?;
        let after = engine.activities().await.len();

        println!("Loaded {} older activities", after.saturating_sub(before));
        if engine.status().end_of_data {
            println!("{}", "Reached the oldest activity".italic());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CmdPull {
    pub subscription: String,
}

impl CmdPull {
    pub const NAME: &str = "pull";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Apply remote changes since the last pull")
            .long_about(
                "\
Apply remote changes since the last pull, the way a push notification would. Local \
changes always win over remote versions until they are flushed.",
            )
            .arg(
                arg!(--subscription <ID> "Subscription id reported by the notification")
                    .default_value("manual"),
            )
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            subscription: matches
                .get_one::<String>("subscription")
                .cloned()
                .unwrap_or_else(|| "manual".to_string()),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "pulling changes...");
        report(engine.handle_notification(&self.subscription).await)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CmdFlush;

impl CmdFlush {
    pub const NAME: &str = "flush";

    pub fn command() -> Command {
        Command::new(Self::NAME).about("Upload pending local changes to the remote store")
    }

    pub fn from(_matches: &ArgMatches) -> Self {
        Self
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "flushing...");
        report(engine.flush().await)?;

        let pending = engine.status().pending_uploads;
        if pending > 0 {
            println!("{pending} changes are still waiting for upload");
        }
        Ok(())
    }
}

fn describe_status(status: &SyncStatus, cached: usize) -> String {
    let mut parts = vec![format!("{cached} cached")];
    if status.pending_uploads > 0 {
        parts.push(format!("{} waiting for upload", status.pending_uploads).yellow().to_string());
    }
    if status.end_of_data {
        parts.push("all history loaded".to_string());
    }
    match status.last_result {
        Some(SyncResult::Failed) => parts.push("last sync failed".red().to_string()),
        Some(SyncResult::NewData | SyncResult::NoData) => parts.push("last sync ok".to_string()),
        None => {}
    }
    parts.join(", ")
}

fn report(result: SyncResult) -> Result<(), Box<dyn Error>> {
    match result {
        SyncResult::NewData => println!("{}", "Synced".green()),
        SyncResult::NoData => println!("Nothing to sync"),
        SyncResult::Failed => {
            return Err("Sync failed, local changes are kept and retried later".into());
        }
    }
    Ok(())
}
