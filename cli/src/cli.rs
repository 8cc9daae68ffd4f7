// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, ffi::OsString, path::PathBuf, sync::Arc};

use clap::{ArgMatches, Command, ValueHint, arg, builder::styling, crate_version, value_parser};
use colored::Colorize;
use futures::{FutureExt, future::LocalBoxFuture};
use tracing_subscriber::EnvFilter;
use trailsync_core::{APP_NAME, SyncEngine};
use trailsync_remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};

use crate::cmd_activity::{CmdAdd, CmdDelete, CmdEdit, CmdList, CmdShow};
use crate::cmd_sync::{CmdFlush, CmdMore, CmdPull, CmdRefresh, CmdStatus};
use crate::config::{Config, parse_config};

const LOG_ENV: &str = "TRAILSYNC_LOG";

/// Run the trailsync command-line interface.
pub async fn run() -> Result<(), Box<dyn Error>> {
    match Cli::parse() {
        Ok(cli) => {
            init_tracing(cli.verbose);
            if let Err(e) = cli.run().await {
                println!("{} {}", "Error:".red(), e);
            }
        }
        Err(e) => println!("{} {}", "Error:".red(), e),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // a subscriber may already be installed by an embedding program
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Command-line interface
#[derive(Debug)]
pub struct Cli {
    /// Path to the configuration file
    pub config: Option<PathBuf>,

    /// Log at debug level
    pub verbose: bool,

    /// The command to execute
    pub command: Commands,
}

impl Cli {
    /// Create the command-line interface
    pub fn command() -> Command {
        const STYLES: styling::Styles = styling::Styles::styled()
            .header(styling::AnsiColor::Green.on_default().bold())
            .usage(styling::AnsiColor::Green.on_default().bold())
            .literal(styling::AnsiColor::Blue.on_default().bold())
            .placeholder(styling::AnsiColor::Cyan.on_default());

        Command::new(APP_NAME)
            .about("Offline-first sync of workout activities with a remote record store.")
            .author("Zexin Yuan <aim@yzx9.xyz>")
            .version(crate_version!())
            .styles(STYLES)
            .subcommand_required(false) // allow default to status
            .arg_required_else_help(false)
            .arg(
                arg!(-c --config [CONFIG] "Path to the configuration file")
                    .long_help(
                        "\
Path to the configuration file. Defaults to $XDG_CONFIG_HOME/trailsync/config.toml on Linux and MacOS, \
%LOCALAPPDATA%/trailsync/config.toml on Windows.",
                    )
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath)
                    .global(true),
            )
            .arg(arg!(-v --verbose "Show debug logs").global(true))
            .subcommand(CmdStatus::command())
            .subcommand(CmdList::command())
            .subcommand(CmdAdd::command())
            .subcommand(CmdEdit::command())
            .subcommand(CmdDelete::command())
            .subcommand(CmdShow::command())
            .subcommand(CmdRefresh::command())
            .subcommand(CmdMore::command())
            .subcommand(CmdPull::command())
            .subcommand(CmdFlush::command())
    }

    /// Parse the command-line arguments
    pub fn parse() -> Result<Self, Box<dyn Error>> {
        let commands = Self::command();
        let matches = commands.get_matches();
        Ok(Self::from(&matches))
    }

    /// Parse the specified arguments
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, Box<dyn Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let commands = Self::command();
        let matches = commands.try_get_matches_from(args)?;
        Ok(Self::from(&matches))
    }

    /// Create a CLI instance from the `ArgMatches`
    pub fn from(matches: &ArgMatches) -> Self {
        use Commands::*;
        let command = match matches.subcommand() {
            Some((CmdStatus::NAME, matches)) => Status(CmdStatus::from(matches)),
            Some((CmdList::NAME, matches)) => List(CmdList::from(matches)),
            Some((CmdAdd::NAME, matches)) => Add(CmdAdd::from(matches)),
            Some((CmdEdit::NAME, matches)) => Edit(CmdEdit::from(matches)),
            Some((CmdDelete::NAME, matches)) => Delete(CmdDelete::from(matches)),
            Some((CmdShow::NAME, matches)) => Show(CmdShow::from(matches)),
            Some((CmdRefresh::NAME, matches)) => Refresh(CmdRefresh::from(matches)),
            Some((CmdMore::NAME, matches)) => More(CmdMore::from(matches)),
            Some((CmdPull::NAME, matches)) => Pull(CmdPull::from(matches)),
            Some((CmdFlush::NAME, matches)) => Flush(CmdFlush::from(matches)),
            _ => Status(CmdStatus),
        };

        Self {
            config: matches.get_one("config").cloned(),
            verbose: matches.get_flag("verbose"),
            command,
        }
    }

    /// Run the command
    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        self.command.run(self.config).await
    }
}

/// The commands available in the CLI
#[derive(Debug, Clone)]
pub enum Commands {
    /// Show the sync status
    Status(CmdStatus),

    /// List activities
    List(CmdList),

    /// Add an activity
    Add(CmdAdd),

    /// Edit an activity
    Edit(CmdEdit),

    /// Delete activities
    Delete(CmdDelete),

    /// Show an activity with its track
    Show(CmdShow),

    /// Reload the newest page
    Refresh(CmdRefresh),

    /// Load older activities
    More(CmdMore),

    /// Apply remote changes
    Pull(CmdPull),

    /// Upload pending changes
    Flush(CmdFlush),
}

impl Commands {
    /// Run the command with the given configuration
    #[rustfmt::skip]
    pub async fn run(self, config: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
        use Commands::*;
        match self {
            Status(a)  => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            List(a)    => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Add(a)     => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Edit(a)    => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Delete(a)  => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Show(a)    => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Refresh(a) => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            More(a)    => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Pull(a)    => Self::run_with(config, |x| a.run(x).boxed_local()).await,
            Flush(a)   => Self::run_with(config, |x| a.run(x).boxed_local()).await,
        }
    }

    async fn run_with<F>(config: Option<PathBuf>, f: F) -> Result<(), Box<dyn Error>>
    where
        F: for<'a> FnOnce(&'a SyncEngine) -> LocalBoxFuture<'a, Result<(), Box<dyn Error>>>,
    {
        tracing::debug!("parsing configuration...");
        let Config { core, remote } = parse_config(config).await?;
        let store: Arc<dyn RemoteStore> = match remote {
            Some(remote) => Arc::new(HttpRemoteStore::new(remote)?),
            None => {
                tracing::warn!("no [remote] table configured, using a store that lives in memory");
                Arc::new(MemoryRemoteStore::new())
            }
        };
        let engine = SyncEngine::open(core, store).await?;

        let result = f(&engine).await;

        // let background uploads finish before the process exits
        engine.idle().await;
        result
    }
}
