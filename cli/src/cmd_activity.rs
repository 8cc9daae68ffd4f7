// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use clap::{ArgMatches, Command, ValueHint, arg, value_parser};
use colored::Colorize;
use jiff::Zoned;
use trailsync_core::{ActivityDraft, CachedActivity, DeleteOutcome, SyncEngine, parse_duration};
use trailsync_remote::RecordId;

use crate::activity_formatter::{ActivityFormatter, short_id};
use crate::arg::{ActivityArgs, ActivityFields, CommonArgs};
use crate::util::{
    OutputFormat, format_distance, format_duration, format_timestamp, parse_distance, parse_start,
};

#[derive(Debug, Clone)]
pub struct CmdList {
    pub limit: Option<usize>,
    pub output_format: OutputFormat,
}

impl CmdList {
    pub const NAME: &str = "list";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .alias("ls")
            .about("List cached activities, newest first")
            .arg(arg!(-l --limit <N> "Show at most N activities").value_parser(value_parser!(usize)))
            .arg(CommonArgs::output_format())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            limit: matches.get_one("limit").copied(),
            output_format: CommonArgs::get_output_format(matches),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "listing activities...");
        let mut activities = engine.activities().await;
        let total = activities.len();
        if let Some(limit) = self.limit.filter(|&limit| total > limit) {
            println!("Displaying the {limit}/{total} activities");
            activities.truncate(limit);
        }
        print_activities(&activities, self.output_format);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CmdAdd {
    pub fields: ActivityFields,
    pub track: Option<PathBuf>,
    pub output_format: OutputFormat,
}

impl CmdAdd {
    pub const NAME: &str = "add";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .alias("new")
            .about("Record a new activity")
            .long_about(
                "\
Record a new activity. It is saved locally at once and uploaded on the next flush. \
With --external-id, an activity already on the remote store carrying the same id is \
updated instead of duplicated.",
            )
            .args(ActivityArgs::fields(true))
            .arg(ActivityArgs::track())
            .arg(CommonArgs::output_format())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            fields: ActivityArgs::get_fields(matches),
            track: ActivityArgs::get_track(matches),
            output_format: CommonArgs::get_output_format(matches),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "adding activity...");
        let now = Zoned::now();
        let name = self.fields.name.clone().unwrap_or_default();
        let sport = self.fields.sport.unwrap_or_default();
        let mut draft = ActivityDraft::new(name, sport, now.timestamp());
        apply_fields(&mut draft, self.fields, &now)?;

        let track = match &self.track {
            Some(path) => Some(
                tokio::fs::read(path)
                    .await
                    .map_err(|e| format!("Failed to read track at {}: {e}", path.display()))?,
            ),
            None => None,
        };

        let activity = if draft.external_id.is_some() {
            engine.save_or_update(draft, track).await?
        } else {
            engine.add(draft, track).await?
        };
        if let Some(entry) = engine.get(&activity.id).await {
            print_activities(&[entry], self.output_format);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CmdEdit {
    pub id: String,
    pub fields: ActivityFields,
    pub output_format: OutputFormat,
}

impl CmdEdit {
    pub const NAME: &str = "edit";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Edit a cached activity")
            .arg(ActivityArgs::id())
            .args(ActivityArgs::fields(false))
            .arg(CommonArgs::output_format())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            id: ActivityArgs::get_id(matches),
            fields: ActivityArgs::get_fields(matches),
            output_format: CommonArgs::get_output_format(matches),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "editing activity...");
        if self.fields.is_empty() {
            return Err("Nothing to edit, give at least one field".into());
        }

        let id = resolve_id(engine, &self.id).await?;
        let mut activity = engine
            .get(&id)
            .await
            .ok_or_else(|| format!("Activity not found: {}", self.id))?
            .activity;

        let now = Zoned::now();
        if let Some(name) = &self.fields.name {
            activity.draft.name.clone_from(name);
        }
        if let Some(sport) = self.fields.sport {
            activity.draft.sport = sport;
        }
        apply_fields(&mut activity.draft, self.fields, &now)?;

        engine.update(activity).await?;
        if let Some(entry) = engine.get(&id).await {
            print_activities(&[entry], self.output_format);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CmdDelete {
    pub ids: Vec<String>,
}

impl CmdDelete {
    pub const NAME: &str = "delete";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .alias("rm")
            .about("Delete activities")
            .arg(ActivityArgs::ids())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            ids: ActivityArgs::get_ids(matches),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "deleting activities...");
        for id in &self.ids {
            let id = resolve_id(engine, id).await?;
            match engine.mark_for_delete(&id).await? {
                DeleteOutcome::RemovedLocally => {
                    println!("{} {}", "Deleted".green(), short_id(id.name()));
                }
                DeleteOutcome::Pending => {
                    println!(
                        "{} {} (removed from the remote store on the next flush)",
                        "Deleted".green(),
                        short_id(id.name())
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CmdShow {
    pub id: String,
    pub track_out: Option<PathBuf>,
    pub output_format: OutputFormat,
}

impl CmdShow {
    pub const NAME: &str = "show";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Show an activity with its track, fetching it from the remote store if needed")
            .arg(ActivityArgs::id())
            .arg(
                arg!(--"track-out" <FILE> "Write the track to this file")
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .arg(CommonArgs::output_format())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            id: ActivityArgs::get_id(matches),
            track_out: matches.get_one("track-out").cloned(),
            output_format: CommonArgs::get_output_format(matches),
        }
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "showing activity...");
        let id = resolve_id(engine, &self.id).await?;
        let hydrated = engine.hydrate(&id).await?;
        let cached = engine.get(&id).await;
        let activity = &hydrated.activity;
        let draft = &activity.draft;
        let track_len = hydrated.track.as_ref().map(Vec::len);

        match self.output_format {
            OutputFormat::Json => {
                let mut value = serde_json::to_value(draft)?;
                value["id"] = activity.id.name().into();
                value["trackBytes"] = track_len.into();
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Table => {
                let tz = jiff::tz::TimeZone::system();
                print_field("ID", activity.id.name());
                print_field("Name", &draft.name);
                print_field("Sport", draft.sport);
                print_field("Start", format_timestamp(draft.start, &tz));
                print_field("Time", format_duration(draft.duration_secs));
                print_field("Distance", format_distance(draft.distance_m));
                if let Some(energy) = draft.energy_kcal {
                    print_field("Energy", format!("{energy:.0} kcal"));
                }
                if let Some(hr) = draft.avg_heart_rate {
                    print_field("Heart rate", format!("{hr} bpm"));
                }
                if let Some(device) = &draft.device {
                    print_field("Device", device);
                }
                if let Some(external_id) = draft.external_id {
                    print_field("External id", external_id);
                }
                match track_len {
                    Some(len) => print_field("Track", format!("{len} bytes")),
                    None => print_field("Track", "none"),
                }
                match &cached {
                    Some(entry) if entry.is_pending_upload() => print_field("Sync", "not saved".yellow()),
                    Some(_) => print_field("Sync", "synced"),
                    None => print_field("Sync", "remote only"),
                }
            }
        }

        if let Some(path) = &self.track_out {
            let track = hydrated.track.as_deref().ok_or("The activity has no track")?;
            tokio::fs::write(path, track)
                .await
                .map_err(|e| format!("Failed to write track to {}: {e}", path.display()))?;
        }
        Ok(())
    }
}

/// Resolves a record name, or a unique prefix of a cached one, to an id in
/// the engine's zone.
pub async fn resolve_id(engine: &SyncEngine, id: &str) -> Result<RecordId, Box<dyn Error>> {
    let exact = RecordId::new(engine.zone().clone(), id);
    if engine.get(&exact).await.is_some() {
        return Ok(exact);
    }

    let mut matches: Vec<RecordId> = engine
        .activities()
        .await
        .into_iter()
        .map(|e| e.activity.id)
        .filter(|i| i.name().starts_with(id))
        .collect();
    match matches.len() {
        0 => Ok(exact), // may still exist remotely
        1 => Ok(matches.remove(0)),
        n => Err(format!("Ambiguous id '{id}', it matches {n} activities").into()),
    }
}

fn apply_fields(
    draft: &mut ActivityDraft,
    fields: ActivityFields,
    now: &Zoned,
) -> Result<(), Box<dyn Error>> {
    if let Some(start) = fields.start {
        draft.start = parse_start(now, &start)?;
    }
    if let Some(duration) = fields.duration {
        draft.duration_secs = i64::try_from(parse_duration(&duration)?.as_secs())?;
    }
    if let Some(distance) = fields.distance {
        draft.distance_m = parse_distance(&distance)?;
    }
    if fields.energy.is_some() {
        draft.energy_kcal = fields.energy;
    }
    if fields.heart_rate.is_some() {
        draft.avg_heart_rate = fields.heart_rate;
    }
    if fields.device.is_some() {
        draft.device = fields.device;
    }
    if fields.external_id.is_some() {
        draft.external_id = fields.external_id;
    }
    Ok(())
}

fn print_field(label: &str, value: impl fmt::Display) {
    println!("{} {value}", format!("{label:<11}").bold());
}

fn print_activities(activities: &[CachedActivity], format: OutputFormat) {
    if activities.is_empty() && format == OutputFormat::Table {
        println!("{}", "No activities".italic());
        return;
    }
    let formatter = ActivityFormatter::new(jiff::tz::TimeZone::system(), format);
    print!("{}", formatter.format(activities));
}
