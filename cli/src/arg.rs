// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::{Arg, ArgMatches, ValueHint, arg, value_parser};
use trailsync_core::Sport;

use crate::util::OutputFormat;

#[derive(Debug, Clone, Copy)]
pub struct CommonArgs;

impl CommonArgs {
    pub fn output_format() -> Arg {
        arg!(--"output-format" <FORMAT> "Output format")
            .value_parser(value_parser!(OutputFormat))
            .default_value("table")
    }

    pub fn get_output_format(matches: &ArgMatches) -> OutputFormat {
        matches
            .get_one("output-format")
            .copied()
            .unwrap_or(OutputFormat::Table)
    }
}

/// Fields of an activity that can be given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFields {
    pub name: Option<String>,
    pub sport: Option<Sport>,
    pub start: Option<String>,
    pub duration: Option<String>,
    pub distance: Option<String>,
    pub energy: Option<f64>,
    pub heart_rate: Option<i64>,
    pub device: Option<String>,
    pub external_id: Option<i64>,
}

impl ActivityFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityArgs;

impl ActivityArgs {
    pub fn id() -> Arg {
        arg!(id: <ID> "The id, or a unique prefix of it, of the activity")
    }

    pub fn get_id(matches: &ArgMatches) -> String {
        matches.get_one::<String>("id").cloned().unwrap_or_default()
    }

    pub fn ids() -> Arg {
        arg!(id: <ID> "The ids, or unique prefixes of them, of the activities").num_args(1..)
    }

    pub fn get_ids(matches: &ArgMatches) -> Vec<String> {
        matches
            .get_many::<String>("id")
            .map(|ids| ids.cloned().collect())
            .unwrap_or_default()
    }

    /// Arguments for the activity fields. The name is positional when `positional` is set.
    pub fn fields(positional: bool) -> Vec<Arg> {
        let name = if positional {
            arg!(name: <NAME> "Name of the activity")
        } else {
            arg!(name: -n --name <NAME> "Name of the activity")
        };
        vec![
            name,
            arg!(--sport <SPORT> "Kind of workout").value_parser(value_parser!(Sport)),
            arg!(--start <START> "Start, e.g. now, 2026-10-17 07:30 or an RFC 3339 timestamp"),
            arg!(--duration <DURATION> "Moving time, e.g. 45m, 1h or 01:30"),
            arg!(--distance <DISTANCE> "Distance in km, or meters with an m suffix"),
            arg!(--energy <KCAL> "Energy burned in kcal").value_parser(value_parser!(f64)),
            arg!(--"heart-rate" <BPM> "Average heart rate").value_parser(value_parser!(i64)),
            arg!(--device <DEVICE> "Recording device"),
            arg!(--"external-id" <ID> "Id of the activity on an external platform")
                .value_parser(value_parser!(i64)),
        ]
    }

    pub fn get_fields(matches: &ArgMatches) -> ActivityFields {
        ActivityFields {
            name: matches.get_one("name").cloned(),
            sport: matches.get_one("sport").copied(),
            start: matches.get_one("start").cloned(),
            duration: matches.get_one("duration").cloned(),
            distance: matches.get_one("distance").cloned(),
            energy: matches.get_one("energy").copied(),
            heart_rate: matches.get_one("heart-rate").copied(),
            device: matches.get_one("device").cloned(),
            external_id: matches.get_one("external-id").copied(),
        }
    }

    pub fn track() -> Arg {
        arg!(--track <FILE> "File holding the GPS track of the activity")
            .value_parser(value_parser!(PathBuf))
            .value_hint(ValueHint::FilePath)
    }

    pub fn get_track(matches: &ArgMatches) -> Option<PathBuf> {
        matches.get_one("track").cloned()
    }
}
