// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use jiff::civil::{Date, DateTime};
use jiff::tz::TimeZone;
use jiff::{Timestamp, Zoned};

/// The output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Parses the start of an activity.
///
/// Accepts `now`, an RFC 3339 timestamp, `YYYY-MM-DD HH:MM` and `YYYY-MM-DD`,
/// the latter two in the time zone of `now`.
pub fn parse_start(now: &Zoned, s: &str) -> Result<Timestamp, Box<dyn Error>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(now.timestamp());
    }

    if let Ok(ts) = s.parse::<Timestamp>() {
        Ok(ts)
    } else if let Ok(dt) = DateTime::strptime("%Y-%m-%d %H:%M", s) {
        Ok(dt.to_zoned(now.time_zone().clone())?.timestamp())
    } else if let Ok(date) = Date::strptime("%Y-%m-%d", s) {
        Ok(date.to_zoned(now.time_zone().clone())?.timestamp())
    } else {
        Err(format!(
            "Invalid start '{s}'. Expected format: now, YYYY-MM-DD, YYYY-MM-DD HH:MM or RFC 3339"
        )
        .into())
    }
}

/// Parses a distance in kilometers, e.g. `5`, `10.5km`, or meters with an `m` suffix.
pub fn parse_distance(s: &str) -> Result<f64, Box<dyn Error>> {
    let s = s.trim();
    let meters = if let Some(km) = s.strip_suffix("km") {
        km.trim().parse::<f64>()? * 1000.0
    } else if let Some(m) = s.strip_suffix('m') {
        m.trim().parse::<f64>()?
    } else {
        s.parse::<f64>()? * 1000.0
    };

    if meters.is_finite() && meters >= 0.0 {
        Ok(meters)
    } else {
        Err(format!("Invalid distance: {s}").into())
    }
}

pub fn format_timestamp(ts: Timestamp, tz: &TimeZone) -> String {
    ts.to_zoned(tz.clone()).strftime("%Y-%m-%d %H:%M").to_string()
}

/// Formats seconds as `H:MM:SS`, or `MM:SS` below one hour.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub fn format_distance(meters: f64) -> String {
    format!("{:.2} km", meters / 1000.0)
}
