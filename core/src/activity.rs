// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Workout activity schema and its mapping onto remote records.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use jiff::Timestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use trailsync_remote::{FieldValue, Record, RecordId, ZoneId};

use crate::error::SyncError;

/// Record type tag of activities.
pub const ACTIVITY_RECORD_TYPE: &str = "Activity";

const F_NAME: &str = "name";
const F_SPORT: &str = "sport";
const F_START: &str = "startDate";
const F_DURATION: &str = "durationSecs";
const F_DISTANCE: &str = "distanceMeters";
const F_ENERGY: &str = "energyKcal";
const F_HEART_RATE: &str = "avgHeartRate";
const F_DEVICE: &str = "device";
const F_EXTERNAL_ID: &str = "externalId";
const F_HAS_TRACK: &str = "hasTrack";
const F_TRACK: &str = "track";

/// Field name of the correlating key.
pub const EXTERNAL_ID_FIELD: &str = F_EXTERNAL_ID;

/// Field name of the flag telling whether the record carries a track.
pub const HAS_TRACK_FIELD: &str = F_HAS_TRACK;

/// Field name of the start timestamp, the sort key of windowed fetches.
pub const START_FIELD: &str = F_START;

/// Every field except the track payload.
pub const SUMMARY_FIELDS: &[&str] = &[
    F_NAME,
    F_SPORT,
    F_START,
    F_DURATION,
    F_DISTANCE,
    F_ENERGY,
    F_HEART_RATE,
    F_DEVICE,
    F_EXTERNAL_ID,
    F_HAS_TRACK,
];

fn record_name_re() -> &'static Regex {
    const RE: &str = r"^[A-Za-z0-9_\-.]{1,255}$";
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(RE).expect("record name pattern is valid"))
}

/// Kind of workout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    /// Running.
    Run,
    /// Cycling.
    Ride,
    /// Walking.
    Walk,
    /// Hiking.
    Hike,
    /// Swimming.
    Swim,
    /// Rowing.
    Row,
    /// Anything else.
    #[default]
    Other,
}

impl Sport {
    /// Returns the wire name of the sport.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Ride => "ride",
            Self::Walk => "walk",
            Self::Hike => "hike",
            Self::Swim => "swim",
            Self::Row => "row",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "run" => Ok(Self::Run),
            "ride" => Ok(Self::Ride),
            "walk" => Ok(Self::Walk),
            "hike" => Ok(Self::Hike),
            "swim" => Ok(Self::Swim),
            "row" => Ok(Self::Row),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown sport: {s}")),
        }
    }
}

/// The domain fields of an activity that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDraft {
    /// Display name.
    pub name: String,
    /// Kind of workout.
    #[serde(default)]
    pub sport: Sport,
    /// When the workout started.
    pub start: Timestamp,
    /// Moving time in seconds.
    #[serde(default)]
    pub duration_secs: i64,
    /// Distance in meters.
    #[serde(default)]
    pub distance_m: f64,
    /// Energy burned in kilocalories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kcal: Option<f64>,
    /// Average heart rate in beats per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<i64>,
    /// Recording device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Id of the activity on an external platform, the correlating key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
}

impl ActivityDraft {
    /// Creates a draft with the required fields.
    pub fn new(name: impl Into<String>, sport: Sport, start: Timestamp) -> Self {
        Self {
            name: name.into(),
            sport,
            start,
            duration_secs: 0,
            distance_m: 0.0,
            energy_kcal: None,
            avg_heart_rate: None,
            device: None,
            external_id: None,
        }
    }

    /// Fills the fields a minimal update leaves alone from the server copy.
    /// Returns whether this draft still sets one of them to a value the server
    /// does not have, which takes a full save to publish.
    pub fn merge_unset(&mut self, server: &Self) -> bool {
        let energy = merge_field(&mut self.energy_kcal, &server.energy_kcal);
        let heart_rate = merge_field(&mut self.avg_heart_rate, &server.avg_heart_rate);
        let device = merge_field(&mut self.device, &server.device);
        energy || heart_rate || device
    }

    /// Whether the draft sets a field outside the minimal update.
    #[must_use]
    pub const fn has_extended_fields(&self) -> bool {
        self.energy_kcal.is_some() || self.avg_heart_rate.is_some() || self.device.is_some()
    }
}

fn merge_field<T: Clone + PartialEq>(local: &mut Option<T>, server: &Option<T>) -> bool {
    match local {
        Some(value) => server.as_ref() != Some(value),
        None => {
            local.clone_from(server);
            false
        }
    }
}

/// A workout activity mirrored between the local cache and the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    /// Stable id, assigned once at creation.
    pub id: RecordId,
    /// Domain fields.
    pub draft: ActivityDraft,
    /// A track payload exists for this activity.
    pub has_track: bool,
}

impl Activity {
    /// Creates an activity from a draft.
    #[must_use]
    pub const fn new(id: RecordId, draft: ActivityDraft, has_track: bool) -> Self {
        Self {
            id,
            draft,
            has_track,
        }
    }

    /// Key of the local blob holding the track payload, if there is one.
    #[must_use]
    pub fn track_key(&self) -> Option<String> {
        self.has_track.then(|| payload_key(&self.id))
    }
}

/// Key of the local payload blob of a record.
#[must_use]
pub fn payload_key(id: &RecordId) -> String {
    format!("payload/{}", id.name())
}

/// Builds a record id in `zone`, wrapping `token` when it is a valid record
/// name and generating a fresh one otherwise.
#[must_use]
pub fn make_id(zone: &ZoneId, token: Option<&str>) -> RecordId {
    match token {
        Some(t) if record_name_re().is_match(t) => RecordId::new(zone.clone(), t),
        Some(t) => {
            tracing::debug!(token = t, "invalid record name, generating a fresh one");
            RecordId::new(zone.clone(), uuid::Uuid::new_v4().to_string())
        }
        None => RecordId::new(zone.clone(), uuid::Uuid::new_v4().to_string()),
    }
}

/// Maps an activity onto a remote record. The track payload is attached as an
/// asset when given.
#[must_use]
pub fn to_record(activity: &Activity, track: Option<&[u8]>) -> Record {
    let d = &activity.draft;
    let record = Record::new(ACTIVITY_RECORD_TYPE, activity.id.clone())
        .with_field(F_NAME, d.name.as_str())
        .with_field(F_SPORT, d.sport.as_str())
        .with_field(F_START, d.start)
        .with_field(F_DURATION, d.duration_secs)
        .with_field(F_DISTANCE, d.distance_m)
        .with_optional(F_ENERGY, d.energy_kcal)
        .with_optional(F_HEART_RATE, d.avg_heart_rate)
        .with_optional(F_DEVICE, d.device.clone())
        .with_optional(F_EXTERNAL_ID, d.external_id)
        .with_field(F_HAS_TRACK, activity.has_track);

    match track {
        Some(bytes) => record.with_field(F_TRACK, FieldValue::Asset(bytes.to_vec())),
        None => record,
    }
}

/// The fields written when adopting an existing remote record by its
/// correlating key. Everything else keeps its server value.
#[must_use]
pub fn to_minimal_record(activity: &Activity) -> Record {
    let d = &activity.draft;
    Record::new(ACTIVITY_RECORD_TYPE, activity.id.clone())
        .with_field(F_NAME, d.name.as_str())
        .with_field(F_SPORT, d.sport.as_str())
        .with_field(F_START, d.start)
        .with_field(F_DURATION, d.duration_secs)
        .with_field(F_DISTANCE, d.distance_m)
        .with_optional(F_EXTERNAL_ID, d.external_id)
}

/// Maps a remote record onto an activity, returning the track payload when the
/// record carries one.
///
/// # Errors
///
/// Returns [`SyncError::Mapping`] if the record is not an activity or lacks a
/// start date.
pub fn from_record(record: &Record) -> Result<(Activity, Option<Vec<u8>>), SyncError> {
    let mapping_err = |reason: &str| SyncError::Mapping {
        record: record.id().to_string(),
        reason: reason.to_string(),
    };

    if record.record_type() != ACTIVITY_RECORD_TYPE {
        return Err(mapping_err("not an activity"));
    }

    let start = record
        .field(F_START)
        .and_then(FieldValue::as_timestamp)
        .ok_or_else(|| mapping_err("missing startDate"))?;

    let string = |name: &str| record.field(name).and_then(FieldValue::as_str);
    let sport = match string(F_SPORT) {
        Some(s) => s.parse().unwrap_or_else(|e| {
            tracing::debug!(id = %record.id(), err = %e, "unknown sport, using other");
            Sport::Other
        }),
        None => Sport::Other,
    };

    let track = record
        .field(F_TRACK)
        .and_then(FieldValue::as_asset)
        .map(<[u8]>::to_vec);
    let has_track = track.is_some()
        || record
            .field(F_HAS_TRACK)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false);

    let draft = ActivityDraft {
        name: string(F_NAME).unwrap_or_default().to_string(),
        sport,
        start,
        duration_secs: record
            .field(F_DURATION)
            .and_then(FieldValue::as_i64)
            .unwrap_or(0),
        distance_m: record
            .field(F_DISTANCE)
            .and_then(FieldValue::as_f64)
            .unwrap_or(0.0),
        energy_kcal: record.field(F_ENERGY).and_then(FieldValue::as_f64),
        avg_heart_rate: record.field(F_HEART_RATE).and_then(FieldValue::as_i64),
        device: string(F_DEVICE).map(str::to_string),
        external_id: record.field(F_EXTERNAL_ID).and_then(FieldValue::as_i64),
    };

    let activity = Activity::new(record.id().clone(), draft, has_track);
    Ok((activity, track))
}
