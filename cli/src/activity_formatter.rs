// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::fmt;

use colored::Color;
use jiff::tz::TimeZone;
use trailsync_core::{CachedActivity, Pending};

use crate::table::{PaddingDirection, Table, TableColumn};
use crate::util::{OutputFormat, format_distance, format_duration, format_timestamp};

/// Length of the record-name prefix shown in tables.
pub const SHORT_ID_LEN: usize = 8;

#[derive(Debug)]
pub struct ActivityFormatter {
    columns: Vec<ActivityColumn>,
    format: OutputFormat,
}

impl ActivityFormatter {
    pub fn new(tz: TimeZone, format: OutputFormat) -> Self {
        let id = match format {
            OutputFormat::Table => ActivityColumn::ShortId,
            OutputFormat::Json => ActivityColumn::Id,
        };
        Self {
            columns: vec![
                id,
                ActivityColumn::Start(tz),
                ActivityColumn::Sport,
                ActivityColumn::Duration,
                ActivityColumn::Distance,
                ActivityColumn::Name,
                ActivityColumn::Sync,
            ],
            format,
        }
    }

    pub fn format<'a>(&'a self, activities: &'a [CachedActivity]) -> impl fmt::Display + 'a {
        Table::new(self.format, &self.columns, activities)
    }
}

#[derive(Debug, Clone)]
pub enum ActivityColumn {
    Id,
    ShortId,
    Start(TimeZone),
    Sport,
    Duration,
    Distance,
    Name,
    Sync,
}

impl TableColumn<CachedActivity> for ActivityColumn {
    fn name(&self) -> Cow<'_, str> {
        match self {
            Self::Id | Self::ShortId => "ID",
            Self::Start(_) => "Start",
            Self::Sport => "Sport",
            Self::Duration => "Time",
            Self::Distance => "Distance",
            Self::Name => "Name",
            Self::Sync => "Sync",
        }
        .into()
    }

    fn format<'a>(&self, data: &'a CachedActivity) -> Cow<'a, str> {
        let activity = &data.activity;
        match self {
            Self::Id => activity.id.name().into(),
            Self::ShortId => short_id(activity.id.name()).into(),
            Self::Start(tz) => format_timestamp(activity.draft.start, tz).into(),
            Self::Sport => activity.draft.sport.as_str().into(),
            Self::Duration => format_duration(activity.draft.duration_secs).into(),
            Self::Distance => format_distance(activity.draft.distance_m).into(),
            Self::Name => activity.draft.name.as_str().into(),
            Self::Sync => sync_label(data).into(),
        }
    }

    fn padding_direction(&self) -> PaddingDirection {
        match self {
            Self::Duration | Self::Distance => PaddingDirection::Right,
            _ => PaddingDirection::Left,
        }
    }

    fn color(&self, data: &CachedActivity) -> Option<Color> {
        match self {
            Self::Sync if data.is_pending_upload() => Some(Color::Yellow),
            Self::ShortId => Some(Color::Cyan),
            _ => None,
        }
    }
}

pub fn short_id(name: &str) -> &str {
    match name.char_indices().nth(SHORT_ID_LEN) {
        Some((i, _)) => &name[..i],
        None => name,
    }
}

fn sync_label(data: &CachedActivity) -> &'static str {
    match data.pending {
        Pending::Save if data.on_remote => "modified",
        Pending::Save => "not saved",
        Pending::Delete => "deleting",
        Pending::None => "synced",
    }
}
