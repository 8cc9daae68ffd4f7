// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de;

/// The name of the application.
pub const APP_NAME: &str = "trailsync";

/// Where the engine keeps its durable blobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// A single SQLite database in the state directory.
    #[default]
    Sqlite,
    /// One file per blob under the state directory.
    Files,
}

/// Configuration of the sync engine.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Remote zone mirrored by the local cache.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Directory for storing application state. In-memory when unset after
    /// normalization failed to find a default.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Blob storage backend.
    #[serde(default)]
    pub storage: StorageKind,

    /// Soft capacity of the local activity cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Number of fully hydrated activities kept in memory.
    #[serde(default = "default_payload_cache_capacity")]
    pub payload_cache_capacity: usize,

    /// Records per windowed fetch.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Items per submitted save-and-delete request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deadline of one fetch or flush cycle.
    #[serde(default = "default_cycle_timeout", deserialize_with = "deserialize_duration")]
    pub cycle_timeout: Duration,

    /// Flush immediately after every local mutation.
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            state_dir: None,
            storage: StorageKind::default(),
            cache_capacity: default_cache_capacity(),
            payload_cache_capacity: default_payload_cache_capacity(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            cycle_timeout: default_cycle_timeout(),
            auto_flush: default_auto_flush(),
        }
    }
}

impl Config {
    /// Normalize the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be expanded.
    pub fn normalize(&mut self) -> Result<(), Box<dyn Error>> {
        // Normalize state directory
        match &self.state_dir {
            Some(a) => {
                self.state_dir = Some(
                    expand_path(a)
                        .map_err(|e| format!("Failed to expand state directory path: {e}"))?,
                );
            }

            None => match get_state_dir() {
                Ok(a) => self.state_dir = Some(a.join(APP_NAME)),
                Err(e) => tracing::warn!(err = %e, "failed to get state directory"),
            },
        }

        if self.zone.trim().is_empty() {
            return Err("zone must not be empty".into());
        }
        Ok(())
    }
}

fn default_zone() -> String {
    "activities".to_string()
}

const fn default_cache_capacity() -> usize {
    100
}

const fn default_payload_cache_capacity() -> usize {
    5
}

const fn default_page_size() -> usize {
    20
}

const fn default_batch_size() -> usize {
    50
}

const fn default_cycle_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_auto_flush() -> bool {
    true
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct DurationVisitor;

    impl de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str(r#"a duration string like "HH:MM", "1d", "24h", "2m", or "90s""#)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_duration(value).map_err(|e| de::Error::custom(e.to_string()))
        }
    }

    deserializer.deserialize_str(DurationVisitor)
}

/// Handle tilde (~) and environment variables in the path
///
/// # Errors
///
/// Returns an error if the home or config directory cannot be determined.
pub fn expand_path(path: &Path) -> Result<PathBuf, Box<dyn Error>> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }

    let path = path.to_str().ok_or("Invalid path")?;

    // Handle tilde and home directory
    let home_prefixes: &[&str] = if cfg!(unix) {
        &["~/", "$HOME/", "${HOME}/"]
    } else {
        &[r"~\", "~/", r"%UserProfile%\", r"%UserProfile%/"]
    };
    for prefix in home_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_home_dir()?.join(stripped));
        }
    }

    // Handle config directories
    let config_prefixes: &[&str] = if cfg!(unix) {
        &["$XDG_CONFIG_HOME/", "${XDG_CONFIG_HOME}/"]
    } else {
        &[r"%LOCALAPPDATA%\", "%LOCALAPPDATA%/"]
    };
    for prefix in config_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_config_dir()?.join(stripped));
        }
    }

    Ok(path.into())
}

fn get_home_dir() -> Result<PathBuf, Box<dyn Error>> {
    dirs::home_dir().ok_or_else(|| "User-specific home directory not found".into())
}

/// Returns the user-specific configuration directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be determined.
pub fn get_config_dir() -> Result<PathBuf, Box<dyn Error>> {
    #[cfg(unix)]
    let config_dir = xdg::BaseDirectories::new().get_config_home();
    #[cfg(windows)]
    let config_dir = dirs::config_dir();
    config_dir.ok_or_else(|| "User-specific config directory not found".into())
}

fn get_state_dir() -> Result<PathBuf, Box<dyn Error>> {
    #[cfg(unix)]
    let state_dir = xdg::BaseDirectories::new().get_state_home();
    #[cfg(windows)]
    let state_dir = dirs::data_dir();
    state_dir.ok_or_else(|| "User-specific state directory not found".into())
}

/// Parse a duration string in the format "HH:MM" / "1d" / "24h" / "60m" / "1800s".
///
/// # Errors
///
/// Returns an error if the string is not in one of the supported formats.
pub fn parse_duration(s: &str) -> Result<Duration, Box<dyn Error>> {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let s = s.trim();
    let secs = if let Some((h, m)) = s.split_once(':') {
        // Try to parse "HH:MM" format
        let hours: u64 = h.trim().parse()?;
        let minutes: u64 = m.trim().parse()?;
        hours * HOUR + minutes * MINUTE
    } else if let Some(rest) = s.strip_suffix('d') {
        rest.trim().parse::<u64>()? * DAY
    } else if let Some(rest) = s.strip_suffix('h') {
        rest.trim().parse::<u64>()? * HOUR
    } else if let Some(rest) = s.strip_suffix('m') {
        rest.trim().parse::<u64>()? * MINUTE
    } else if let Some(rest) = s.strip_suffix('s') {
        rest.trim().parse::<u64>()?
    } else {
        return Err(format!("Invalid duration format: {s}").into());
    };
    Ok(Duration::from_secs(secs))
}
