// SPDX-License-Identifier: Apache-2.0

//! Configuration for a single file tailer.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::tail::error::{Error, Result};

pub const DEFAULT_POLL_FREQUENCY: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_REOPEN_RETRIES: u32 = 20;

/// Compression format of the tailed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// gzip (`.gz`)
    Gzip,
    /// zlib (`.z`)
    Zlib,
    /// bzip2 (`.bz2`)
    Bzip2,
}

impl std::str::FromStr for CompressionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gz" => Ok(CompressionKind::Gzip),
            "z" => Ok(CompressionKind::Zlib),
            "bz2" => Ok(CompressionKind::Bzip2),
            _ => Err(format!(
                "Invalid compression '{}'. Valid options: gz, z, bz2",
                s
            )),
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionKind::Gzip => write!(f, "gz"),
            CompressionKind::Zlib => write!(f, "z"),
            CompressionKind::Bzip2 => write!(f, "bz2"),
        }
    }
}

/// Poll frequencies used while waiting for file changes.
///
/// Waits start at `min_poll_frequency` and double on every idle poll up to
/// `max_poll_frequency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    pub min_poll_frequency: Duration,
    pub max_poll_frequency: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            min_poll_frequency: DEFAULT_POLL_FREQUENCY,
            max_poll_frequency: DEFAULT_POLL_FREQUENCY,
        }
    }
}

impl WatcherConfig {
    /// Fill in defaults and clamp `min` down to `max`.
    pub fn normalized(self) -> Self {
        if self.min_poll_frequency.is_zero() && self.max_poll_frequency.is_zero() {
            return Self::default();
        }

        let max = if self.max_poll_frequency.is_zero() {
            self.min_poll_frequency
        } else {
            self.max_poll_frequency
        };

        Self {
            min_poll_frequency: self.min_poll_frequency.min(max),
            max_poll_frequency: max,
        }
    }
}

/// Configuration for a [`FileTailer`](crate::tail::FileTailer)
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the file to tail. Must exist when the tailer is created.
    pub filename: PathBuf,
    /// Byte offset to resume from, as previously reported by `Line::offset`
    pub start_offset: i64,
    /// IANA encoding label. `None` reads the file as UTF-8.
    pub encoding: Option<String>,
    /// Compression of the file. Compressed files are read once and never waited on.
    pub compression: Option<CompressionKind>,
    /// Poll frequencies for change detection and reopening
    pub watcher: WatcherConfig,
    /// Number of attempts to open a different file during rotation
    pub max_reopen_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filename: PathBuf::new(),
            start_offset: 0,
            encoding: None,
            compression: None,
            watcher: WatcherConfig::default(),
            max_reopen_retries: DEFAULT_MAX_REOPEN_RETRIES,
        }
    }
}

impl Config {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.filename.as_os_str().is_empty() {
            return Err(Error::Config("filename cannot be empty".to_string()));
        }

        if self.start_offset < 0 {
            return Err(Error::Config(format!(
                "start_offset must not be negative, got {}",
                self.start_offset
            )));
        }

        if self.max_reopen_retries == 0 {
            return Err(Error::Config(
                "max_reopen_retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the tailer should wait for more data at end of file.
    pub fn wait_at_eof(&self) -> bool {
        self.compression.is_none()
    }
}
