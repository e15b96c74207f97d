// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::tail::config::{CompressionKind, Config, WatcherConfig};
use crate::tail::encoding::resolve_encoding;
use crate::tail::error::{Error, Result};
use crate::tail::position::last_line_position;

/// Compression of the tailed file
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum CompressionArg {
    /// gzip
    Gz,
    /// zlib
    Z,
    /// bzip2
    Bz2,
}

impl From<CompressionArg> for CompressionKind {
    fn from(c: CompressionArg) -> Self {
        match c {
            CompressionArg::Gz => CompressionKind::Gzip,
            CompressionArg::Z => CompressionKind::Zlib,
            CompressionArg::Bz2 => CompressionKind::Bzip2,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// File to tail
    #[arg(env = "LOGTAIL_PATH")]
    pub path: PathBuf,

    /// Byte offset to resume from, as printed with --print-offsets
    #[arg(long, env = "LOGTAIL_START_OFFSET", default_value = "0")]
    pub start_offset: i64,

    /// Skip existing content and start after the last complete line
    #[arg(
        long,
        env = "LOGTAIL_FROM_END",
        default_value = "false",
        conflicts_with = "start_offset"
    )]
    pub from_end: bool,

    /// Encoding of the file (e.g. UTF-16LE, Shift_JIS). Defaults to UTF-8.
    #[arg(long, env = "LOGTAIL_ENCODING")]
    pub encoding: Option<String>,

    /// Compression of the file. Compressed files are read once to the end.
    #[arg(value_enum, long, env = "LOGTAIL_COMPRESSION")]
    pub compression: Option<CompressionArg>,

    /// Initial interval between checks for file changes
    #[arg(
        long,
        env = "LOGTAIL_MIN_POLL_FREQUENCY",
        default_value = "250ms",
        value_parser = humantime::parse_duration,
    )]
    pub min_poll_frequency: Duration,

    /// Longest interval between checks for file changes
    #[arg(
        long,
        env = "LOGTAIL_MAX_POLL_FREQUENCY",
        default_value = "250ms",
        value_parser = humantime::parse_duration,
    )]
    pub max_poll_frequency: Duration,

    /// Attempts to open the replacement file after rotation before giving up
    #[arg(long, env = "LOGTAIL_MAX_REOPEN_RETRIES", default_value = "20")]
    pub max_reopen_retries: u32,

    /// Prefix each printed line with the offset to resume after it
    #[arg(long, env = "LOGTAIL_PRINT_OFFSETS", default_value = "false")]
    pub print_offsets: bool,
}

impl TailArgs {
    /// Build a validated tailer configuration.
    ///
    /// With `--from-end` the file is scanned here to find the start offset.
    pub fn build_config(&self) -> Result<Config> {
        let compression = self.compression.map(CompressionKind::from);

        let start_offset = if self.from_end {
            if compression.is_some() {
                return Err(Error::Config(
                    "--from-end cannot be used with compressed files".to_string(),
                ));
            }
            let encoding = resolve_encoding(self.encoding.as_deref())?;
            let position = last_line_position(&self.path, encoding)
                .map_err(|e| Error::from_open(e, self.path.clone()))?;
            position as i64
        } else {
            self.start_offset
        };

        let config = Config {
            filename: self.path.clone(),
            start_offset,
            encoding: self.encoding.clone(),
            compression,
            watcher: WatcherConfig {
                min_poll_frequency: self.min_poll_frequency,
                max_poll_frequency: self.max_poll_frequency,
            },
            max_reopen_retries: self.max_reopen_retries,
        };
        config.validate()?;

        Ok(config)
    }
}
