// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Tailer was stopped")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported encoding: {0}")]
    EncodingConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// End of a stream that will not grow any further (compressed files).
    #[error("End of file")]
    Eof,

    #[error("Gave up reopening {path} after {attempts} attempts")]
    Reopen { path: PathBuf, attempts: u32 },

    #[error("Retries exhausted after {0} attempts")]
    RetriesExhausted(u32),
}

impl Error {
    /// Returns true when the error only signals that the tailer was stopped.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Map an open/stat failure on `path` to `NotFound` when appropriate.
    pub(crate) fn from_open(err: io::Error, path: impl Into<PathBuf>) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Error::NotFound(path.into())
        } else {
            Error::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
