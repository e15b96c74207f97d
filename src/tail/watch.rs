// SPDX-License-Identifier: Apache-2.0

//! Polling change detection for a single tailed file.

use std::fs::File;
use std::io;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::tail::backoff::Backoff;
use crate::tail::config::WatcherConfig;
use crate::tail::error::{Error, Result};
use crate::tail::fileext::{self, FileStat};

/// A change observed on the tailed path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The file grew or its modification time changed
    Modified,
    /// The file shrank below the read position
    Truncated,
    /// The path no longer refers to the open file
    Deleted,
}

/// Block until a file exists at `path`.
pub fn block_until_exists(
    cancel: &CancellationToken,
    path: &Path,
    cfg: &WatcherConfig,
) -> Result<()> {
    let mut backoff = Backoff::new(
        cancel,
        cfg.min_poll_frequency,
        cfg.max_poll_frequency,
        None,
    );

    loop {
        match fileext::stat(path) {
            Ok(_) => return Ok(()),
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(Error::Io(e)),
        }
        backoff.wait()?;
    }
}

/// Block until the file at `path` changes relative to the open handle `file`.
///
/// `last_offset` is how far the handle has been read; a path size below it
/// means the file was truncated.
pub fn block_until_event(
    cancel: &CancellationToken,
    file: &File,
    path: &Path,
    last_offset: u64,
    cfg: &WatcherConfig,
) -> Result<Event> {
    let original = fileext::stat_file(file)?;
    let mut backoff = Backoff::new(
        cancel,
        cfg.min_poll_frequency,
        cfg.max_poll_frequency,
        None,
    );

    loop {
        if fileext::is_delete_pending(file) {
            debug!(path = %path.display(), "File is pending deletion");
            return Ok(Event::Deleted);
        }

        let current = match fileext::stat(path) {
            Ok(current) => current,
            Err(e) if is_missing(&e) => return Ok(Event::Deleted),
            Err(e) => return Err(Error::Io(e)),
        };

        if let Some(event) = classify(&original, &current, last_offset) {
            debug!(path = %path.display(), ?event, size = current.size, last_offset, "File changed");
            return Ok(event);
        }

        backoff.wait()?;
    }
}

fn classify(original: &FileStat, current: &FileStat, last_offset: u64) -> Option<Event> {
    if !original.same_file(current) {
        return Some(Event::Deleted);
    }

    if current.size < last_offset {
        return Some(Event::Truncated);
    }

    if current.size > last_offset || current.modified != original.modified {
        return Some(Event::Modified);
    }

    None
}

/// Windows reports a path queued for deletion as access denied.
pub(crate) fn is_missing(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::NotFound => true,
        io::ErrorKind::PermissionDenied => cfg!(windows),
        _ => false,
    }
}
