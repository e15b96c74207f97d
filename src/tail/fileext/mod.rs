// SPDX-License-Identifier: Apache-2.0

//! Platform file primitives.
//!
//! Opening, stat'ing and identifying files differs between Unix and Windows:
//! on Windows a file must be opened with delete sharing for rotation to work at
//! all, and a deleted file can linger in a "delete pending" state while handles
//! remain open. The rest of the tailer only talks to the functions in this
//! module; the platform back end is chosen at compile time.

use serde::{Deserialize, Serialize};
use std::fs::{File, Metadata};
use std::io;
use std::path::Path;
use std::time::SystemTime;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

/// Identity of the file behind an open handle or a path.
///
/// Rotation shows up as the path resolving to a different identity than the
/// handle being read. Unix uses device and inode, Windows the volume serial
/// number and file index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    device: u64,
    index: u64,
}

impl FileId {
    pub fn new(device: u64, index: u64) -> Self {
        Self { device, index }
    }

    pub fn from_file(file: &File) -> io::Result<Self> {
        sys::file_id(file)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device, self.index)
    }
}

/// The subset of file metadata used for change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub id: FileId,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStat {
    fn new(id: FileId, metadata: &Metadata) -> Self {
        Self {
            id,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }

    /// Whether both stats describe the same underlying file.
    pub fn same_file(&self, other: &FileStat) -> bool {
        self.id == other.id
    }
}

/// Open `path` for reading with the sharing semantics rotation needs.
pub fn open_file(path: &Path) -> io::Result<File> {
    sys::open_file(path)
}

/// Stat the file currently found at `path`.
pub fn stat(path: &Path) -> io::Result<FileStat> {
    sys::stat(path)
}

/// Stat an open handle.
pub fn stat_file(file: &File) -> io::Result<FileStat> {
    let metadata = file.metadata()?;
    Ok(FileStat::new(FileId::from_file(file)?, &metadata))
}

/// Whether the handle refers to a file queued for deletion. Always false on Unix.
pub fn is_delete_pending(file: &File) -> bool {
    sys::is_delete_pending(file)
}
