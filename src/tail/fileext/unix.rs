// SPDX-License-Identifier: Apache-2.0

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::{FileId, FileStat};

/// Open a file, resolving one level of symlink indirection first.
pub(super) fn open_file(path: &Path) -> io::Result<File> {
    File::open(resolve_symlink(path)?)
}

fn resolve_symlink(path: &Path) -> io::Result<PathBuf> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.file_type().is_symlink() {
        return Ok(path.to_path_buf());
    }

    let target = fs::read_link(path)?;
    if target.is_absolute() {
        return Ok(target);
    }

    // Relative links are relative to the directory holding the link.
    Ok(match path.parent() {
        Some(dir) => dir.join(target),
        None => target,
    })
}

pub(super) fn stat(path: &Path) -> io::Result<FileStat> {
    let metadata = fs::metadata(path)?;
    Ok(FileStat::new(
        FileId::new(metadata.dev(), metadata.ino()),
        &metadata,
    ))
}

pub(super) fn file_id(file: &File) -> io::Result<FileId> {
    let metadata = file.metadata()?;
    Ok(FileId::new(metadata.dev(), metadata.ino()))
}

pub(super) fn is_delete_pending(_file: &File) -> bool {
    false
}
