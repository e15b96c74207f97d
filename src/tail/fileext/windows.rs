// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, OpenOptions};
use std::io;
use std::mem::{self, MaybeUninit};
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::path::Path;

use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Storage::FileSystem::{
    BY_HANDLE_FILE_INFORMATION, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
    FILE_STANDARD_INFO, FileStandardInfo, GetFileInformationByHandle,
    GetFileInformationByHandleEx,
};

use super::{FileId, FileStat};

/// Open a file so that writers may rename or delete it while we hold the handle.
pub(super) fn open_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .share_mode(FILE_SHARE_DELETE | FILE_SHARE_READ | FILE_SHARE_WRITE)
        .open(path)
}

/// The file index is only reachable through a handle, so stat'ing a path opens it.
pub(super) fn stat(path: &Path) -> io::Result<FileStat> {
    let file = open_file(path)?;
    let metadata = file.metadata()?;
    Ok(FileStat::new(file_id(&file)?, &metadata))
}

pub(super) fn file_id(file: &File) -> io::Result<FileId> {
    let mut info = MaybeUninit::<BY_HANDLE_FILE_INFORMATION>::zeroed();
    if unsafe { GetFileInformationByHandle(raw_handle(file), info.as_mut_ptr()) } == 0 {
        return Err(io::Error::last_os_error());
    }
    let info = unsafe { info.assume_init() };

    let index = u64::from(info.nFileIndexHigh) << 32 | u64::from(info.nFileIndexLow);
    Ok(FileId::new(u64::from(info.dwVolumeSerialNumber), index))
}

fn raw_handle(file: &File) -> HANDLE {
    file.as_raw_handle() as HANDLE
}

/// A failed query is reported as pending so the caller reopens instead of hanging.
pub(super) fn is_delete_pending(file: &File) -> bool {
    let mut info = MaybeUninit::<FILE_STANDARD_INFO>::zeroed();
    let result = unsafe {
        GetFileInformationByHandleEx(
            raw_handle(file),
            FileStandardInfo,
            info.as_mut_ptr().cast(),
            mem::size_of::<FILE_STANDARD_INFO>() as u32,
        )
    };
    if result == 0 {
        return true;
    }

    unsafe { info.assume_init() }.DeletePending as u8 != 0
}
