// SPDX-License-Identifier: Apache-2.0

//! Start offset helpers.

use encoding_rs::Encoding;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::tail::encoding::{Newlines, read_bom};

const SCAN_CHUNK: u64 = 1024;

/// Offset just past the last line terminator in the file at `path`, or 0 if
/// there is none.
///
/// Starting a tailer here skips everything already written without splitting
/// a last line that is still being appended to. The terminator is searched in
/// the encoding the file will be read with: a BOM decides it when present,
/// otherwise `encoding`. Matches are only accepted on code unit boundaries
/// counted from the end of the BOM.
pub fn last_line_position(path: &Path, encoding: Option<&'static Encoding>) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let (_, bom) = read_bom(&mut file)?;
    let active = bom.and_then(|b| b.encoding()).or(encoding);
    let newlines = Newlines::for_encoding(active);
    let newline = newlines.newline.as_slice();
    let unit = newlines.unit() as u64;

    let data_start = bom.map_or(0, |b| b.len() as u64).min(len);
    let chunk_len = SCAN_CHUNK - SCAN_CHUNK % unit;
    let mut buf = vec![0u8; chunk_len as usize];

    // Drop a trailing partial code unit so chunks stay aligned.
    let mut end = data_start + (len - data_start) / unit * unit;
    while end > data_start {
        let start = end.saturating_sub(chunk_len).max(data_start);
        let chunk = &mut buf[..(end - start) as usize];

        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(idx) = chunk
            .chunks_exact(unit as usize)
            .rposition(|code_unit| code_unit == newline)
        {
            return Ok(start + (idx as u64 + 1) * unit);
        }
        end = start;
    }

    Ok(0)
}
