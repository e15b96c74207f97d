// SPDX-License-Identifier: Apache-2.0

use encoding_rs::Encoding;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{info, warn};

use crate::tail::config::CompressionKind;
use crate::tail::decompress::decompressor;
use crate::tail::encoding::{Bom, Newlines, read_bom};

const CHUNK_SIZE: usize = 4096;

/// Where raw bytes come from
enum Source {
    Plain(File),
    Compressed {
        /// Kept for metadata, the stream owns its own handle
        file: File,
        stream: Box<dyn Read + Send>,
    },
}

impl Source {
    fn file(&self) -> &File {
        match self {
            Source::Plain(file) => file,
            Source::Compressed { file, .. } => file,
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(file) => file.read(buf),
            Source::Compressed { stream, .. } => stream.read(buf),
        }
    }
}

/// LineReader splits a byte stream into decoded lines
///
/// It tracks `position`, the number of raw bytes that have been delivered as
/// complete lines. That value is what callers persist and later pass back as a
/// start offset, so it never includes bytes of a line that was not returned yet.
pub struct LineReader {
    /// The open source, `None` once closed
    source: Option<Source>,
    /// Compression applied to every file handed to `reset`
    compression: Option<CompressionKind>,
    /// Encoding from configuration
    configured: Option<&'static Encoding>,
    /// Encoding used for the current file, a BOM may override `configured`
    active: Option<&'static Encoding>,
    /// Encoded line terminators for `active`
    newlines: Newlines,
    /// Raw bytes consumed as complete lines
    position: u64,
    /// Bytes read but not yet delivered
    pending: Vec<u8>,
    /// Prefix of `pending` already searched for a newline
    scanned: usize,
    chunk: Vec<u8>,
}

impl LineReader {
    /// Create a reader with no file attached. Call [`LineReader::reset`] before reading.
    pub fn new(encoding: Option<&'static Encoding>, compression: Option<CompressionKind>) -> Self {
        Self {
            source: None,
            compression,
            configured: encoding,
            active: encoding,
            newlines: Newlines::for_encoding(encoding),
            position: 0,
            pending: Vec::new(),
            scanned: 0,
            chunk: vec![0u8; CHUNK_SIZE],
        }
    }

    /// Attach a new file and continue reading at `offset`.
    ///
    /// The start of the file is checked for a BOM, which is always skipped. The
    /// configured encoding is kept unless the BOM names a different one.
    pub fn reset(&mut self, file: File, offset: u64) -> io::Result<()> {
        self.close();

        match self.compression {
            None => self.reset_plain(file, offset),
            Some(kind) => self.reset_compressed(file, kind, offset),
        }
    }

    fn reset_plain(&mut self, mut file: File, offset: u64) -> io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        let (_, bom) = read_bom(&mut file)?;

        let start = offset.max(bom.map_or(0, |b| b.len() as u64));
        file.seek(SeekFrom::Start(start))?;

        self.apply_bom(bom);
        self.position = start;
        self.source = Some(Source::Plain(file));
        Ok(())
    }

    /// Compressed streams cannot seek, the offset counts decompressed bytes to skip.
    fn reset_compressed(
        &mut self,
        file: File,
        kind: CompressionKind,
        offset: u64,
    ) -> io::Result<()> {
        let handle = file.try_clone()?;
        let mut stream = decompressor(file, kind);
        let (prefix, bom) = read_bom(&mut stream)?;

        let start = offset.max(bom.map_or(0, |b| b.len() as u64));
        let prefix_len = prefix.len() as u64;
        if start <= prefix_len {
            self.pending.extend_from_slice(&prefix[start as usize..]);
            self.position = start;
        } else {
            let skipped = io::copy(&mut stream.by_ref().take(start - prefix_len), &mut io::sink())?;
            self.position = prefix_len + skipped;
        }

        self.apply_bom(bom);
        self.source = Some(Source::Compressed {
            file: handle,
            stream,
        });
        Ok(())
    }

    fn apply_bom(&mut self, bom: Option<Bom>) {
        self.active = match bom {
            Some(bom) => match bom.encoding() {
                Some(detected) => {
                    if self.configured.is_some_and(|c| c != detected) {
                        info!(
                            configured = self.configured.map(|c| c.name()),
                            detected = detected.name(),
                            "BOM found, decoding with the detected encoding"
                        );
                    }
                    Some(detected)
                }
                None => {
                    warn!(bom = ?bom, "No decoder available for BOM, keeping configured encoding");
                    self.configured
                }
            },
            None => self.configured,
        };
        self.newlines = Newlines::for_encoding(self.active);
    }

    /// Read the next complete line.
    ///
    /// Returns `Ok(None)` when no full line is available yet. Bytes of a trailing
    /// partial line are kept and completed by later reads.
    pub fn next(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(idx) = self.find_newline() {
                let consumed = idx + self.newlines.newline.len();
                let line: Vec<u8> = self.pending.drain(..consumed).collect();
                self.scanned = 0;
                self.position += consumed as u64;
                return Ok(Some(self.decode(&line[..idx])));
            }

            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };

            let n = match source.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend_from_slice(&self.chunk[..n]);
        }
    }

    /// Return any unterminated trailing bytes as a final line.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }

        let line = std::mem::take(&mut self.pending);
        self.scanned = 0;
        self.position += line.len() as u64;
        Some(self.decode(&line))
    }

    fn find_newline(&mut self) -> Option<usize> {
        let newline = self.newlines.newline.as_slice();
        let unit = self.newlines.unit();

        let mut i = self.scanned;
        while i + newline.len() <= self.pending.len() {
            if &self.pending[i..i + newline.len()] == newline {
                return Some(i);
            }
            i += unit;
        }
        self.scanned = i;
        None
    }

    fn decode(&self, line: &[u8]) -> String {
        let cr = self.newlines.carriage_return.as_slice();
        let line = match line.strip_suffix(cr) {
            Some(stripped) if stripped.len() % self.newlines.unit() == 0 => stripped,
            _ => line,
        };

        match self.active {
            Some(encoding) => encoding.decode_without_bom_handling(line).0.into_owned(),
            None => String::from_utf8_lossy(line).into_owned(),
        }
    }

    /// Raw offset just past the last delivered line.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Raw offset of everything read from the source, delivered or not.
    pub fn read_position(&self) -> u64 {
        self.position + self.pending.len() as u64
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The encoding lines are currently decoded with.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.active
    }

    /// The file being read, if any.
    pub fn file(&self) -> Option<&File> {
        self.source.as_ref().map(Source::file)
    }

    /// Seekable access to the file. `None` for compressed sources.
    pub fn plain_file_mut(&mut self) -> Option<&mut File> {
        match self.source.as_mut() {
            Some(Source::Plain(file)) => Some(file),
            _ => None,
        }
    }

    /// Detach the file, discarding undelivered bytes. The handle is returned so
    /// the caller decides when it is released.
    pub fn close(&mut self) -> Option<File> {
        self.pending.clear();
        self.scanned = 0;
        self.source.take().map(|source| match source {
            Source::Plain(file) => file,
            Source::Compressed { file, .. } => file,
        })
    }
}
