// SPDX-License-Identifier: Apache-2.0

use bzip2::read::MultiBzDecoder;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use std::fs::File;
use std::io::Read;

use crate::tail::config::CompressionKind;

/// Wrap a file in the streaming decompressor for `kind`.
///
/// Corrupt or mislabelled input surfaces as an IO error on the first read.
pub fn decompressor(file: File, kind: CompressionKind) -> Box<dyn Read + Send> {
    match kind {
        CompressionKind::Gzip => Box::new(MultiGzDecoder::new(file)),
        CompressionKind::Zlib => Box::new(ZlibDecoder::new(file)),
        CompressionKind::Bzip2 => Box::new(MultiBzDecoder::new(file)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn compressed(kind: CompressionKind, content: &[u8]) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let out = file.reopen().unwrap();
        match kind {
            CompressionKind::Gzip => {
                let mut enc = flate2::write::GzEncoder::new(out, flate2::Compression::default());
                enc.write_all(content).unwrap();
                enc.finish().unwrap();
            }
            CompressionKind::Zlib => {
                let mut enc =
                    flate2::write::ZlibEncoder::new(out, flate2::Compression::default());
                enc.write_all(content).unwrap();
                enc.finish().unwrap();
            }
            CompressionKind::Bzip2 => {
                let mut enc = bzip2::write::BzEncoder::new(out, bzip2::Compression::default());
                enc.write_all(content).unwrap();
                enc.finish().unwrap();
            }
        }
        file
    }

    #[test]
    fn test_decompress_all_kinds() {
        for kind in [
            CompressionKind::Gzip,
            CompressionKind::Zlib,
            CompressionKind::Bzip2,
        ] {
            let file = compressed(kind, b"line1\nline2\n");
            let mut reader = decompressor(file.reopen().unwrap(), kind);
            let mut out = String::new();
            reader.read_to_string(&mut out).unwrap();
            assert_eq!(out, "line1\nline2\n", "kind {}", kind);
        }
    }

    #[test]
    fn test_decompress_plain_file_fails() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not gzip").unwrap();
        file.flush().unwrap();

        let mut reader = decompressor(file.reopen().unwrap(), CompressionKind::Gzip);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }
}
