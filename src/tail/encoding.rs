// SPDX-License-Identifier: Apache-2.0

//! Byte-order marks and encoded line terminators.
//!
//! Wide encodings store `\n` as more than one byte, so the line reader splits on
//! the encoded form computed here instead of a literal `0x0A`.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use std::io::{self, Read};

use crate::tail::error::{Error, Result};

/// Longest BOM we look for.
pub const MAX_BOM_LEN: usize = 4;

/// A byte-order mark found at the start of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bom {
    Utf32Be,
    Utf32Le,
    Utf8,
    Utf16Be,
    Utf16Le,
}

impl Bom {
    // UTF-32LE must be checked before UTF-16LE since they share a prefix.
    const ORDERED: [Bom; 5] = [
        Bom::Utf32Be,
        Bom::Utf32Le,
        Bom::Utf8,
        Bom::Utf16Be,
        Bom::Utf16Le,
    ];

    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Bom::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
            Bom::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
            Bom::Utf8 => &[0xEF, 0xBB, 0xBF],
            Bom::Utf16Be => &[0xFE, 0xFF],
            Bom::Utf16Le => &[0xFF, 0xFE],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// The decoder implied by the mark. UTF-32 has no decoder available.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        match self {
            Bom::Utf8 => Some(UTF_8),
            Bom::Utf16Be => Some(UTF_16BE),
            Bom::Utf16Le => Some(UTF_16LE),
            Bom::Utf32Be | Bom::Utf32Le => None,
        }
    }

    /// Match the leading bytes of a stream against the known marks.
    pub fn detect(prefix: &[u8]) -> Option<Bom> {
        Self::ORDERED
            .into_iter()
            .find(|bom| prefix.starts_with(bom.bytes()))
    }
}

/// Read up to [`MAX_BOM_LEN`] bytes from the current position of `reader`.
///
/// Returns the bytes read together with the detected mark, if any. The caller
/// decides where to continue; for seekable sources that is usually right past
/// the mark.
pub fn read_bom<R: Read + ?Sized>(reader: &mut R) -> io::Result<(Vec<u8>, Option<Bom>)> {
    let mut prefix = Vec::with_capacity(MAX_BOM_LEN);
    reader
        .take(MAX_BOM_LEN as u64)
        .read_to_end(&mut prefix)?;
    let bom = Bom::detect(&prefix);
    Ok((prefix, bom))
}

/// Resolve an IANA label into an encoding. `None` means no transcoding.
pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    match label {
        None => Ok(None),
        Some(label) => Encoding::for_label(label.trim().as_bytes())
            .map(Some)
            .ok_or_else(|| Error::EncodingConfig(label.to_string())),
    }
}

/// Encoded forms of the line feed and carriage return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Newlines {
    pub newline: Vec<u8>,
    pub carriage_return: Vec<u8>,
}

impl Newlines {
    pub fn for_encoding(encoding: Option<&'static Encoding>) -> Self {
        match encoding {
            // encoding_rs never encodes into UTF-16, its encoders emit UTF-8.
            Some(enc) if enc == UTF_16LE => Self {
                newline: vec![b'\n', 0x00],
                carriage_return: vec![b'\r', 0x00],
            },
            Some(enc) if enc == UTF_16BE => Self {
                newline: vec![0x00, b'\n'],
                carriage_return: vec![0x00, b'\r'],
            },
            Some(enc) => Self {
                newline: enc.encode("\n").0.into_owned(),
                carriage_return: enc.encode("\r").0.into_owned(),
            },
            None => Self::default(),
        }
    }

    /// Width of the code unit newlines are aligned to.
    pub fn unit(&self) -> usize {
        self.newline.len().max(1)
    }
}

impl Default for Newlines {
    fn default() -> Self {
        Self {
            newline: vec![b'\n'],
            carriage_return: vec![b'\r'],
        }
    }
}
