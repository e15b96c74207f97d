// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Number of leading bytes a complete signature holds.
pub const SIGNATURE_SIZE: usize = 1024;

/// Read offsets at which a growing signature is worth recomputing.
const THRESHOLDS: [u64; 5] = [64, 128, 256, 512, 1024];

/// A signature identifies file content by its first bytes.
///
/// When a file is replaced, comparing the old and new signatures tells us
/// whether the new file continues the old content (same prefix) or is a fresh
/// file that must be read from the start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Up to SIGNATURE_SIZE leading bytes of the file
    bytes: Vec<u8>,
}

impl Signature {
    /// Compute the signature of an open file.
    ///
    /// The stream position is restored afterwards, so this can be used on a
    /// handle that is in the middle of being read.
    pub fn from_file(file: &mut File) -> io::Result<Self> {
        let position = file.stream_position()?;
        file.seek(SeekFrom::Start(0))?;

        let mut bytes = Vec::with_capacity(SIGNATURE_SIZE);
        let read = (&mut *file)
            .take(SIGNATURE_SIZE as u64)
            .read_to_end(&mut bytes);

        file.seek(SeekFrom::Start(position))?;
        read?;

        Ok(Self { bytes })
    }

    /// Create a signature from raw bytes, keeping at most SIGNATURE_SIZE of them
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        bytes.truncate(SIGNATURE_SIZE);
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the file was long enough to fill the signature.
    pub fn completed(&self) -> bool {
        self.bytes.len() == SIGNATURE_SIZE
    }

    /// Check if two signatures describe the same content.
    ///
    /// A complete signature only matches an identical one. An incomplete one
    /// matches when the bytes both sides have agree. Empty signatures never match.
    pub fn matches(&self, other: &Signature) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }

        if self.completed() {
            return self.bytes == other.bytes;
        }

        let n = self.len().min(other.len());
        self.bytes[..n] == other.bytes[..n]
    }

    /// Whether reading has progressed far enough to grow this signature.
    pub fn should_recompute(&self, offset: u64) -> bool {
        if self.completed() {
            return false;
        }

        let len = self.bytes.len() as u64;
        THRESHOLDS
            .iter()
            .find(|&&threshold| threshold > len)
            .is_some_and(|&threshold| offset >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn signature_of(content: &[u8]) -> Signature {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        Signature::from_file(&mut file.reopen().unwrap()).unwrap()
    }

    #[test]
    fn test_signature_from_file() {
        let sig = signature_of(b"hello world");
        assert_eq!(sig.bytes(), b"hello world");
        assert_eq!(sig.len(), 11);
        assert!(!sig.completed());
    }

    #[test]
    fn test_signature_truncates_to_size() {
        let sig = signature_of(&vec![b'x'; 3000]);
        assert_eq!(sig.len(), SIGNATURE_SIZE);
        assert!(sig.completed());

        let sig = Signature::from_bytes(vec![b'y'; 2000]);
        assert!(sig.completed());
    }

    #[test]
    fn test_signature_restores_position() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"line1\nline2\n").unwrap();
        file.flush().unwrap();

        let mut handle = file.reopen().unwrap();
        handle.seek(SeekFrom::Start(6)).unwrap();
        let sig = Signature::from_file(&mut handle).unwrap();

        assert_eq!(sig.bytes(), b"line1\nline2\n");
        assert_eq!(handle.stream_position().unwrap(), 6);
    }

    #[test]
    fn test_signature_matches() {
        let full = Signature::from_bytes(b"hello world".to_vec());
        let prefix = Signature::from_bytes(b"hello".to_vec());
        let other = Signature::from_bytes(b"world".to_vec());
        let empty = Signature::from_bytes(vec![]);

        assert!(full.matches(&prefix));
        assert!(prefix.matches(&full));
        assert!(full.matches(&full));
        assert!(!full.matches(&other));

        assert!(!full.matches(&empty));
        assert!(!empty.matches(&full));
        assert!(!empty.matches(&empty));
    }

    #[test]
    fn test_signature_complete_requires_equality() {
        let mut content = vec![b'a'; SIGNATURE_SIZE];
        let complete = Signature::from_bytes(content.clone());

        content[SIGNATURE_SIZE - 1] = b'b';
        let different = Signature::from_bytes(content);
        assert!(!complete.matches(&different));

        // A shorter file cannot continue content that already filled a signature.
        let partial = Signature::from_bytes(vec![b'a'; 100]);
        assert!(!complete.matches(&partial));
        assert!(partial.matches(&complete));
    }

    #[test]
    fn test_signature_should_recompute() {
        let small = Signature::from_bytes(vec![b'a'; 10]);
        assert!(!small.should_recompute(10));
        assert!(!small.should_recompute(63));
        assert!(small.should_recompute(64));
        assert!(small.should_recompute(500));

        let mid = Signature::from_bytes(vec![b'a'; 128]);
        assert!(!mid.should_recompute(200));
        assert!(mid.should_recompute(256));

        let complete = Signature::from_bytes(vec![b'a'; SIGNATURE_SIZE]);
        assert!(!complete.should_recompute(u64::MAX));
    }

    #[test]
    fn test_signature_serde() {
        let sig = Signature::from_bytes(b"hello".to_vec());
        let json = serde_json::to_string(&sig).unwrap();
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, back);
    }
}
