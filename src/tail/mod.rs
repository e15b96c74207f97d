// SPDX-License-Identifier: Apache-2.0

//! Polling file tailer.
//!
//! A [`FileTailer`] follows a single path and returns appended lines one at a
//! time. It keeps going when the file is rotated, truncated, atomically
//! replaced or deleted and recreated, delivering every line exactly once.
//!
//! Features:
//! - Content signatures to tell an atomic rewrite from unrelated new content
//! - BOM detection and any encoding known to `encoding_rs`
//! - gzip, zlib and bzip2 compressed files
//! - Byte offsets suitable for resuming after a restart

pub mod backoff;
pub mod config;
pub mod decompress;
pub mod encoding;
pub mod error;
pub mod fileext;
pub mod position;
pub mod reader;
pub mod signature;
pub mod tailer;
pub mod watch;

pub use config::{CompressionKind, Config, WatcherConfig};
pub use error::{Error, Result};
pub use fileext::FileId;
pub use position::last_line_position;
pub use signature::Signature;
pub use tailer::{FileTailer, Line};
