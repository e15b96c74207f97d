// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tail::backoff::Backoff;
use crate::tail::config::Config;
use crate::tail::encoding::resolve_encoding;
use crate::tail::error::{Error, Result};
use crate::tail::fileext::{self, FileId};
use crate::tail::reader::LineReader;
use crate::tail::signature::Signature;
use crate::tail::watch::{self, Event};

/// A single line read from the tailed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Decoded text without the line terminator
    pub text: String,
    /// Raw bytes consumed up to and including this line's terminator. Pass it
    /// back as `Config::start_offset` to resume after this line.
    pub offset: i64,
    /// When the line was read
    pub time: DateTime<Utc>,
}

impl Line {
    fn new(text: String, offset: u64) -> Self {
        Self {
            text,
            offset: offset as i64,
            time: Utc::now(),
        }
    }
}

struct TailerState {
    reader: LineReader,
    /// Signature of the file the reader is attached to
    signature: Signature,
    /// Lines drained from a replaced file, delivered before anything else
    buffered: VecDeque<Line>,
}

impl TailerState {
    fn push_buffered(&mut self, text: String) {
        let offset = self.reader.position();
        self.buffered.push_back(Line::new(text, offset));
    }

    /// Grow an incomplete signature once reading has passed the next threshold.
    fn grow_signature(&mut self, offset: u64) {
        if !self.signature.should_recompute(offset) {
            return;
        }

        let Some(file) = self.reader.plain_file_mut() else {
            return;
        };

        match Signature::from_file(file) {
            Ok(signature) => self.signature = signature,
            Err(e) => debug!(error = %e, "Failed to recompute signature"),
        }
    }
}

/// FileTailer follows one file path and returns lines as they are appended.
///
/// The path may be rotated, truncated, atomically replaced or deleted and
/// recreated while tailing; the tailer reopens it and continues without
/// duplicating or skipping lines. Files are polled, no OS notification
/// mechanism is used.
///
/// [`FileTailer::next`] blocks the calling thread. [`FileTailer::size`] and
/// [`FileTailer::stop`] may be called from other threads.
pub struct FileTailer {
    cfg: Config,
    state: Mutex<TailerState>,
    cancel: CancellationToken,
    /// False for compressed files, which cannot grow
    wait_at_eof: bool,
}

impl FileTailer {
    /// Open `cfg.filename` and position the reader at `cfg.start_offset`.
    ///
    /// Fails with [`Error::NotFound`] if the file does not exist and with
    /// [`Error::EncodingConfig`] if the encoding label is unknown.
    pub fn new(mut cfg: Config) -> Result<Self> {
        cfg.validate()?;
        cfg.watcher = cfg.watcher.normalized();

        let encoding = resolve_encoding(cfg.encoding.as_deref())?;

        let mut file = fileext::open_file(&cfg.filename)
            .map_err(|e| Error::from_open(e, cfg.filename.clone()))?;
        if file.metadata()?.is_dir() {
            return Err(Error::Config(format!(
                "{} is a directory",
                cfg.filename.display()
            )));
        }

        let signature = Signature::from_file(&mut file)?;
        let mut reader = LineReader::new(encoding, cfg.compression);
        reader.reset(file, cfg.start_offset as u64)?;

        debug!(
            path = ?cfg.filename,
            offset = reader.position(),
            encoding = reader.encoding().map(|e| e.name()),
            compression = ?cfg.compression,
            "Tailing file"
        );

        Ok(Self {
            wait_at_eof: cfg.wait_at_eof(),
            cfg,
            state: Mutex::new(TailerState {
                reader,
                signature,
                buffered: VecDeque::new(),
            }),
            cancel: CancellationToken::new(),
        })
    }

    /// Path being tailed.
    pub fn filename(&self) -> &Path {
        &self.cfg.filename
    }

    /// Return the next line, blocking until one is available.
    ///
    /// Returns [`Error::Cancelled`] once [`FileTailer::stop`] has been called,
    /// including when the call is blocked waiting for data. For compressed
    /// files the final unterminated line is returned and [`Error::Eof`] follows.
    pub fn next(&self) -> Result<Line> {
        let mut state = self.lock();

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if let Some(line) = state.buffered.pop_front() {
                return Ok(line);
            }

            if let Some(text) = state.reader.next()? {
                let offset = state.reader.position();
                state.grow_signature(offset);
                return Ok(Line::new(text, offset));
            }

            if !self.wait_at_eof {
                return match state.reader.flush() {
                    Some(text) => Ok(Line::new(text, state.reader.position())),
                    None => Err(Error::Eof),
                };
            }

            self.wait(&mut state)?;
        }
    }

    /// Current size of the file being read, in bytes.
    ///
    /// After a failed reopen no file is attached and the path is stat'ed instead.
    pub fn size(&self) -> Result<i64> {
        let state = self.lock();
        if let Some(file) = state.reader.file() {
            return Ok(file.metadata()?.len() as i64);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let stat = fileext::stat(&self.cfg.filename)
            .map_err(|e| Error::from_open(e, self.cfg.filename.clone()))?;
        Ok(stat.size as i64)
    }

    /// Stop tailing. Blocked and future calls to `next` return `Cancelled`.
    ///
    /// Safe to call more than once.
    pub fn stop(&self) -> Result<()> {
        self.cancel.cancel();

        let mut state = self.lock();
        if state.reader.close().is_some() {
            debug!(path = ?self.cfg.filename, "Stopped tailing file");
        }
        Ok(())
    }

    #[cfg(test)]
    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, TailerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the file changes and react to the change.
    fn wait(&self, state: &mut TailerState) -> Result<()> {
        let Some(file) = state.reader.file() else {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            // A previous reopen failed and left nothing attached.
            debug!(path = ?self.cfg.filename, "No file attached, reopening");
            return self.reopen(state, false);
        };

        let event = watch::block_until_event(
            &self.cancel,
            file,
            &self.cfg.filename,
            state.reader.read_position(),
            &self.cfg.watcher,
        )?;

        match event {
            Event::Modified => Ok(()),
            Event::Truncated => {
                info!(path = ?self.cfg.filename, "File was truncated, reopening");
                self.reopen(state, true)
            }
            Event::Deleted => {
                self.drain(state);
                if state.buffered.is_empty() {
                    debug!(path = ?self.cfg.filename, "File was removed, reopening");
                    self.reopen(state, false)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Read what is left in the current handle into the buffered lines.
    fn drain(&self, state: &mut TailerState) {
        loop {
            match state.reader.next() {
                Ok(Some(text)) => state.push_buffered(text),
                Ok(None) => break,
                Err(e) => {
                    debug!(path = ?self.cfg.filename, error = %e, "Stopped draining replaced file");
                    return;
                }
            }
        }

        if let Some(text) = state.reader.flush() {
            state.push_buffered(text);
        }

        if !state.buffered.is_empty() {
            debug!(
                path = ?self.cfg.filename,
                lines = state.buffered.len(),
                "Drained replaced file"
            );
        }
    }

    /// Attach the reader to whatever file is now found at the path.
    ///
    /// Unless `truncated`, a file with the same identity as the current one has
    /// not been replaced yet and is retried. If the new file starts with the same
    /// content as the old one it is an atomic rewrite and reading continues at
    /// the previous position, otherwise it is read from the start.
    ///
    /// On failure the reader is left detached and the next call to `next`
    /// tries again.
    fn reopen(&self, state: &mut TailerState, truncated: bool) -> Result<()> {
        let path = &self.cfg.filename;

        let old_id = match state.reader.file() {
            Some(file) if !truncated => match FileId::from_file(file) {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!(path = ?path, error = %e, "Failed to read identity of replaced file");
                    None
                }
            },
            _ => None,
        };
        let prev_position = state.reader.position();

        // Holding the old handle keeps its inode from being reused by the new
        // file. Windows refuses to recreate a path while a handle to it is open.
        let _replaced = state.reader.close().filter(|_| !cfg!(windows));

        let mut backoff = Backoff::new(
            &self.cancel,
            self.cfg.watcher.min_poll_frequency,
            self.cfg.watcher.max_poll_frequency,
            Some(self.cfg.max_reopen_retries),
        );

        loop {
            let mut file = match fileext::open_file(path) {
                Ok(file) => file,
                Err(e) if watch::is_missing(&e) => {
                    debug!(path = ?path, "Waiting for file to appear");
                    watch::block_until_exists(&self.cancel, path, &self.cfg.watcher)?;
                    continue;
                }
                Err(e) => return Err(Error::Io(e)),
            };

            let id = match FileId::from_file(&file) {
                Ok(id) => id,
                Err(e) => {
                    debug!(path = ?path, error = %e, "Failed to read identity of new file, retrying");
                    self.retry_wait(&mut backoff)?;
                    continue;
                }
            };

            if old_id == Some(id) {
                debug!(path = ?path, file_id = %id, "File has not been replaced yet, retrying");
                self.retry_wait(&mut backoff)?;
                continue;
            }

            let signature = Signature::from_file(&mut file)?;
            let offset = if state.signature.matches(&signature) {
                prev_position.min(file.metadata()?.len())
            } else {
                0
            };

            info!(path = ?path, file_id = %id, offset, truncated, "Reopened file");
            state.signature = signature;
            state.reader.reset(file, offset)?;
            return Ok(());
        }
    }

    fn retry_wait(&self, backoff: &mut Backoff) -> Result<()> {
        backoff.wait().map_err(|e| match e {
            Error::RetriesExhausted(attempts) => Error::Reopen {
                path: self.cfg.filename.clone(),
                attempts,
            },
            other => other,
        })
    }
}

impl Drop for FileTailer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail::config::{CompressionKind, WatcherConfig};
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn fast_config(path: &Path) -> Config {
        Config {
            watcher: WatcherConfig {
                min_poll_frequency: Duration::from_millis(5),
                max_poll_frequency: Duration::from_millis(5),
            },
            ..Config::new(path)
        }
    }

    fn create_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn append(path: &Path, content: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn verify(tailer: &FileTailer, text: &str, offset: i64) {
        let line = tailer.next().unwrap();
        assert_eq!(line.text, text);
        assert_eq!(line.offset, offset);
    }

    #[test]
    fn test_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.log");

        let err = FileTailer::new(Config::new(&missing)).err().unwrap();
        assert!(matches!(err, Error::NotFound(p) if p == missing));

        let empty = create_file(&dir, "empty.log", "");
        assert!(FileTailer::new(Config::new(empty)).is_ok());
    }

    #[test]
    fn test_invalid_construction() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "app.log", "hello\n");

        let mut cfg = Config::new(&path);
        cfg.encoding = Some("no-such-encoding".to_string());
        assert!(matches!(
            FileTailer::new(cfg).err().unwrap(),
            Error::EncodingConfig(_)
        ));

        let mut cfg = Config::new(&path);
        cfg.start_offset = -5;
        assert!(matches!(FileTailer::new(cfg).err().unwrap(), Error::Config(_)));

        assert!(FileTailer::new(Config::new(dir.path())).is_err());
    }

    #[test]
    fn test_read_from_offsets() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "read.log", "hello\nworld\ntest\n");

        let tailer = FileTailer::new(Config::new(&path)).unwrap();
        verify(&tailer, "hello", 6);
        verify(&tailer, "world", 12);
        verify(&tailer, "test", 17);

        let mut cfg = Config::new(&path);
        cfg.start_offset = 6;
        let tailer = FileTailer::new(cfg).unwrap();
        verify(&tailer, "world", 12);
        verify(&tailer, "test", 17);
    }

    #[test]
    fn test_over_4096_byte_line() {
        let dir = TempDir::new().unwrap();
        let long = "a".repeat(4098);
        let path = create_file(&dir, "long.log", &format!("test\n{}\nhello\nworld\n", long));

        let tailer = FileTailer::new(Config::new(path)).unwrap();
        verify(&tailer, "test", 5);
        verify(&tailer, &long, 4104);
        verify(&tailer, "hello", 4110);
        verify(&tailer, "world", 4116);
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "partial.log", "hello\nwo");

        let tailer = FileTailer::new(fast_config(&path)).unwrap();
        verify(&tailer, "hello", 6);

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            append(&writer_path, "rld\n");
        });

        verify(&tailer, "world", 12);
        writer.join().unwrap();
    }

    #[test]
    fn test_size() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "size.log", "hello\n");

        let tailer = FileTailer::new(Config::new(&path)).unwrap();
        assert_eq!(tailer.size().unwrap(), 6);

        append(&path, "world\n");
        assert_eq!(tailer.size().unwrap(), 12);
    }

    #[test]
    fn test_stop_while_waiting() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "stopped.log", "hello\n");

        let tailer = Arc::new(FileTailer::new(fast_config(&path)).unwrap());
        verify(&tailer, "hello", 6);

        let stopper = Arc::clone(&tailer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stopper.stop().unwrap();
        });

        assert!(tailer.next().unwrap_err().is_cancelled());
        handle.join().unwrap();

        assert!(tailer.is_stopped());
        assert!(tailer.next().unwrap_err().is_cancelled());
        assert!(tailer.size().unwrap_err().is_cancelled());
        assert!(tailer.stop().is_ok());
    }

    #[test]
    fn test_compressed_reaches_eof() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log.gz");
        let mut enc = flate2::write::GzEncoder::new(
            std::fs::File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(b"one\ntwo\nlast").unwrap();
        enc.finish().unwrap();

        let mut cfg = Config::new(&path);
        cfg.compression = Some(CompressionKind::Gzip);
        let tailer = FileTailer::new(cfg).unwrap();

        verify(&tailer, "one", 4);
        verify(&tailer, "two", 8);
        verify(&tailer, "last", 12);
        assert!(matches!(tailer.next(), Err(Error::Eof)));
        assert!(matches!(tailer.next(), Err(Error::Eof)));
    }

    #[test]
    fn test_signature_grows_while_reading() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "grow.log", "short\n");

        let tailer = FileTailer::new(fast_config(&path)).unwrap();
        verify(&tailer, "short", 6);
        assert_eq!(tailer.lock().signature.len(), 6);

        let line = "x".repeat(99);
        append(&path, &format!("{}\n", line));
        verify(&tailer, &line, 106);
        assert_eq!(tailer.lock().signature.len(), 106);
    }

    #[traced_test]
    #[test]
    fn test_truncate_reopens() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "truncate.log", "a really long string goes here\nhello\nworld\n");

        let tailer = FileTailer::new(fast_config(&path)).unwrap();
        verify(&tailer, "a really long string goes here", 31);
        verify(&tailer, "hello", 37);
        verify(&tailer, "world", 43);

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut f = std::fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(writer_path)
                .unwrap();
            f.write_all(b"h311o\nw0r1d\nendofworld\n").unwrap();
        });

        verify(&tailer, "h311o", 6);
        verify(&tailer, "w0r1d", 12);
        verify(&tailer, "endofworld", 23);
        writer.join().unwrap();

        assert!(logs_contain("File was truncated"));
        assert!(logs_contain("Reopened file"));
    }

    #[test]
    fn test_removed_and_created_during_wait() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "removed.log", "hello\n");

        let tailer = FileTailer::new(fast_config(&path)).unwrap();
        verify(&tailer, "hello", 6);

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            std::fs::remove_file(&writer_path).unwrap();
            thread::sleep(Duration::from_millis(100));
            std::fs::write(&writer_path, "new\n").unwrap();
        });

        verify(&tailer, "new", 4);
        writer.join().unwrap();
    }

    #[test]
    fn test_reopen_gives_up_on_unchanged_file() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "same.log", "hello\n");

        let mut cfg = fast_config(&path);
        cfg.max_reopen_retries = 2;
        let tailer = FileTailer::new(cfg).unwrap();
        verify(&tailer, "hello", 6);

        let mut state = tailer.lock();
        let err = tailer.reopen(&mut state, false).unwrap_err();
        assert!(matches!(err, Error::Reopen { ref path, attempts: 2 } if path == &tailer.cfg.filename));
        assert!(state.reader.file().is_none());
        drop(state);

        // The next call reattaches the same file where reading stopped.
        assert!(!tailer.is_stopped());
        assert_eq!(tailer.size().unwrap(), 6);
        append(&path, "world\n");
        verify(&tailer, "world", 12);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_reopen_is_not_cancellation() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "replaced.log", "a\n");

        let tailer = FileTailer::new(fast_config(&path)).unwrap();
        verify(&tailer, "a", 2);

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(tailer.next(), Err(Error::Io(_))));
        assert!(matches!(tailer.next(), Err(Error::Io(_))));
        assert!(!tailer.is_stopped());
        assert!(!matches!(tailer.size(), Err(Error::Cancelled)));

        std::fs::remove_dir(&path).unwrap();
        std::fs::write(&path, "b\n").unwrap();
        verify(&tailer, "b", 2);
        assert_eq!(tailer.size().unwrap(), 2);
    }

    #[test]
    fn test_stopped_while_waiting_for_file_to_be_created() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir, "gone.log", "hello\n");

        let tailer = Arc::new(FileTailer::new(fast_config(&path)).unwrap());
        verify(&tailer, "hello", 6);

        std::fs::remove_file(&path).unwrap();

        let stopper = Arc::clone(&tailer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stopper.stop().unwrap();
        });

        assert!(matches!(tailer.next(), Err(Error::Cancelled)));
        handle.join().unwrap();
    }
}
