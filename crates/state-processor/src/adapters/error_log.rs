//! # Error Log Adapters
//!
//! - [`FileErrorLog`]: append-only file, one line per dead-lettered record,
//!   flushed after every line.
//! - [`MemoryErrorLog`]: shared in-memory line buffer for tests.

use crate::ports::outbound::ErrorLog;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Append-only error log file.
#[derive(Debug)]
pub struct FileErrorLog {
    path: PathBuf,
    file: File,
}

impl FileErrorLog {
    /// Opens (creating if needed) the log at `path`, including missing
    /// parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Location of the log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorLog for FileErrorLog {
    fn append(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }
}

/// In-memory error log. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryErrorLog {
    lines: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemoryErrorLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the appended lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of appended lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// True if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Makes subsequent appends fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl ErrorLog for MemoryErrorLog {
    fn append(&mut self, line: &str) -> io::Result<()> {
        if *self.failing.lock() {
            return Err(io::Error::new(io::ErrorKind::Other, "error log unavailable"));
        }
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}
