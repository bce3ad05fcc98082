//! Per-level log files opened lazily in append mode.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Levels the sink keeps a file for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Fatal,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [
        LogLevel::Error,
        LogLevel::Fatal,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    fn mirrored(self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Fatal)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry holding at most one open append-mode handle per [`LogLevel`].
///
/// Handles are flushed and released by [`LogSink::close`] or on drop.
pub struct LogSink {
    dir: PathBuf,
    handles: BTreeMap<LogLevel, File>,
    mirror: Option<Box<dyn Write>>,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("dir", &self.dir)
            .field("handles", &self.handles)
            .field("mirrored", &self.is_mirrored())
            .finish()
    }
}

impl LogSink {
    /// Create a sink writing `<level>.log` files under `dir`. Nothing is opened yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handles: BTreeMap::new(),
            mirror: None,
        }
    }

    /// Also print error and fatal messages to stdout.
    pub fn with_stdout_mirror(mut self, mirror: bool) -> Self {
        self.mirror = None;
        if mirror {
            self = self.with_mirror_writer(io::stdout());
        }
        self
    }

    /// Copy error and fatal messages to `writer`.
    pub fn with_mirror_writer(mut self, writer: impl Write + 'static) -> Self {
        self.mirror = Some(Box::new(writer));
        self
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.is_some()
    }

    /// Create the log directory and an empty file per level without opening handles.
    pub fn touch_all(&self) -> HarnessResult<()> {
        fs::create_dir_all(&self.dir)?;
        for level in LogLevel::ALL {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(level))
                .map_err(|source| HarnessError::LogSink { level, source })?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, level: LogLevel) -> PathBuf {
        self.dir.join(format!("{level}.log"))
    }

    pub fn is_open(&self, level: LogLevel) -> bool {
        self.handles.contains_key(&level)
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Append one line to the level's file, opening it on first use.
    pub fn write(&mut self, level: LogLevel, message: &str) -> HarnessResult<()> {
        let path = self.path_for(level);
        let file = match self.handles.entry(level) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(%level, path = %path.display(), "opening log file");
                let file = open_append(&path).map_err(|source| HarnessError::LogSink { level, source })?;
                entry.insert(file)
            }
        };
        writeln!(file, "{message}").map_err(|source| HarnessError::LogSink { level, source })?;

        if let Some(mirror) = self.mirror.as_mut().filter(|_| level.mirrored()) {
            writeln!(mirror, "{message}").map_err(|source| HarnessError::LogSink { level, source })?;
        }
        Ok(())
    }

    pub fn error(&mut self, message: &str) -> HarnessResult<()> {
        self.write(LogLevel::Error, message)
    }

    pub fn fatal(&mut self, message: &str) -> HarnessResult<()> {
        self.write(LogLevel::Fatal, message)
    }

    pub fn info(&mut self, message: &str) -> HarnessResult<()> {
        self.write(LogLevel::Info, message)
    }

    pub fn debug(&mut self, message: &str) -> HarnessResult<()> {
        self.write(LogLevel::Debug, message)
    }

    pub fn flush(&mut self) -> HarnessResult<()> {
        for (level, file) in self.handles.iter_mut() {
            file.flush().map_err(|source| HarnessError::LogSink {
                level: *level,
                source,
            })?;
        }
        Ok(())
    }

    /// Flush and release every open handle.
    pub fn close(&mut self) -> HarnessResult<()> {
        self.flush()?;
        self.handles.clear();
        Ok(())
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
