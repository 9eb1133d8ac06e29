//! Logger chain: persistent operator logs that mirror every write to parent loggers.
//!
//! A per-run logger is chained to the batch's common log so both stay in sync.
//! A closed or null logger simply drops local writes; parents still receive them.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{instrument, warn};

const SECTION_SEPARATOR: &str = "------------------------------------------------------------";

/// Destination for log text.
pub trait LogSink: Send {
  fn write_str(&mut self, text: &str) -> io::Result<()>;

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
  fn write_str(&mut self, _text: &str) -> io::Result<()> {
    Ok(())
  }
}

/// Sink writing UTF-8 text to a file, flushed after every write.
#[derive(Debug)]
pub struct FileSink {
  file: File,
}

impl FileSink {
  /// Creates or truncates `path`.
  pub fn create(path: &Path) -> io::Result<Self> {
    Ok(Self {
      file: File::create(path)?,
    })
  }
}

impl LogSink for FileSink {
  fn write_str(&mut self, text: &str) -> io::Result<()> {
    self.file.write_all(text.as_bytes())?;
    self.file.flush()
  }

  fn flush(&mut self) -> io::Result<()> {
    self.file.sync_all()
  }
}

struct LoggerInner {
  sink: Box<dyn LogSink>,
  parents: Vec<Logger>,
  path: Option<PathBuf>,
  bytes_written: u64,
}

/// Cloneable handle to one node of the logger chain.
#[derive(Clone)]
pub struct Logger {
  inner: Arc<Mutex<LoggerInner>>,
}

impl std::fmt::Debug for Logger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let inner = self.lock();
    f.debug_struct("Logger")
      .field("path", &inner.path)
      .field("parents", &inner.parents.len())
      .field("bytes_written", &inner.bytes_written)
      .finish()
  }
}

impl Logger {
  /// Logger with no sink and no parents.
  pub fn null() -> Self {
    Self::with_sink(Box::new(NullSink), Vec::new())
  }

  pub fn with_sink(sink: Box<dyn LogSink>, parents: Vec<Logger>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(LoggerInner {
        sink,
        parents,
        path: None,
        bytes_written: 0,
      })),
    }
  }

  /// Opens (truncating) a file logger mirrored to `parents`.
  #[instrument(level = "trace", skip(parents))]
  pub fn open(path: &Path, parents: Vec<Logger>) -> io::Result<Self> {
    let logger = Self::with_sink(Box::new(FileSink::create(path)?), parents);
    logger.lock().path = Some(path.to_path_buf());
    Ok(logger)
  }

  fn lock(&self) -> MutexGuard<'_, LoggerInner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// File backing this logger, if any.
  pub fn path(&self) -> Option<PathBuf> {
    self.lock().path.clone()
  }

  /// Bytes written to this logger's own sink (parents excluded).
  pub fn bytes_written(&self) -> u64 {
    self.lock().bytes_written
  }

  pub fn write(&self, text: &str) {
    let parents = {
      let mut inner = self.lock();
      match inner.sink.write_str(text) {
        Ok(()) => inner.bytes_written += text.len() as u64,
        Err(e) => warn!(path = ?inner.path, error = %e, "log write failed"),
      }
      inner.parents.clone()
    };
    for parent in &parents {
      parent.write(text);
    }
  }

  pub fn write_line(&self, text: &str) {
    let mut line = String::with_capacity(text.len() + 1);
    line.push_str(text);
    line.push('\n');
    self.write(&line);
  }

  pub fn write_section_separator(&self) {
    self.write_line(SECTION_SEPARATOR);
  }

  /// Flushes and releases the local sink. Later writes still reach the parents.
  pub fn close(&self) {
    let mut inner = self.lock();
    if let Err(e) = inner.sink.flush() {
      warn!(path = ?inner.path, error = %e, "log flush failed");
    }
    inner.sink = Box::new(NullSink);
  }
}
