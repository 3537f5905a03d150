//! Structured job log.
//!
//! Every record is printed to the console as `[ <tag> ] <message>` with the tag
//! highlighted, and, when a log file is configured, appended to it as one JSON
//! object per line. The file is opened and closed for each record.

use crate::error::{AppError, Result};
use crossterm::style::{Color, Stylize};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// ANSI SGR code recorded for error records.
pub const RED: i32 = 31;
/// ANSI SGR code recorded for info records.
pub const BLUE: i32 = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Error,
}

impl Level {
  pub fn color(self) -> i32 {
    match self {
      Level::Info => BLUE,
      Level::Error => RED,
    }
  }
}

/// One persisted log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  pub tag: String,
  pub message: String,
  pub timestamp: String,
  pub color: i32,
}

impl LogEntry {
  pub fn new(color: i32, tag: &str, message: String) -> Self {
    Self {
      tag: tag.to_string(),
      message,
      timestamp: timestamp(),
      color,
    }
  }
}

fn timestamp() -> String {
  let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
  now
    .format(&Rfc3339)
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

fn console_color(color: i32) -> Color {
  match color {
    RED => Color::DarkRed,
    BLUE => Color::DarkBlue,
    30..=37 => Color::AnsiValue((color - 30) as u8),
    90..=97 => Color::AnsiValue((color - 90 + 8) as u8),
    _ => Color::Reset,
  }
}

/// Renders the console form of a record.
pub fn format_line(color: i32, tag: &str, message: &str) -> String {
  format!("[ {} ] {}", tag.with(console_color(color)), message)
}

fn print_line(color: i32, tag: &str, message: &str) {
  let line = format_line(color, tag, message);
  let mut out = std::io::stdout().lock();
  // A closed stdout must not take the run down with it.
  let _ = writeln!(out, "{line}");
}

#[derive(Debug)]
struct LogFile {
  path: PathBuf,
  lock: Mutex<()>,
}

impl LogFile {
  fn append(&self, entry: &LogEntry) -> Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
    let mut file = open_append(&self.path).map_err(|source| self.failure(&entry.tag, source))?;
    file
      .write_all(line.as_bytes())
      .map_err(|source| self.failure(&entry.tag, source))?;

    Ok(())
  }

  fn failure(&self, tag: &str, source: std::io::Error) -> AppError {
    AppError::LogFile {
      tag: tag.to_string(),
      path: self.path.clone(),
      source,
    }
  }
}

fn open_append(path: &Path) -> std::io::Result<File> {
  let mut options = OpenOptions::new();
  options.append(true).create(true);
  #[cfg(unix)]
  {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
  }
  options.open(path)
}

/// Console plus optional JSON-lines file.
///
/// Cloning is cheap; clones share the file path and the write lock.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
  file: Option<Arc<LogFile>>,
}

impl LogSink {
  /// Console only.
  pub fn console() -> Self {
    Self::default()
  }

  /// Console plus appends to `path`. The file is not touched until the first record.
  pub fn with_file(path: impl Into<PathBuf>) -> Self {
    Self {
      file: Some(Arc::new(LogFile {
        path: path.into(),
        lock: Mutex::new(()),
      })),
    }
  }

  /// Truncates (or creates) `path` and returns a sink appending to it.
  pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
      use std::os::unix::fs::OpenOptionsExt;
      options.mode(0o600);
    }
    options.open(&path).map_err(|source| AppError::LogFile {
      tag: String::new(),
      path: path.clone(),
      source,
    })?;

    Ok(Self::with_file(path))
  }

  pub fn path(&self) -> Option<&Path> {
    self.file.as_deref().map(|file| file.path.as_path())
  }

  pub async fn info(&self, tag: &str, message: impl Into<String>) -> Result<()> {
    self.emit(Level::Info.color(), tag, message).await
  }

  pub async fn error(&self, tag: &str, message: impl Into<String>) -> Result<()> {
    self.emit(Level::Error.color(), tag, message).await
  }

  pub async fn log(&self, level: Level, tag: &str, message: impl Into<String>) -> Result<()> {
    self.emit(level.color(), tag, message).await
  }

  /// Prints the record and appends it to the log file, if any.
  ///
  /// The write runs on the blocking pool. A file that cannot be opened or
  /// written yields [`AppError::LogFile`]; the caller decides whether to stop
  /// the process.
  pub async fn emit(&self, color: i32, tag: &str, message: impl Into<String>) -> Result<()> {
    let entry = LogEntry::new(color, tag, message.into());
    let file = self.file.clone();
    tokio::task::spawn_blocking(move || write_record(file.as_deref(), &entry)).await?
  }

  /// Prints a previously recorded entry without persisting it again.
  pub fn echo(&self, entry: &LogEntry) {
    print_line(entry.color, &entry.tag, &entry.message);
  }

  /// Error-level record, then terminates the process with exit code 1.
  ///
  /// Never returns, whatever exit codes the jobs reported.
  pub fn fatal(&self, tag: &str, message: impl Display) -> ! {
    let entry = LogEntry::new(Level::Error.color(), tag, message.to_string());
    if write_record(self.file.as_deref(), &entry).is_err() {
      // The file is the broken part; the console line is already out.
      tracing::error!(tag, "could not persist fatal record");
    }
    std::process::exit(1)
  }
}

fn write_record(file: Option<&LogFile>, entry: &LogEntry) -> Result<()> {
  print_line(entry.color, &entry.tag, &entry.message);
  match file {
    Some(file) => file.append(entry),
    None => Ok(()),
  }
}
