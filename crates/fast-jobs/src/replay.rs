//! Reading a job log back.

use crate::error::{AppError, Result};
use crate::log::{LogEntry, LogSink};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Selects entries by exact tag and/or a message regex. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
  tag: Option<String>,
  message: Option<Regex>,
}

impl Filter {
  pub fn new(tag: Option<&str>, pattern: Option<&str>) -> Result<Self> {
    let tag = tag.filter(|t| !t.is_empty()).map(str::to_string);
    let message = match pattern.filter(|p| !p.is_empty()) {
      Some(pattern) => Some(Regex::new(pattern)?),
      None => None,
    };

    Ok(Self { tag, message })
  }

  pub fn matches(&self, entry: &LogEntry) -> bool {
    let tag_matches = self.tag.as_ref().is_none_or(|tag| entry.tag == *tag);
    let message_matches = self
      .message
      .as_ref()
      .is_none_or(|regex| regex.is_match(&entry.message));

    tag_matches && message_matches
  }
}

/// Parses one entry per line, skipping blank lines. Errors carry the 1-based line number.
pub fn read_entries<R: BufRead>(reader: R) -> impl Iterator<Item = Result<LogEntry>> {
  reader
    .lines()
    .enumerate()
    .filter_map(|(index, line)| match line {
      Ok(line) if line.trim().is_empty() => None,
      Ok(line) => Some(
        serde_json::from_str(&line).map_err(|source| AppError::LogEntryInvalid {
          line: index + 1,
          source,
        }),
      ),
      Err(e) => Some(Err(AppError::IoError(e))),
    })
}

/// Entries of `reader` accepted by `filter`, in file order.
pub fn filter_entries<R: BufRead>(reader: R, filter: &Filter) -> Result<Vec<LogEntry>> {
  let mut selected = Vec::new();
  for entry in read_entries(reader) {
    let entry = entry?;
    if filter.matches(&entry) {
      selected.push(entry);
    }
  }
  Ok(selected)
}

/// Prints the matching entries of the log file at `path` with their recorded colors.
///
/// Returns how many entries were printed.
pub fn replay(path: &Path, filter: &Filter, sink: &LogSink) -> Result<usize> {
  if !path.exists() {
    return Err(AppError::LogFileNotFound(path.to_path_buf()));
  }

  let file = File::open(path)?;
  let mut printed = 0;
  for entry in read_entries(BufReader::new(file)) {
    let entry = entry?;
    if filter.matches(&entry) {
      sink.echo(&entry);
      printed += 1;
    }
  }

  Ok(printed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::log::{BLUE, RED};

  fn entry(tag: &str, message: &str) -> LogEntry {
    LogEntry {
      tag: tag.into(),
      message: message.into(),
      timestamp: "2024-05-01T10:00:00Z".into(),
      color: BLUE,
    }
  }

  fn log_text(entries: &[LogEntry]) -> String {
    entries
      .iter()
      .map(|e| serde_json::to_string(e).unwrap() + "\n")
      .collect()
  }

  fn sample() -> Vec<LogEntry> {
    vec![
      entry("web", "job started"),
      entry("db", "job started"),
      entry("web", "GET /health 200"),
      entry("db", "ready to accept connections"),
      entry("web", "GET /login 500"),
      LogEntry {
        color: RED,
        ..entry("web", "job error, exit=2")
      },
    ]
  }

  #[test]
  fn empty_filter_keeps_everything() {
    let log = log_text(&sample());
    let filter = Filter::new(Some(""), Some("")).unwrap();
    assert_eq!(filter_entries(log.as_bytes(), &filter).unwrap(), sample());
  }

  #[test]
  fn tag_filter_keeps_exactly_that_tag_in_order() {
    let log = log_text(&sample());
    let filter = Filter::new(Some("web"), None).unwrap();
    let expected: Vec<_> = sample().into_iter().filter(|e| e.tag == "web").collect();
    assert_eq!(filter_entries(log.as_bytes(), &filter).unwrap(), expected);
  }

  #[test]
  fn tag_and_regex_must_both_match() {
    let log = log_text(&sample());
    let filter = Filter::new(Some("web"), Some(r"GET /\w+ 5\d\d")).unwrap();
    let selected = filter_entries(log.as_bytes(), &filter).unwrap();
    assert_eq!(selected, vec![entry("web", "GET /login 500")]);

    let filter = Filter::new(None, Some("started")).unwrap();
    let tags: Vec<_> = filter_entries(log.as_bytes(), &filter)
      .unwrap()
      .into_iter()
      .map(|e| e.tag)
      .collect();
    assert_eq!(tags, vec!["web", "db"]);
  }

  #[test]
  fn invalid_regex_is_rejected() {
    assert!(matches!(
      Filter::new(None, Some("(")),
      Err(AppError::InvalidFilter(_))
    ));
  }

  #[test]
  fn malformed_line_reports_its_number() {
    let log = format!("{}\nnot json\n", serde_json::to_string(&entry("a", "ok")).unwrap());
    let err = filter_entries(log.as_bytes(), &Filter::default()).unwrap_err();
    assert!(matches!(err, AppError::LogEntryInvalid { line: 2, .. }));
  }

  #[test]
  fn blank_lines_are_skipped() {
    let log = format!("\n{}\n\n", serde_json::to_string(&entry("a", "ok")).unwrap());
    let entries = filter_entries(log.as_bytes(), &Filter::default()).unwrap();
    assert_eq!(entries.len(), 1);
  }

  #[test]
  fn replay_counts_printed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.log");
    std::fs::write(&path, log_text(&sample())).unwrap();

    let filter = Filter::new(Some("db"), None).unwrap();
    assert_eq!(replay(&path, &filter, &LogSink::console()).unwrap(), 2);

    // Replaying never appends to the file it reads.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), log_text(&sample()));
  }

  #[test]
  fn replay_of_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = replay(&dir.path().join("nope.log"), &Filter::default(), &LogSink::console()).unwrap_err();
    assert!(matches!(err, AppError::LogFileNotFound(_)));
  }
}
