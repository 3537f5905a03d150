use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Invalid job file {path:?}: {details}")]
  JobFileInvalid { path: PathBuf, details: String },

  #[error("Job tag is required")]
  MissingTag,

  #[error("Failed to launch job '{tag}': {reason}")]
  LaunchFailed { tag: String, reason: String },

  #[error("Failed to write log file {path:?}: {source}")]
  LogFile {
    tag: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Log file not found: {0:?}")]
  LogFileNotFound(PathBuf),

  #[error("Invalid log entry at line {line}: {source}")]
  LogEntryInvalid {
    line: usize,
    #[source]
    source: serde_json::Error,
  },

  #[error("Invalid filter: {0}")]
  InvalidFilter(#[from] regex::Error),

  #[error("IO error: {0}")]
  IoError(#[from] std::io::Error),

  #[error("TOML parse error: {0}")]
  TomlError(#[from] toml::de::Error),

  #[error("Task join error: {0}")]
  TaskJoinError(#[from] tokio::task::JoinError),

  #[error("JSON parse error: {0}")]
  JsonError(#[from] serde_json::Error),
}

impl AppError {
  /// Errors that mean the launch or logging machinery itself is broken.
  /// A run that hits one of these is aborted instead of reported.
  pub fn is_infrastructure(&self) -> bool {
    matches!(
      self,
      AppError::LaunchFailed { .. } | AppError::LogFile { .. } | AppError::TaskJoinError(_)
    )
  }

  /// Tag of the job the error belongs to, if any.
  pub fn tag(&self) -> Option<&str> {
    match self {
      AppError::LaunchFailed { tag, .. } | AppError::LogFile { tag, .. } if !tag.is_empty() => {
        Some(tag.as_str())
      }
      _ => None,
    }
  }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn launch_and_log_failures_are_infrastructure() {
    let launch = AppError::LaunchFailed {
      tag: "build".into(),
      reason: "No such file or directory".into(),
    };
    assert!(launch.is_infrastructure());
    assert_eq!(launch.tag(), Some("build"));

    let log = AppError::LogFile {
      tag: "build".into(),
      path: PathBuf::from("/nope/log.json"),
      source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
    };
    assert!(log.is_infrastructure());
  }

  #[test]
  fn config_errors_are_not_infrastructure() {
    assert!(!AppError::MissingTag.is_infrastructure());
    assert_eq!(AppError::MissingTag.tag(), None);
    assert!(!AppError::LogFileNotFound(PathBuf::from("x.log")).is_infrastructure());
  }
}
