use crate::log::Level;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A job as written in the job file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
  /// Identifies the job in every log record.
  pub tag: String,
  /// Command line handed to `shell -c`.
  pub command: String,
  pub shell: String,
  /// Working directory. Empty means the current directory.
  pub dir: String,
  /// `KEY=VALUE` entries. Empty means the job inherits the ambient environment,
  /// anything else is the exact environment of the job.
  #[serde(deserialize_with = "null_as_empty")]
  pub env: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl JobSpec {
  pub fn new(tag: impl Into<String>, command: impl Into<String>, shell: impl Into<String>) -> Self {
    Self {
      tag: tag.into(),
      command: command.into(),
      shell: shell.into(),
      ..Self::default()
    }
  }

  pub fn inherits_env(&self) -> bool {
    self.env.is_empty()
  }

  /// Splits `env` into key/value pairs. Entries without `=` are returned as `Err`.
  pub fn env_pairs(&self) -> impl Iterator<Item = Result<(&str, &str), &str>> {
    self
      .env
      .iter()
      .map(|entry| entry.split_once('=').ok_or(entry.as_str()))
  }
}

#[derive(Debug, PartialEq, Clone)]
pub enum JobStatus {
  Waiting,
  Running,
  Done,
  Failed(i32),
  Killed,
}

impl std::fmt::Display for JobStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      JobStatus::Waiting => write!(f, "Waiting"),
      JobStatus::Running => write!(f, "Running"),
      JobStatus::Done => write!(f, "Done"),
      JobStatus::Failed(code) => write!(f, "Failed({code})"),
      JobStatus::Killed => write!(f, "Killed"),
    }
  }
}

impl JobStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, JobStatus::Done | JobStatus::Failed(_) | JobStatus::Killed)
  }
}

/// Final result of one job, recorded once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
  pub exit_code: i32,
  pub duration: Duration,
}

impl JobOutcome {
  pub fn level(&self) -> Level {
    if self.exit_code > 0 {
      Level::Error
    } else {
      Level::Info
    }
  }
}

/// Runtime slot of one job.
///
/// The runner task owns the child process; everybody else only sees the
/// status, the outcome once it is recorded, and the kill switch.
#[derive(Debug, Clone)]
pub struct JobState {
  spec: Arc<JobSpec>,
  status: Arc<Mutex<JobStatus>>,
  outcome: Arc<OnceLock<JobOutcome>>,
  kill: CancellationToken,
}

impl JobState {
  pub fn new(spec: JobSpec) -> Self {
    Self {
      spec: Arc::new(spec),
      status: Arc::new(Mutex::new(JobStatus::Waiting)),
      outcome: Arc::new(OnceLock::new()),
      kill: CancellationToken::new(),
    }
  }

  pub fn spec(&self) -> &JobSpec {
    &self.spec
  }

  pub fn tag(&self) -> &str {
    &self.spec.tag
  }

  pub async fn status(&self) -> JobStatus {
    self.status.lock().await.clone()
  }

  pub(crate) async fn set_status(&self, status: JobStatus) {
    *self.status.lock().await = status;
  }

  pub fn outcome(&self) -> Option<JobOutcome> {
    self.outcome.get().copied()
  }

  /// Stores the outcome. Only the first call has an effect.
  pub(crate) fn finish(&self, outcome: JobOutcome) -> bool {
    self.outcome.set(outcome).is_ok()
  }

  /// Asks the runner to kill the child. Idempotent.
  pub fn kill(&self) {
    self.kill.cancel();
  }

  pub fn kill_requested(&self) -> bool {
    self.kill.is_cancelled()
  }

  pub(crate) fn killed(&self) -> WaitForCancellationFuture<'_> {
    self.kill.cancelled()
  }
}
