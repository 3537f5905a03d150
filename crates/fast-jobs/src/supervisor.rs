use crate::error::Result;
use crate::jobset::JobSet;
use crate::log::LogSink;
use crate::model::{HighestExitCode, RunOutcome, RunReport};
use std::future::Future;
use std::time::Instant;

/// Runs a [`JobSet`] and turns it into a process exit code.
///
/// ```text
/// Dispatching ──► Running ──┬─► Completed    (every job exited)
///                           └─► Interrupted  (cancel future fired first)
/// ```
///
/// Whichever of the two becomes ready first wins; the other path never runs.
#[derive(Debug)]
pub struct Supervisor {
  jobs: JobSet,
  sink: LogSink,
  highest: HighestExitCode,
}

impl Supervisor {
  pub fn new(jobs: JobSet, sink: LogSink) -> Self {
    Self {
      jobs,
      sink,
      highest: HighestExitCode::new(),
    }
  }

  pub fn jobs(&self) -> &JobSet {
    &self.jobs
  }

  pub fn highest_exit_code(&self) -> i32 {
    self.highest.get()
  }

  /// Dispatches every job and waits for them or for `cancel`, whichever comes first.
  ///
  /// On cancellation every job still running is killed and the exit code is at
  /// least 1. An error from the launch or logging machinery kills the remaining
  /// jobs and is returned without a status report.
  pub async fn run<F>(&self, cancel: F) -> Result<RunReport>
  where
    F: Future<Output = ()>,
  {
    let started = Instant::now();
    let mut running = self.jobs.dispatch_all(&self.sink, &self.highest);
    tracing::debug!(jobs = self.jobs.len(), "jobs dispatched");

    tokio::pin!(cancel);
    let finished = tokio::select! {
      finished = running.wait_all() => Some(finished),
      _ = &mut cancel => None,
    };

    let outcome = match finished {
      Some(Ok(())) => RunOutcome::Completed,
      Some(Err(error)) => {
        self.jobs.shutdown();
        running.drain().await;
        return Err(error);
      }
      None => {
        tracing::debug!("run interrupted, killing jobs");
        self.jobs.shutdown();
        running.drain().await;
        RunOutcome::Interrupted
      }
    };

    self.jobs.status_report(started, &self.sink).await?;

    Ok(RunReport::new(outcome, self.highest.get()))
  }
}
