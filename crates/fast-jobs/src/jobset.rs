use crate::config::Config;
use crate::error::Result;
use crate::job::{JobOutcome, JobSpec, JobState, JobStatus};
use crate::log::LogSink;
use crate::model::HighestExitCode;
use crate::runner;
use std::time::Instant;
use tokio::task::JoinSet;

/// The jobs of one run, in file order.
#[derive(Debug, Clone, Default)]
pub struct JobSet {
  jobs: Vec<JobState>,
}

impl JobSet {
  pub fn new(specs: impl IntoIterator<Item = JobSpec>) -> Self {
    Self {
      jobs: specs.into_iter().map(JobState::new).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, JobState> {
    self.jobs.iter()
  }

  /// Starts one runner task per job, all at once.
  pub fn dispatch_all(&self, sink: &LogSink, highest: &HighestExitCode) -> Dispatch {
    let mut tasks = JoinSet::new();

    for job in &self.jobs {
      let job = job.clone();
      let sink = sink.clone();
      let highest = highest.clone();
      tasks.spawn(async move { runner::run(&job, &sink, &highest).await });
    }

    Dispatch { tasks }
  }

  /// Kills every job that is still running. Jobs that already exited are left alone.
  pub fn shutdown(&self) {
    for job in &self.jobs {
      job.kill();
    }
  }

  pub async fn statuses(&self) -> Vec<JobStatus> {
    let mut statuses = Vec::with_capacity(self.jobs.len());
    for job in &self.jobs {
      statuses.push(job.status().await);
    }
    statuses
  }

  /// One line per job with its exit code and duration, then the total run time.
  pub async fn status_report(&self, started: Instant, sink: &LogSink) -> Result<()> {
    for job in &self.jobs {
      match job.outcome() {
        Some(outcome) => {
          sink
            .log(
              outcome.level(),
              job.tag(),
              format!("exit={}, duration={:?}", outcome.exit_code, outcome.duration),
            )
            .await?
        }
        None => sink.error(job.tag(), "exit=-, duration=-").await?,
      }
    }

    println!("total run time {:?}", started.elapsed());

    Ok(())
  }
}

impl From<Config> for JobSet {
  fn from(config: Config) -> Self {
    Self::new(config.jobs)
  }
}

/// Handle on the runner tasks of a dispatched [`JobSet`].
///
/// Dropping it aborts the runners, which kills their children.
#[derive(Debug)]
pub struct Dispatch {
  tasks: JoinSet<Result<JobOutcome>>,
}

impl Dispatch {
  /// Waits until every runner has finished. Returns the first runner error.
  pub async fn wait_all(&mut self) -> Result<()> {
    while let Some(joined) = self.tasks.join_next().await {
      joined??;
    }
    Ok(())
  }

  /// Waits for the remaining runners, only logging their errors.
  pub async fn drain(&mut self) {
    while let Some(joined) = self.tasks.join_next().await {
      match joined {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => tracing::warn!(%error, "job failed while shutting down"),
        Err(error) => tracing::warn!(%error, "job task did not finish cleanly"),
      }
    }
  }
}
