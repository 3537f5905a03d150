use crate::error::{AppError, Result};
use crate::job::{JobOutcome, JobState, JobStatus};
use crate::log::LogSink;
use crate::model::HighestExitCode;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinSet;

fn build_command(job: &JobState) -> Command {
  let spec = job.spec();

  let mut command = Command::new(&spec.shell);
  command
    .arg("-c")
    .arg(&spec.command)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  if !spec.dir.is_empty() {
    command.current_dir(&spec.dir);
  }

  if !spec.inherits_env() {
    command.env_clear();
    for pair in spec.env_pairs() {
      match pair {
        Ok((key, value)) => {
          command.env(key, value);
        }
        Err(entry) => tracing::warn!(tag = job.tag(), entry, "skipping env entry without '='"),
      }
    }
  }

  command
}

fn trim_line(buf: &[u8]) -> &[u8] {
  let line = buf.strip_suffix(b"\n").unwrap_or(buf);
  line.strip_suffix(b"\r").unwrap_or(line)
}

/// Logs every line of `reader` under `tag` until EOF.
///
/// Both stdout and stderr lines are logged at info level.
async fn forward_lines<R>(reader: R, tag: String, sink: LogSink) -> Result<()>
where
  R: AsyncRead + Unpin,
{
  let mut reader = BufReader::new(reader);
  let mut buf = Vec::new();

  loop {
    buf.clear();
    match reader.read_until(b'\n', &mut buf).await {
      Ok(0) => return Ok(()),
      Ok(_) => sink.info(&tag, String::from_utf8_lossy(trim_line(&buf))).await?,
      Err(error) => {
        tracing::warn!(tag = %tag, %error, "stopped reading job output");
        return Ok(());
      }
    }
  }
}

/// Completes with the first reader error. Pends forever once every reader
/// finished cleanly.
async fn first_failure(readers: &mut JoinSet<Result<()>>) -> AppError {
  while let Some(joined) = readers.join_next().await {
    match joined {
      Ok(Ok(())) => {}
      Ok(Err(error)) => return error,
      Err(error) => return error.into(),
    }
  }
  std::future::pending().await
}

/// Sends SIGKILL and reaps the child. Returns the reaped status, if any.
async fn kill_and_reap(child: &mut Child, tag: &str) -> Option<ExitStatus> {
  if let Err(error) = child.start_kill() {
    tracing::debug!(tag, %error, "kill failed, job already exited");
  }
  match child.wait().await {
    Ok(status) => Some(status),
    Err(error) => {
      tracing::debug!(tag, %error, "failed to reap killed job");
      None
    }
  }
}

/// A reaped status that still carries an exit code means the child exited
/// on its own before the kill landed.
fn exited_on_its_own(reaped: Option<ExitStatus>) -> Option<ExitStatus> {
  reaped.filter(|status| status.code().is_some())
}

async fn finish(
  job: &JobState,
  highest: &HighestExitCode,
  outcome: JobOutcome,
  status: JobStatus,
) -> JobOutcome {
  highest.record(outcome.exit_code);
  job.finish(outcome);
  job.set_status(status).await;
  outcome
}

/// Logs how the child exited and returns the exit code to record.
async fn report_exit(
  sink: &LogSink,
  tag: &str,
  status: std::io::Result<ExitStatus>,
) -> Result<i32> {
  let code = match status {
    Ok(status) => status.code(),
    Err(error) => {
      tracing::warn!(tag, %error, "failed to wait for job");
      None
    }
  };

  match code {
    Some(0) => {
      sink.info(tag, "job complete, exit=0").await?;
      Ok(0)
    }
    Some(code) => {
      sink.error(tag, format!("job error, exit={code}")).await?;
      Ok(code)
    }
    // Killed by a signal, or a status the platform cannot express as a code.
    None => {
      sink.error(tag, "job error, exit=1").await?;
      Ok(1)
    }
  }
}

async fn record_exit(
  job: &JobState,
  sink: &LogSink,
  highest: &HighestExitCode,
  status: std::io::Result<ExitStatus>,
  duration: Duration,
) -> Result<JobOutcome> {
  let exit_code = report_exit(sink, job.tag(), status).await?;
  let status = match exit_code {
    0 => JobStatus::Done,
    code => JobStatus::Failed(code),
  };
  Ok(finish(job, highest, JobOutcome { exit_code, duration }, status).await)
}

enum Stopped {
  Exited(std::io::Result<ExitStatus>),
  LogFailed(AppError),
  KillRequested,
}

/// Runs one job to completion (or until [`JobState::kill`]) and records its outcome.
///
/// A child that cannot be spawned is reported as [`AppError::LaunchFailed`].
/// A log write that fails while the child runs kills it and returns the
/// error right away. A non-zero exit is not an error, it is the returned
/// outcome.
pub async fn run(job: &JobState, sink: &LogSink, highest: &HighestExitCode) -> Result<JobOutcome> {
  let tag = job.tag().to_string();
  let mut command = build_command(job);

  sink.info(&tag, "job started").await?;

  let started = Instant::now();
  let mut child = command.spawn().map_err(|e| AppError::LaunchFailed {
    tag: tag.clone(),
    reason: e.to_string(),
  })?;
  job.set_status(JobStatus::Running).await;

  let mut readers = JoinSet::new();
  if let Some(stdout) = child.stdout.take() {
    readers.spawn(forward_lines(stdout, tag.clone(), sink.clone()));
  }
  if let Some(stderr) = child.stderr.take() {
    readers.spawn(forward_lines(stderr, tag.clone(), sink.clone()));
  }

  let stopped = tokio::select! {
    biased;
    status = child.wait() => Stopped::Exited(status),
    error = first_failure(&mut readers) => Stopped::LogFailed(error),
    _ = job.killed() => Stopped::KillRequested,
  };

  let status = match stopped {
    Stopped::Exited(status) => status,
    Stopped::LogFailed(error) => {
      kill_and_reap(&mut child, &tag).await;
      readers.abort_all();
      job.set_status(JobStatus::Killed).await;
      return Err(error);
    }
    Stopped::KillRequested => {
      let reaped = kill_and_reap(&mut child, &tag).await;
      // Trailing output still in the pipes is dropped with the readers.
      readers.abort_all();
      let duration = started.elapsed();

      if let Some(status) = exited_on_its_own(reaped) {
        return record_exit(job, sink, highest, Ok(status), duration).await;
      }

      let outcome = JobOutcome {
        exit_code: 1,
        duration,
      };
      let outcome = finish(job, highest, outcome, JobStatus::Killed).await;
      sink.error(&tag, "job killed, exit=1").await?;
      return Ok(outcome);
    }
  };
  let duration = started.elapsed();

  // Both streams are drained before the outcome is recorded. A kill request
  // while draining (e.g. a grandchild holding the pipe) stops the wait.
  let drained = async {
    while let Some(joined) = readers.join_next().await {
      joined??;
    }
    Ok::<(), AppError>(())
  };
  let interrupted = tokio::select! {
    drained = drained => {
      drained?;
      false
    }
    _ = job.killed() => true,
  };
  if interrupted {
    readers.abort_all();
  }

  record_exit(job, sink, highest, status, duration).await
}
