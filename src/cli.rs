use anyhow::{Context, Result};
use clap::Parser;
use fast_jobs::replay::{self, Filter};
use fast_jobs::{Config, ConfigSource, JobSet, JobSpec, LogSink, Supervisor};
use std::path::PathBuf;

/// Tag used for records that do not belong to a job.
const APP_TAG: &str = "fast-jobs";

#[derive(Debug, Parser, Clone)]
#[command(
  name = "fast-jobs",
  version,
  about = "Run shell commands in parallel with tagged, structured logs"
)]
pub struct Cli {
  /// Tag applied to job output; with --logs, only show this tag
  #[arg(long, default_value = "")]
  pub tag: String,

  /// Command to run
  #[arg(long, default_value = "")]
  pub command: String,

  /// The shell to run the command in
  #[arg(long, default_value = "/bin/bash")]
  pub shell: String,

  /// Directory to run the command in (default: current directory)
  #[arg(long)]
  pub dir: Option<PathBuf>,

  /// Add a job to the jobs file
  #[arg(long)]
  pub add: bool,

  /// Environment variables to set, as a JSON array of "KEY=VALUE" strings
  /// (default: the shell's environment variables)
  #[arg(long)]
  pub env: Option<String>,

  /// Run the jobs in the jobs file
  #[arg(long)]
  pub run: bool,

  /// Jobs file (default: jobs.json, jobs.toml, .fast-jobs.json or .fast-jobs.toml)
  #[arg(long)]
  pub file: Option<PathBuf>,

  /// Where logs are written to (--run) or read from (--logs)
  #[arg(long)]
  pub logfile: Option<PathBuf>,

  /// Print the log file and exit
  #[arg(long)]
  pub logs: bool,

  /// Only show log messages matching this regex
  #[arg(long)]
  pub filter: Option<String>,
}

/// Executes the requested modes and returns the process exit code.
pub async fn run(args: Cli) -> Result<i32> {
  if args.logs {
    replay_logs(&args)?;
    return Ok(0);
  }

  let source = match &args.file {
    Some(path) => ConfigSource::from_path(path.clone()),
    None => Config::find_file()?,
  };
  let mut config = Config::load(&source)?;

  if args.add {
    add_job(&args, &mut config, &source)?;
  }

  if args.run {
    return Ok(run_jobs(&args, config).await);
  }

  Ok(0)
}

fn replay_logs(args: &Cli) -> Result<()> {
  let path = args
    .logfile
    .as_deref()
    .context("--logs needs --logfile to know which file to read")?;
  let filter =
    Filter::new(Some(args.tag.as_str()), args.filter.as_deref()).context("error compiling regex")?;

  replay::replay(path, &filter, &LogSink::console())?;
  Ok(())
}

fn job_env(args: &Cli) -> Result<Vec<String>> {
  match args.env.as_deref().filter(|env| !env.is_empty()) {
    Some(json) => serde_json::from_str(json)
      .context("--env must be a JSON array of \"KEY=VALUE\" strings"),
    None => Ok(
      std::env::vars_os()
        .map(|(key, value)| format!("{}={}", key.to_string_lossy(), value.to_string_lossy()))
        .collect(),
    ),
  }
}

fn add_job(args: &Cli, config: &mut Config, source: &ConfigSource) -> Result<()> {
  let dir = match &args.dir {
    Some(dir) => dir.clone(),
    None => std::env::current_dir().context("cannot read current directory")?,
  };

  if which::which(&args.shell).is_err() {
    tracing::warn!(shell = %args.shell, "shell not found on this machine");
  }

  config.add(JobSpec {
    tag: args.tag.clone(),
    command: args.command.clone(),
    shell: args.shell.clone(),
    dir: dir.display().to_string(),
    env: job_env(args)?,
  })?;

  let path = source.path();
  config
    .save(source)
    .with_context(|| format!("couldn't write file {}", path.display()))?;

  println!("wrote job {} to {}", args.tag, path.display());
  Ok(())
}

async fn run_jobs(args: &Cli, config: Config) -> i32 {
  let sink = match &args.logfile {
    Some(path) => LogSink::create(path).unwrap_or_else(|e| LogSink::console().fatal(APP_TAG, e)),
    None => LogSink::console(),
  };

  let supervisor = Supervisor::new(JobSet::from(config), sink.clone());
  let cancel = async {
    match fast_jobs::wait_for_shutdown_signal().await {
      Ok(signal) => tracing::info!(%signal, "interrupting run"),
      Err(error) => {
        tracing::error!(%error, "cannot listen for termination signals");
        std::future::pending::<()>().await
      }
    }
  };

  match supervisor.run(cancel).await {
    Ok(report) => report.exit_code,
    Err(error) => {
      let tag = error.tag().unwrap_or(APP_TAG).to_string();
      sink.fatal(&tag, error)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("fast-jobs").chain(args.iter().copied())).unwrap()
  }

  #[test]
  fn cli_definition_is_valid() {
    Cli::command().debug_assert();
  }

  #[test]
  fn defaults_match_the_documented_ones() {
    let args = parse(&[]);
    assert_eq!(args.shell, "/bin/bash");
    assert_eq!(args.tag, "");
    assert!(args.file.is_none());
    assert!(!args.add && !args.run && !args.logs);
  }

  #[test]
  fn explicit_env_is_parsed_from_json() {
    let args = parse(&["--env", r#"["A=1","B=2"]"#]);
    assert_eq!(job_env(&args).unwrap(), vec!["A=1", "B=2"]);

    let args = parse(&["--env", r#"{"A":"1"}"#]);
    assert!(job_env(&args).is_err());
  }

  #[test]
  fn missing_env_captures_the_current_environment() {
    let env = job_env(&parse(&[])).unwrap();
    let ambient = std::env::vars_os().count();
    assert_eq!(env.len(), ambient);
    assert!(env.iter().all(|entry| entry.contains('=')));
  }

  #[tokio::test]
  async fn add_appends_to_the_jobs_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("jobs.json");
    let file_arg = file.display().to_string();
    let dir_arg = dir.path().display().to_string();

    for tag in ["first", "second"] {
      let args = parse(&[
        "--add", "--tag", tag, "--command", "exit 0", "--shell", "/bin/sh", "--dir", &dir_arg,
        "--env", "[]", "--file", &file_arg,
      ]);
      assert_eq!(run(args).await.unwrap(), 0);
    }

    let config = Config::load(&ConfigSource::JsonFile(file)).unwrap();
    let tags: Vec<_> = config.jobs.iter().map(|j| j.tag.as_str()).collect();
    assert_eq!(tags, vec!["first", "second"]);
    assert_eq!(config.jobs[0].dir, dir_arg);
    assert_eq!(config.jobs[0].shell, "/bin/sh");
  }

  #[tokio::test]
  async fn add_without_tag_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file_arg = dir.path().join("jobs.json").display().to_string();
    let args = parse(&["--add", "--command", "true", "--file", &file_arg]);

    assert!(run(args).await.is_err());
    assert!(!dir.path().join("jobs.json").exists());
  }

  #[tokio::test]
  async fn run_returns_worst_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("jobs.json");
    std::fs::write(
      &file,
      r#"[
        {"tag":"a","command":"exit 0","shell":"/bin/sh","dir":"","env":[]},
        {"tag":"b","command":"exit 3","shell":"/bin/sh","dir":"","env":[]}
      ]"#,
    )
    .unwrap();
    let log = dir.path().join("jobs.log");

    let args = parse(&[
      "--run",
      "--file",
      &file.display().to_string(),
      "--logfile",
      &log.display().to_string(),
    ]);
    assert_eq!(run(args).await.unwrap(), 3);
    assert!(std::fs::read_to_string(&log).unwrap().lines().count() >= 6);
  }

  #[tokio::test]
  async fn logs_mode_requires_a_logfile() {
    assert!(run(parse(&["--logs"])).await.is_err());
  }

  #[tokio::test]
  async fn logs_mode_rejects_bad_regex() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("jobs.log");
    std::fs::write(&log, "").unwrap();

    let args = parse(&["--logs", "--logfile", &log.display().to_string(), "--filter", "("]);
    assert!(run(args).await.is_err());
  }
}
