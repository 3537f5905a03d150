//! Process exit codes of the `fast-jobs` binary.

use std::path::Path;
use std::process::{Command, Output};

fn write_jobs(dir: &Path, jobs: &str) -> String {
  let file = dir.join("jobs.json");
  std::fs::write(&file, jobs).unwrap();
  file.display().to_string()
}

fn fast_jobs(dir: &Path, args: &[&str]) -> Output {
  Command::new(env!("CARGO_BIN_EXE_fast-jobs"))
    .args(args)
    .current_dir(dir)
    .output()
    .expect("failed to run fast-jobs")
}

#[test]
fn worst_job_exit_code_becomes_the_process_exit_code() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_jobs(
    dir.path(),
    r#"[
      {"tag":"ok","command":"exit 0","shell":"/bin/sh","dir":"","env":[]},
      {"tag":"bad","command":"exit 4","shell":"/bin/sh","dir":"","env":[]}
    ]"#,
  );

  let output = fast_jobs(dir.path(), &["--run", "--file", &file]);
  assert_eq!(output.status.code(), Some(4));
  assert!(String::from_utf8_lossy(&output.stdout).contains("total run time"));
}

#[test]
fn launch_failure_exits_one() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_jobs(
    dir.path(),
    r#"[
      {"tag":"broken","command":"true","shell":"/definitely/not/a/shell","dir":"","env":[]},
      {"tag":"fine","command":"sleep 20","shell":"/bin/sh","dir":"","env":[]}
    ]"#,
  );
  let log = dir.path().join("jobs.log");

  let output = fast_jobs(
    dir.path(),
    &["--run", "--file", &file, "--logfile", &log.display().to_string()],
  );
  assert_eq!(output.status.code(), Some(1));

  // The fatal record names the job that could not start.
  let last = std::fs::read_to_string(&log).unwrap();
  let last: serde_json::Value = serde_json::from_str(last.lines().last().unwrap()).unwrap();
  assert_eq!(last["tag"], "broken");
  assert_eq!(last["color"], 31);
}

#[test]
fn unwritable_log_file_exits_one() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_jobs(
    dir.path(),
    r#"[{"tag":"ok","command":"exit 0","shell":"/bin/sh","dir":"","env":[]}]"#,
  );
  let log = dir.path().join("missing").join("jobs.log");

  let output = fast_jobs(
    dir.path(),
    &["--run", "--file", &file, "--logfile", &log.display().to_string()],
  );
  assert_eq!(output.status.code(), Some(1));
}
