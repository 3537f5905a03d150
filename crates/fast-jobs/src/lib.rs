//! Parallel shell job runner.
//!
//! A [`JobSet`] is started all at once by a [`Supervisor`]; every job runs as
//! `shell -c command`, its stdout and stderr lines are logged under the job's
//! tag through a [`LogSink`], and the highest exit code becomes the exit code
//! of the run.

pub mod config;
pub mod error;
pub mod job;
pub mod jobset;
pub mod log;
pub mod model;
pub mod replay;
pub mod runner;
pub mod signals;
pub mod supervisor;

pub use config::{Config, ConfigSource};
pub use error::{AppError, Result};
pub use job::{JobOutcome, JobSpec, JobState, JobStatus};
pub use jobset::{Dispatch, JobSet};
pub use log::{Level, LogEntry, LogSink};
pub use model::{HighestExitCode, RunOutcome, RunReport};
pub use replay::Filter;
pub use signals::{ShutdownSignals, Signal, wait_for_shutdown_signal};
pub use supervisor::Supervisor;
