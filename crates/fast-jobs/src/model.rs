use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Highest exit code reported by any job of a run.
///
/// Shared by every runner; updates are a lock-free max so concurrent
/// reports never lose the larger value.
#[derive(Debug, Clone, Default)]
pub struct HighestExitCode(Arc<AtomicI32>);

impl HighestExitCode {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self, code: i32) {
    self.0.fetch_max(code, Ordering::AcqRel);
  }

  pub fn get(&self) -> i32 {
    self.0.load(Ordering::Acquire)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
  /// Every job exited on its own.
  Completed,
  /// The cancellation trigger fired first and the remaining jobs were killed.
  Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
  pub outcome: RunOutcome,
  /// Exit code for the whole process.
  pub exit_code: i32,
}

impl RunReport {
  pub fn new(outcome: RunOutcome, highest: i32) -> Self {
    let exit_code = match outcome {
      RunOutcome::Completed => highest,
      RunOutcome::Interrupted => highest.max(1),
    };
    Self { outcome, exit_code }
  }
}
