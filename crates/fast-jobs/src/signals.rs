//! Termination signals that interrupt a run.
//!
//! On unix SIGINT, SIGTERM and SIGQUIT are handled. Elsewhere only Ctrl-C is.

use std::fmt;

/// The signal that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
  Interrupt,
  Terminate,
  Quit,
}

impl fmt::Display for Signal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Signal::Interrupt => write!(f, "SIGINT"),
      Signal::Terminate => write!(f, "SIGTERM"),
      Signal::Quit => write!(f, "SIGQUIT"),
    }
  }
}

/// Handlers registered up front, so a signal that arrives before
/// [`ShutdownSignals::recv`] is polled is not lost.
#[cfg(unix)]
#[derive(Debug)]
pub struct ShutdownSignals {
  interrupt: tokio::signal::unix::Signal,
  terminate: tokio::signal::unix::Signal,
  quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
  pub fn new() -> std::io::Result<Self> {
    use tokio::signal::unix::{SignalKind, signal};

    Ok(Self {
      interrupt: signal(SignalKind::interrupt())?,
      terminate: signal(SignalKind::terminate())?,
      quit: signal(SignalKind::quit())?,
    })
  }

  /// Completes with the first termination signal received.
  pub async fn recv(&mut self) -> Signal {
    tokio::select! {
      _ = self.interrupt.recv() => Signal::Interrupt,
      _ = self.terminate.recv() => Signal::Terminate,
      _ = self.quit.recv() => Signal::Quit,
    }
  }
}

#[cfg(not(unix))]
#[derive(Debug)]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
  pub fn new() -> std::io::Result<Self> {
    Ok(Self)
  }

  pub async fn recv(&mut self) -> Signal {
    if let Err(error) = tokio::signal::ctrl_c().await {
      tracing::error!(%error, "cannot listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
    Signal::Interrupt
  }
}

/// Registers the handlers and completes when the process receives a
/// termination signal.
///
/// Returns `Err` if the handlers cannot be registered.
pub async fn wait_for_shutdown_signal() -> std::io::Result<Signal> {
  let mut signals = ShutdownSignals::new()?;
  Ok(signals.recv().await)
}
