mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Diagnostics filter, EnvFilter syntax (e.g. `FAST_JOBS_LOG=debug`).
const LOG_ENV: &str = "FAST_JOBS_LOG";

fn init_tracing() {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

#[tokio::main]
async fn main() {
  init_tracing();
  let args = cli::Cli::parse();

  match cli::run(args).await {
    Ok(code) => std::process::exit(code),
    Err(e) => {
      eprintln!("Error: {:#}", e);
      std::process::exit(1);
    }
  }
}
