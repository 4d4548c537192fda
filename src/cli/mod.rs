//! cli
//!
//! Debug command-line interface for svnbridge.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Delegate to command handlers
//!
//! The CLI never talks to a live repository. It exposes the pure pieces of
//! the bridge (revision ids, layouts, the delta codec, the history cache) for
//! inspection.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "SVNBRIDGE_LOG";

/// Options shared by all handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    /// Print JSON instead of text.
    pub json: bool,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    let ctx = Context { json: cli.json };
    commands::dispatch(cli.command, &ctx)
}

/// Log to stderr, filtered by `SVNBRIDGE_LOG` (default `warn`).
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A second install (tests calling run twice) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
