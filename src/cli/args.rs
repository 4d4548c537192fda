//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! - `--verbose` / `-v`: Debug logging (overrides `SVNBRIDGE_LOG`)
//! - `--json`: Machine-readable output where a command supports it

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// svnbridge - inspect the pieces of the Subversion bridge
#[derive(Parser, Debug)]
#[command(name = "svnbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse or generate revision ids
    Revid {
        #[command(subcommand)]
        action: RevidAction,
    },

    /// Show how a layout classifies repository paths
    Classify {
        /// Layout name (root, trunk, trunkN, itrunkN); guessed from the paths if omitted
        #[arg(long, short)]
        layout: Option<String>,

        /// Repository-root-relative paths
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Inspect svndiff streams
    Delta {
        #[command(subcommand)]
        action: DeltaAction,
    },

    /// Inspect the history cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Revision id subcommands.
#[derive(Subcommand, Debug)]
pub enum RevidAction {
    /// Decode a revision id into repository, branch and revision
    Parse {
        /// The revision id
        revid: String,
    },

    /// Encode a foreign revision as a revision id
    Format {
        /// Repository UUID
        #[arg(long)]
        uuid: String,

        /// Branch path, empty for the repository root
        #[arg(long, default_value = "")]
        branch: String,

        /// Source revision number
        #[arg(long)]
        revnum: u64,

        /// Mapping scheme (v1, v2, v3[-scheme], v4)
        #[arg(long, default_value = "v4")]
        mapping: String,
    },
}

/// Delta subcommands.
#[derive(Subcommand, Debug)]
pub enum DeltaAction {
    /// List the windows of an svndiff stream
    Dump(DeltaDumpArgs),

    /// Encode a file as an svndiff stream
    Encode {
        /// Target text
        input: PathBuf,

        /// Source text the stream applies to (empty if omitted)
        #[arg(long)]
        source: Option<PathBuf>,

        /// Output file
        #[arg(long, short)]
        output: PathBuf,
    },
}

/// Arguments for `delta dump`.
#[derive(Args, Debug)]
pub struct DeltaDumpArgs {
    /// File holding the svndiff stream
    pub input: PathBuf,

    /// Source text to apply the stream to
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Write the reconstructed text here (requires applying the stream)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show stored changed paths
    Show {
        /// Repository UUID (resolved under the configured cache directory)
        #[arg(long, conflicts_with = "db", required_unless_present = "db")]
        uuid: Option<String>,

        /// Explicit cache database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// First revision to show
        #[arg(long, default_value_t = 0)]
        from: u64,

        /// Last revision to show (defaults to the watermark)
        #[arg(long)]
        to: Option<u64>,
    },
}
