//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each handler validates its arguments, calls into the library, and formats
//! the result as text or, with `--json`, as one JSON document on stdout.

mod cache;
mod classify;
mod delta;
mod revid;

pub use cache::show as cache_show;
pub use classify::classify;
pub use delta::{dump as delta_dump, encode as delta_encode};
pub use revid::{format as revid_format, parse as revid_parse};

use super::args::{CacheAction, Command, DeltaAction, RevidAction};
use super::Context;
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Revid { action } => match action {
            RevidAction::Parse { revid } => revid::parse(ctx, &revid),
            RevidAction::Format {
                uuid,
                branch,
                revnum,
                mapping,
            } => revid::format(ctx, &uuid, &branch, revnum, &mapping),
        },
        Command::Classify { layout, paths } => classify::classify(ctx, layout.as_deref(), &paths),
        Command::Delta { action } => match action {
            DeltaAction::Dump(args) => delta::dump(ctx, &args),
            DeltaAction::Encode {
                input,
                source,
                output,
            } => delta::encode(ctx, &input, source.as_deref(), &output),
        },
        Command::Cache { action } => match action {
            CacheAction::Show { uuid, db, from, to } => {
                cache::show(ctx, uuid.as_deref(), db.as_deref(), from, to)
            }
        },
    }
}

/// Print a JSON value on stdout.
fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
