//! cache command - Show history cache contents

use std::path::{Path, PathBuf};

use super::print_json;
use crate::cli::Context;
use crate::core::config::Config;
use crate::core::types::{RepositoryUuid, RevNum};
use crate::history::HistoryCache;
use anyhow::{bail, Result};
use serde_json::json;

fn resolve(uuid: Option<&str>, db: Option<&Path>) -> Result<PathBuf> {
    if let Some(db) = db {
        return Ok(db.to_path_buf());
    }
    let Some(uuid) = uuid else {
        bail!("either --uuid or --db is required");
    };
    let uuid = RepositoryUuid::new(uuid)?;
    let loaded = Config::load(Some(&uuid))?;
    for warning in &loaded.warnings {
        tracing::warn!(path = %warning.path.display(), "{}", warning.message);
    }
    Ok(loaded.config.paths()?.cache_db_path(&uuid))
}

pub fn show(ctx: &Context, uuid: Option<&str>, db: Option<&Path>, from: RevNum, to: Option<RevNum>) -> Result<()> {
    let path = resolve(uuid, db)?;
    if !path.exists() {
        bail!("no history cache at {}", path.display());
    }
    let (watermark, rows) = HistoryCache::inspect(&path, from, to.unwrap_or(RevNum::MAX))?;

    if ctx.json {
        let rows: Vec<_> = rows
            .iter()
            .map(|r| {
                json!({
                    "revnum": r.revnum,
                    "path": r.path,
                    "action": r.change.action,
                    "copyfrom": r.change.copyfrom,
                })
            })
            .collect();
        return print_json(&json!({ "watermark": watermark, "rows": rows }));
    }

    println!("Cache: {}", path.display());
    println!("Watermark: {watermark}");
    for row in &rows {
        let path = if row.path.is_empty() { "/" } else { row.path.as_str() };
        match &row.change.copyfrom {
            Some(from) => println!("r{} {} {path} (from {from})", row.revnum, row.change.action.as_char()),
            None => println!("r{} {} {path}", row.revnum, row.change.action.as_char()),
        }
    }
    Ok(())
}
