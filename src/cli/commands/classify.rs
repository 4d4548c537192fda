//! classify command - Show where paths sit in a branch layout

use super::print_json;
use crate::cli::Context;
use crate::layout::{guess_layout, layout_from_name, Classification};
use anyhow::{bail, Result};
use serde_json::json;

pub fn classify(ctx: &Context, layout: Option<&str>, paths: &[String]) -> Result<()> {
    let layout = match layout {
        Some(name) => match layout_from_name(name) {
            Some(layout) => layout,
            None => bail!("unknown layout '{name}'"),
        },
        None => guess_layout(paths.iter().map(String::as_str)),
    };

    let results: Vec<(&String, Classification)> =
        paths.iter().map(|p| (p, layout.classify(p))).collect();

    if ctx.json {
        let entries: Vec<_> = results
            .iter()
            .map(|(path, class)| {
                let kind = match class {
                    Classification::Branch(_) => "branch",
                    Classification::Tag(_) => "tag",
                    Classification::NotABranchPath => "none",
                };
                match class.location() {
                    Some(loc) => json!({
                        "path": path,
                        "kind": kind,
                        "project": loc.project,
                        "root": loc.branch_root,
                        "remainder": loc.remainder,
                    }),
                    None => json!({ "path": path, "kind": kind }),
                }
            })
            .collect();
        return print_json(&json!({ "layout": layout.name(), "paths": entries }));
    }

    println!("Layout: {}", layout.name());
    for (path, class) in &results {
        match class {
            Classification::NotABranchPath => println!("{path}: not a branch path"),
            Classification::Branch(loc) | Classification::Tag(loc) => {
                let kind = if class.is_tag() { "tag" } else { "branch" };
                print!("{path}: {kind} {}", loc.branch_root);
                if !loc.project.is_empty() {
                    print!(" (project {})", loc.project);
                }
                if !loc.remainder.is_empty() {
                    print!(", path {}", loc.remainder);
                }
                println!();
            }
        }
    }
    Ok(())
}
