//! revid command - Decode and encode revision ids

use super::print_json;
use crate::cli::Context;
use crate::core::types::{BranchPath, ForeignRevision, RepositoryUuid, RevisionId};
use crate::mapping::MappingRegistry;
use anyhow::{Context as _, Result};
use serde_json::json;

/// Decode a revision id with whichever scheme produced it.
pub fn parse(ctx: &Context, revid: &str) -> Result<()> {
    let revid = RevisionId::new(revid)?;
    let registry = MappingRegistry::default();
    let (foreign, scheme) = registry
        .parse_revision_id(&revid)
        .with_context(|| format!("'{revid}' is not a generated revision id"))?;
    if ctx.json {
        return print_json(&json!({
            "mapping": scheme.name(),
            "uuid": foreign.uuid,
            "branch": foreign.branch_path,
            "revnum": foreign.revnum,
        }));
    }
    println!("Mapping: {}", scheme.name());
    println!("UUID: {}", foreign.uuid);
    println!("Branch: {}", display_branch(&foreign.branch_path));
    println!("Revision: {}", foreign.revnum);
    Ok(())
}

/// Encode a foreign revision with a named scheme.
pub fn format(ctx: &Context, uuid: &str, branch: &str, revnum: u64, mapping: &str) -> Result<()> {
    let foreign = ForeignRevision::new(RepositoryUuid::new(uuid)?, BranchPath::new(branch)?, revnum);
    let scheme = MappingRegistry::default().get(mapping)?;
    let revid = scheme.revision_id_foreign_to_target(&foreign);
    if ctx.json {
        return print_json(&json!({ "mapping": scheme.name(), "revid": revid }));
    }
    println!("{revid}");
    Ok(())
}

fn display_branch(branch: &BranchPath) -> String {
    if branch.is_root() {
        "(root)".to_string()
    } else {
        branch.to_string()
    }
}
