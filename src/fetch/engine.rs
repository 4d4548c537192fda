//! fetch::engine
//!
//! Copies a branch's history into a target repository, oldest revision
//! first, one write group per revision.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::errors::BridgeError;
use crate::core::types::{BranchPath, RevNum, RevisionId};
use crate::core::Result;
use crate::repository::SourceRepository;
use crate::revmeta::RevisionMetadata;
use crate::target::{Inventory, TargetRepository};
use crate::transport::{Editor, NodeKind, Report};

use super::editor::{EditContext, RevisionBuildEditor};
use super::idmap::determine_fileid_map;

/// What a fetch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Revisions added to the target, oldest first.
    pub fetched: Vec<RevisionId>,
    /// Revisions that carried only metadata and were skipped.
    pub hidden: Vec<RevNum>,
    /// Whether any revision was built from a switch drive.
    pub used_switch: bool,
}

/// Fetches branch history from a source into a target.
pub struct FetchEngine<'a> {
    source: &'a SourceRepository,
    target: &'a dyn TargetRepository,
    use_replay: bool,
}

impl<'a> FetchEngine<'a> {
    pub fn new(source: &'a SourceRepository, target: &'a dyn TargetRepository) -> Self {
        Self {
            source,
            target,
            use_replay: true,
        }
    }

    /// Never try replay; every revision is built from a switch drive.
    pub fn without_replay(mut self) -> Self {
        self.use_replay = false;
        self
    }

    pub fn uses_replay(&self) -> bool {
        self.use_replay
    }

    /// Fetch `branch` up to `revnum` (the head when `None`).
    ///
    /// Returns the revision id of the tip together with the report.
    pub fn fetch_branch(
        &mut self,
        branch: &BranchPath,
        revnum: Option<RevNum>,
    ) -> Result<(RevisionId, FetchReport)> {
        let latest = self.source.latest_revnum()?;
        let revnum = revnum.unwrap_or(latest);
        if revnum > latest {
            return Err(BridgeError::NoSuchRevision { revnum });
        }
        if self.source.connection()?.check_path(branch.as_str(), revnum)? != NodeKind::Dir {
            return Err(BridgeError::PathNotFound {
                path: branch.to_string(),
                revnum,
            });
        }
        let _lock = self.source.lock_branch(branch)?;

        let mut report = FetchReport::default();
        let mut tip = None;
        let mut todo = Vec::new();
        for meta in self
            .source
            .revmeta()
            .iter_reverse_branch_changes(branch, revnum, 0)
        {
            let meta = meta?;
            if meta.is_hidden()? {
                report.hidden.push(meta.revnum);
                continue;
            }
            let revid = meta.get_revision_id()?;
            tip.get_or_insert_with(|| revid.clone());
            if self.target.has_revision(&revid) {
                debug!(%revid, "reached a revision the target already has");
                break;
            }
            todo.push(meta);
        }
        todo.reverse();
        report.hidden.reverse();
        info!(branch = %branch, revnum, count = todo.len(), "fetching revisions");

        let mut previous: Option<(RevisionId, Arc<Inventory>)> = None;
        for meta in todo {
            let fetched = self.fetch_revision(&meta, previous.take(), &mut report)?;
            report.fetched.push(fetched.0.clone());
            previous = Some(fetched);
        }
        Ok((tip.unwrap_or_else(RevisionId::null), report))
    }

    fn fetch_revision(
        &mut self,
        meta: &RevisionMetadata,
        previous: Option<(RevisionId, Arc<Inventory>)>,
        report: &mut FetchReport,
    ) -> Result<(RevisionId, Arc<Inventory>)> {
        let revid = meta.get_revision_id()?;
        let lhs = meta.get_lhs_parent_revmeta()?;
        let parent_revid = lhs.as_ref().map(|p| p.get_revision_id()).transpose()?;
        let parent = match (&parent_revid, previous) {
            (Some(want), Some((have, inv))) if *want == have => inv,
            (Some(want), _) => self.target.get_inventory(want)?,
            (None, _) => Arc::new(Inventory::new()),
        };

        // Hidden revisions between the parent and its history make replay's
        // low-water mark wrong.
        let history = meta.history_parent()?;
        let contiguous = match (&lhs, &history) {
            (Some(l), Some(h)) => l.branch_path == h.branch_path && l.revnum == h.revnum,
            (None, None) => true,
            _ => false,
        };

        let mapping = meta.mapping()?;
        let id_map = determine_fileid_map(
            mapping.as_ref(),
            meta.uuid(),
            meta.revnum,
            &meta.branch_path,
            meta.paths()?,
            &meta.get_fileid_map()?,
        );
        let ctx = EditContext {
            source: self.source,
            target: self.target,
            mapping,
            branch: meta.branch_path.clone(),
            revnum: meta.revnum,
            revision_id: revid.clone(),
            parent: Arc::clone(&parent),
            parent_branch: lhs.as_ref().map(|p| p.branch_path.clone()),
            id_map,
        };
        debug!(%revid, parent = ?parent_revid, contiguous, "building revision");

        self.target.start_write_group()?;
        let stored = self
            .drive(ctx, lhs.as_deref(), contiguous, report)
            .and_then(|inv| {
                let inv = if *parent == inv {
                    Arc::clone(&parent)
                } else {
                    Arc::new(inv)
                };
                self.target.add_revision(meta.get_revision()?, Arc::clone(&inv))?;
                Ok(inv)
            });
        match stored {
            Ok(inv) => {
                self.target.commit_write_group()?;
                Ok((revid, inv))
            }
            Err(err) => {
                if let Err(abort) = self.target.abort_write_group() {
                    warn!(%revid, error = %abort, "could not abort write group");
                }
                Err(err)
            }
        }
    }

    fn drive(
        &mut self,
        ctx: EditContext<'a>,
        lhs: Option<&RevisionMetadata>,
        contiguous: bool,
        report: &mut FetchReport,
    ) -> Result<Inventory> {
        let revnum = ctx.revnum;
        let branch = ctx.branch.clone();
        let mut editor = RevisionBuildEditor::new(ctx.clone());
        if revnum == 0 {
            let root = editor.open_root(None)?;
            editor.close_directory(root)?;
            editor.close_edit()?;
            return editor.into_inventory();
        }

        let mut conn = self.source.connection_at(branch.as_str())?;
        if self.use_replay && contiguous {
            let low_water_mark = lhs.map_or(revnum, |p| p.revnum);
            match conn.replay(revnum, low_water_mark, true, &mut editor) {
                Ok(()) => return editor.into_inventory(),
                Err(err) if err.is_unsupported() => {
                    info!(revnum, "server cannot replay, using switch from now on");
                    self.use_replay = false;
                    editor = RevisionBuildEditor::new(ctx);
                }
                Err(err) => {
                    conn.discard();
                    return Err(err);
                }
            }
        }

        let mut state = Report::new();
        match lhs {
            Some(p) => state.link_path("", p.branch_path.as_str(), p.revnum),
            None => state.set_path("", 0, true),
        };
        report.used_switch = true;
        if let Err(err) = conn.do_switch(&state, branch.as_str(), revnum, &mut editor) {
            conn.discard();
            return Err(err);
        }
        editor.into_inventory()
    }
}
