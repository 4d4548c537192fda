//! revmeta
//!
//! Per-revision metadata, computed on first access.
//!
//! # Overview
//!
//! A [`RevisionMetadata`] describes one branch at one source revision. It
//! answers everything the fetch and lookup code asks about that revision
//! (its revision id, parents, fileid overrides) by combining:
//!
//! - the changed paths below the branch
//! - the revision properties
//! - the branch-root file properties, and their diff against the previous
//!   location of the branch
//!
//! Each input is fetched once and kept in a `OnceCell`. The
//! [`RevmetaProvider`] hands out shared instances per `(branch, revnum)`
//! and drops them all when the latest revision moves.
//!
//! Metadata that violates its grammar is logged and ignored: the revision
//! is then treated as a plain source revision.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::errors::{BridgeError, ErrorKind};
use crate::core::types::{BranchPath, FileId, ForeignRevision, RepositoryUuid, RevNum, RevisionId};
use crate::core::Result;
use crate::history::LogWalker;
use crate::mapping::{import_plain_revision, MappingRegistry, MappingScheme};
use crate::target::Revision;
use crate::transport::{ChangeAction, ChangedPaths, ConnectionPool, PropMap};

/// What every piece of metadata needs to reach the source.
pub struct RevmetaContext {
    pub pool: Arc<ConnectionPool>,
    pub repos_url: String,
    pub uuid: RepositoryUuid,
    pub walker: Arc<dyn LogWalker>,
    pub registry: Arc<MappingRegistry>,
    /// Scheme for revisions that carry no metadata of their own.
    pub default_mapping: Arc<dyn MappingScheme>,
    /// Drop one trailing newline from imported messages.
    pub strip_trailing_newline: bool,
}

/// Properties whose value differs between `old` and `new`.
///
/// Removed properties show up with an empty value.
pub fn diff_props(old: &PropMap, new: &PropMap) -> PropMap {
    let mut changed: PropMap = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for key in old.keys() {
        if !new.contains_key(key) {
            changed.insert(key.clone(), String::new());
        }
    }
    changed
}

/// Downgrade malformed metadata to "absent", keep every other error.
fn tolerate<T>(what: &str, revmeta: &RevisionMetadata, result: Result<T>, fallback: T) -> Result<T> {
    match result {
        Err(e) if e.kind() == ErrorKind::MalformedMetadata => {
            warn!(
                branch = %revmeta.branch_path,
                revnum = revmeta.revnum,
                error = %e,
                "ignoring malformed {what}"
            );
            Ok(fallback)
        }
        other => other,
    }
}

/// One branch at one revision.
pub struct RevisionMetadata {
    ctx: Arc<RevmetaContext>,
    provider: Weak<RevmetaProvider>,
    pub branch_path: BranchPath,
    pub revnum: RevNum,
    paths: OnceCell<ChangedPaths>,
    revprops: OnceCell<PropMap>,
    fileprops: OnceCell<PropMap>,
    previous_fileprops: OnceCell<PropMap>,
    changed_fileprops: OnceCell<PropMap>,
    mapping: OnceCell<Option<Arc<dyn MappingScheme>>>,
    lhs_parent: OnceCell<Option<Arc<RevisionMetadata>>>,
}

impl std::fmt::Debug for RevisionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionMetadata")
            .field("branch_path", &self.branch_path)
            .field("revnum", &self.revnum)
            .finish_non_exhaustive()
    }
}

impl RevisionMetadata {
    fn new(ctx: Arc<RevmetaContext>, provider: Weak<RevmetaProvider>, branch_path: BranchPath, revnum: RevNum) -> Self {
        Self {
            ctx,
            provider,
            branch_path,
            revnum,
            paths: OnceCell::new(),
            revprops: OnceCell::new(),
            fileprops: OnceCell::new(),
            previous_fileprops: OnceCell::new(),
            changed_fileprops: OnceCell::new(),
            mapping: OnceCell::new(),
            lhs_parent: OnceCell::new(),
        }
    }

    pub fn uuid(&self) -> &RepositoryUuid {
        &self.ctx.uuid
    }

    pub fn foreign(&self) -> ForeignRevision {
        ForeignRevision::new(self.ctx.uuid.clone(), self.branch_path.clone(), self.revnum)
    }

    /// Changes below (or creating) the branch in this revision.
    pub fn paths(&self) -> Result<&ChangedPaths> {
        self.paths.get_or_try_init(|| {
            self.ctx
                .walker
                .revision_paths(self.revnum, Some(self.branch_path.as_str()))
        })
    }

    pub fn revprops(&self) -> Result<&PropMap> {
        self.revprops.get_or_try_init(|| {
            let conn = self.ctx.pool.get(&self.ctx.repos_url)?;
            conn.rev_proplist(self.revnum)
        })
    }

    /// Properties of the branch root at this revision.
    pub fn fileprops(&self) -> Result<&PropMap> {
        self.fileprops.get_or_try_init(|| {
            let conn = self.ctx.pool.get(&self.ctx.repos_url)?;
            match conn.get_dir(self.branch_path.as_str(), self.revnum) {
                Ok(listing) => Ok(listing.props),
                Err(e) if e.is_not_found() => Ok(PropMap::new()),
                Err(e) => Err(e),
            }
        })
    }

    /// Branch-root properties at the previous location of the branch.
    pub fn previous_fileprops(&self) -> Result<&PropMap> {
        self.previous_fileprops.get_or_try_init(|| {
            match self.history_parent()? {
                Some(parent) => parent.fileprops().cloned(),
                None => Ok(PropMap::new()),
            }
        })
    }

    /// Branch-root properties this revision changed.
    pub fn changed_fileprops(&self) -> Result<&PropMap> {
        self.changed_fileprops.get_or_try_init(|| {
            Ok(diff_props(self.previous_fileprops()?, self.fileprops()?))
        })
    }

    /// The scheme that wrote this revision's metadata, if any.
    pub fn original_mapping(&self) -> Result<Option<Arc<dyn MappingScheme>>> {
        self.mapping
            .get_or_try_init(|| {
                let revprops = self.revprops()?;
                let changed = self.changed_fileprops()?;
                Ok(self.ctx.registry.find_mapping(revprops, changed))
            })
            .cloned()
    }

    /// The scheme used to name this revision.
    pub fn mapping(&self) -> Result<Arc<dyn MappingScheme>> {
        Ok(self
            .original_mapping()?
            .unwrap_or_else(|| Arc::clone(&self.ctx.default_mapping)))
    }

    /// Whether the branch root itself was added, replaced or modified.
    pub fn changes_branch_root(&self) -> Result<bool> {
        Ok(self.paths()?.contains_key(self.branch_path.as_str()))
    }

    /// Whether the revision created the branch root from scratch or by copy.
    pub fn creates_branch_root(&self) -> Result<bool> {
        Ok(self
            .paths()?
            .get(self.branch_path.as_str())
            .is_some_and(|c| matches!(c.action, ChangeAction::Add | ChangeAction::Replace)))
    }

    pub fn is_hidden(&self) -> Result<bool> {
        let Some(mapping) = self.original_mapping()? else {
            return Ok(false);
        };
        Ok(mapping.supports_hidden() && mapping.is_hidden(self.revprops()?, self.changed_fileprops()?))
    }

    /// Previous revision of this branch in the source history, following
    /// copies, hidden revisions included.
    pub fn history_parent(&self) -> Result<Option<Arc<RevisionMetadata>>> {
        self.lhs_parent
            .get_or_try_init(|| {
                let walker = &self.ctx.walker;
                let Some((path, revnum)) =
                    walker.previous_location(self.branch_path.as_str(), self.revnum)?
                else {
                    return Ok(None);
                };
                let Some(changed) = walker.find_latest_change(&path, revnum)? else {
                    return Ok(None);
                };
                let branch = BranchPath::new(&path)?;
                Ok(Some(self.lookup(&branch, changed)))
            })
            .cloned()
    }

    fn lookup(&self, branch: &BranchPath, revnum: RevNum) -> Arc<RevisionMetadata> {
        match self.provider.upgrade() {
            Some(provider) => provider.get(branch, revnum),
            None => Arc::new(RevisionMetadata::new(
                Arc::clone(&self.ctx),
                Weak::new(),
                branch.clone(),
                revnum,
            )),
        }
    }

    /// Left-hand parent in the fetched history: the previous visible
    /// revision of the branch.
    pub fn get_lhs_parent_revmeta(&self) -> Result<Option<Arc<RevisionMetadata>>> {
        let mut parent = self.history_parent()?;
        while let Some(candidate) = parent.clone() {
            if !candidate.is_hidden()? {
                break;
            }
            debug!(revnum = candidate.revnum, "skipping hidden revision");
            parent = candidate.history_parent()?;
        }
        Ok(parent)
    }

    /// Revision id, custom if the revision was pushed with one.
    pub fn get_revision_id(&self) -> Result<RevisionId> {
        if let Some(mapping) = self.original_mapping()? {
            let recorded = tolerate(
                "revision id",
                self,
                mapping.get_revision_id(&self.branch_path, self.revprops()?, self.changed_fileprops()?),
                None,
            )?;
            if let Some((_, revid)) = recorded {
                return Ok(revid);
            }
            return Ok(mapping.revision_id_foreign_to_target(&self.foreign()));
        }
        Ok(self.ctx.default_mapping.revision_id_foreign_to_target(&self.foreign()))
    }

    pub fn get_lhs_parent(&self) -> Result<Option<RevisionId>> {
        if let Some(mapping) = self.original_mapping()? {
            let recorded = tolerate(
                "left-hand parent",
                self,
                mapping.get_lhs_parent(&self.branch_path, self.revprops()?, self.changed_fileprops()?),
                None,
            )?;
            if let Some(revid) = recorded {
                return Ok((!revid.is_null()).then_some(revid));
            }
        }
        match self.get_lhs_parent_revmeta()? {
            Some(parent) => parent.get_revision_id().map(Some),
            None => Ok(None),
        }
    }

    pub fn get_rhs_parents(&self) -> Result<Vec<RevisionId>> {
        let Some(mapping) = self.original_mapping()? else {
            return Ok(Vec::new());
        };
        tolerate(
            "merge parents",
            self,
            mapping.get_rhs_parents(&self.branch_path, self.revprops()?, self.changed_fileprops()?),
            Vec::new(),
        )
    }

    /// All parents, left-hand first.
    pub fn get_parent_ids(&self) -> Result<Vec<RevisionId>> {
        let rhs = self.get_rhs_parents()?;
        let mut parents = match self.get_lhs_parent()? {
            Some(lhs) => vec![lhs],
            None if rhs.is_empty() => return Ok(Vec::new()),
            None => vec![RevisionId::null()],
        };
        parents.extend(rhs);
        Ok(parents)
    }

    pub fn get_revision(&self) -> Result<Revision> {
        let mut rev = Revision {
            revision_id: self.get_revision_id()?,
            parent_ids: self.get_parent_ids()?,
            ..Revision::default()
        };
        let revprops = self.revprops()?;
        match self.original_mapping()? {
            Some(mapping) => {
                let imported = mapping.import_revision(
                    revprops,
                    self.changed_fileprops()?,
                    &self.foreign(),
                    &mut rev,
                );
                if !tolerate("revision metadata", self, imported.map(|()| true), false)? {
                    import_plain_revision(revprops, &mut rev)?;
                }
            }
            None => import_plain_revision(revprops, &mut rev)?,
        }
        if self.ctx.strip_trailing_newline && rev.message.ends_with('\n') {
            rev.message.pop();
        }
        Ok(rev)
    }

    /// Explicit file ids, keyed by branch-relative path.
    pub fn get_fileid_map(&self) -> Result<BTreeMap<String, FileId>> {
        let Some(mapping) = self.original_mapping()? else {
            return Ok(BTreeMap::new());
        };
        tolerate(
            "file id map",
            self,
            mapping.import_fileid_map(self.revprops()?, self.changed_fileprops()?),
            BTreeMap::new(),
        )
    }

    pub fn get_text_parents(&self) -> Result<BTreeMap<String, RevisionId>> {
        let Some(mapping) = self.original_mapping()? else {
            return Ok(BTreeMap::new());
        };
        tolerate(
            "text parents",
            self,
            mapping.import_text_parents(self.revprops()?, self.changed_fileprops()?),
            BTreeMap::new(),
        )
    }

    /// Revno recorded with a pushed revision.
    pub fn get_revno(&self) -> Result<Option<u64>> {
        let Some(mapping) = self.original_mapping()? else {
            return Ok(None);
        };
        let recorded = tolerate(
            "revision id",
            self,
            mapping.get_revision_id(&self.branch_path, self.revprops()?, self.changed_fileprops()?),
            None,
        )?;
        Ok(recorded.map(|(revno, _)| revno))
    }
}

/// Shared, memoized [`RevisionMetadata`] instances.
pub struct RevmetaProvider {
    ctx: Arc<RevmetaContext>,
    me: Weak<RevmetaProvider>,
    cache: Mutex<HashMap<(BranchPath, RevNum), Arc<RevisionMetadata>>>,
    latest: Mutex<Option<RevNum>>,
}

impl RevmetaProvider {
    pub fn new(ctx: RevmetaContext) -> Arc<Self> {
        let ctx = Arc::new(ctx);
        Arc::new_cyclic(|me| Self {
            ctx,
            me: me.clone(),
            cache: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &RevmetaContext {
        &self.ctx
    }

    /// Metadata for `branch@revnum`, shared with earlier callers.
    pub fn get(&self, branch: &BranchPath, revnum: RevNum) -> Arc<RevisionMetadata> {
        let key = (branch.clone(), revnum);
        let mut cache = self.cache.lock();
        Arc::clone(cache.entry(key).or_insert_with(|| {
            Arc::new(RevisionMetadata::new(
                Arc::clone(&self.ctx),
                self.me.clone(),
                branch.clone(),
                revnum,
            ))
        }))
    }

    /// Number of memoized instances.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop every memoized instance.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
        *self.latest.lock() = None;
        self.ctx.walker.invalidate();
    }

    /// Invalidate if the latest revision moved since the last check.
    pub fn check_watermark(&self) -> Result<RevNum> {
        self.ctx.walker.invalidate();
        let latest = self.ctx.walker.latest_revnum()?;
        let mut seen = self.latest.lock();
        if seen.is_some_and(|prev| prev != latest) {
            debug!(latest, "latest revision moved; dropping revision metadata");
            self.cache.lock().clear();
        }
        *seen = Some(latest);
        Ok(latest)
    }

    /// Revisions that changed `branch`, newest first, from `from` down to
    /// `to`, following the branch through copies.
    pub fn iter_reverse_branch_changes<'a>(
        &'a self,
        branch: &BranchPath,
        from: RevNum,
        to: RevNum,
    ) -> impl Iterator<Item = Result<Arc<RevisionMetadata>>> + 'a {
        self.ctx
            .walker
            .iterate_changes(branch.as_str(), from)
            .take_while(move |step| step.as_ref().map_or(true, |(_, _, revnum)| *revnum >= to))
            .map(move |step| {
                let (path, _, revnum) = step?;
                let branch = BranchPath::new(&path).map_err(BridgeError::from)?;
                Ok(self.get(&branch, revnum))
            })
    }
}
