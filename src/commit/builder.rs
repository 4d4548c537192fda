//! commit::builder
//!
//! Writes one target revision into the source as a single atomic commit.
//!
//! # Branch root
//!
//! The branch root is reused when the base is the branch's newest state,
//! created (as a copy of the base when there is one) when it does not exist,
//! and otherwise replaced by a fresh copy of the base. Replacing requires
//! that the caller accepts rewriting the branch.
//!
//! # Tree walk
//!
//! Each directory gets its deletes first, then its files, then its
//! subdirectories. Entries whose id lives elsewhere in the base become
//! copies of their old location, so renames keep their history.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::errors::BridgeError;
use crate::core::types::{BranchPath, FileId, RevNum, RevisionId};
use crate::core::Result;
use crate::delta::send_stream;
use crate::mapping::props::{format_svn_date, SVN_AUTHOR, SVN_DATE, SVN_EXECUTABLE, SVN_LOG, SVN_SPECIAL};
use crate::mapping::{ExportedProps, MappingScheme, RevisionExport};
use crate::repository::SourceRepository;
use crate::revmeta::RevisionMetadata;
use crate::target::{EntryKind, Inventory, InventoryEntry, Revision, TargetRepository, TextSource};
use crate::transport::{Capability, CommitInfo, CopyFrom, DirectoryBaton, Editor, FileBaton, NodeKind, PropMap};

use super::identity::{determine_texts_identity, TextsIdentity};

/// The source state a commit builds on.
#[derive(Debug, Clone)]
pub struct CommitBase {
    pub branch: BranchPath,
    pub revnum: RevNum,
    pub mapping: Arc<dyn MappingScheme>,
    pub revision_id: RevisionId,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub revision_id: RevisionId,
    pub revnum: RevNum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RootAction {
    Reuse,
    Create(Option<CopyFrom>),
    Replace(Option<CopyFrom>),
}

/// Builds a commit of a new tree on top of a base revision.
pub struct CommitBuilder<'a> {
    source: &'a SourceRepository,
    branch: BranchPath,
    parent_ids: Vec<RevisionId>,
    base: Option<CommitBase>,
    mapping: Arc<dyn MappingScheme>,
    committer: Option<String>,
    timestamp: Option<f64>,
    timezone: i32,
    properties: BTreeMap<String, String>,
    revision_id: Option<RevisionId>,
    append_revisions_only: bool,
}

impl<'a> CommitBuilder<'a> {
    /// Resolve the base from the first of `parent_ids`.
    ///
    /// # Errors
    ///
    /// `RevisionIdNotFound` if the left-hand parent is not in the source.
    pub fn new(source: &'a SourceRepository, branch: BranchPath, parent_ids: Vec<RevisionId>) -> Result<Self> {
        let base = match parent_ids.first().filter(|p| !p.is_null()) {
            Some(lhs) => {
                let (path, revnum, mapping) = source.lookup_revision_id(lhs)?;
                Some(CommitBase {
                    branch: path,
                    revnum,
                    mapping,
                    revision_id: lhs.clone(),
                })
            }
            None => None,
        };
        Ok(Self {
            source,
            branch,
            parent_ids,
            base,
            mapping: source.default_mapping(),
            committer: None,
            timestamp: None,
            timezone: 0,
            properties: BTreeMap::new(),
            revision_id: None,
            append_revisions_only: source.config().append_revisions_only(),
        })
    }

    pub fn base(&self) -> Option<&CommitBase> {
        self.base.as_ref()
    }

    pub fn committer(mut self, committer: impl Into<String>) -> Self {
        self.committer = Some(committer.into());
        self
    }

    pub fn timestamp(mut self, timestamp: f64, timezone: i32) -> Self {
        self.timestamp = Some(timestamp);
        self.timezone = timezone;
        self
    }

    pub fn properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Record `revid` as the new revision's id.
    pub fn revision_id(mut self, revid: RevisionId) -> Self {
        self.revision_id = Some(revid);
        self
    }

    pub fn append_revisions_only(mut self, enabled: bool) -> Self {
        self.append_revisions_only = enabled;
        self
    }

    fn base_meta(&self) -> Option<Arc<RevisionMetadata>> {
        self.base
            .as_ref()
            .map(|b| self.source.revision_metadata(&b.branch, b.revnum))
    }

    /// Revno of the new revision: one past the base's.
    fn revno(&self) -> Result<u64> {
        let mut steps = 1;
        let mut current = self.base_meta();
        while let Some(meta) = current {
            if let Some(revno) = meta.get_revno()? {
                return Ok(revno + steps);
            }
            steps += 1;
            current = meta.get_lhs_parent_revmeta()?;
        }
        Ok(steps)
    }

    fn export(&self, message: &str, identity: &TextsIdentity, use_revprops: bool) -> Result<ExportedProps> {
        let base_fileprops = match &self.base {
            Some(b) => self.source.branch_fileprops(b.branch.as_str(), b.revnum)?,
            None => PropMap::new(),
        };
        let mut exported = if use_revprops {
            ExportedProps::revprops(base_fileprops)
        } else {
            ExportedProps::fileprops(base_fileprops)
        };
        let export = RevisionExport {
            branch_root: &self.branch,
            timestamp: self.timestamp,
            timezone: self.timezone,
            committer: self.committer.as_deref(),
            properties: &self.properties,
            revision_id: self.revision_id.as_ref(),
            revno: self.revno()?,
            parent_ids: &self.parent_ids,
        };
        self.mapping.export_revision(&export, &mut exported)?;
        self.mapping.export_fileid_map(&identity.fileids, &mut exported)?;
        self.mapping
            .export_text_parents(&identity.text_parents, &mut exported)?;
        self.mapping.export_message(message, &mut exported)?;
        Ok(exported)
    }

    fn root_action(&self, exists: bool) -> Result<RootAction> {
        let copy = self
            .base
            .as_ref()
            .map(|b| CopyFrom::new(b.branch.as_str(), b.revnum));
        if !exists {
            return Ok(RootAction::Create(copy));
        }
        if let Some(base) = &self.base {
            if base.branch == self.branch {
                let latest = self.source.latest_revnum()?;
                let changed = self
                    .source
                    .walker()
                    .find_latest_change(self.branch.as_str(), latest)?;
                if changed.map_or(true, |c| base.revnum >= c) {
                    return Ok(RootAction::Reuse);
                }
            }
        }
        if self.branch.is_root() {
            return Err(BridgeError::unsupported("replacing the repository root"));
        }
        if self.append_revisions_only {
            return Err(BridgeError::OutOfDate {
                path: self.branch.to_string(),
                base_revnum: self.base.as_ref().map_or(0, |b| b.revnum),
            });
        }
        Ok(RootAction::Replace(copy))
    }

    /// Commit `new` (with texts from `texts`) on top of `base`.
    pub fn commit<T: TextSource + ?Sized>(
        self,
        message: &str,
        base: &Inventory,
        new: &Inventory,
        texts: &T,
    ) -> Result<Committed> {
        let _lock = self.source.lock_branch(&self.branch)?;
        let identity = determine_texts_identity(
            new,
            base,
            self.base.as_ref().map(|b| &b.revision_id),
        );
        let mut conn = self.source.connection()?;
        let use_revprops = self.mapping.supports_custom_revprops()
            && conn.has_capability(Capability::CommitRevprops)?;
        if !use_revprops && !self.mapping.supports_custom_fileprops() {
            return Err(BridgeError::unsupported(format!(
                "mapping {} cannot store metadata on this server",
                self.mapping.name()
            )));
        }
        let exported = self.export(message, &identity, use_revprops)?;

        let latest = self.source.latest_revnum()?;
        let mut prefix: Vec<&str> = self.branch.components().collect();
        prefix.pop();
        let mut parent_path = String::new();
        let mut parents = Vec::new();
        for component in prefix {
            parent_path = join(&parent_path, component);
            if conn.check_path(&parent_path, latest)? != NodeKind::Dir {
                return Err(BridgeError::MissingPrefix { path: parent_path });
            }
            parents.push(parent_path.clone());
        }
        let exists = conn.check_path(self.branch.as_str(), latest)? == NodeKind::Dir;
        let action = self.root_action(exists)?;
        debug!(branch = %self.branch, ?action, modified = identity.modified.len(), "committing");

        let mut revprops = PropMap::new();
        revprops.insert(SVN_LOG.to_string(), message.to_string());
        if use_revprops {
            revprops.extend(exported.revprops.clone());
        }
        let info: Arc<Mutex<Option<CommitInfo>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&info);
        {
            let mut editor = conn.get_commit_editor(
                revprops,
                Box::new(move |committed: &CommitInfo| *slot.lock() = Some(committed.clone())),
            )?;
            let mut writer = TreeWriter {
                editor: &mut *editor,
                new,
                base,
                texts,
                identity: &identity,
                base_location: self.base.as_ref().map(|b| (b.branch.clone(), b.revnum)),
                branch: &self.branch,
            };
            if let Err(err) = writer.write(&parents, &action, &exported.fileprops) {
                if let Err(abort) = editor.abort_edit() {
                    warn!(error = %abort, "abort after failed commit also failed");
                }
                return Err(err);
            }
        }
        let revnum = info
            .lock()
            .as_ref()
            .map(|i| i.revnum)
            .ok_or_else(|| BridgeError::protocol("commit finished without reporting a revision"))?;
        self.source.invalidate_cache();

        let overrides = self.source.config().override_svn_revprops();
        let wanted = |name: &str| !use_revprops || overrides.iter().any(|o| o == name);
        if (wanted(SVN_AUTHOR) || wanted(SVN_DATE)) && conn.has_capability(Capability::RevpropChanges)? {
            if let Some(committer) = self.committer.as_deref().filter(|_| wanted(SVN_AUTHOR)) {
                conn.change_rev_prop(revnum, SVN_AUTHOR, Some(committer))?;
            }
            if let Some(timestamp) = self.timestamp.filter(|_| wanted(SVN_DATE)) {
                conn.change_rev_prop(revnum, SVN_DATE, Some(&format_svn_date(timestamp)))?;
            }
        }
        let revision_id = match self.revision_id {
            Some(revid) => revid,
            None => self.source.generate_revision_id(&self.branch, revnum)?,
        };
        info!(%revision_id, revnum, branch = %self.branch, "committed");
        Ok(Committed { revision_id, revnum })
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Sends a tree to a commit editor.
struct TreeWriter<'w, E: Editor + ?Sized, T: TextSource + ?Sized> {
    editor: &'w mut E,
    new: &'w Inventory,
    base: &'w Inventory,
    texts: &'w T,
    identity: &'w TextsIdentity,
    base_location: Option<(BranchPath, RevNum)>,
    branch: &'w BranchPath,
}

impl<E: Editor + ?Sized, T: TextSource + ?Sized> TreeWriter<'_, E, T> {
    fn write(&mut self, parents: &[String], action: &RootAction, fileprops: &PropMap) -> Result<()> {
        let root = self.editor.open_root(None)?;
        let mut batons = vec![root];
        for path in parents {
            let parent = batons[batons.len() - 1];
            batons.push(self.editor.open_directory(path, parent, None)?);
        }
        let parent = batons[batons.len() - 1];
        let branch = self.branch.as_str();
        let (baton, old_root) = match action {
            RootAction::Reuse if self.branch.is_root() => (root, self.base.root_id().cloned()),
            RootAction::Reuse => (
                self.editor
                    .open_directory(branch, parent, self.base_location.as_ref().map(|b| b.1))?,
                self.base.root_id().cloned(),
            ),
            RootAction::Create(copy) | RootAction::Replace(copy) => {
                if matches!(action, RootAction::Replace(_)) {
                    self.editor.delete_entry(branch, None, parent)?;
                }
                let old_root = copy.as_ref().and(self.base.root_id().cloned());
                (self.editor.add_directory(branch, parent, copy.as_ref())?, old_root)
            }
        };
        if !self.branch.is_root() {
            batons.push(baton);
        }
        let new_root = self
            .new
            .root_id()
            .cloned()
            .ok_or_else(|| BridgeError::protocol("committed tree has no root"))?;
        self.process_dir(baton, &new_root, "", old_root.as_ref())?;
        for (name, value) in fileprops {
            let value = (!value.is_empty()).then_some(value.as_str());
            self.editor.change_dir_prop(baton, name, value)?;
        }
        while let Some(baton) = batons.pop() {
            self.editor.close_directory(baton)?;
        }
        self.editor.close_edit()
    }

    fn repo_path(&self, rel: &str) -> String {
        join(self.branch.as_str(), rel)
    }

    fn base_revnum(&self) -> Option<RevNum> {
        self.base_location.as_ref().map(|b| b.1)
    }

    /// Copy source for an id that lives at another path in the base.
    fn copy_source(&self, id: &FileId) -> Option<CopyFrom> {
        let (branch, revnum) = self.base_location.as_ref()?;
        let old = self.base.id2path(id)?;
        Some(CopyFrom::new(join(branch.as_str(), &old), *revnum))
    }

    fn process_dir(
        &mut self,
        baton: DirectoryBaton,
        new_dir: &FileId,
        rel: &str,
        old_dir: Option<&FileId>,
    ) -> Result<()> {
        let (new_inv, base_inv) = (self.new, self.base);
        let base_revnum = self.base_revnum();
        if let Some(old_dir) = old_dir {
            let gone: Vec<String> = self
                .base
                .children(old_dir)
                .filter(|(name, id)| new_inv.child(new_dir, name) != Some(*id))
                .map(|(name, _)| name.to_string())
                .collect();
            for name in gone {
                let path = self.repo_path(&join(rel, &name));
                self.editor.delete_entry(&path, base_revnum, baton)?;
            }
        }

        let (dirs, files): (Vec<_>, Vec<_>) = new_inv
            .children(new_dir)
            .filter_map(|(name, id)| Some((name, new_inv.get(id)?)))
            .partition(|(_, entry)| entry.kind == EntryKind::Directory);

        for (name, entry) in files {
            let id = &entry.file_id;
            let path = self.repo_path(&join(rel, name));
            let in_place = old_dir.and_then(|d| base_inv.child(d, name)) == Some(id);
            let copy = if in_place { None } else { self.copy_source(id) };
            let file = if in_place {
                if !self.identity.modified.contains(id) {
                    continue;
                }
                self.editor.open_file(&path, baton, base_revnum)?
            } else {
                self.editor.add_file(&path, baton, copy.as_ref())?
            };
            let old = if in_place || copy.is_some() {
                base_inv.get(id)
            } else {
                None
            };
            self.send_file(file, entry, old)?;
        }

        for (name, entry) in dirs {
            let id = &entry.file_id;
            let child_rel = join(rel, name);
            let path = self.repo_path(&child_rel);
            let in_place = old_dir.and_then(|d| base_inv.child(d, name)) == Some(id);
            let (child, old) = if in_place {
                if !self.identity.visited.contains(&child_rel) {
                    continue;
                }
                (self.editor.open_directory(&path, baton, base_revnum)?, Some(id))
            } else {
                match self.copy_source(id) {
                    Some(from) => (self.editor.add_directory(&path, baton, Some(&from))?, Some(id)),
                    None => (self.editor.add_directory(&path, baton, None)?, None),
                }
            };
            self.process_dir(child, id, &child_rel, old)?;
            self.editor.close_directory(child)?;
        }
        Ok(())
    }

    fn send_file(&mut self, file: FileBaton, new: &InventoryEntry, old: Option<&InventoryEntry>) -> Result<()> {
        let old_exec = old.is_some_and(|o| o.executable);
        if new.executable != old_exec {
            self.editor
                .change_file_prop(file, SVN_EXECUTABLE, new.executable.then_some("*"))?;
        }
        let special = new.kind == EntryKind::Symlink;
        let old_special = old.is_some_and(|o| o.kind == EntryKind::Symlink);
        if special != old_special {
            self.editor
                .change_file_prop(file, SVN_SPECIAL, special.then_some("*"))?;
        }
        let text_changed = old.map_or(true, |o| {
            o.kind != new.kind
                || o.text_sha256 != new.text_sha256
                || o.symlink_target != new.symlink_target
        });
        let checksum = if text_changed {
            let text = self.texts.text(new)?;
            self.editor.apply_textdelta(file, None)?;
            let editor = &mut *self.editor;
            Some(send_stream::<_, BridgeError>(text.as_slice(), |w| {
                editor.textdelta_window(file, w)
            })?)
        } else {
            None
        };
        self.editor.close_file(file, checksum.as_deref())
    }
}

/// Commit target revision `revid` to `branch` on top of its left-hand parent.
pub fn push_revision(
    source: &SourceRepository,
    branch: &BranchPath,
    target: &dyn TargetRepository,
    revid: &RevisionId,
) -> Result<Committed> {
    let rev = target.get_revision(revid)?;
    commit_target_revision(source, branch, target, &rev, None)
}

fn commit_target_revision(
    source: &SourceRepository,
    branch: &BranchPath,
    target: &dyn TargetRepository,
    rev: &Revision,
    append_revisions_only: Option<bool>,
) -> Result<Committed> {
    let new = target.get_inventory(&rev.revision_id)?;
    let base = match rev.parent_ids.first() {
        Some(parent) => target.get_inventory(parent)?,
        None => Arc::new(Inventory::new()),
    };
    let mut builder = CommitBuilder::new(source, branch.clone(), rev.parent_ids.clone())?
        .timestamp(rev.timestamp, rev.timezone)
        .properties(rev.properties.clone())
        .revision_id(rev.revision_id.clone());
    if !rev.committer.is_empty() {
        builder = builder.committer(rev.committer.clone());
    }
    if let Some(enabled) = append_revisions_only {
        builder = builder.append_revisions_only(enabled);
    }
    builder.commit(&rev.message, &base, &new, target)
}

/// Whether the source already holds `revid`.
fn source_has(source: &SourceRepository, revid: &RevisionId) -> Result<bool> {
    if revid.is_null() {
        return Ok(true);
    }
    match source.lookup_revision_id(revid) {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Left-hand ancestors of `tip` missing from the source, oldest first.
fn missing_lhs(source: &SourceRepository, target: &dyn TargetRepository, tip: &RevisionId) -> Result<Vec<RevisionId>> {
    let mut todo = Vec::new();
    let mut current = tip.clone();
    while !source_has(source, &current)? {
        let rev = target.get_revision(&current)?;
        todo.push(current);
        current = match rev.parent_ids.into_iter().next() {
            Some(parent) => parent,
            None => break,
        };
    }
    todo.reverse();
    Ok(todo)
}

/// Push every revision of `tip`'s left-hand history the source lacks onto
/// `branch`, oldest first.
///
/// With `push_merged_revisions` set, merged lines missing from the source
/// are first pushed to their own branches, named after the revision's
/// `branch-nick` property.
pub fn push_branch(
    source: &SourceRepository,
    branch: &BranchPath,
    target: &dyn TargetRepository,
    tip: &RevisionId,
) -> Result<Vec<Committed>> {
    let todo = missing_lhs(source, target, tip)?;
    info!(branch = %branch, count = todo.len(), "pushing revisions");
    let mut committed = Vec::with_capacity(todo.len());
    for revid in &todo {
        let rev = target.get_revision(revid)?;
        if rev.parent_ids.len() > 1 && source.config().push_merged_revisions() {
            let project = source
                .layout()
                .classify(branch.as_str())
                .location()
                .map(|l| l.project.clone())
                .unwrap_or_default();
            push_merged(source, target, &project, &rev.parent_ids[1..])?;
        }
        committed.push(push_revision(source, branch, target, revid)?);
    }
    Ok(committed)
}

fn push_merged(
    source: &SourceRepository,
    target: &dyn TargetRepository,
    project: &str,
    merged: &[RevisionId],
) -> Result<()> {
    for parent in merged {
        for revid in missing_lhs(source, target, parent)? {
            let rev = target.get_revision(&revid)?;
            let nick = rev
                .properties
                .get("branch-nick")
                .map(|n| n.replace('/', "_"))
                .unwrap_or_else(|| "merged".to_string());
            let path = source.layout().get_branch_path(&nick, project)?;
            if path.is_root() {
                return Err(BridgeError::unsupported(format!(
                    "layout {} has no branch for merged revision {revid}",
                    source.layout().name()
                )));
            }
            debug!(%revid, branch = %path, "pushing merged revision");
            let push = || commit_target_revision(source, &path, target, &rev, Some(false));
            match push() {
                Err(BridgeError::MissingPrefix { .. }) => {
                    create_branch_prefix(source, &path)?;
                    push()?;
                }
                other => {
                    other?;
                }
            }
        }
    }
    Ok(())
}

/// Create the missing parent directories of `path` in one commit.
///
/// Returns the new revision, or `None` when nothing was missing.
pub fn create_branch_prefix(source: &SourceRepository, path: &BranchPath) -> Result<Option<RevNum>> {
    let latest = source.latest_revnum()?;
    let mut conn = source.connection()?;
    let mut components: Vec<&str> = path.components().collect();
    components.pop();

    let mut existing = Vec::new();
    let mut missing = Vec::new();
    let mut current = String::new();
    for component in components {
        current = join(&current, component);
        if missing.is_empty() && conn.check_path(&current, latest)? == NodeKind::Dir {
            existing.push(current.clone());
        } else {
            missing.push(current.clone());
        }
    }
    if missing.is_empty() {
        return Ok(None);
    }

    let info: Arc<Mutex<Option<CommitInfo>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&info);
    let mut revprops = PropMap::new();
    revprops.insert(SVN_LOG.to_string(), format!("Create {}", missing.join(", ")));
    {
        let mut editor = conn.get_commit_editor(
            revprops,
            Box::new(move |committed: &CommitInfo| *slot.lock() = Some(committed.clone())),
        )?;
        let result = (|| -> Result<()> {
            let mut batons = vec![editor.open_root(None)?];
            for dir in &existing {
                let parent = batons[batons.len() - 1];
                batons.push(editor.open_directory(dir, parent, None)?);
            }
            for dir in &missing {
                let parent = batons[batons.len() - 1];
                batons.push(editor.add_directory(dir, parent, None)?);
            }
            while let Some(baton) = batons.pop() {
                editor.close_directory(baton)?;
            }
            editor.close_edit()
        })();
        if let Err(err) = result {
            if let Err(abort) = editor.abort_edit() {
                warn!(error = %abort, "abort after failed commit also failed");
            }
            return Err(err);
        }
    }
    source.invalidate_cache();
    let revnum = info.lock().as_ref().map(|i| i.revnum);
    debug!(?missing, ?revnum, "created branch prefix");
    Ok(revnum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CacheSettings, Config, RepoConfig};
    use crate::fetch::FetchEngine;
    use crate::target::MemoryTargetRepository;
    use crate::transport::memory::FailOn;
    use crate::transport::{ChangeAction, MemoryConnector, MemoryRepository};

    struct Setup {
        _dir: tempfile::TempDir,
        repo: MemoryRepository,
        source: SourceRepository,
        target: MemoryTargetRepository,
    }

    fn setup(append_only: bool) -> Setup {
        setup_with(RepoConfig {
            append_revisions_only: Some(append_only),
            ..Default::default()
        })
    }

    fn setup_with(repo_config: RepoConfig) -> Setup {
        let repo = MemoryRepository::new("mem://commit");
        let mut txn = repo.begin("ann", "layout");
        txn.mkdir("trunk").unwrap();
        txn.mkdir("branches").unwrap();
        txn.put_file("trunk/a", b"alpha\n").unwrap();
        txn.commit().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.global.cache_dir = Some(dir.path().to_path_buf());
        config.global.cache = Some(CacheSettings {
            enabled: Some(false),
            ..Default::default()
        });
        config.repo = Some(repo_config);
        let connector = MemoryConnector::new().with_repository(repo.clone());
        let source = SourceRepository::open(Arc::new(connector), "mem://commit", &config).unwrap();
        Setup {
            _dir: dir,
            repo,
            source,
            target: MemoryTargetRepository::new(),
        }
    }

    fn trunk() -> BranchPath {
        BranchPath::new("trunk").unwrap()
    }

    fn fetch(s: &Setup, branch: &BranchPath) -> (RevisionId, Arc<Inventory>) {
        let (tip, _) = FetchEngine::new(&s.source, &s.target)
            .fetch_branch(branch, None)
            .unwrap();
        let inv = s.target.get_inventory(&tip).unwrap();
        (tip, inv)
    }

    /// `base` with top-level file `name` set to `text`.
    fn with_file(s: &Setup, base: &Inventory, name: &str, text: &[u8]) -> Inventory {
        s.target.start_write_group().unwrap();
        let sha = s.target.add_text(text).unwrap();
        s.target.commit_write_group().unwrap();
        let mut inv = base.clone();
        match inv.path2id(name) {
            Some(id) => {
                let entry = inv.get_mut(&id).unwrap();
                entry.text_sha256 = Some(sha);
                entry.text_size = Some(text.len() as u64);
            }
            None => {
                let root = inv.root_id().unwrap().clone();
                let id = FileId::new(format!("{name}-id")).unwrap();
                inv.add(InventoryEntry::file(id, root, name, RevisionId::null(), sha, text.len() as u64))
                    .unwrap();
            }
        }
        inv
    }

    #[test]
    fn commit_then_fetch_keeps_identity() {
        let s = setup(true);
        let (tip, base) = fetch(&s, &trunk());
        let new = with_file(&s, &base, "b", b"bravo\n");
        let custom = RevisionId::new("carol@example.com-1").unwrap();
        let committed = CommitBuilder::new(&s.source, trunk(), vec![tip.clone()])
            .unwrap()
            .committer("carol")
            .timestamp(1234567890.0, 3600)
            .revision_id(custom.clone())
            .commit("add b", &base, &new, &s.target)
            .unwrap();
        assert_eq!(committed.revnum, 2);
        assert_eq!(committed.revision_id, custom);
        assert_eq!(s.repo.cat("trunk/b", 2).unwrap(), b"bravo\n");

        let (fetched, inv) = fetch(&s, &trunk());
        assert_eq!(fetched, custom);
        assert_eq!(inv.path2id("b"), Some(FileId::new("b-id").unwrap()));
        let rev = s.target.get_revision(&custom).unwrap();
        assert_eq!(rev.committer, "carol");
        assert_eq!(rev.parent_ids, vec![tip]);
        assert_eq!(rev.timezone, 3600);
    }

    #[test]
    fn stale_base_is_out_of_date() {
        let s = setup(true);
        let (tip, base) = fetch(&s, &trunk());
        let first = with_file(&s, &base, "b", b"one\n");
        CommitBuilder::new(&s.source, trunk(), vec![tip.clone()])
            .unwrap()
            .commit("first", &base, &first, &s.target)
            .unwrap();
        let second = with_file(&s, &base, "c", b"two\n");
        let err = CommitBuilder::new(&s.source, trunk(), vec![tip])
            .unwrap()
            .commit("second", &base, &second, &s.target)
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::OutOfDate);
        assert_eq!(s.repo.latest_revnum(), 2);
    }

    #[test]
    fn stale_base_replaces_when_rewriting() {
        let s = setup(false);
        let (tip, base) = fetch(&s, &trunk());
        let first = with_file(&s, &base, "b", b"one\n");
        CommitBuilder::new(&s.source, trunk(), vec![tip.clone()])
            .unwrap()
            .commit("first", &base, &first, &s.target)
            .unwrap();
        let second = with_file(&s, &base, "c", b"two\n");
        let committed = CommitBuilder::new(&s.source, trunk(), vec![tip])
            .unwrap()
            .commit("second", &base, &second, &s.target)
            .unwrap();
        let changes = s.repo.changed_paths(committed.revnum).unwrap();
        let root = &changes["trunk"];
        assert_eq!(root.action, ChangeAction::Replace);
        assert_eq!(root.copyfrom, Some(CopyFrom::new("trunk", 1)));
        assert!(s.repo.cat("trunk/b", committed.revnum).is_err());
        assert_eq!(s.repo.cat("trunk/c", committed.revnum).unwrap(), b"two\n");
    }

    #[test]
    fn new_branch_is_a_copy_of_its_base() {
        let s = setup(true);
        let (tip, base) = fetch(&s, &trunk());
        let branch = BranchPath::new("branches/feature").unwrap();
        let new = with_file(&s, &base, "a", b"changed\n");
        let committed = CommitBuilder::new(&s.source, branch.clone(), vec![tip])
            .unwrap()
            .commit("branch", &base, &new, &s.target)
            .unwrap();
        let changes = s.repo.changed_paths(committed.revnum).unwrap();
        assert_eq!(changes["branches/feature"].copyfrom, Some(CopyFrom::new("trunk", 1)));
        assert_eq!(changes["branches/feature/a"].action, ChangeAction::Modify);

        let (_, inv) = fetch(&s, &branch);
        assert_eq!(inv.path2id("a"), base.path2id("a"));
    }

    #[test]
    fn branch_prefix_must_exist() {
        let s = setup(true);
        let (tip, base) = fetch(&s, &trunk());
        let branch = BranchPath::new("proj/branches/x").unwrap();
        let err = CommitBuilder::new(&s.source, branch.clone(), vec![tip.clone()])
            .unwrap()
            .commit("x", &base, &base, &s.target)
            .unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(create_branch_prefix(&s.source, &branch).unwrap(), Some(2));
        assert_eq!(create_branch_prefix(&s.source, &branch).unwrap(), None);
        let committed = CommitBuilder::new(&s.source, branch, vec![tip])
            .unwrap()
            .commit("x", &base, &base, &s.target)
            .unwrap();
        assert_eq!(committed.revnum, 3);
    }

    #[test]
    fn failed_commit_leaves_no_revision() {
        let s = setup(true);
        let (tip, base) = fetch(&s, &trunk());
        let new = with_file(&s, &base, "b", b"bravo\n");
        s.repo.set_fail_on(FailOn::Commit);
        assert!(CommitBuilder::new(&s.source, trunk(), vec![tip])
            .unwrap()
            .commit("add b", &base, &new, &s.target)
            .is_err());
        assert_eq!(s.repo.latest_revnum(), 1);
    }

    #[test]
    fn fileprops_when_revprops_are_refused() {
        let s = setup(true);
        s.repo.set_capability(Capability::CommitRevprops, false);
        let (tip, base) = fetch(&s, &trunk());
        let new = with_file(&s, &base, "b", b"bravo\n");
        let custom = RevisionId::new("dave@example.com-1").unwrap();
        let committed = CommitBuilder::new(&s.source, trunk(), vec![tip])
            .unwrap()
            .committer("dave")
            .timestamp(1234567890.25, 0)
            .revision_id(custom.clone())
            .commit("add b", &base, &new, &s.target)
            .unwrap();
        let revprops = s.repo.revprops(committed.revnum).unwrap();
        assert_eq!(revprops.get(SVN_AUTHOR).map(String::as_str), Some("dave"));
        assert_eq!(
            revprops.get(SVN_DATE).map(String::as_str),
            Some("2009-02-13T23:31:30.250000Z")
        );
        assert!(s
            .source
            .branch_fileprops("trunk", committed.revnum)
            .unwrap()
            .contains_key("bzr:revision-id:v4"));
        let (fetched, _) = fetch(&s, &trunk());
        assert_eq!(fetched, custom);
    }

    #[test]
    fn push_revision_commits_target_revision() {
        let s = setup(true);
        let (tip, base) = fetch(&s, &trunk());
        let new = with_file(&s, &base, "b", b"bravo\n");
        let revid = RevisionId::new("pushed-1").unwrap();
        s.target.start_write_group().unwrap();
        s.target
            .add_revision(
                Revision {
                    revision_id: revid.clone(),
                    parent_ids: vec![tip],
                    committer: "erin".into(),
                    message: "pushed".into(),
                    timestamp: 1234567890.0,
                    ..Default::default()
                },
                Arc::new(new),
            )
            .unwrap();
        s.target.commit_write_group().unwrap();

        let committed = push_revision(&s.source, &trunk(), &s.target, &revid).unwrap();
        assert_eq!(committed.revision_id, revid);
        assert_eq!(s.repo.cat("trunk/b", committed.revnum).unwrap(), b"bravo\n");
        let (found_branch, found_revnum, _) = s.source.lookup_revision_id(&revid).unwrap();
        assert_eq!((found_branch, found_revnum), (trunk(), committed.revnum));
    }

    fn store(s: &Setup, revid: &str, parents: Vec<RevisionId>, inv: Inventory, nick: &str) -> RevisionId {
        let revid = RevisionId::new(revid).unwrap();
        s.target.start_write_group().unwrap();
        s.target
            .add_revision(
                Revision {
                    revision_id: revid.clone(),
                    parent_ids: parents,
                    committer: "frank".into(),
                    message: format!("{revid}"),
                    timestamp: 1234567890.0,
                    properties: BTreeMap::from([("branch-nick".to_string(), nick.to_string())]),
                    ..Default::default()
                },
                Arc::new(inv),
            )
            .unwrap();
        s.target.commit_write_group().unwrap();
        revid
    }

    fn merge_history(s: &Setup) -> (RevisionId, RevisionId) {
        let (tip, base) = fetch(s, &trunk());
        let side = with_file(s, &base, "s", b"side\n");
        let side_id = store(s, "side-1", vec![tip.clone()], side.clone(), "side");
        let merged = with_file(s, &side, "m", b"merge\n");
        let merge_id = store(s, "merge-1", vec![tip, side_id.clone()], merged, "trunk");
        (side_id, merge_id)
    }

    #[test]
    fn push_branch_skips_merged_lines_by_default() {
        let s = setup(true);
        let (_, merge_id) = merge_history(&s);
        let committed = push_branch(&s.source, &trunk(), &s.target, &merge_id).unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].revision_id, merge_id);
        assert_eq!(s.repo.cat("trunk/m", 2).unwrap(), b"merge\n");
        assert!(s.repo.cat("branches/side/s", 2).is_err());
    }

    #[test]
    fn push_branch_pushes_merged_lines_when_enabled() {
        let s = setup_with(RepoConfig {
            push_merged_revisions: Some(true),
            ..Default::default()
        });
        let (side_id, merge_id) = merge_history(&s);
        let committed = push_branch(&s.source, &trunk(), &s.target, &merge_id).unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].revnum, 3);
        assert_eq!(s.repo.cat("branches/side/s", 2).unwrap(), b"side\n");
        let (branch, revnum, _) = s.source.lookup_revision_id(&side_id).unwrap();
        assert_eq!((branch.as_str(), revnum), ("branches/side", 2));

        // Everything is in the source now.
        assert!(push_branch(&s.source, &trunk(), &s.target, &merge_id).unwrap().is_empty());
    }
}
