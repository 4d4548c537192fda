//! fetch::editor
//!
//! Builds a target snapshot from a tree-delta drive.
//!
//! # Model
//!
//! The editor starts from a copy of the parent snapshot and applies every
//! call to it. Paths are relative to the branch root the drive was started
//! at; copy sources are relative to the repository root.
//!
//! # Identity
//!
//! An added path takes its id from the revision's id map, then from an
//! entry already at that path (a child of a moved directory), and only
//! then a freshly generated one. When the id is still live at another path
//! the drive is renaming a node before deleting its old location: the entry
//! moves, and the later `delete_entry` for the old path is absorbed.
//!
//! # Invariants
//!
//! - An entry's `revision` changes only when its own name, parent, kind,
//!   content or executable bit changed, so replay and switch drives produce
//!   the same snapshot.
//! - Absorbed deletes never overlap, and none is left pending when the root
//!   closes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::errors::BridgeError;
use crate::core::types::{BranchPath, FileId, RevNum, RevisionId};
use crate::core::Result;
use crate::delta::{md5_hex, TxDeltaApplier, Window};
use crate::history::changes::path_is_child;
use crate::mapping::props::{SVN_EXECUTABLE, SVN_SPECIAL};
use crate::mapping::MappingScheme;
use crate::repository::SourceRepository;
use crate::target::{
    sha256_hex, EntryKind, Inventory, InventoryEntry, TargetRepository, TextSource,
};
use crate::transport::editor::{BatonTracker, DirectoryBaton, Editor, FileBaton};
use crate::transport::{CopyFrom, NodeKind, PropMap};

use super::idmap::branch_relative;

/// Everything the editor needs to know about the revision it builds.
#[derive(Clone)]
pub struct EditContext<'a> {
    pub source: &'a SourceRepository,
    pub target: &'a dyn TargetRepository,
    pub mapping: Arc<dyn MappingScheme>,
    pub branch: BranchPath,
    pub revnum: RevNum,
    pub revision_id: RevisionId,
    /// Snapshot of the left-hand parent.
    pub parent: Arc<Inventory>,
    /// Branch path the parent snapshot was taken at.
    pub parent_branch: Option<BranchPath>,
    /// Ids for created paths, keyed by branch-relative path.
    pub id_map: BTreeMap<String, FileId>,
}

struct OpenDir {
    path: String,
    file_id: FileId,
    /// Names re-added below a reused directory; the rest are stale.
    listed: Option<BTreeSet<String>>,
}

struct OpenFile {
    baton: FileBaton,
    path: String,
    file_id: FileId,
    base: Vec<u8>,
    applier: Option<TxDeltaApplier>,
    executable: bool,
    special: bool,
}

enum EditState {
    Open,
    Done(Inventory),
    Aborted,
}

/// Applies one revision's tree delta to its parent snapshot.
pub struct RevisionBuildEditor<'a> {
    ctx: EditContext<'a>,
    inv: Inventory,
    tracker: BatonTracker,
    dirs: HashMap<DirectoryBaton, OpenDir>,
    file: Option<OpenFile>,
    /// Old path of each entry moved before its delete arrived.
    premature: BTreeMap<String, FileId>,
    /// Entries moved off an id another path claimed, keyed by their
    /// temporary id. Each must be claimed back before the root closes.
    parked: BTreeMap<FileId, FileId>,
    branch_props: BTreeMap<String, Option<String>>,
    state: EditState,
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl<'a> RevisionBuildEditor<'a> {
    pub fn new(ctx: EditContext<'a>) -> Self {
        let inv = (*ctx.parent).clone();
        Self {
            ctx,
            inv,
            tracker: BatonTracker::new(),
            dirs: HashMap::new(),
            file: None,
            premature: BTreeMap::new(),
            parked: BTreeMap::new(),
            branch_props: BTreeMap::new(),
            state: EditState::Open,
        }
    }

    /// Branch-root property changes seen during the drive.
    pub fn branch_fileprops(&self) -> &BTreeMap<String, Option<String>> {
        &self.branch_props
    }

    /// The finished snapshot.
    pub fn into_inventory(self) -> Result<Inventory> {
        match self.state {
            EditState::Done(inv) => Ok(inv),
            EditState::Open => Err(BridgeError::protocol("edit was never closed")),
            EditState::Aborted => Err(BridgeError::protocol("edit was aborted")),
        }
    }

    fn generated_id(&self, rel: &str) -> FileId {
        self.ctx
            .mapping
            .generate_file_id(self.ctx.source.uuid(), self.ctx.revnum, &self.ctx.branch, rel)
    }

    fn dir(&self, baton: DirectoryBaton) -> Result<&OpenDir> {
        self.dirs
            .get(&baton)
            .ok_or_else(|| BridgeError::protocol(format!("unknown {baton}")))
    }

    fn open_file_mut(&mut self, baton: FileBaton) -> Result<&mut OpenFile> {
        self.tracker.check_file(baton)?;
        self.file
            .as_mut()
            .filter(|f| f.baton == baton)
            .ok_or_else(|| BridgeError::protocol(format!("unknown {baton}")))
    }

    fn entry(&self, id: &FileId) -> Result<&InventoryEntry> {
        self.inv
            .get(id)
            .ok_or_else(|| BridgeError::protocol(format!("file id '{id}' vanished during edit")))
    }

    fn note_listed(&mut self, parent: DirectoryBaton, name: &str) {
        if let Some(listed) = self.dirs.get_mut(&parent).and_then(|d| d.listed.as_mut()) {
            listed.insert(name.to_string());
        }
    }

    /// Move a live entry into place for an add; `false` if `id` is not live.
    fn claim_live(&mut self, id: &FileId, rel: &str, parent_id: &FileId) -> Result<bool> {
        let Some(old_path) = self.inv.id2path(id) else {
            return Ok(false);
        };
        if old_path == rel {
            return Ok(true);
        }
        if let Some(other) = self
            .premature
            .keys()
            .find(|p| path_is_child(p, &old_path) || path_is_child(&old_path, p))
        {
            return Err(BridgeError::unsupported(format!(
                "overlapping early deletes of '{other}' and '{old_path}'"
            )));
        }
        debug!(from = %old_path, to = rel, file_id = %id, "moving entry before its delete");
        self.inv.rename(id, parent_id, basename(rel))?;
        self.premature.insert(old_path, id.clone());
        Ok(true)
    }

    /// Give the entry at `current` the id `wanted`.
    ///
    /// An entry still holding `wanted` at another path is parked on a
    /// temporary id until its own path is opened; a swap of two paths
    /// arrives that way when the drive opens files in place.
    fn adopt_id(&mut self, current: &FileId, wanted: &FileId) -> Result<()> {
        if self.inv.has_id(wanted) {
            let parked = FileId::new(format!("{wanted}#parked-{}", self.parked.len()))?;
            trace!(file_id = %wanted, parked = %parked, "parking id claimed by another path");
            self.inv.rekey(wanted, parked.clone())?;
            for dir in self.dirs.values_mut().filter(|d| &d.file_id == wanted) {
                dir.file_id = parked.clone();
            }
            self.parked.insert(parked, wanted.clone());
        }
        self.inv.rekey(current, wanted.clone())?;
        self.parked.remove(current);
        for dir in self.dirs.values_mut().filter(|d| &d.file_id == current) {
            dir.file_id = wanted.clone();
        }
        Ok(())
    }

    /// Choose the id for a path being added and put a live entry in place.
    ///
    /// Returns the id and whether an entry already sits at `rel`.
    fn place(&mut self, rel: &str, parent_id: &FileId) -> Result<(FileId, bool)> {
        let existing = self.inv.path2id(rel);
        let id = self
            .ctx
            .id_map
            .get(rel)
            .cloned()
            .or_else(|| existing.clone())
            .unwrap_or_else(|| self.generated_id(rel));
        if let Some(existing) = &existing {
            if existing != &id {
                return Err(BridgeError::protocol(format!(
                    "add of '{rel}', which already exists"
                )));
            }
        }
        let live = self.claim_live(&id, rel, parent_id)?;
        Ok((id, live))
    }

    /// The parent snapshot entry a copy source refers to, when the source
    /// lies in the same branch.
    fn snapshot_source(&self, from: &CopyFrom) -> Option<FileId> {
        let parent_branch = self.ctx.parent_branch.as_ref()?;
        if parent_branch != &self.ctx.branch {
            return None;
        }
        let rel = branch_relative(&from.path, parent_branch)?;
        self.ctx.parent.path2id(&rel)
    }

    fn file_entry(
        &self,
        id: FileId,
        parent_id: FileId,
        name: &str,
        content: &[u8],
        props: &PropMap,
    ) -> Result<InventoryEntry> {
        let mut entry = InventoryEntry::file(
            id,
            parent_id,
            name,
            self.ctx.revision_id.clone(),
            String::new(),
            0,
        );
        entry.executable = props.contains_key(SVN_EXECUTABLE);
        let link = content.strip_prefix(b"link ");
        match (props.contains_key(SVN_SPECIAL), link) {
            (true, Some(target)) => {
                entry.kind = EntryKind::Symlink;
                entry.text_sha256 = None;
                entry.text_size = None;
                entry.symlink_target = Some(String::from_utf8_lossy(target).into_owned());
            }
            _ => {
                entry.text_sha256 = Some(self.ctx.target.add_text(content)?);
                entry.text_size = Some(content.len() as u64);
            }
        }
        Ok(entry)
    }

    /// Fill a copied directory with the children of its source. Children
    /// get ids for their new paths.
    fn materialize(&mut self, rel: &str, dir_id: &FileId, from: &CopyFrom) -> Result<()> {
        match self.snapshot_source(from) {
            Some(src) => self.materialize_from_snapshot(rel, dir_id, src),
            None => self.materialize_from_source(rel, dir_id, from),
        }
    }

    fn materialize_from_snapshot(&mut self, rel: &str, dir_id: &FileId, src: FileId) -> Result<()> {
        let parent = Arc::clone(&self.ctx.parent);
        let mut work = vec![(src, rel.to_string(), dir_id.clone())];
        while let Some((src, dst, parent_id)) = work.pop() {
            for (name, child) in parent.children(&src) {
                let Some(old) = parent.get(child) else {
                    continue;
                };
                let path = join(&dst, name);
                let id = self
                    .ctx
                    .id_map
                    .get(&path)
                    .cloned()
                    .unwrap_or_else(|| self.generated_id(&path));
                if self.claim_live(&id, &path, &parent_id)? {
                    continue;
                }
                let mut entry = old.clone();
                entry.file_id = id.clone();
                entry.parent_id = Some(parent_id.clone());
                entry.revision = self.ctx.revision_id.clone();
                self.inv.add(entry)?;
                if old.kind == EntryKind::Directory {
                    work.push((child.clone(), path, id));
                }
            }
        }
        Ok(())
    }

    fn materialize_from_source(&mut self, rel: &str, dir_id: &FileId, from: &CopyFrom) -> Result<()> {
        debug!(from = %from, to = rel, "copy source outside the parent snapshot");
        let source = self.ctx.source;
        let conn = source.connection()?;
        let mut work = vec![(from.path.clone(), rel.to_string(), dir_id.clone())];
        while let Some((src, dst, parent_id)) = work.pop() {
            let listing = conn.get_dir(&src, from.revnum)?;
            for (name, node) in listing.entries {
                let path = join(&dst, &name);
                let id = self
                    .ctx
                    .id_map
                    .get(&path)
                    .cloned()
                    .unwrap_or_else(|| self.generated_id(&path));
                if self.claim_live(&id, &path, &parent_id)? {
                    continue;
                }
                let src_path = join(&src, &name);
                if node.kind == NodeKind::Dir {
                    self.inv.add(InventoryEntry::directory(
                        id.clone(),
                        Some(parent_id.clone()),
                        &name,
                        self.ctx.revision_id.clone(),
                    ))?;
                    work.push((src_path, path, id));
                } else {
                    let (content, props) = conn.get_file(&src_path, from.revnum)?;
                    let entry = self.file_entry(id, parent_id.clone(), &name, &content, &props)?;
                    self.inv.add(entry)?;
                }
            }
        }
        Ok(())
    }

    /// Base text and entry template for a copied file.
    fn copied_file(&self, from: &CopyFrom) -> Result<(Vec<u8>, Option<InventoryEntry>)> {
        if let Some(src) = self.snapshot_source(from) {
            if let Some(entry) = self.ctx.parent.get(&src) {
                return Ok((self.ctx.target.text(entry)?, Some(entry.clone())));
            }
        }
        let (content, props) = self.ctx.source.connection()?.get_file(&from.path, from.revnum)?;
        let template = InventoryEntry {
            executable: props.contains_key(SVN_EXECUTABLE),
            kind: if props.contains_key(SVN_SPECIAL) {
                EntryKind::Symlink
            } else {
                EntryKind::File
            },
            ..InventoryEntry::file(
                FileId::tree_root(),
                FileId::tree_root(),
                "",
                RevisionId::null(),
                sha256_hex(&content),
                content.len() as u64,
            )
        };
        Ok((content, Some(template)))
    }

    /// Stamp revisions: untouched entries keep the parent's.
    fn finalize(&mut self) -> Result<()> {
        if !self.premature.is_empty() {
            let paths: Vec<&str> = self.premature.keys().map(String::as_str).collect();
            return Err(BridgeError::protocol(format!(
                "paths moved but never deleted: {}",
                paths.join(", ")
            )));
        }
        if let Some((parked, wanted)) = self.parked.iter().next() {
            return Err(BridgeError::protocol(format!(
                "id '{wanted}' was claimed by another path, but '{}' never got a new one",
                self.inv.id2path(parked).unwrap_or_default()
            )));
        }
        let ids: Vec<FileId> = self.inv.path_ids().into_values().collect();
        for id in ids {
            let kept = match (self.ctx.parent.get(&id), self.inv.get(&id)) {
                (Some(old), Some(new)) if old.same_content(new) => Some(old.revision.clone()),
                _ => None,
            };
            if let Some(entry) = self.inv.get_mut(&id) {
                entry.revision = kept.unwrap_or_else(|| self.ctx.revision_id.clone());
            }
        }
        let inv = std::mem::take(&mut self.inv);
        self.state = EditState::Done(inv);
        Ok(())
    }

    fn close_stale_children(&mut self, dir: &OpenDir) -> Result<()> {
        let Some(listed) = &dir.listed else {
            return Ok(());
        };
        let stale: Vec<FileId> = self
            .inv
            .children(&dir.file_id)
            .filter(|(name, _)| !listed.contains(*name))
            .map(|(_, id)| id.clone())
            .collect();
        for id in stale {
            trace!(dir = %dir.path, file_id = %id, "dropping child not re-added");
            self.inv.remove_recursive(&id)?;
        }
        Ok(())
    }
}

impl Editor for RevisionBuildEditor<'_> {
    fn open_root(&mut self, _base_revnum: Option<RevNum>) -> Result<DirectoryBaton> {
        let baton = self.tracker.open_root()?;
        let wanted = self.ctx.id_map.get("").cloned();
        let root_id = match (self.inv.root_id().cloned(), wanted) {
            (Some(current), Some(wanted)) if current != wanted => {
                self.inv.rekey(&current, wanted.clone())?;
                wanted
            }
            (Some(current), _) => current,
            (None, wanted) => {
                let id = wanted.unwrap_or_else(|| self.generated_id(""));
                self.inv.add(InventoryEntry::directory(
                    id.clone(),
                    None,
                    "",
                    self.ctx.revision_id.clone(),
                ))?;
                id
            }
        };
        self.dirs.insert(
            baton,
            OpenDir {
                path: String::new(),
                file_id: root_id,
                listed: None,
            },
        );
        Ok(baton)
    }

    fn delete_entry(&mut self, path: &str, _revnum: Option<RevNum>, parent: DirectoryBaton) -> Result<()> {
        self.tracker.check_parent(parent)?;
        let rel = path.trim_matches('/');
        if self.premature.remove(rel).is_some() {
            trace!(path = rel, "delete of an entry that already moved");
            return Ok(());
        }
        if let Some(moved) = self.premature.keys().find(|p| path_is_child(p, rel)) {
            return Err(BridgeError::unsupported(format!(
                "delete of '{rel}' below '{moved}', which already moved"
            )));
        }
        // deleting a parent also deletes the old location of anything that
        // moved out of it
        self.premature.retain(|p, _| !path_is_child(rel, p));
        let id = self
            .inv
            .path2id(rel)
            .ok_or_else(|| BridgeError::protocol(format!("delete of missing path '{rel}'")))?;
        self.inv.remove_recursive(&id)?;
        let inv = &self.inv;
        self.parked.retain(|parked, _| inv.has_id(parked));
        Ok(())
    }

    fn add_directory(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
    ) -> Result<DirectoryBaton> {
        let baton = self.tracker.open_dir(parent)?;
        let rel = path.trim_matches('/').to_string();
        let parent_id = self.dir(parent)?.file_id.clone();
        self.note_listed(parent, basename(&rel));
        let (id, reused) = self.place(&rel, &parent_id)?;
        if reused {
            if self.entry(&id)?.kind != EntryKind::Directory {
                return Err(BridgeError::protocol(format!(
                    "'{rel}' added as a directory over a file id"
                )));
            }
        } else {
            self.inv.add(InventoryEntry::directory(
                id.clone(),
                Some(parent_id),
                basename(&rel),
                self.ctx.revision_id.clone(),
            ))?;
            if let Some(from) = copyfrom {
                self.materialize(&rel, &id, from)?;
            }
        }
        let listed = (reused && copyfrom.is_none()).then(BTreeSet::new);
        self.dirs.insert(
            baton,
            OpenDir {
                path: rel,
                file_id: id,
                listed,
            },
        );
        Ok(baton)
    }

    fn open_directory(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        _base_revnum: Option<RevNum>,
    ) -> Result<DirectoryBaton> {
        let baton = self.tracker.open_dir(parent)?;
        let rel = path.trim_matches('/').to_string();
        self.note_listed(parent, basename(&rel));
        let mut id = self
            .inv
            .path2id(&rel)
            .ok_or_else(|| BridgeError::protocol(format!("open of missing directory '{rel}'")))?;
        if let Some(wanted) = self.ctx.id_map.get(&rel).cloned() {
            if wanted != id {
                self.adopt_id(&id, &wanted)?;
                id = wanted;
            }
        }
        self.dirs.insert(
            baton,
            OpenDir {
                path: rel,
                file_id: id,
                listed: None,
            },
        );
        Ok(baton)
    }

    fn change_dir_prop(&mut self, dir: DirectoryBaton, name: &str, value: Option<&str>) -> Result<()> {
        self.tracker.check_dir(dir)?;
        if self.dir(dir)?.path.is_empty() {
            self.branch_props
                .insert(name.to_string(), value.map(str::to_string));
        }
        Ok(())
    }

    fn close_directory(&mut self, dir: DirectoryBaton) -> Result<()> {
        self.tracker.close_dir(dir)?;
        let open = self
            .dirs
            .remove(&dir)
            .ok_or_else(|| BridgeError::protocol(format!("unknown {dir}")))?;
        self.close_stale_children(&open)?;
        if self.tracker.root_closed() {
            self.finalize()?;
        }
        Ok(())
    }

    fn add_file(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
    ) -> Result<FileBaton> {
        let baton = self.tracker.open_file(parent)?;
        let rel = path.trim_matches('/').to_string();
        let parent_id = self.dir(parent)?.file_id.clone();
        self.note_listed(parent, basename(&rel));
        let (id, reused) = self.place(&rel, &parent_id)?;

        let (base, template) = match copyfrom {
            Some(from) => self.copied_file(from)?,
            None => (Vec::new(), None),
        };
        if reused {
            if self.entry(&id)?.kind == EntryKind::Directory {
                return Err(BridgeError::protocol(format!(
                    "'{rel}' added as a file over a directory id"
                )));
            }
        } else {
            let mut entry = InventoryEntry::file(
                id.clone(),
                parent_id,
                basename(&rel),
                self.ctx.revision_id.clone(),
                String::new(),
                0,
            );
            entry.text_sha256 = None;
            entry.text_size = None;
            if let Some(template) = template {
                entry.kind = template.kind;
                entry.executable = template.executable;
                entry.text_sha256 = template.text_sha256;
                entry.text_size = template.text_size;
                entry.symlink_target = template.symlink_target;
            }
            self.inv.add(entry)?;
        }
        let entry = self.entry(&id)?;
        let (executable, special) = (entry.executable, entry.kind == EntryKind::Symlink);
        self.file = Some(OpenFile {
            baton,
            path: rel,
            file_id: id,
            base,
            applier: None,
            executable,
            special,
        });
        Ok(baton)
    }

    fn open_file(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        _base_revnum: Option<RevNum>,
    ) -> Result<FileBaton> {
        let baton = self.tracker.open_file(parent)?;
        let rel = path.trim_matches('/').to_string();
        self.note_listed(parent, basename(&rel));
        let mut id = self
            .inv
            .path2id(&rel)
            .ok_or_else(|| BridgeError::protocol(format!("open of missing file '{rel}'")))?;
        if let Some(wanted) = self.ctx.id_map.get(&rel).cloned() {
            if wanted != id {
                self.adopt_id(&id, &wanted)?;
                id = wanted;
            }
        }
        let entry = self.entry(&id)?;
        let base = self.ctx.target.text(entry)?;
        let (executable, special) = (entry.executable, entry.kind == EntryKind::Symlink);
        self.file = Some(OpenFile {
            baton,
            path: rel,
            file_id: id,
            base,
            applier: None,
            executable,
            special,
        });
        Ok(baton)
    }

    fn change_file_prop(&mut self, file: FileBaton, name: &str, value: Option<&str>) -> Result<()> {
        let open = self.open_file_mut(file)?;
        match name {
            SVN_EXECUTABLE => open.executable = value.is_some(),
            SVN_SPECIAL => open.special = value.is_some(),
            _ => {}
        }
        Ok(())
    }

    fn apply_textdelta(&mut self, file: FileBaton, base_checksum: Option<&str>) -> Result<()> {
        let open = self.open_file_mut(file)?;
        if let Some(expected) = base_checksum {
            let actual = md5_hex(&open.base);
            if actual != expected {
                return Err(BridgeError::ChecksumMismatch {
                    path: open.path.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        open.applier = Some(TxDeltaApplier::new(open.base.clone()));
        Ok(())
    }

    fn textdelta_window(&mut self, file: FileBaton, window: Option<&Window>) -> Result<()> {
        let open = self.open_file_mut(file)?;
        let applier = open
            .applier
            .as_mut()
            .ok_or_else(|| BridgeError::protocol("delta window before apply_textdelta"))?;
        applier.window(window)?;
        Ok(())
    }

    fn close_file(&mut self, file: FileBaton, checksum: Option<&str>) -> Result<()> {
        self.tracker.check_file(file)?;
        let open = self
            .file
            .take()
            .filter(|f| f.baton == file)
            .ok_or_else(|| BridgeError::protocol(format!("unknown {file}")))?;
        self.tracker.close_file(file)?;

        let text = match open.applier {
            Some(applier) if !applier.is_closed() => {
                return Err(BridgeError::protocol(format!(
                    "'{}' closed during a text delta",
                    open.path
                )))
            }
            Some(applier) => applier.finish(),
            None => open.base,
        };
        if let Some(expected) = checksum {
            let actual = md5_hex(&text);
            if actual != expected {
                return Err(BridgeError::ChecksumMismatch {
                    path: open.path,
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let link = text.strip_prefix(b"link ").filter(|_| open.special);
        let sha = match link {
            Some(_) => None,
            None => {
                let sha = sha256_hex(&text);
                if self.entry(&open.file_id)?.text_sha256.as_ref() != Some(&sha) {
                    self.ctx.target.add_text(&text)?;
                }
                Some(sha)
            }
        };
        let entry = self
            .inv
            .get_mut(&open.file_id)
            .ok_or_else(|| BridgeError::protocol(format!("'{}' vanished during edit", open.path)))?;
        entry.executable = open.executable;
        match link {
            Some(target) => {
                entry.kind = EntryKind::Symlink;
                entry.symlink_target = Some(String::from_utf8_lossy(target).into_owned());
                entry.text_sha256 = None;
                entry.text_size = None;
            }
            None => {
                entry.kind = EntryKind::File;
                entry.symlink_target = None;
                entry.text_sha256 = sha;
                entry.text_size = Some(text.len() as u64);
            }
        }
        Ok(())
    }

    fn close_edit(&mut self) -> Result<()> {
        self.tracker.finish()?;
        match self.state {
            EditState::Done(_) => Ok(()),
            _ => Err(BridgeError::protocol("close_edit before the root was closed")),
        }
    }

    fn abort_edit(&mut self) -> Result<()> {
        self.tracker.abort();
        self.state = EditState::Aborted;
        Ok(())
    }
}
