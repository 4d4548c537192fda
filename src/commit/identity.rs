//! commit::identity
//!
//! One pass over the new tree deciding what a commit has to record and
//! which parts of the tree it has to touch.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::types::{FileId, RevisionId};
use crate::target::{EntryKind, Inventory, InventoryEntry};

/// What a commit records and sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextsIdentity {
    /// Paths whose id the source would not infer: anything not at the same
    /// path in the base.
    pub fileids: BTreeMap<String, FileId>,
    /// Last text revision of modified files, where it is not the base.
    pub text_parents: BTreeMap<String, RevisionId>,
    /// Files whose text or properties must be sent.
    pub modified: BTreeSet<FileId>,
    /// Directories (by new path) with changes somewhere below them.
    pub visited: BTreeSet<String>,
}

fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(path);
    std::iter::from_fn(move || {
        let current = rest?;
        rest = match current.rfind('/') {
            Some(i) => Some(&current[..i]),
            None if current.is_empty() => None,
            None => Some(""),
        };
        Some(current)
    })
    .skip(1)
}

/// Add the directories above `path`. A directory is only ever present with
/// all of its ancestors.
fn mark(visited: &mut BTreeSet<String>, path: &str) {
    for dir in ancestors(path) {
        if !visited.insert(dir.to_string()) {
            break;
        }
    }
}

/// Whether a file's text or properties differ between two entries.
pub fn file_changed(old: &InventoryEntry, new: &InventoryEntry) -> bool {
    old.kind != new.kind
        || old.text_sha256 != new.text_sha256
        || old.symlink_target != new.symlink_target
        || old.executable != new.executable
}

/// Compare `new` against `base` (the tree at `base_revid`).
pub fn determine_texts_identity(
    new: &Inventory,
    base: &Inventory,
    base_revid: Option<&RevisionId>,
) -> TextsIdentity {
    let mut identity = TextsIdentity::default();

    for (path, entry) in new.iter_entries() {
        let same_place = base.path2id(&path).as_ref() == Some(&entry.file_id);
        if !same_place {
            identity.fileids.insert(path.clone(), entry.file_id.clone());
        }
        let old = base.get(&entry.file_id);
        let moved = old.map_or(true, |o| o.name != entry.name || o.parent_id != entry.parent_id);
        if entry.kind != EntryKind::Directory {
            match old {
                Some(old) if !file_changed(old, entry) => {}
                _ => {
                    identity.modified.insert(entry.file_id.clone());
                    if let (Some(old), Some(base_revid)) = (old, base_revid) {
                        if &old.revision != base_revid {
                            identity.text_parents.insert(path.clone(), old.revision.clone());
                        }
                    }
                }
            }
        }
        if moved || !same_place || identity.modified.contains(&entry.file_id) {
            mark(&mut identity.visited, &path);
        }
    }

    // Deletions and moves touch the directory the entry left.
    for (_, old) in base.iter_entries() {
        let stayed = new
            .get(&old.file_id)
            .is_some_and(|e| e.parent_id == old.parent_id && e.name == old.name);
        if stayed {
            continue;
        }
        if let Some(dir) = old.parent_id.as_ref().and_then(|p| new.id2path(p)) {
            if identity.visited.insert(dir.clone()) {
                mark(&mut identity.visited, &dir);
            }
        }
    }
    identity
}
