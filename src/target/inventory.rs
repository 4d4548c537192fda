//! target::inventory
//!
//! Snapshot of a branch tree keyed by file id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{FileId, RevisionId};

use super::TargetError;

/// Kind of an inventory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

/// One node of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub file_id: FileId,
    /// `None` only for the root.
    pub parent_id: Option<FileId>,
    pub name: String,
    pub kind: EntryKind,
    /// Revision that last changed this entry.
    pub revision: RevisionId,
    pub text_sha256: Option<String>,
    pub text_size: Option<u64>,
    pub executable: bool,
    pub symlink_target: Option<String>,
}

impl InventoryEntry {
    pub fn directory(file_id: FileId, parent_id: Option<FileId>, name: &str, revision: RevisionId) -> Self {
        Self {
            file_id,
            parent_id,
            name: name.to_string(),
            kind: EntryKind::Directory,
            revision,
            text_sha256: None,
            text_size: None,
            executable: false,
            symlink_target: None,
        }
    }

    pub fn file(
        file_id: FileId,
        parent_id: FileId,
        name: &str,
        revision: RevisionId,
        text_sha256: String,
        text_size: u64,
    ) -> Self {
        Self {
            file_id,
            parent_id: Some(parent_id),
            name: name.to_string(),
            kind: EntryKind::File,
            revision,
            text_sha256: Some(text_sha256),
            text_size: Some(text_size),
            executable: false,
            symlink_target: None,
        }
    }

    /// Same node apart from the revision that last changed it.
    pub fn same_content(&self, other: &InventoryEntry) -> bool {
        self.file_id == other.file_id
            && self.parent_id == other.parent_id
            && self.name == other.name
            && self.kind == other.kind
            && self.text_sha256 == other.text_sha256
            && self.executable == other.executable
            && self.symlink_target == other.symlink_target
    }
}

/// A tree snapshot with path lookups.
///
/// ```
/// use svnbridge::core::types::{FileId, RevisionId};
/// use svnbridge::target::{Inventory, InventoryEntry};
///
/// let rev = RevisionId::new("r1").unwrap();
/// let mut inv = Inventory::new();
/// inv.add(InventoryEntry::directory(FileId::tree_root(), None, "", rev.clone())).unwrap();
/// let src = FileId::new("src-id").unwrap();
/// inv.add(InventoryEntry::directory(src.clone(), Some(FileId::tree_root()), "src", rev)).unwrap();
/// assert_eq!(inv.path2id("src"), Some(src.clone()));
/// assert_eq!(inv.id2path(&src).as_deref(), Some("src"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    root_id: Option<FileId>,
    entries: BTreeMap<FileId, InventoryEntry>,
    children: BTreeMap<FileId, BTreeMap<String, FileId>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_id(&self) -> Option<&FileId> {
        self.root_id.as_ref()
    }

    pub fn root(&self) -> Option<&InventoryEntry> {
        self.root_id.as_ref().and_then(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_id(&self, id: &FileId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &FileId) -> Option<&InventoryEntry> {
        self.entries.get(id)
    }

    /// Mutable access for content changes.
    ///
    /// Name and parent must go through [`rename`](Self::rename) so the
    /// child index stays consistent.
    pub fn get_mut(&mut self, id: &FileId) -> Option<&mut InventoryEntry> {
        self.entries.get_mut(id)
    }

    /// Children of a directory, sorted by name.
    pub fn children(&self, id: &FileId) -> impl Iterator<Item = (&str, &FileId)> {
        self.children
            .get(id)
            .into_iter()
            .flat_map(|c| c.iter().map(|(name, id)| (name.as_str(), id)))
    }

    pub fn child(&self, parent: &FileId, name: &str) -> Option<&FileId> {
        self.children.get(parent)?.get(name)
    }

    pub fn path2id(&self, path: &str) -> Option<FileId> {
        let mut id = self.root_id.as_ref()?;
        for name in path.split('/').filter(|c| !c.is_empty()) {
            id = self.child(id, name)?;
        }
        Some(id.clone())
    }

    pub fn id2path(&self, id: &FileId) -> Option<String> {
        let mut names = Vec::new();
        let mut entry = self.entries.get(id)?;
        while let Some(parent) = &entry.parent_id {
            names.push(entry.name.as_str());
            entry = self.entries.get(parent)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    pub fn get_by_path(&self, path: &str) -> Option<&InventoryEntry> {
        self.path2id(path).and_then(|id| self.entries.get(&id))
    }

    /// Insert an entry below an existing directory, or as the root.
    pub fn add(&mut self, entry: InventoryEntry) -> Result<(), TargetError> {
        if self.entries.contains_key(&entry.file_id) {
            return Err(TargetError::DuplicateId {
                file_id: entry.file_id.to_string(),
            });
        }
        match &entry.parent_id {
            None => {
                if self.root_id.is_some() {
                    return Err(TargetError::DuplicateId {
                        file_id: entry.file_id.to_string(),
                    });
                }
                self.root_id = Some(entry.file_id.clone());
            }
            Some(parent) => {
                self.check_slot(parent, &entry.name)?;
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .insert(entry.name.clone(), entry.file_id.clone());
            }
        }
        self.entries.insert(entry.file_id.clone(), entry);
        Ok(())
    }

    fn check_slot(&self, parent: &FileId, name: &str) -> Result<(), TargetError> {
        let parent_entry = self.entries.get(parent).ok_or_else(|| TargetError::NoSuchId {
            file_id: parent.to_string(),
        })?;
        if parent_entry.kind != EntryKind::Directory {
            return Err(TargetError::NotADirectory {
                file_id: parent.to_string(),
            });
        }
        if self.child(parent, name).is_some() {
            return Err(TargetError::NameCollision {
                parent: parent.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Remove an entry and everything below it, returning what was removed
    /// (parents before children).
    pub fn remove_recursive(&mut self, id: &FileId) -> Result<Vec<InventoryEntry>, TargetError> {
        let entry = self.entries.get(id).ok_or_else(|| TargetError::NoSuchId {
            file_id: id.to_string(),
        })?;
        match entry.parent_id.clone() {
            Some(parent) => {
                let name = entry.name.clone();
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.remove(&name);
                }
            }
            None => self.root_id = None,
        }
        let mut removed = Vec::new();
        let mut work = vec![id.clone()];
        while let Some(next) = work.pop() {
            if let Some(kids) = self.children.remove(&next) {
                work.extend(kids.into_values());
            }
            if let Some(entry) = self.entries.remove(&next) {
                removed.push(entry);
            }
        }
        Ok(removed)
    }

    /// Move an entry (with its subtree) to `new_parent/new_name`.
    pub fn rename(&mut self, id: &FileId, new_parent: &FileId, new_name: &str) -> Result<(), TargetError> {
        if self.is_ancestor(id, new_parent) {
            return Err(TargetError::Cycle {
                file_id: id.to_string(),
            });
        }
        self.check_slot(new_parent, new_name)?;
        let entry = self.entries.get_mut(id).ok_or_else(|| TargetError::NoSuchId {
            file_id: id.to_string(),
        })?;
        let old_parent = entry.parent_id.replace(new_parent.clone());
        let old_name = std::mem::replace(&mut entry.name, new_name.to_string());
        if let Some(siblings) = old_parent.as_ref().and_then(|p| self.children.get_mut(p)) {
            siblings.remove(&old_name);
        }
        self.children
            .entry(new_parent.clone())
            .or_default()
            .insert(new_name.to_string(), id.clone());
        Ok(())
    }

    /// Give an entry a new identity, keeping its place and children.
    pub fn rekey(&mut self, old: &FileId, new: FileId) -> Result<(), TargetError> {
        if self.entries.contains_key(&new) {
            return Err(TargetError::DuplicateId {
                file_id: new.to_string(),
            });
        }
        let mut entry = self.entries.remove(old).ok_or_else(|| TargetError::NoSuchId {
            file_id: old.to_string(),
        })?;
        entry.file_id = new.clone();
        match &entry.parent_id {
            Some(parent) => {
                if let Some(slot) = self
                    .children
                    .get_mut(parent)
                    .and_then(|c| c.get_mut(&entry.name))
                {
                    *slot = new.clone();
                }
            }
            None => self.root_id = Some(new.clone()),
        }
        if let Some(kids) = self.children.remove(old) {
            for kid in kids.values() {
                if let Some(child) = self.entries.get_mut(kid) {
                    child.parent_id = Some(new.clone());
                }
            }
            self.children.insert(new.clone(), kids);
        }
        self.entries.insert(new, entry);
        Ok(())
    }

    /// Whether `ancestor` is `id` or lies above it.
    pub fn is_ancestor(&self, ancestor: &FileId, id: &FileId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.entries.get(cur).and_then(|e| e.parent_id.as_ref());
        }
        false
    }

    /// Every entry with its path, sorted by path (root first).
    pub fn iter_entries(&self) -> Vec<(String, &InventoryEntry)> {
        let mut out = Vec::with_capacity(self.entries.len());
        let Some(root) = self.root_id.as_ref() else {
            return out;
        };
        let mut stack = vec![(String::new(), root)];
        while let Some((path, id)) = stack.pop() {
            if let Some(entry) = self.entries.get(id) {
                out.push((path.clone(), entry));
            }
            for (name, child) in self.children(id) {
                let child_path = if path.is_empty() {
                    name.to_string()
                } else {
                    format!("{path}/{name}")
                };
                stack.push((child_path, child));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Paths mapped to file ids, for comparisons.
    pub fn path_ids(&self) -> BTreeMap<String, FileId> {
        self.iter_entries()
            .into_iter()
            .map(|(path, entry)| (path, entry.file_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev() -> RevisionId {
        RevisionId::new("r1").unwrap()
    }

    fn id(s: &str) -> FileId {
        FileId::new(s).unwrap()
    }

    fn sample() -> Inventory {
        let mut inv = Inventory::new();
        inv.add(InventoryEntry::directory(id("root"), None, "", rev())).unwrap();
        inv.add(InventoryEntry::directory(id("d"), Some(id("root")), "dir", rev()))
            .unwrap();
        inv.add(InventoryEntry::file(id("f"), id("d"), "file", rev(), "00".into(), 0))
            .unwrap();
        inv.add(InventoryEntry::file(id("g"), id("root"), "top", rev(), "00".into(), 0))
            .unwrap();
        inv
    }

    #[test]
    fn paths_both_ways() {
        let inv = sample();
        assert_eq!(inv.path2id(""), Some(id("root")));
        assert_eq!(inv.path2id("dir/file"), Some(id("f")));
        assert_eq!(inv.path2id("dir/missing"), None);
        assert_eq!(inv.id2path(&id("f")).as_deref(), Some("dir/file"));
        assert_eq!(inv.id2path(&id("root")).as_deref(), Some(""));
        let paths: Vec<String> = inv.iter_entries().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["", "dir", "dir/file", "top"]);
    }

    #[test]
    fn add_checks_structure() {
        let mut inv = sample();
        let dup = InventoryEntry::file(id("f"), id("root"), "other", rev(), "00".into(), 0);
        assert!(matches!(inv.add(dup), Err(TargetError::DuplicateId { .. })));
        let clash = InventoryEntry::file(id("h"), id("root"), "top", rev(), "00".into(), 0);
        assert!(matches!(inv.add(clash), Err(TargetError::NameCollision { .. })));
        let under_file = InventoryEntry::file(id("h"), id("g"), "x", rev(), "00".into(), 0);
        assert!(matches!(inv.add(under_file), Err(TargetError::NotADirectory { .. })));
    }

    #[test]
    fn remove_takes_subtree() {
        let mut inv = sample();
        let removed = inv.remove_recursive(&id("d")).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!inv.has_id(&id("f")));
        assert_eq!(inv.path2id("dir"), None);
        assert_eq!(inv.len(), 2);
    }

    #[test]
    fn rename_moves_subtree() {
        let mut inv = sample();
        inv.rename(&id("d"), &id("root"), "moved").unwrap();
        assert_eq!(inv.path2id("moved/file"), Some(id("f")));
        assert_eq!(inv.path2id("dir"), None);
        assert!(matches!(
            inv.rename(&id("root"), &id("d"), "loop"),
            Err(TargetError::Cycle { .. })
        ));
    }

    #[test]
    fn rekey_keeps_children() {
        let mut inv = sample();
        inv.rekey(&id("d"), id("d2")).unwrap();
        assert_eq!(inv.path2id("dir"), Some(id("d2")));
        assert_eq!(inv.get(&id("f")).unwrap().parent_id, Some(id("d2")));
        assert_eq!(inv.id2path(&id("f")).as_deref(), Some("dir/file"));
        inv.rekey(&id("root"), id("root2")).unwrap();
        assert_eq!(inv.root_id(), Some(&id("root2")));
        assert_eq!(inv.path2id("top"), Some(id("g")));
    }
}
