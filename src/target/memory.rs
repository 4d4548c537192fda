//! target::memory
//!
//! An in-memory [`TargetRepository`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{sha256_hex, Inventory, Revision, TargetError, TargetRepository};
use crate::core::errors::BridgeError;
use crate::core::types::RevisionId;
use crate::core::Result;

#[derive(Debug, Default)]
struct Pending {
    revisions: Vec<(Revision, Arc<Inventory>)>,
    texts: HashMap<String, Arc<Vec<u8>>>,
}

#[derive(Debug, Default)]
struct Inner {
    revisions: HashMap<RevisionId, (Revision, Arc<Inventory>)>,
    order: Vec<RevisionId>,
    texts: HashMap<String, Arc<Vec<u8>>>,
    pending: Option<Pending>,
}

impl Inner {
    fn pending_mut(&mut self) -> Result<&mut Pending> {
        self.pending
            .as_mut()
            .ok_or_else(|| TargetError::NoWriteGroup.into())
    }

    fn lookup(&self, revid: &RevisionId) -> Option<&(Revision, Arc<Inventory>)> {
        self.revisions.get(revid).or_else(|| {
            self.pending
                .as_ref()?
                .revisions
                .iter()
                .find(|(rev, _)| &rev.revision_id == revid)
        })
    }
}

/// Revisions, snapshots and texts held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetRepository {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTargetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored texts, for assertions.
    pub fn text_count(&self) -> usize {
        self.inner.lock().texts.len()
    }

    pub fn in_write_group(&self) -> bool {
        self.inner.lock().pending.is_some()
    }
}

impl TargetRepository for MemoryTargetRepository {
    fn has_revision(&self, revid: &RevisionId) -> bool {
        revid.is_null() || self.inner.lock().lookup(revid).is_some()
    }

    fn get_revision(&self, revid: &RevisionId) -> Result<Revision> {
        self.inner
            .lock()
            .lookup(revid)
            .map(|(rev, _)| rev.clone())
            .ok_or_else(|| BridgeError::RevisionIdNotFound {
                revid: revid.to_string(),
            })
    }

    fn get_inventory(&self, revid: &RevisionId) -> Result<Arc<Inventory>> {
        if revid.is_null() {
            return Ok(Arc::new(Inventory::new()));
        }
        self.inner
            .lock()
            .lookup(revid)
            .map(|(_, inv)| Arc::clone(inv))
            .ok_or_else(|| BridgeError::RevisionIdNotFound {
                revid: revid.to_string(),
            })
    }

    fn add_text(&self, content: &[u8]) -> Result<String> {
        let sha = sha256_hex(content);
        let mut inner = self.inner.lock();
        if !inner.texts.contains_key(&sha) {
            inner
                .pending_mut()?
                .texts
                .entry(sha.clone())
                .or_insert_with(|| Arc::new(content.to_vec()));
        }
        Ok(sha)
    }

    fn get_text(&self, sha256: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        inner
            .texts
            .get(sha256)
            .or_else(|| inner.pending.as_ref()?.texts.get(sha256))
            .map(|t| t.to_vec())
            .ok_or_else(|| {
                TargetError::MissingText {
                    sha256: sha256.to_string(),
                }
                .into()
            })
    }

    fn start_write_group(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.pending.is_some() {
            return Err(TargetError::WriteGroupActive.into());
        }
        inner.pending = Some(Pending::default());
        Ok(())
    }

    fn commit_write_group(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let pending = inner.pending.take().ok_or(TargetError::NoWriteGroup)?;
        debug!(
            revisions = pending.revisions.len(),
            texts = pending.texts.len(),
            "committing write group"
        );
        inner.texts.extend(pending.texts);
        for (rev, inv) in pending.revisions {
            inner.order.push(rev.revision_id.clone());
            inner.revisions.insert(rev.revision_id.clone(), (rev, inv));
        }
        Ok(())
    }

    fn abort_write_group(&self) -> Result<()> {
        let pending = self.inner.lock().pending.take().ok_or(TargetError::NoWriteGroup)?;
        debug!(
            revisions = pending.revisions.len(),
            texts = pending.texts.len(),
            "aborted write group"
        );
        Ok(())
    }

    fn add_revision(&self, revision: Revision, inventory: Arc<Inventory>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.lookup(&revision.revision_id).is_some() {
            return Err(BridgeError::Internal(format!(
                "revision {} already stored",
                revision.revision_id
            )));
        }
        inner.pending_mut()?.revisions.push((revision, inventory));
        Ok(())
    }

    fn revision_ids(&self) -> Vec<RevisionId> {
        self.inner.lock().order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileId;
    use crate::target::{InventoryEntry, TextSource};

    fn revision(id: &str) -> Revision {
        Revision {
            revision_id: RevisionId::new(id).unwrap(),
            ..Revision::default()
        }
    }

    #[test]
    fn write_group_commit() {
        let repo = MemoryTargetRepository::new();
        assert!(repo.add_text(b"x").is_err());
        repo.start_write_group().unwrap();
        assert!(repo.start_write_group().is_err());
        let sha = repo.add_text(b"hello").unwrap();
        repo.add_revision(revision("r1"), Arc::new(Inventory::new()))
            .unwrap();
        assert!(repo.has_revision(&RevisionId::new("r1").unwrap()));
        repo.commit_write_group().unwrap();
        assert_eq!(repo.get_text(&sha).unwrap(), b"hello");
        assert_eq!(repo.revision_ids(), vec![RevisionId::new("r1").unwrap()]);
    }

    #[test]
    fn abort_discards_everything() {
        let repo = MemoryTargetRepository::new();
        repo.start_write_group().unwrap();
        let sha = repo.add_text(b"gone").unwrap();
        repo.add_revision(revision("r1"), Arc::new(Inventory::new()))
            .unwrap();
        repo.abort_write_group().unwrap();
        assert!(!repo.has_revision(&RevisionId::new("r1").unwrap()));
        assert!(repo.get_text(&sha).is_err());
        assert_eq!(repo.text_count(), 0);
        assert!(!repo.in_write_group());
    }

    #[test]
    fn null_revision_is_empty() {
        let repo = MemoryTargetRepository::new();
        assert!(repo.has_revision(&RevisionId::null()));
        assert!(repo.get_inventory(&RevisionId::null()).unwrap().is_empty());
        let err = repo.get_inventory(&RevisionId::new("nope").unwrap()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn symlink_text_from_target() {
        let repo = MemoryTargetRepository::new();
        let mut entry = InventoryEntry::file(
            FileId::new("l").unwrap(),
            FileId::tree_root(),
            "link",
            RevisionId::null(),
            String::new(),
            0,
        );
        entry.kind = crate::target::EntryKind::Symlink;
        entry.text_sha256 = None;
        entry.symlink_target = Some("../dest".into());
        assert_eq!(repo.text(&entry).unwrap(), b"link ../dest");
    }
}
