//! target
//!
//! The DAG-based side of the bridge.
//!
//! Fetched revisions land in a [`TargetRepository`] as a [`Revision`] plus
//! an [`Inventory`] snapshot; pushed revisions are read back from one.
//! Texts are content-addressed by their SHA-256.
//!
//! # Write groups
//!
//! All additions happen inside a write group. `commit_write_group` makes
//! them visible at once; `abort_write_group` discards them, so a failed
//! fetch leaves the repository exactly as it was.

pub mod inventory;
pub mod memory;

pub use inventory::{EntryKind, Inventory, InventoryEntry};
pub use memory::MemoryTargetRepository;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::types::RevisionId;
use crate::core::Result;

/// Errors from the target model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("file id '{file_id}' already present")]
    DuplicateId { file_id: String },

    #[error("file id '{file_id}' not present")]
    NoSuchId { file_id: String },

    #[error("'{file_id}' is not a directory")]
    NotADirectory { file_id: String },

    #[error("'{name}' already exists in '{parent}'")]
    NameCollision { parent: String, name: String },

    #[error("moving '{file_id}' below itself")]
    Cycle { file_id: String },

    #[error("no write group is active")]
    NoWriteGroup,

    #[error("a write group is already active")]
    WriteGroupActive,

    #[error("text {sha256} not stored")]
    MissingText { sha256: String },
}

impl TargetError {
    /// Errors caused by an inconsistent tree drive rather than by storage.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. }
                | Self::NoSuchId { .. }
                | Self::NotADirectory { .. }
                | Self::NameCollision { .. }
                | Self::Cycle { .. }
        )
    }
}

/// Revision metadata on the target side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub revision_id: RevisionId,
    /// Left-hand parent first.
    pub parent_ids: Vec<RevisionId>,
    pub committer: String,
    pub message: String,
    /// Seconds since the epoch.
    pub timestamp: f64,
    /// Offset from UTC in seconds.
    pub timezone: i32,
    pub properties: BTreeMap<String, String>,
}

impl Default for Revision {
    fn default() -> Self {
        Self {
            revision_id: RevisionId::null(),
            parent_ids: Vec::new(),
            committer: String::new(),
            message: String::new(),
            timestamp: 0.0,
            timezone: 0,
            properties: BTreeMap::new(),
        }
    }
}

/// Hex SHA-256 of a text.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Storage for fetched and locally created revisions.
pub trait TargetRepository: Send + Sync {
    fn has_revision(&self, revid: &RevisionId) -> bool;

    fn get_revision(&self, revid: &RevisionId) -> Result<Revision>;

    /// Snapshot of a revision; `null:` is the empty tree.
    fn get_inventory(&self, revid: &RevisionId) -> Result<Arc<Inventory>>;

    /// Store a text, returning its SHA-256.
    fn add_text(&self, content: &[u8]) -> Result<String>;

    fn get_text(&self, sha256: &str) -> Result<Vec<u8>>;

    fn start_write_group(&self) -> Result<()>;

    fn commit_write_group(&self) -> Result<()>;

    fn abort_write_group(&self) -> Result<()>;

    fn add_revision(&self, revision: Revision, inventory: Arc<Inventory>) -> Result<()>;

    /// Stored revisions in insertion order.
    fn revision_ids(&self) -> Vec<RevisionId>;
}

/// Full text of inventory entries.
pub trait TextSource {
    fn text(&self, entry: &InventoryEntry) -> Result<Vec<u8>>;
}

/// Content of a symlink node as the source stores it.
pub fn symlink_text(target: &str) -> Vec<u8> {
    format!("link {target}").into_bytes()
}

impl<T: TargetRepository + ?Sized> TextSource for T {
    fn text(&self, entry: &InventoryEntry) -> Result<Vec<u8>> {
        match (entry.kind, &entry.symlink_target, &entry.text_sha256) {
            (EntryKind::Symlink, Some(target), _) => Ok(symlink_text(target)),
            (_, _, Some(sha)) => self.get_text(sha),
            _ => Ok(Vec::new()),
        }
    }
}
