//! transport::editor
//!
//! The tree-delta editor protocol.
//!
//! # Protocol
//!
//! A driver describes a tree change as a depth-first sequence of calls:
//!
//! ```text
//! open_root
//!   delete_entry / add_directory / open_directory / add_file / open_file
//!     ... (children, recursively)
//!   close_directory
//! close_edit | abort_edit
//! ```
//!
//! Batons are opaque `Copy` tokens. A directory baton stays valid until its
//! `close_directory`; a file baton until its `close_file`. Only the most
//! recently opened directory may receive new children, and a file must be
//! closed before its siblings are touched. [`BatonTracker`] enforces this on
//! the receiving side so every editor reports out-of-order calls as a
//! `ProtocolViolation` instead of corrupting state.
//!
//! # Paths
//!
//! Paths passed to the editor are relative to the session the edit was
//! started on. Copy sources ([`CopyFrom`]) are relative to the repository
//! root.

use std::fmt;

use crate::core::types::RevNum;
use crate::core::{BridgeError, Result};
use crate::delta::Window;
use crate::transport::CopyFrom;

/// Token identifying an open directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryBaton(u32);

/// Token identifying an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileBaton(u32);

impl DirectoryBaton {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl FileBaton {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DirectoryBaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir#{}", self.0)
    }
}

impl fmt::Display for FileBaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Receiver of a tree delta.
pub trait Editor {
    /// Announce the revision the edit will produce.
    fn set_target_revision(&mut self, _revnum: RevNum) -> Result<()> {
        Ok(())
    }

    fn open_root(&mut self, base_revnum: Option<RevNum>) -> Result<DirectoryBaton>;

    /// Remove `path` (and everything below it).
    fn delete_entry(
        &mut self,
        path: &str,
        revnum: Option<RevNum>,
        parent: DirectoryBaton,
    ) -> Result<()>;

    fn add_directory(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
    ) -> Result<DirectoryBaton>;

    fn open_directory(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        base_revnum: Option<RevNum>,
    ) -> Result<DirectoryBaton>;

    /// Set (`Some`) or delete (`None`) a directory property.
    fn change_dir_prop(&mut self, dir: DirectoryBaton, name: &str, value: Option<&str>)
        -> Result<()>;

    fn close_directory(&mut self, dir: DirectoryBaton) -> Result<()>;

    fn add_file(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
    ) -> Result<FileBaton>;

    fn open_file(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        base_revnum: Option<RevNum>,
    ) -> Result<FileBaton>;

    fn change_file_prop(&mut self, file: FileBaton, name: &str, value: Option<&str>) -> Result<()>;

    /// Begin a text delta against the file's base text.
    ///
    /// `base_checksum` is the hex MD5 the sender expects the base to have.
    fn apply_textdelta(&mut self, file: FileBaton, base_checksum: Option<&str>) -> Result<()>;

    /// Deliver one delta window; `None` ends the delta.
    fn textdelta_window(&mut self, file: FileBaton, window: Option<&Window>) -> Result<()>;

    /// Close a file; `checksum` is the hex MD5 of its final text.
    fn close_file(&mut self, file: FileBaton, checksum: Option<&str>) -> Result<()>;

    fn close_edit(&mut self) -> Result<()>;

    fn abort_edit(&mut self) -> Result<()>;
}

/// An editor whose `close_edit` commits a new revision atomically.
///
/// Nothing becomes visible in the repository until `close_edit` returns;
/// `abort_edit` (or dropping the editor) discards the transaction.
pub trait CommitEditor: Editor + Send {}

/// Receiver-side bookkeeping for baton discipline.
///
/// ```
/// use svnbridge::transport::editor::BatonTracker;
///
/// let mut tracker = BatonTracker::new();
/// let root = tracker.open_root().unwrap();
/// let dir = tracker.open_dir(root).unwrap();
/// let file = tracker.open_file(dir).unwrap();
/// assert!(tracker.close_dir(dir).is_err()); // file still open
/// tracker.close_file(file).unwrap();
/// tracker.close_dir(dir).unwrap();
/// tracker.close_dir(root).unwrap();
/// tracker.finish().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct BatonTracker {
    next: u32,
    dirs: Vec<u32>,
    file: Option<u32>,
    root_opened: bool,
    finished: bool,
}

impl BatonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    fn check_live(&self) -> Result<()> {
        if self.finished {
            return Err(BridgeError::protocol("edit already finished"));
        }
        Ok(())
    }

    fn require_top(&self, dir: DirectoryBaton, op: &str) -> Result<()> {
        self.check_live()?;
        if let Some(file) = self.file {
            return Err(BridgeError::protocol(format!(
                "{op} on {dir} while file#{file} is open"
            )));
        }
        match self.dirs.last() {
            Some(&top) if top == dir.0 => Ok(()),
            _ => Err(BridgeError::protocol(format!(
                "{op} on {dir}, which is not the innermost open directory"
            ))),
        }
    }

    pub fn open_root(&mut self) -> Result<DirectoryBaton> {
        self.check_live()?;
        if self.root_opened {
            return Err(BridgeError::protocol("open_root called twice"));
        }
        self.root_opened = true;
        let id = self.issue();
        self.dirs.push(id);
        Ok(DirectoryBaton(id))
    }

    /// Validate `parent` for a child operation that opens no baton.
    pub fn check_parent(&self, parent: DirectoryBaton) -> Result<()> {
        self.require_top(parent, "child operation")
    }

    /// Validate a directory property change.
    pub fn check_dir(&self, dir: DirectoryBaton) -> Result<()> {
        self.check_live()?;
        if self.dirs.contains(&dir.0) {
            Ok(())
        } else {
            Err(BridgeError::protocol(format!("{dir} is not open")))
        }
    }

    pub fn open_dir(&mut self, parent: DirectoryBaton) -> Result<DirectoryBaton> {
        self.require_top(parent, "open directory")?;
        let id = self.issue();
        self.dirs.push(id);
        Ok(DirectoryBaton(id))
    }

    pub fn close_dir(&mut self, dir: DirectoryBaton) -> Result<()> {
        self.require_top(dir, "close_directory")?;
        self.dirs.pop();
        Ok(())
    }

    pub fn open_file(&mut self, parent: DirectoryBaton) -> Result<FileBaton> {
        self.require_top(parent, "open file")?;
        let id = self.issue();
        self.file = Some(id);
        Ok(FileBaton(id))
    }

    /// Validate an operation on an open file.
    pub fn check_file(&self, file: FileBaton) -> Result<()> {
        self.check_live()?;
        if self.file == Some(file.0) {
            Ok(())
        } else {
            Err(BridgeError::protocol(format!("{file} is not open")))
        }
    }

    pub fn close_file(&mut self, file: FileBaton) -> Result<()> {
        self.check_file(file)?;
        self.file = None;
        Ok(())
    }

    /// Innermost open directory, if any.
    pub fn current_dir(&self) -> Option<DirectoryBaton> {
        self.dirs.last().copied().map(DirectoryBaton)
    }

    /// Whether the root has been opened and closed again.
    pub fn root_closed(&self) -> bool {
        self.root_opened && self.dirs.is_empty()
    }

    /// Validate `close_edit`.
    pub fn finish(&mut self) -> Result<()> {
        self.check_live()?;
        if self.file.is_some() || !self.dirs.is_empty() {
            return Err(BridgeError::protocol(format!(
                "close_edit with {} directories and {} files still open",
                self.dirs.len(),
                usize::from(self.file.is_some())
            )));
        }
        self.finished = true;
        Ok(())
    }

    /// Mark the edit aborted; later calls are violations.
    pub fn abort(&mut self) {
        self.finished = true;
        self.dirs.clear();
        self.file = None;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
