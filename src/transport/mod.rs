//! transport
//!
//! Access to the source repository.
//!
//! # Architecture
//!
//! The engine never talks to a server directly. Everything it needs from the
//! source goes through the [`Transport`] trait: tree reads, the log,
//! revision properties, replay/switch drives of an [`Editor`], and commit
//! editors. Implementations:
//!
//! - [`MemoryTransport`]: a complete in-process repository, used by tests
//!   and the debug CLI
//!
//! # Sessions
//!
//! A transport is a session anchored at a URL inside one repository. Paths
//! passed to tree and log operations are relative to that URL; [`reparent`]
//! moves the anchor without reconnecting. Each session performs one
//! blocking exchange at a time, so sessions are `Send` but not shared;
//! concurrent callers take separate sessions from a [`ConnectionPool`].
//!
//! [`reparent`]: Transport::reparent

pub mod auth;
pub mod editor;
pub mod memory;
pub mod pool;

pub use auth::{
    CredentialChain, CredentialProvider, Credentials, EnvCredentialProvider,
    StaticUsernameProvider,
};
pub use editor::{BatonTracker, CommitEditor, DirectoryBaton, Editor, FileBaton};
pub use memory::{MemoryConnector, MemoryRepository, MemoryTransport};
pub use pool::{ConnectionPool, Connector, PooledConnection};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::{RepositoryUuid, RevNum};
use crate::core::{BridgeError, Result};
use crate::layout::PathLister;

/// Node or revision properties.
pub type PropMap = BTreeMap<String, String>;

/// Callback invoked once a commit editor has committed.
pub type CommitCallback = Box<dyn FnOnce(&CommitInfo) + Send>;

/// Kind of node at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    None,
    File,
    Dir,
}

/// Source of a copy: a repository-root-relative path at a revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyFrom {
    pub path: String,
    pub revnum: RevNum,
}

impl CopyFrom {
    pub fn new(path: impl Into<String>, revnum: RevNum) -> Self {
        Self {
            path: path.into().trim_matches('/').to_string(),
            revnum,
        }
    }
}

impl fmt::Display for CopyFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.revnum)
    }
}

/// What a revision did to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    #[serde(rename = "A")]
    Add,
    #[serde(rename = "D")]
    Delete,
    #[serde(rename = "R")]
    Replace,
    #[serde(rename = "M")]
    Modify,
}

impl ChangeAction {
    pub fn as_char(self) -> char {
        match self {
            Self::Add => 'A',
            Self::Delete => 'D',
            Self::Replace => 'R',
            Self::Modify => 'M',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Add),
            'D' => Some(Self::Delete),
            'R' => Some(Self::Replace),
            'M' => Some(Self::Modify),
            _ => None,
        }
    }

    /// Whether the path gets a new node (added or replaced).
    pub fn creates_node(self) -> bool {
        matches!(self, Self::Add | Self::Replace)
    }
}

/// One changed-path record of a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub action: ChangeAction,
    pub copyfrom: Option<CopyFrom>,
}

impl ChangedPath {
    pub fn new(action: ChangeAction) -> Self {
        Self {
            action,
            copyfrom: None,
        }
    }

    pub fn copied(action: ChangeAction, from: CopyFrom) -> Self {
        Self {
            action,
            copyfrom: Some(from),
        }
    }
}

/// Changed paths of one revision, keyed by repository-root-relative path.
pub type ChangedPaths = BTreeMap<String, ChangedPath>;

/// One revision as reported by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub revnum: RevNum,
    /// Present only when changed paths were requested.
    pub changed_paths: Option<ChangedPaths>,
    pub revprops: PropMap,
}

/// A directory entry as listed by [`Transport::get_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub kind: NodeKind,
    pub size: u64,
    pub created_rev: RevNum,
}

/// Contents and properties of a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub entries: BTreeMap<String, DirEntry>,
    pub props: PropMap,
}

/// Optional server features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `replay` of a single revision.
    Replay,
    /// Arbitrary revision properties on commit.
    CommitRevprops,
    /// Changing revision properties after the fact.
    RevpropChanges,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replay => "replay",
            Self::CommitRevprops => "commit-revprops",
            Self::RevpropChanges => "revprop-changes",
        }
    }
}

/// Information about a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub revnum: RevNum,
    pub date: String,
    pub author: Option<String>,
}

/// One path of a switch/update report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Path relative to the switch target root.
    pub path: String,
    pub revnum: RevNum,
    /// The client has nothing at this path yet.
    pub start_empty: bool,
    /// Repository-root-relative path the client state actually comes from.
    pub link_path: Option<String>,
}

/// Description of the state a client already has, for switch and update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client has `path` at `revnum` of the session location.
    pub fn set_path(&mut self, path: &str, revnum: RevNum, start_empty: bool) -> &mut Self {
        self.entries.push(ReportEntry {
            path: path.trim_matches('/').to_string(),
            revnum,
            start_empty,
            link_path: None,
        });
        self
    }

    /// The client has `path` as it was at `link_path@revnum`.
    pub fn link_path(&mut self, path: &str, link_path: &str, revnum: RevNum) -> &mut Self {
        self.entries.push(ReportEntry {
            path: path.trim_matches('/').to_string(),
            revnum,
            start_empty: false,
            link_path: Some(link_path.trim_matches('/').to_string()),
        });
        self
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// The entry describing the target root.
    pub fn root(&self) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.path.is_empty())
    }
}

/// A session with the source repository.
pub trait Transport: Send {
    fn get_uuid(&self) -> Result<RepositoryUuid>;

    /// URL of the repository root.
    fn get_repos_root(&self) -> Result<String>;

    /// URL this session is anchored at.
    fn session_url(&self) -> &str;

    /// Move the session to another URL in the same repository.
    fn reparent(&mut self, url: &str) -> Result<()>;

    fn get_latest_revnum(&self) -> Result<RevNum>;

    fn check_path(&self, path: &str, revnum: RevNum) -> Result<NodeKind>;

    fn get_dir(&self, path: &str, revnum: RevNum) -> Result<DirListing>;

    /// Contents and properties of a file.
    fn get_file(&self, path: &str, revnum: RevNum) -> Result<(Vec<u8>, PropMap)>;

    /// Report log entries between `start` and `end` (either order) that
    /// touched any of `paths`. A `limit` of zero means no limit.
    fn get_log(
        &self,
        paths: &[String],
        start: RevNum,
        end: RevNum,
        limit: usize,
        discover_changed_paths: bool,
        callback: &mut dyn FnMut(LogEntry) -> Result<()>,
    ) -> Result<()>;

    fn rev_proplist(&self, revnum: RevNum) -> Result<PropMap>;

    fn change_rev_prop(&mut self, revnum: RevNum, name: &str, value: Option<&str>) -> Result<()>;

    fn has_capability(&self, capability: Capability) -> Result<bool>;

    /// Drive `editor` with the changes `revnum` made below the session URL.
    ///
    /// Copies whose source revision is below `low_water_mark` are sent as
    /// plain adds with full content.
    fn replay(
        &mut self,
        revnum: RevNum,
        low_water_mark: RevNum,
        send_deltas: bool,
        editor: &mut dyn Editor,
    ) -> Result<()>;

    /// Drive `editor` from the state in `report` to `target_path@revnum`.
    ///
    /// `target_path` is relative to the repository root.
    fn do_switch(
        &mut self,
        report: &Report,
        target_path: &str,
        revnum: RevNum,
        editor: &mut dyn Editor,
    ) -> Result<()>;

    /// Drive `editor` from the state in `report` to the session URL at
    /// `revnum`.
    fn do_update(&mut self, report: &Report, revnum: RevNum, editor: &mut dyn Editor) -> Result<()> {
        let root = self.get_repos_root()?;
        let target = url_relative_path(&root, self.session_url())?;
        self.do_switch(report, &target, revnum, editor)
    }

    /// Start an atomic commit at the session URL.
    fn get_commit_editor(
        &mut self,
        revprops: PropMap,
        callback: CommitCallback,
    ) -> Result<Box<dyn CommitEditor + '_>>;
}

/// Path of `url` below the repository root `root`.
pub fn url_relative_path(root: &str, url: &str) -> Result<String> {
    let root = root.trim_end_matches('/');
    let url = url.trim_end_matches('/');
    if url == root {
        return Ok(String::new());
    }
    url.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
        .ok_or_else(|| BridgeError::unsupported(format!("{url} is not inside repository {root}")))
}

/// Join a repository root URL and a path.
pub fn url_join(root: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        root.trim_end_matches('/').to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), path)
    }
}

/// Adapts a session to the [`PathLister`] interface used by layouts.
pub struct SessionLister<'a>(pub &'a dyn Transport);

impl PathLister for SessionLister<'_> {
    fn is_dir(&self, path: &str, revnum: RevNum) -> Result<bool> {
        Ok(self.0.check_path(path, revnum)? == NodeKind::Dir)
    }

    fn list_subdirs(&self, path: &str, revnum: RevNum) -> Result<Option<Vec<String>>> {
        match self.0.get_dir(path, revnum) {
            Ok(listing) => Ok(Some(
                listing
                    .entries
                    .into_iter()
                    .filter(|(_, entry)| entry.kind == NodeKind::Dir)
                    .map(|(name, _)| name)
                    .collect(),
            )),
            Err(BridgeError::PathNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_action_chars() {
        for action in [
            ChangeAction::Add,
            ChangeAction::Delete,
            ChangeAction::Replace,
            ChangeAction::Modify,
        ] {
            assert_eq!(ChangeAction::from_char(action.as_char()), Some(action));
        }
        assert_eq!(ChangeAction::from_char('X'), None);
        assert!(ChangeAction::Replace.creates_node());
        assert!(!ChangeAction::Modify.creates_node());
    }

    #[test]
    fn url_helpers() {
        assert_eq!(url_relative_path("mem://r", "mem://r").unwrap(), "");
        assert_eq!(url_relative_path("mem://r/", "mem://r/trunk/a").unwrap(), "trunk/a");
        assert!(url_relative_path("mem://r", "mem://rx/trunk").is_err());
        assert_eq!(url_join("mem://r", ""), "mem://r");
        assert_eq!(url_join("mem://r/", "/trunk/"), "mem://r/trunk");
    }

    #[test]
    fn report_root() {
        let mut report = Report::new();
        report.link_path("/", "trunk", 4);
        let root = report.root().unwrap();
        assert_eq!(root.link_path.as_deref(), Some("trunk"));
        assert_eq!(root.revnum, 4);
        assert!(Report::new().root().is_none());
    }
}
