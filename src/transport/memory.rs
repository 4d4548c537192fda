//! transport::memory
//!
//! A complete source repository held in memory.
//!
//! # Design
//!
//! Every revision is an immutable tree of `Arc`-shared nodes; a commit
//! copies only the nodes on the paths it touches, so unchanged subtrees are
//! shared between revisions. Each revision also records its changed paths
//! and revision properties, which is all the log needs.
//!
//! History can be built directly with [`MemoryTxn`] (convenient in tests)
//! or through the commit editor returned by a session, which checks base
//! revisions the way a server does and commits atomically on `close_edit`.
//!
//! Optional capabilities can be switched off and individual operations can
//! be made to fail, so callers' fallback and error paths can be exercised.
//!
//! # Example
//!
//! ```
//! use svnbridge::transport::{MemoryRepository, NodeKind, Transport};
//!
//! let repo = MemoryRepository::new("mem://demo");
//! let mut txn = repo.begin("alice", "initial import");
//! txn.mkdir("trunk").unwrap();
//! txn.put_file("trunk/README", b"hi\n").unwrap();
//! assert_eq!(txn.commit().unwrap(), 1);
//!
//! let session = repo.open_session("mem://demo/trunk").unwrap();
//! assert_eq!(session.check_path("README", 1).unwrap(), NodeKind::File);
//! assert_eq!(session.get_file("README", 1).unwrap().0, b"hi\n");
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use super::auth::CredentialChain;
use super::editor::{BatonTracker, CommitEditor, DirectoryBaton, Editor, FileBaton};
use super::pool::Connector;
use super::{
    url_join, url_relative_path, Capability, ChangeAction, ChangedPath, ChangedPaths,
    CommitCallback, CommitInfo, CopyFrom, DirEntry, DirListing, LogEntry, NodeKind, PropMap,
    Report, Transport,
};
use crate::core::types::{RepositoryUuid, RevNum};
use crate::core::{BridgeError, Result};
use crate::delta::{delta_windows, md5_hex, pack_window, unpack_window, TxDeltaApplier};

/// Date format of `svn:date`.
pub const SVN_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir {
        children: BTreeMap<String, Arc<Node>>,
        props: PropMap,
        created_rev: RevNum,
    },
    File {
        content: Arc<Vec<u8>>,
        props: PropMap,
        created_rev: RevNum,
    },
}

impl Node {
    fn empty_dir(created_rev: RevNum) -> Self {
        Node::Dir {
            children: Default::default(),
            props: PropMap::new(),
            created_rev,
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Node::Dir { .. } => NodeKind::Dir,
            Node::File { .. } => NodeKind::File,
        }
    }

    fn props(&self) -> &PropMap {
        match self {
            Node::Dir { props, .. } | Node::File { props, .. } => props,
        }
    }

    fn props_mut(&mut self) -> &mut PropMap {
        match self {
            Node::Dir { props, .. } | Node::File { props, .. } => props,
        }
    }

    fn created_rev(&self) -> RevNum {
        match self {
            Node::Dir { created_rev, .. } | Node::File { created_rev, .. } => *created_rev,
        }
    }

    fn set_created_rev(&mut self, rev: RevNum) {
        match self {
            Node::Dir { created_rev, .. } | Node::File { created_rev, .. } => *created_rev = rev,
        }
    }

    fn content(&self) -> &[u8] {
        match self {
            Node::File { content, .. } => content,
            Node::Dir { .. } => &[],
        }
    }

    fn child(&self, name: &str) -> Option<&Arc<Node>> {
        match self {
            Node::Dir { children, .. } => children.get(name),
            Node::File { .. } => None,
        }
    }

    fn child_names(&self) -> Vec<&String> {
        match self {
            Node::Dir { children, .. } => children.keys().collect(),
            Node::File { .. } => Vec::new(),
        }
    }
}

/// Equal kind, properties and content, ignoring node history.
fn same_content(a: &Arc<Node>, b: &Arc<Node>) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (a.as_ref(), b.as_ref()) {
        (
            Node::File {
                content: ca,
                props: pa,
                ..
            },
            Node::File {
                content: cb,
                props: pb,
                ..
            },
        ) => pa == pb && ca == cb,
        (
            Node::Dir {
                children: ca,
                props: pa,
                ..
            },
            Node::Dir {
                children: cb,
                props: pb,
                ..
            },
        ) => {
            pa == pb
                && ca.len() == cb.len()
                && ca
                    .iter()
                    .zip(cb.iter())
                    .all(|((na, a), (nb, b))| na == nb && same_content(a, b))
        }
        _ => false,
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

fn join(base: &str, rel: &str) -> String {
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{rel}"),
    }
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

fn is_within(path: &str, root: &str) -> bool {
    root.is_empty() || path == root || path.starts_with(&format!("{root}/"))
}

fn lookup<'a>(root: &'a Arc<Node>, path: &str) -> Option<&'a Arc<Node>> {
    let mut node = root;
    for name in components(path) {
        node = node.child(name)?;
    }
    Some(node)
}

fn node_mut<'a>(root: &'a mut Arc<Node>, path: &str) -> Option<&'a mut Node> {
    let mut node = Arc::make_mut(root);
    for name in components(path) {
        node = match node {
            Node::Dir { children, .. } => Arc::make_mut(children.get_mut(name)?),
            Node::File { .. } => return None,
        };
    }
    Some(node)
}

fn insert_node(root: &mut Arc<Node>, path: &str, node: Arc<Node>) -> Result<()> {
    if path.is_empty() {
        *root = node;
        return Ok(());
    }
    let (parent, name) = split_parent(path);
    match node_mut(root, parent) {
        Some(Node::Dir { children, .. }) => {
            children.insert(name.to_string(), node);
            Ok(())
        }
        _ => Err(BridgeError::PathNotFound {
            path: parent.to_string(),
            revnum: 0,
        }),
    }
}

fn remove_node(root: &mut Arc<Node>, path: &str) -> bool {
    let (parent, name) = split_parent(path);
    match node_mut(root, parent) {
        Some(Node::Dir { children, .. }) => children.remove(name).is_some(),
        _ => false,
    }
}

/// Which operation an injected failure hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// `get_log` fails after delivering this many entries.
    GetLog { after: usize },
    /// `get_log` stops without error after this many entries.
    ShortLog { after: usize },
    /// `replay` fails before driving the editor.
    Replay,
    /// A commit editor's `close_edit` fails without committing.
    Commit,
    /// `change_rev_prop` fails.
    ChangeRevProp,
}

fn injected(what: &str) -> BridgeError {
    BridgeError::Internal(format!("injected failure in {what}"))
}

#[derive(Debug, Clone)]
struct RevisionState {
    root: Arc<Node>,
    revprops: PropMap,
    changes: ChangedPaths,
}

#[derive(Debug)]
struct RepoInner {
    uuid: RepositoryUuid,
    root_url: String,
    revisions: Vec<RevisionState>,
    replay: bool,
    commit_revprops: bool,
    revprop_changes: bool,
    fail_on: Option<FailOn>,
    sessions_opened: usize,
}

impl RepoInner {
    fn head(&self) -> RevNum {
        (self.revisions.len() - 1) as RevNum
    }

    fn revision(&self, revnum: RevNum) -> Result<&RevisionState> {
        usize::try_from(revnum)
            .ok()
            .and_then(|i| self.revisions.get(i))
            .ok_or(BridgeError::NoSuchRevision { revnum })
    }
}

/// An in-memory repository shared by all of its sessions.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    inner: Arc<Mutex<RepoInner>>,
}

impl MemoryRepository {
    /// A new repository with a random UUID and an empty revision 0.
    pub fn new(root_url: &str) -> Self {
        Self::with_uuid(root_url, RepositoryUuid::generate())
    }

    pub fn with_uuid(root_url: &str, uuid: RepositoryUuid) -> Self {
        let mut revprops = PropMap::new();
        revprops.insert("svn:date".into(), Utc::now().format(SVN_DATE_FORMAT).to_string());
        let rev0 = RevisionState {
            root: Arc::new(Node::empty_dir(0)),
            revprops,
            changes: ChangedPaths::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(RepoInner {
                uuid,
                root_url: root_url.trim_end_matches('/').to_string(),
                revisions: vec![rev0],
                replay: true,
                commit_revprops: true,
                revprop_changes: true,
                fail_on: None,
                sessions_opened: 0,
            })),
        }
    }

    pub fn uuid(&self) -> RepositoryUuid {
        self.inner.lock().uuid.clone()
    }

    pub fn root_url(&self) -> String {
        self.inner.lock().root_url.clone()
    }

    pub fn latest_revnum(&self) -> RevNum {
        self.inner.lock().head()
    }

    /// Switch an optional capability on or off.
    pub fn set_capability(&self, capability: Capability, enabled: bool) {
        let mut inner = self.inner.lock();
        match capability {
            Capability::Replay => inner.replay = enabled,
            Capability::CommitRevprops => inner.commit_revprops = enabled,
            Capability::RevpropChanges => inner.revprop_changes = enabled,
        }
    }

    pub fn set_fail_on(&self, fail_on: FailOn) {
        self.inner.lock().fail_on = Some(fail_on);
    }

    pub fn clear_fail_on(&self) {
        self.inner.lock().fail_on = None;
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.inner.lock().sessions_opened
    }

    /// Open a session at `url`, which must lie inside this repository.
    pub fn open_session(&self, url: &str) -> Result<MemoryTransport> {
        let root_url = {
            let mut inner = self.inner.lock();
            inner.sessions_opened += 1;
            inner.root_url.clone()
        };
        let path = url_relative_path(&root_url, url)?;
        Ok(MemoryTransport {
            repo: self.clone(),
            url: url_join(&root_url, &path),
            path,
            username: None,
        })
    }

    /// Start building a revision directly.
    pub fn begin(&self, author: &str, message: &str) -> MemoryTxn {
        let mut txn = MemoryTxn::new(self.clone(), Some(author.to_string()));
        txn.revprops.insert("svn:log".into(), message.to_string());
        txn
    }

    /// Contents of a file, for assertions.
    pub fn cat(&self, path: &str, revnum: RevNum) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        match lookup(&inner.revision(revnum)?.root, path).map(|n| n.as_ref()) {
            Some(Node::File { content, .. }) => Ok(content.to_vec()),
            _ => Err(BridgeError::PathNotFound {
                path: path.to_string(),
                revnum,
            }),
        }
    }

    /// Every path in the tree at `revnum` with its kind, sorted.
    pub fn tree_paths(&self, revnum: RevNum) -> Result<Vec<(String, NodeKind)>> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        let mut stack = vec![(String::new(), Arc::clone(&inner.revision(revnum)?.root))];
        while let Some((path, node)) = stack.pop() {
            if let Node::Dir { children, .. } = node.as_ref() {
                for (name, child) in children {
                    let child_path = join(&path, name);
                    out.push((child_path.clone(), child.kind()));
                    stack.push((child_path, Arc::clone(child)));
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn changed_paths(&self, revnum: RevNum) -> Result<ChangedPaths> {
        Ok(self.inner.lock().revision(revnum)?.changes.clone())
    }

    pub fn revprops(&self, revnum: RevNum) -> Result<PropMap> {
        Ok(self.inner.lock().revision(revnum)?.revprops.clone())
    }

    fn created_rev_at_head(&self, path: &str) -> Option<RevNum> {
        let inner = self.inner.lock();
        let head = inner.revisions.last()?;
        lookup(&head.root, path).map(|n| n.created_rev())
    }

    fn snapshot_roots(&self) -> Vec<Arc<Node>> {
        self.inner
            .lock()
            .revisions
            .iter()
            .map(|r| Arc::clone(&r.root))
            .collect()
    }

    fn should_fail(&self, matches: impl Fn(&FailOn) -> bool) -> bool {
        let inner = self.inner.lock();
        inner.fail_on.as_ref().map_or(false, matches)
    }
}

/// A revision under construction.
#[derive(Debug)]
pub struct MemoryTxn {
    repo: MemoryRepository,
    base_rev: RevNum,
    root: Arc<Node>,
    changes: ChangedPaths,
    revprops: PropMap,
}

impl MemoryTxn {
    fn new(repo: MemoryRepository, author: Option<String>) -> Self {
        let (base_rev, root) = {
            let inner = repo.inner.lock();
            let head = inner.head();
            (head, Arc::clone(&inner.revisions[head as usize].root))
        };
        let mut revprops = PropMap::new();
        if let Some(author) = author {
            revprops.insert("svn:author".into(), author);
        }
        Self {
            repo,
            base_rev,
            root,
            changes: ChangedPaths::new(),
            revprops,
        }
    }

    pub fn base_revnum(&self) -> RevNum {
        self.base_rev
    }

    fn kind_of(&self, path: &str) -> NodeKind {
        lookup(&self.root, path).map_or(NodeKind::None, |n| n.kind())
    }

    fn require_absent(&self, path: &str) -> Result<()> {
        if self.kind_of(path) != NodeKind::None {
            return Err(BridgeError::OutOfDate {
                path: path.to_string(),
                base_revnum: self.base_rev,
            });
        }
        let (parent, _) = split_parent(path);
        if self.kind_of(parent) != NodeKind::Dir {
            return Err(BridgeError::PathNotFound {
                path: parent.to_string(),
                revnum: self.base_rev,
            });
        }
        Ok(())
    }

    fn record_add(&mut self, path: &str, copyfrom: Option<CopyFrom>) {
        let action = match self.changes.get(path) {
            Some(c) if c.action == ChangeAction::Delete => ChangeAction::Replace,
            _ => ChangeAction::Add,
        };
        self.changes
            .insert(path.to_string(), ChangedPath { action, copyfrom });
    }

    fn record_modify(&mut self, path: &str) {
        self.changes
            .entry(path.to_string())
            .or_insert_with(|| ChangedPath::new(ChangeAction::Modify));
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let path = path.trim_matches('/');
        self.require_absent(path)?;
        insert_node(&mut self.root, path, Arc::new(Node::empty_dir(0)))?;
        self.record_add(path, None);
        Ok(())
    }

    /// Create or overwrite a file.
    pub fn put_file(&mut self, path: &str, content: &[u8]) -> Result<()> {
        let path = path.trim_matches('/');
        match self.kind_of(path) {
            NodeKind::File => {
                if let Some(Node::File { content: old, .. }) = node_mut(&mut self.root, path) {
                    if old.as_slice() != content {
                        *old = Arc::new(content.to_vec());
                        self.record_modify(path);
                    }
                }
                Ok(())
            }
            NodeKind::Dir => Err(BridgeError::OutOfDate {
                path: path.to_string(),
                base_revnum: self.base_rev,
            }),
            NodeKind::None => {
                self.require_absent(path)?;
                let node = Node::File {
                    content: Arc::new(content.to_vec()),
                    props: PropMap::new(),
                    created_rev: 0,
                };
                insert_node(&mut self.root, path, Arc::new(node))?;
                self.record_add(path, None);
                Ok(())
            }
        }
    }

    /// Copy `src@src_rev` to `dst`.
    pub fn copy(&mut self, src: &str, src_rev: RevNum, dst: &str) -> Result<()> {
        let src = src.trim_matches('/');
        let dst = dst.trim_matches('/');
        let node = {
            let inner = self.repo.inner.lock();
            lookup(&inner.revision(src_rev)?.root, src)
                .cloned()
                .ok_or_else(|| BridgeError::PathNotFound {
                    path: src.to_string(),
                    revnum: src_rev,
                })?
        };
        self.require_absent(dst)?;
        insert_node(&mut self.root, dst, node)?;
        self.record_add(dst, Some(CopyFrom::new(src, src_rev)));
        Ok(())
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        let path = path.trim_matches('/');
        if path.is_empty() || !remove_node(&mut self.root, path) {
            return Err(BridgeError::PathNotFound {
                path: path.to_string(),
                revnum: self.base_rev,
            });
        }
        let prefix = format!("{path}/");
        self.changes.retain(|p, _| !p.starts_with(&prefix));
        match self.changes.get(path).map(|c| c.action) {
            Some(ChangeAction::Add) => {
                self.changes.remove(path);
            }
            _ => {
                self.changes
                    .insert(path.to_string(), ChangedPath::new(ChangeAction::Delete));
            }
        }
        Ok(())
    }

    /// Set or remove a node property.
    pub fn set_prop(&mut self, path: &str, name: &str, value: Option<&str>) -> Result<()> {
        let path = path.trim_matches('/');
        let node = node_mut(&mut self.root, path).ok_or_else(|| BridgeError::PathNotFound {
            path: path.to_string(),
            revnum: self.base_rev,
        })?;
        let props = node.props_mut();
        let changed = match value {
            Some(v) => props.insert(name.to_string(), v.to_string()).as_deref() != Some(v),
            None => props.remove(name).is_some(),
        };
        if changed {
            self.record_modify(path);
        }
        Ok(())
    }

    pub fn set_revprop(&mut self, name: &str, value: &str) {
        self.revprops.insert(name.to_string(), value.to_string());
    }

    fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        match lookup(&self.root, path).map(|n| n.as_ref()) {
            Some(Node::File { content, .. }) => Some(content.to_vec()),
            _ => None,
        }
    }

    /// Commit and return the new revision number.
    pub fn commit(self) -> Result<RevNum> {
        Ok(self.commit_with_info()?.revnum)
    }

    fn commit_with_info(self) -> Result<CommitInfo> {
        let mut inner = self.repo.inner.lock();
        let head = inner.head();
        if head != self.base_rev {
            for later in (self.base_rev + 1)..=head {
                let state = inner.revision(later)?;
                for theirs in state.changes.keys() {
                    if let Some(ours) = self
                        .changes
                        .keys()
                        .find(|ours| is_within(ours, theirs) || is_within(theirs, ours))
                    {
                        return Err(BridgeError::OutOfDate {
                            path: ours.clone(),
                            base_revnum: self.base_rev,
                        });
                    }
                }
            }
        }

        let new_rev = head + 1;
        let mut root = Arc::clone(&inner.revision(head)?.root);
        for (path, change) in &self.changes {
            if change.action == ChangeAction::Delete {
                remove_node(&mut root, path);
                continue;
            }
            let node = lookup(&self.root, path)
                .cloned()
                .ok_or_else(|| BridgeError::Internal(format!("lost node for {path}")))?;
            insert_node(&mut root, path, node)?;
        }
        for (path, change) in &self.changes {
            let mut stamp = vec![String::new()];
            let mut prefix = String::new();
            let parts: Vec<&str> = components(path).collect();
            let upto = if change.action == ChangeAction::Delete {
                parts.len().saturating_sub(1)
            } else {
                parts.len()
            };
            for part in &parts[..upto] {
                prefix = join(&prefix, part);
                stamp.push(prefix.clone());
            }
            for p in stamp {
                if let Some(node) = node_mut(&mut root, &p) {
                    node.set_created_rev(new_rev);
                }
            }
        }

        let date = Utc::now().format(SVN_DATE_FORMAT).to_string();
        let mut revprops = self.revprops;
        revprops.insert("svn:date".into(), date.clone());
        let author = revprops.get("svn:author").cloned();
        debug!(revnum = new_rev, changes = self.changes.len(), "committed revision");
        inner.revisions.push(RevisionState {
            root,
            revprops,
            changes: self.changes,
        });
        Ok(CommitInfo {
            revnum: new_rev,
            date,
            author,
        })
    }
}

/// Opens sessions on registered memory repositories.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    repos: Vec<MemoryRepository>,
    credentials: Option<Arc<CredentialChain>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, repo: MemoryRepository) -> Self {
        self.repos.push(repo);
        self
    }

    /// Authenticate new sessions through `chain`.
    pub fn with_credentials(mut self, chain: CredentialChain) -> Self {
        self.credentials = Some(Arc::new(chain));
        self
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let url = url.trim_end_matches('/');
        let repo = self
            .repos
            .iter()
            .find(|r| is_within(url, &r.root_url()))
            .ok_or_else(|| BridgeError::unsupported(format!("no repository serves {url}")))?;
        let mut session = repo.open_session(url)?;
        if let Some(chain) = &self.credentials {
            session.username = chain
                .first_credentials(&repo.root_url())
                .map(|c| c.username);
        }
        Ok(Box::new(session))
    }
}

/// A session on a [`MemoryRepository`].
#[derive(Debug)]
pub struct MemoryTransport {
    repo: MemoryRepository,
    url: String,
    path: String,
    username: Option<String>,
}

impl MemoryTransport {
    pub fn repository(&self) -> &MemoryRepository {
        &self.repo
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    fn full_path(&self, rel: &str) -> String {
        join(&self.path, rel.trim_matches('/'))
    }

    fn node_at(&self, path: &str, revnum: RevNum) -> Result<Option<Arc<Node>>> {
        let inner = self.repo.inner.lock();
        Ok(lookup(&inner.revision(revnum)?.root, &self.full_path(path)).cloned())
    }
}

impl Transport for MemoryTransport {
    fn get_uuid(&self) -> Result<RepositoryUuid> {
        Ok(self.repo.uuid())
    }

    fn get_repos_root(&self) -> Result<String> {
        Ok(self.repo.root_url())
    }

    fn session_url(&self) -> &str {
        &self.url
    }

    fn reparent(&mut self, url: &str) -> Result<()> {
        let root = self.repo.root_url();
        self.path = url_relative_path(&root, url)?;
        self.url = url_join(&root, &self.path);
        Ok(())
    }

    fn get_latest_revnum(&self) -> Result<RevNum> {
        Ok(self.repo.latest_revnum())
    }

    fn check_path(&self, path: &str, revnum: RevNum) -> Result<NodeKind> {
        Ok(self.node_at(path, revnum)?.map_or(NodeKind::None, |n| n.kind()))
    }

    fn get_dir(&self, path: &str, revnum: RevNum) -> Result<DirListing> {
        match self.node_at(path, revnum)?.as_deref() {
            Some(Node::Dir {
                children, props, ..
            }) => Ok(DirListing {
                entries: children
                    .iter()
                    .map(|(name, child)| {
                        let entry = DirEntry {
                            kind: child.kind(),
                            size: child.content().len() as u64,
                            created_rev: child.created_rev(),
                        };
                        (name.clone(), entry)
                    })
                    .collect(),
                props: props.clone(),
            }),
            _ => Err(BridgeError::PathNotFound {
                path: self.full_path(path),
                revnum,
            }),
        }
    }

    fn get_file(&self, path: &str, revnum: RevNum) -> Result<(Vec<u8>, PropMap)> {
        match self.node_at(path, revnum)?.as_deref() {
            Some(Node::File { content, props, .. }) => Ok((content.to_vec(), props.clone())),
            _ => Err(BridgeError::PathNotFound {
                path: self.full_path(path),
                revnum,
            }),
        }
    }

    fn get_log(
        &self,
        paths: &[String],
        start: RevNum,
        end: RevNum,
        limit: usize,
        discover_changed_paths: bool,
        callback: &mut dyn FnMut(LogEntry) -> Result<()>,
    ) -> Result<()> {
        let prefixes: Vec<String> = if paths.is_empty() {
            vec![self.path.clone()]
        } else {
            paths.iter().map(|p| self.full_path(p)).collect()
        };
        let (entries, cut) = {
            let inner = self.repo.inner.lock();
            let head = inner.head();
            for bound in [start, end] {
                if bound > head {
                    return Err(BridgeError::NoSuchRevision { revnum: bound });
                }
            }
            let revnums: Vec<RevNum> = if start <= end {
                (start..=end).collect()
            } else {
                (end..=start).rev().collect()
            };
            let mut entries = Vec::new();
            for revnum in revnums {
                let state = inner.revision(revnum)?;
                // the root log lists every revision, empty ones included
                let touched = prefixes.iter().any(String::is_empty)
                    || state
                        .changes
                        .keys()
                        .any(|c| prefixes.iter().any(|p| is_within(c, p)));
                if !touched {
                    continue;
                }
                entries.push(LogEntry {
                    revnum,
                    changed_paths: discover_changed_paths.then(|| state.changes.clone()),
                    revprops: state.revprops.clone(),
                });
                if limit > 0 && entries.len() == limit {
                    break;
                }
            }
            let cut = match inner.fail_on {
                Some(FailOn::GetLog { after }) => Some((after, true)),
                Some(FailOn::ShortLog { after }) => Some((after, false)),
                _ => None,
            };
            (entries, cut)
        };
        for (delivered, entry) in entries.into_iter().enumerate() {
            match cut {
                Some((after, true)) if after == delivered => return Err(injected("get_log")),
                Some((after, false)) if after == delivered => return Ok(()),
                _ => {}
            }
            callback(entry)?;
        }
        Ok(())
    }

    fn rev_proplist(&self, revnum: RevNum) -> Result<PropMap> {
        self.repo.revprops(revnum)
    }

    fn change_rev_prop(&mut self, revnum: RevNum, name: &str, value: Option<&str>) -> Result<()> {
        let mut inner = self.repo.inner.lock();
        if !inner.revprop_changes {
            return Err(BridgeError::unsupported("changing revision properties"));
        }
        if inner.fail_on == Some(FailOn::ChangeRevProp) {
            return Err(injected("change_rev_prop"));
        }
        let index = usize::try_from(revnum)
            .ok()
            .filter(|i| *i < inner.revisions.len())
            .ok_or(BridgeError::NoSuchRevision { revnum })?;
        let props = &mut inner.revisions[index].revprops;
        match value {
            Some(v) => props.insert(name.to_string(), v.to_string()),
            None => props.remove(name),
        };
        Ok(())
    }

    fn has_capability(&self, capability: Capability) -> Result<bool> {
        let inner = self.repo.inner.lock();
        Ok(match capability {
            Capability::Replay => inner.replay,
            Capability::CommitRevprops => inner.commit_revprops,
            Capability::RevpropChanges => inner.revprop_changes,
        })
    }

    fn replay(
        &mut self,
        revnum: RevNum,
        low_water_mark: RevNum,
        send_deltas: bool,
        editor: &mut dyn Editor,
    ) -> Result<()> {
        if !self.has_capability(Capability::Replay)? {
            return Err(BridgeError::unsupported("replay"));
        }
        if self.repo.should_fail(|f| *f == FailOn::Replay) {
            return Err(injected("replay"));
        }
        if revnum == 0 {
            return Err(BridgeError::NoSuchRevision { revnum });
        }
        let roots = self.repo.snapshot_roots();
        let changes = self.repo.changed_paths(revnum)?;
        let new = lookup(&roots[revnum as usize], &self.path).cloned();
        let base = match changes.get(&self.path) {
            Some(change) if change.action.creates_node() => change
                .copyfrom
                .as_ref()
                .filter(|cf| cf.revnum >= low_water_mark)
                .and_then(|cf| lookup(&roots[cf.revnum as usize], &cf.path).cloned()),
            _ => lookup(&roots[(revnum - 1) as usize], &self.path).cloned(),
        };
        debug!(revnum, low_water_mark, path = %self.path, "replaying revision");
        let mut driver = DeltaDriver {
            editor,
            session_path: self.path.clone(),
            changes,
            use_copies: true,
            low_water_mark,
            roots,
            send_deltas,
            base_revnum: Some(revnum - 1),
        };
        driver.run(base.as_ref(), new.as_ref())
    }

    fn do_switch(
        &mut self,
        report: &Report,
        target_path: &str,
        revnum: RevNum,
        editor: &mut dyn Editor,
    ) -> Result<()> {
        let entry = report
            .root()
            .ok_or_else(|| BridgeError::protocol("switch report has no root entry"))?;
        let roots = self.repo.snapshot_roots();
        for rev in [entry.revnum, revnum] {
            if rev as usize >= roots.len() {
                return Err(BridgeError::NoSuchRevision { revnum: rev });
            }
        }
        let target_path = target_path.trim_matches('/');
        let new = lookup(&roots[revnum as usize], target_path)
            .cloned()
            .ok_or_else(|| BridgeError::PathNotFound {
                path: target_path.to_string(),
                revnum,
            })?;
        let base = if entry.start_empty {
            None
        } else {
            let from = entry.link_path.as_deref().unwrap_or(&self.path);
            lookup(&roots[entry.revnum as usize], from).cloned()
        };
        debug!(revnum, target = target_path, base_revnum = entry.revnum, "switching");
        editor.set_target_revision(revnum)?;
        let mut driver = DeltaDriver {
            editor,
            session_path: target_path.to_string(),
            changes: ChangedPaths::new(),
            use_copies: false,
            low_water_mark: revnum,
            roots,
            send_deltas: true,
            base_revnum: Some(entry.revnum),
        };
        driver.run(base.as_ref(), Some(&new))
    }

    fn get_commit_editor(
        &mut self,
        revprops: PropMap,
        callback: CommitCallback,
    ) -> Result<Box<dyn CommitEditor + '_>> {
        let custom = revprops.keys().any(|k| k != "svn:log");
        if custom && !self.has_capability(Capability::CommitRevprops)? {
            return Err(BridgeError::unsupported(
                "custom revision properties on commit",
            ));
        }
        let mut txn = MemoryTxn::new(self.repo.clone(), self.username.clone());
        for (name, value) in revprops {
            if name != "svn:author" && name != "svn:date" {
                txn.revprops.insert(name, value);
            }
        }
        Ok(Box::new(MemoryCommitEditor {
            repo: self.repo.clone(),
            session_path: self.path.clone(),
            txn: Some(txn),
            tracker: BatonTracker::new(),
            dirs: HashMap::new(),
            file: None,
            callback: Some(callback),
        }))
    }
}

/// Drives an editor with the difference between two trees.
struct DeltaDriver<'e> {
    editor: &'e mut dyn Editor,
    session_path: String,
    changes: ChangedPaths,
    use_copies: bool,
    low_water_mark: RevNum,
    roots: Vec<Arc<Node>>,
    send_deltas: bool,
    base_revnum: Option<RevNum>,
}

impl DeltaDriver<'_> {
    fn run(&mut self, base: Option<&Arc<Node>>, new: Option<&Arc<Node>>) -> Result<()> {
        let result = self.drive(base, new);
        if result.is_err() {
            let _ = self.editor.abort_edit();
        }
        result
    }

    fn drive(&mut self, base: Option<&Arc<Node>>, new: Option<&Arc<Node>>) -> Result<()> {
        let root = self.editor.open_root(self.base_revnum)?;
        if let Some(new) = new {
            self.diff_dir(root, "", base, new)?;
        }
        self.editor.close_directory(root)?;
        self.editor.close_edit()
    }

    fn diff_props(
        &mut self,
        base: Option<&PropMap>,
        new: &PropMap,
        mut set: impl FnMut(&mut dyn Editor, &str, Option<&str>) -> Result<()>,
    ) -> Result<()> {
        let empty = PropMap::new();
        let base = base.unwrap_or(&empty);
        for (name, value) in new {
            if base.get(name) != Some(value) {
                set(&mut *self.editor, name, Some(value))?;
            }
        }
        for name in base.keys() {
            if !new.contains_key(name) {
                set(&mut *self.editor, name, None)?;
            }
        }
        Ok(())
    }

    fn diff_dir(
        &mut self,
        baton: DirectoryBaton,
        rel: &str,
        base: Option<&Arc<Node>>,
        new: &Arc<Node>,
    ) -> Result<()> {
        self.diff_props(base.map(|b| b.props()), new.props(), |e, name, value| {
            e.change_dir_prop(baton, name, value)
        })?;
        let mut names: BTreeSet<String> = new.child_names().into_iter().cloned().collect();
        if let Some(base) = base {
            names.extend(base.child_names().into_iter().cloned());
        }
        for name in names {
            let child_rel = join(rel, &name);
            let repo_path = join(&self.session_path, &child_rel);
            let change = self.changes.get(&repo_path).cloned();
            let old = base.and_then(|b| b.child(&name)).cloned();
            let cur = new.child(&name).cloned();
            match (old, cur) {
                (Some(_), None) => self.editor.delete_entry(&child_rel, self.base_revnum, baton)?,
                (None, Some(cur)) => self.add_node(baton, &child_rel, &cur, change.as_ref())?,
                (Some(old), Some(cur)) => {
                    let replaced = change
                        .as_ref()
                        .map_or(false, |c| c.action == ChangeAction::Replace)
                        || old.kind() != cur.kind();
                    if replaced {
                        self.editor.delete_entry(&child_rel, self.base_revnum, baton)?;
                        self.add_node(baton, &child_rel, &cur, change.as_ref())?;
                    } else if !same_content(&old, &cur) {
                        match cur.kind() {
                            NodeKind::Dir => {
                                let dir =
                                    self.editor
                                        .open_directory(&child_rel, baton, self.base_revnum)?;
                                self.diff_dir(dir, &child_rel, Some(&old), &cur)?;
                                self.editor.close_directory(dir)?;
                            }
                            _ => {
                                let file =
                                    self.editor.open_file(&child_rel, baton, self.base_revnum)?;
                                self.diff_file(file, Some(&old), &cur)?;
                            }
                        }
                    }
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn copy_source(&self, change: Option<&ChangedPath>, kind: NodeKind) -> Option<(CopyFrom, Arc<Node>)> {
        if !self.use_copies {
            return None;
        }
        let from = change?.copyfrom.as_ref()?;
        if from.revnum < self.low_water_mark || !is_within(&from.path, &self.session_path) {
            return None;
        }
        let node = lookup(self.roots.get(from.revnum as usize)?, &from.path)?;
        (node.kind() == kind).then(|| (from.clone(), Arc::clone(node)))
    }

    fn add_node(
        &mut self,
        parent: DirectoryBaton,
        rel: &str,
        node: &Arc<Node>,
        change: Option<&ChangedPath>,
    ) -> Result<()> {
        let copy = self.copy_source(change, node.kind());
        let copyfrom = copy.as_ref().map(|(from, _)| from);
        let copy_base = copy.as_ref().map(|(_, base)| base);
        match node.kind() {
            NodeKind::Dir => {
                let dir = self.editor.add_directory(rel, parent, copyfrom)?;
                self.diff_dir(dir, rel, copy_base, node)?;
                self.editor.close_directory(dir)
            }
            _ => {
                let file = self.editor.add_file(rel, parent, copyfrom)?;
                self.diff_file(file, copy_base, node)
            }
        }
    }

    fn diff_file(&mut self, file: FileBaton, base: Option<&Arc<Node>>, new: &Arc<Node>) -> Result<()> {
        self.diff_props(base.map(|b| b.props()), new.props(), |e, name, value| {
            e.change_file_prop(file, name, value)
        })?;
        let base_text = base.map_or(&[][..], |b| b.content());
        let text = new.content();
        if self.send_deltas && (base.is_none() || base_text != text) {
            let base_checksum = base.map(|_| md5_hex(base_text));
            self.editor.apply_textdelta(file, base_checksum.as_deref())?;
            for window in delta_windows(base_text, text) {
                // windows cross the session boundary in wire form
                let (window, _) = unpack_window(&pack_window(&window))?;
                self.editor.textdelta_window(file, Some(&window))?;
            }
            self.editor.textdelta_window(file, None)?;
        }
        self.editor.close_file(file, Some(&md5_hex(text)))
    }
}

struct OpenFile {
    baton: FileBaton,
    path: String,
    base: Vec<u8>,
    applier: Option<TxDeltaApplier>,
}

/// Commit editor of a [`MemoryTransport`] session.
struct MemoryCommitEditor {
    repo: MemoryRepository,
    session_path: String,
    txn: Option<MemoryTxn>,
    tracker: BatonTracker,
    dirs: HashMap<DirectoryBaton, String>,
    file: Option<OpenFile>,
    callback: Option<CommitCallback>,
}

impl MemoryCommitEditor {
    fn txn(&mut self) -> Result<&mut MemoryTxn> {
        self.txn
            .as_mut()
            .ok_or_else(|| BridgeError::protocol("commit editor already finished"))
    }

    fn dir_path(&self, dir: DirectoryBaton) -> Result<String> {
        self.dirs
            .get(&dir)
            .cloned()
            .ok_or_else(|| BridgeError::protocol(format!("unknown {dir}")))
    }

    fn open_file_mut(&mut self, file: FileBaton) -> Result<&mut OpenFile> {
        self.tracker.check_file(file)?;
        self.file
            .as_mut()
            .filter(|f| f.baton == file)
            .ok_or_else(|| BridgeError::protocol(format!("unknown {file}")))
    }

    fn check_up_to_date(&self, path: &str, revnum: Option<RevNum>) -> Result<()> {
        let (Some(base), Some(created)) = (revnum, self.repo.created_rev_at_head(path)) else {
            return Ok(());
        };
        if created > base {
            return Err(BridgeError::OutOfDate {
                path: path.to_string(),
                base_revnum: base,
            });
        }
        Ok(())
    }

    fn add_entry(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
        dir: bool,
    ) -> Result<String> {
        self.tracker.check_parent(parent)?;
        let full = join(&self.session_path, path.trim_matches('/'));
        let txn = self.txn()?;
        match (copyfrom, dir) {
            (Some(from), _) => txn.copy(&from.path, from.revnum, &full)?,
            (None, true) => txn.mkdir(&full)?,
            (None, false) => {
                txn.require_absent(&full)?;
                txn.put_file(&full, b"")?;
            }
        }
        Ok(full)
    }
}

impl Editor for MemoryCommitEditor {
    fn open_root(&mut self, _base_revnum: Option<RevNum>) -> Result<DirectoryBaton> {
        let path = self.session_path.clone();
        if self.txn()?.kind_of(&path) != NodeKind::Dir {
            return Err(BridgeError::PathNotFound {
                path,
                revnum: self.txn()?.base_rev,
            });
        }
        let baton = self.tracker.open_root()?;
        self.dirs.insert(baton, path);
        Ok(baton)
    }

    fn delete_entry(
        &mut self,
        path: &str,
        revnum: Option<RevNum>,
        parent: DirectoryBaton,
    ) -> Result<()> {
        self.tracker.check_parent(parent)?;
        let full = join(&self.session_path, path.trim_matches('/'));
        self.check_up_to_date(&full, revnum)?;
        self.txn()?.delete(&full)
    }

    fn add_directory(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
    ) -> Result<DirectoryBaton> {
        let full = self.add_entry(path, parent, copyfrom, true)?;
        let baton = self.tracker.open_dir(parent)?;
        self.dirs.insert(baton, full);
        Ok(baton)
    }

    fn open_directory(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        _base_revnum: Option<RevNum>,
    ) -> Result<DirectoryBaton> {
        self.tracker.check_parent(parent)?;
        let full = join(&self.session_path, path.trim_matches('/'));
        if self.txn()?.kind_of(&full) != NodeKind::Dir {
            return Err(BridgeError::PathNotFound {
                path: full,
                revnum: self.txn()?.base_rev,
            });
        }
        let baton = self.tracker.open_dir(parent)?;
        self.dirs.insert(baton, full);
        Ok(baton)
    }

    fn change_dir_prop(&mut self, dir: DirectoryBaton, name: &str, value: Option<&str>) -> Result<()> {
        self.tracker.check_dir(dir)?;
        let path = self.dir_path(dir)?;
        self.txn()?.set_prop(&path, name, value)
    }

    fn close_directory(&mut self, dir: DirectoryBaton) -> Result<()> {
        self.tracker.close_dir(dir)?;
        self.dirs.remove(&dir);
        Ok(())
    }

    fn add_file(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        copyfrom: Option<&CopyFrom>,
    ) -> Result<FileBaton> {
        let full = self.add_entry(path, parent, copyfrom, false)?;
        let base = self.txn()?.file_content(&full).unwrap_or_default();
        let baton = self.tracker.open_file(parent)?;
        self.file = Some(OpenFile {
            baton,
            path: full,
            base,
            applier: None,
        });
        Ok(baton)
    }

    fn open_file(
        &mut self,
        path: &str,
        parent: DirectoryBaton,
        base_revnum: Option<RevNum>,
    ) -> Result<FileBaton> {
        self.tracker.check_parent(parent)?;
        let full = join(&self.session_path, path.trim_matches('/'));
        self.check_up_to_date(&full, base_revnum)?;
        let base = self
            .txn()?
            .file_content(&full)
            .ok_or_else(|| BridgeError::PathNotFound {
                path: full.clone(),
                revnum: base_revnum.unwrap_or_default(),
            })?;
        let baton = self.tracker.open_file(parent)?;
        self.file = Some(OpenFile {
            baton,
            path: full,
            base,
            applier: None,
        });
        Ok(baton)
    }

    fn change_file_prop(&mut self, file: FileBaton, name: &str, value: Option<&str>) -> Result<()> {
        let path = self.open_file_mut(file)?.path.clone();
        self.txn()?.set_prop(&path, name, value)
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

    fn textdelta_window(&mut self, file: FileBaton, window: Option<&crate::delta::Window>) -> Result<()> {
        let open = self.open_file_mut(file)?;
        let applier = open
            .applier
            .as_mut()
            .ok_or_else(|| BridgeError::protocol("delta window before apply_textdelta"))?;
        applier.window(window)?;
        Ok(())
    }

    fn close_file(&mut self, file: FileBaton, checksum: Option<&str>) -> Result<()> {
        self.open_file_mut(file)?;
        self.tracker.close_file(file)?;
        let Some(open) = self.file.take() else {
            return Err(BridgeError::protocol(format!("unknown {file}")));
        };
        let text = match open.applier {
            Some(applier) if !applier.is_closed() => {
                return Err(BridgeError::protocol(format!(
                    "delta for '{}' was not terminated",
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
        self.txn()?.put_file(&open.path, &text)
    }

    fn close_edit(&mut self) -> Result<()> {
        self.tracker.finish()?;
        if self.repo.should_fail(|f| *f == FailOn::Commit) {
            self.txn = None;
            return Err(injected("commit"));
        }
        let txn = self
            .txn
            .take()
            .ok_or_else(|| BridgeError::protocol("commit editor already finished"))?;
        let info = txn.commit_with_info()?;
        if let Some(callback) = self.callback.take() {
            callback(&info);
        }
        Ok(())
    }

    fn abort_edit(&mut self) -> Result<()> {
        self.tracker.abort();
        self.txn = None;
        self.file = None;
        Ok(())
    }
}

impl CommitEditor for MemoryCommitEditor {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::delta::send_stream;

    fn sample() -> MemoryRepository {
        let repo = MemoryRepository::new("mem://r");
        let mut txn = repo.begin("alice", "layout");
        txn.mkdir("trunk").unwrap();
        txn.mkdir("branches").unwrap();
        txn.put_file("trunk/a", b"alpha").unwrap();
        txn.commit().unwrap();
        repo
    }

    /// Records editor calls as strings.
    #[derive(Default)]
    struct Recorder {
        tracker: BatonTracker,
        calls: Vec<String>,
        texts: HashMap<FileBaton, TxDeltaApplier>,
    }

    impl Editor for Recorder {
        fn open_root(&mut self, _base: Option<RevNum>) -> Result<DirectoryBaton> {
            self.calls.push("open_root".into());
            self.tracker.open_root()
        }
        fn delete_entry(&mut self, path: &str, _r: Option<RevNum>, p: DirectoryBaton) -> Result<()> {
            self.tracker.check_parent(p)?;
            self.calls.push(format!("delete {path}"));
            Ok(())
        }
        fn add_directory(
            &mut self,
            path: &str,
            p: DirectoryBaton,
            copyfrom: Option<&CopyFrom>,
        ) -> Result<DirectoryBaton> {
            self.calls.push(match copyfrom {
                Some(cf) => format!("add_dir {path} from {cf}"),
                None => format!("add_dir {path}"),
            });
            self.tracker.open_dir(p)
        }
        fn open_directory(&mut self, path: &str, p: DirectoryBaton, _r: Option<RevNum>) -> Result<DirectoryBaton> {
            self.calls.push(format!("open_dir {path}"));
            self.tracker.open_dir(p)
        }
        fn change_dir_prop(&mut self, _d: DirectoryBaton, name: &str, _v: Option<&str>) -> Result<()> {
            self.calls.push(format!("dir_prop {name}"));
            Ok(())
        }
        fn close_directory(&mut self, d: DirectoryBaton) -> Result<()> {
            self.tracker.close_dir(d)
        }
        fn add_file(&mut self, path: &str, p: DirectoryBaton, copyfrom: Option<&CopyFrom>) -> Result<FileBaton> {
            self.calls.push(match copyfrom {
                Some(cf) => format!("add_file {path} from {cf}"),
                None => format!("add_file {path}"),
            });
            let f = self.tracker.open_file(p)?;
            self.texts.insert(f, TxDeltaApplier::new(Vec::new()));
            Ok(f)
        }
        fn open_file(&mut self, path: &str, p: DirectoryBaton, _r: Option<RevNum>) -> Result<FileBaton> {
            self.calls.push(format!("open_file {path}"));
            let f = self.tracker.open_file(p)?;
            self.texts.insert(f, TxDeltaApplier::new(b"alpha".to_vec()));
            Ok(f)
        }
        fn change_file_prop(&mut self, _f: FileBaton, name: &str, _v: Option<&str>) -> Result<()> {
            self.calls.push(format!("file_prop {name}"));
            Ok(())
        }
        fn apply_textdelta(&mut self, _f: FileBaton, _c: Option<&str>) -> Result<()> {
            Ok(())
        }
        fn textdelta_window(&mut self, f: FileBaton, w: Option<&crate::delta::Window>) -> Result<()> {
            if let Some(applier) = self.texts.get_mut(&f) {
                applier.window(w)?;
            }
            Ok(())
        }
        fn close_file(&mut self, f: FileBaton, _c: Option<&str>) -> Result<()> {
            if let Some(applier) = self.texts.remove(&f) {
                if applier.is_closed() {
                    self.calls
                        .push(format!("text {}", String::from_utf8_lossy(&applier.finish())));
                }
            }
            self.tracker.close_file(f)
        }
        fn close_edit(&mut self) -> Result<()> {
            self.calls.push("close_edit".into());
            self.tracker.finish()
        }
        fn abort_edit(&mut self) -> Result<()> {
            self.calls.push("abort_edit".into());
            self.tracker.abort();
            Ok(())
        }
    }

    #[test]
    fn txn_records_changes_and_created_revs() {
        let repo = sample();
        let changes = repo.changed_paths(1).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes["trunk/a"].action, ChangeAction::Add);

        let mut txn = repo.begin("bob", "rename");
        txn.copy("trunk/a", 1, "trunk/b").unwrap();
        txn.delete("trunk/a").unwrap();
        assert_eq!(txn.commit().unwrap(), 2);
        let changes = repo.changed_paths(2).unwrap();
        assert_eq!(changes["trunk/b"].copyfrom, Some(CopyFrom::new("trunk/a", 1)));
        assert_eq!(changes["trunk/a"].action, ChangeAction::Delete);

        let session = repo.open_session("mem://r").unwrap();
        let listing = session.get_dir("trunk", 2).unwrap();
        assert_eq!(listing.entries["b"].created_rev, 2);
        let root = session.get_dir("", 2).unwrap();
        assert_eq!(root.entries["branches"].created_rev, 1);
        assert_eq!(repo.revprops(2).unwrap()["svn:author"], "bob");
    }

    #[test]
    fn tree_paths_are_sorted_with_kinds() {
        let repo = sample();
        let mut txn = repo.begin("bob", "more");
        txn.mkdir("trunk/sub").unwrap();
        txn.put_file("trunk/sub/z", b"z").unwrap();
        txn.commit().unwrap();
        assert_eq!(
            repo.tree_paths(2).unwrap(),
            vec![
                ("branches".to_string(), NodeKind::Dir),
                ("trunk".to_string(), NodeKind::Dir),
                ("trunk/a".to_string(), NodeKind::File),
                ("trunk/sub".to_string(), NodeKind::Dir),
                ("trunk/sub/z".to_string(), NodeKind::File),
            ]
        );
        assert!(NodeKind::None < NodeKind::File && NodeKind::File < NodeKind::Dir);
    }

    #[test]
    fn delete_then_add_is_replace() {
        let repo = sample();
        let mut txn = repo.begin("bob", "replace");
        txn.delete("trunk/a").unwrap();
        txn.put_file("trunk/a", b"new").unwrap();
        txn.commit().unwrap();
        assert_eq!(repo.changed_paths(2).unwrap()["trunk/a"].action, ChangeAction::Replace);
    }

    #[test]
    fn log_filters_by_path_and_orders() {
        let repo = sample();
        let mut txn = repo.begin("bob", "branch");
        txn.copy("trunk", 1, "branches/x").unwrap();
        txn.commit().unwrap();

        let session = repo.open_session("mem://r").unwrap();
        let mut seen = Vec::new();
        session
            .get_log(&["branches".into()], 2, 0, 0, true, &mut |e| {
                seen.push(e.revnum);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![2, 1]);

        let mut all = Vec::new();
        session
            .get_log(&[], 0, 2, 2, false, &mut |e| {
                assert!(e.changed_paths.is_none());
                all.push(e.revnum);
                Ok(())
            })
            .unwrap();
        assert_eq!(all, vec![0, 1]);

        let err = session.get_log(&[], 0, 9, 0, false, &mut |_| Ok(())).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn replay_sends_copies_above_low_water_mark() {
        let repo = sample();
        let mut txn = repo.begin("bob", "rename");
        txn.copy("trunk/a", 1, "trunk/b").unwrap();
        txn.delete("trunk/a").unwrap();
        txn.commit().unwrap();

        let mut session = repo.open_session("mem://r/trunk").unwrap();
        let mut rec = Recorder::default();
        session.replay(2, 1, true, &mut rec).unwrap();
        assert_eq!(
            rec.calls,
            vec!["open_root", "delete a", "add_file b from trunk/a@1", "close_edit"]
        );

        let mut rec = Recorder::default();
        session.replay(2, 2, true, &mut rec).unwrap();
        assert_eq!(
            rec.calls,
            vec!["open_root", "delete a", "add_file b", "text alpha", "close_edit"]
        );
    }

    #[test]
    fn replay_sends_real_deltas_for_modifications() {
        let repo = sample();
        let mut txn = repo.begin("bob", "edit");
        txn.put_file("trunk/a", b"alphabet").unwrap();
        txn.commit().unwrap();

        let mut session = repo.open_session("mem://r/trunk").unwrap();
        let mut rec = Recorder::default();
        session.replay(2, 1, true, &mut rec).unwrap();
        assert_eq!(rec.calls, vec!["open_root", "open_file a", "text alphabet", "close_edit"]);
    }

    #[test]
    fn replay_can_be_disabled() {
        let repo = sample();
        repo.set_capability(Capability::Replay, false);
        let mut session = repo.open_session("mem://r").unwrap();
        let err = session.replay(1, 0, true, &mut Recorder::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn switch_diffs_between_branches() {
        let repo = sample();
        let mut txn = repo.begin("bob", "branch");
        txn.copy("trunk", 1, "branches/x").unwrap();
        txn.put_file("branches/x/c", b"gamma").unwrap();
        txn.commit().unwrap();

        let mut session = repo.open_session("mem://r/branches/x").unwrap();
        let mut report = Report::new();
        report.link_path("", "trunk", 1);
        let mut rec = Recorder::default();
        session.do_switch(&report, "branches/x", 2, &mut rec).unwrap();
        assert_eq!(rec.calls, vec!["open_root", "add_file c", "text gamma", "close_edit"]);

        let mut empty = Report::new();
        empty.set_path("", 2, true);
        let mut rec = Recorder::default();
        session.do_update(&empty, 2, &mut rec).unwrap();
        assert_eq!(
            rec.calls,
            vec!["open_root", "add_file a", "text alpha", "add_file c", "text gamma", "close_edit"]
        );
    }

    fn send_text(editor: &mut dyn CommitEditor, file: FileBaton, text: &[u8]) -> String {
        editor.apply_textdelta(file, None).unwrap();
        send_stream::<_, BridgeError>(text, |w| editor.textdelta_window(file, w)).unwrap()
    }

    #[test]
    fn commit_editor_commits_atomically() {
        let repo = sample();
        let mut session = repo.open_session("mem://r").unwrap();
        session.set_username(Some("carol".into()));
        let committed = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&committed);
        {
            let mut editor = session
                .get_commit_editor(
                    PropMap::from([("svn:log".to_string(), "add foo".to_string())]),
                    Box::new(move |info| *slot.lock() = Some(info.clone())),
                )
                .unwrap();
            let root = editor.open_root(Some(1)).unwrap();
            let trunk = editor.open_directory("trunk", root, Some(1)).unwrap();
            let foo = editor.add_file("trunk/foo", trunk, None).unwrap();
            let md5 = send_text(editor.as_mut(), foo, b"hello");
            editor.close_file(foo, Some(&md5)).unwrap();
            editor.close_directory(trunk).unwrap();
            editor.close_directory(root).unwrap();
            assert_eq!(repo.latest_revnum(), 1);
            editor.close_edit().unwrap();
        }
        let info = committed.lock().clone().unwrap();
        assert_eq!(info.revnum, 2);
        assert_eq!(info.author.as_deref(), Some("carol"));
        assert_eq!(repo.cat("trunk/foo", 2).unwrap(), b"hello");
        assert_eq!(repo.revprops(2).unwrap()["svn:log"], "add foo");
    }

    #[test]
    fn commit_editor_detects_out_of_date_file() {
        let repo = sample();
        let mut txn = repo.begin("bob", "edit");
        txn.put_file("trunk/a", b"changed").unwrap();
        txn.commit().unwrap();

        let mut session = repo.open_session("mem://r").unwrap();
        let mut editor = session
            .get_commit_editor(PropMap::new(), Box::new(|_| {}))
            .unwrap();
        let root = editor.open_root(Some(1)).unwrap();
        let trunk = editor.open_directory("trunk", root, Some(1)).unwrap();
        let err = editor.open_file("trunk/a", trunk, Some(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfDate);
        editor.abort_edit().unwrap();
        assert_eq!(repo.latest_revnum(), 2);
    }

    #[test]
    fn aborted_edit_leaves_no_revision() {
        let repo = sample();
        let mut session = repo.open_session("mem://r").unwrap();
        let mut editor = session
            .get_commit_editor(PropMap::new(), Box::new(|_| {}))
            .unwrap();
        let root = editor.open_root(Some(1)).unwrap();
        editor.add_directory("tags", root, None).unwrap();
        editor.abort_edit().unwrap();
        assert_eq!(repo.latest_revnum(), 1);
        assert!(editor.close_edit().is_err());
    }

    #[test]
    fn custom_revprops_need_capability() {
        let repo = sample();
        repo.set_capability(Capability::CommitRevprops, false);
        let mut session = repo.open_session("mem://r").unwrap();
        let props = PropMap::from([("bzr:revision-id".to_string(), "x".to_string())]);
        let err = session
            .get_commit_editor(props, Box::new(|_| {}))
            .err()
            .unwrap();
        assert!(err.is_unsupported());
        assert!(session
            .get_commit_editor(PropMap::from([("svn:log".to_string(), "m".to_string())]), Box::new(|_| {}))
            .is_ok());
    }

    #[test]
    fn revprop_changes_and_injected_failures() {
        let repo = sample();
        let mut session = repo.open_session("mem://r").unwrap();
        session.change_rev_prop(1, "svn:author", Some("dave")).unwrap();
        assert_eq!(repo.revprops(1).unwrap()["svn:author"], "dave");

        repo.set_fail_on(FailOn::ChangeRevProp);
        assert!(session.change_rev_prop(1, "svn:author", Some("eve")).is_err());
        repo.clear_fail_on();

        repo.set_capability(Capability::RevpropChanges, false);
        assert!(session
            .change_rev_prop(1, "svn:author", Some("eve"))
            .unwrap_err()
            .is_unsupported());
    }

    #[test]
    fn concurrent_commits_merge_or_conflict() {
        let repo = sample();
        let mut first = repo.begin("a", "one");
        let mut second = repo.begin("b", "two");
        let mut third = repo.begin("c", "three");
        first.put_file("trunk/x", b"x").unwrap();
        second.put_file("trunk/y", b"y").unwrap();
        third.put_file("trunk/x", b"other").unwrap();
        first.commit().unwrap();
        second.commit().unwrap();
        assert_eq!(repo.cat("trunk/x", 3).unwrap(), b"x");
        assert_eq!(repo.cat("trunk/y", 3).unwrap(), b"y");
        assert_eq!(third.commit().unwrap_err().kind(), ErrorKind::OutOfDate);
    }

    #[test]
    fn reparent_stays_inside_repository() {
        let repo = sample();
        let mut session = repo.open_session("mem://r").unwrap();
        session.reparent("mem://r/trunk").unwrap();
        assert_eq!(session.session_url(), "mem://r/trunk");
        assert_eq!(session.check_path("a", 1).unwrap(), NodeKind::File);
        assert!(session.reparent("mem://elsewhere").is_err());
    }
}
