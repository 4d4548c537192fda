//! Shared fixtures for the integration tests.
//!
//! Every fixture runs against the in-memory repository, with the history
//! cache either disabled or placed in a temporary directory.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use svnbridge::commit::{CommitBuilder, Committed};
use svnbridge::core::config::{CacheSettings, Config, RepoConfig};
use svnbridge::core::types::{BranchPath, FileId, RevisionId};
use svnbridge::core::Result;
use svnbridge::fetch::FetchEngine;
use svnbridge::repository::SourceRepository;
use svnbridge::target::{
    EntryKind, Inventory, InventoryEntry, MemoryTargetRepository, TargetRepository, TextSource,
};
use svnbridge::transport::{MemoryConnector, MemoryRepository};

/// A source repository with a target to fetch into.
pub struct Bridge {
    pub dir: TempDir,
    pub repo: MemoryRepository,
    pub source: SourceRepository,
    pub target: MemoryTargetRepository,
}

impl Bridge {
    /// Open `repo` with the cache disabled and default repository settings.
    pub fn open(repo: MemoryRepository) -> Self {
        Self::with_config(repo, RepoConfig::default(), false)
    }

    /// Open `repo` with explicit repository settings.
    pub fn with_config(repo: MemoryRepository, repo_config: RepoConfig, cache: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.global.cache_dir = Some(dir.path().to_path_buf());
        config.global.cache = Some(CacheSettings {
            enabled: Some(cache),
            ..Default::default()
        });
        config.repo = Some(repo_config);
        let url = repo.root_url();
        let connector = MemoryConnector::new().with_repository(repo.clone());
        let source = SourceRepository::open(Arc::new(connector), &url, &config).unwrap();
        Self {
            dir,
            repo,
            source,
            target: MemoryTargetRepository::new(),
        }
    }

    /// Fetch `branch` into the bridge's own target.
    pub fn fetch(&self, branch: &str) -> (RevisionId, Arc<Inventory>) {
        fetch_into(&self.source, &self.target, branch, true)
    }

    /// Fetch `branch` into a new, empty target.
    pub fn fetch_fresh(&self, branch: &str, use_replay: bool) -> (MemoryTargetRepository, RevisionId, Arc<Inventory>) {
        let target = MemoryTargetRepository::new();
        let (tip, inv) = fetch_into(&self.source, &target, branch, use_replay);
        (target, tip, inv)
    }

    /// Store a text in the target, returning its hash.
    pub fn text(&self, content: &[u8]) -> String {
        self.target.start_write_group().unwrap();
        let sha = self.target.add_text(content).unwrap();
        self.target.commit_write_group().unwrap();
        sha
    }

    /// Commit `new` on top of `parent` (whose tree is `base`) to `branch`.
    pub fn commit(
        &self,
        branch: &str,
        parent: &RevisionId,
        base: &Inventory,
        new: &Inventory,
        message: &str,
    ) -> Result<Committed> {
        CommitBuilder::new(&self.source, BranchPath::new(branch).unwrap(), vec![parent.clone()])?
            .committer("tester")
            .commit(message, base, new, &self.target)
    }
}

pub fn fetch_into(
    source: &SourceRepository,
    target: &dyn TargetRepository,
    branch: &str,
    use_replay: bool,
) -> (RevisionId, Arc<Inventory>) {
    let mut engine = FetchEngine::new(source, target);
    if !use_replay {
        engine = engine.without_replay();
    }
    let (tip, _) = engine
        .fetch_branch(&BranchPath::new(branch).unwrap(), None)
        .unwrap();
    let inv = target.get_inventory(&tip).unwrap();
    (tip, inv)
}

/// A repository whose r1 creates `trunk`, `branches` and `tags`.
pub fn standard_repo(url: &str) -> MemoryRepository {
    let repo = MemoryRepository::new(url);
    let mut txn = repo.begin("admin", "Create layout");
    txn.mkdir("trunk").unwrap();
    txn.mkdir("branches").unwrap();
    txn.mkdir("tags").unwrap();
    txn.commit().unwrap();
    repo
}

pub fn fid(id: &str) -> FileId {
    FileId::new(id).unwrap()
}

/// Path to content of every file in `inv`.
pub fn files(target: &dyn TargetRepository, inv: &Inventory) -> BTreeMap<String, Vec<u8>> {
    inv.iter_entries()
        .into_iter()
        .filter(|(_, e)| e.kind == EntryKind::File)
        .map(|(path, e)| (path, target.text(e).unwrap()))
        .collect()
}

/// Add a file below the directory at `dir` (empty for the root).
pub fn add_file(bridge: &Bridge, inv: &mut Inventory, dir: &str, name: &str, id: &str, content: &[u8]) {
    let parent = inv.path2id(dir).unwrap();
    let sha = bridge.text(content);
    inv.add(InventoryEntry::file(
        fid(id),
        parent,
        name,
        RevisionId::null(),
        sha,
        content.len() as u64,
    ))
    .unwrap();
}

/// Add a directory below the directory at `dir`.
pub fn add_dir(inv: &mut Inventory, dir: &str, name: &str, id: &str) {
    let parent = inv.path2id(dir).unwrap();
    inv.add(InventoryEntry::directory(fid(id), Some(parent), name, RevisionId::null()))
        .unwrap();
}
