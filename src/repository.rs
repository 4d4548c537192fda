//! repository
//!
//! The source repository facade.
//!
//! [`SourceRepository`] owns everything the fetch and commit engines share
//! for one repository: the connection pool, the history walker (cached or
//! direct), the branch layout, the mapping registry and the revision
//! metadata provider.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use svnbridge::core::config::{CacheSettings, Config};
//! use svnbridge::repository::SourceRepository;
//! use svnbridge::transport::{MemoryConnector, MemoryRepository};
//!
//! let repo = MemoryRepository::new("mem://facade");
//! let mut txn = repo.begin("ann", "layout");
//! txn.mkdir("trunk").unwrap();
//! txn.commit().unwrap();
//!
//! let mut config = Config::default();
//! config.global.cache = Some(CacheSettings {
//!     enabled: Some(false),
//!     ..Default::default()
//! });
//! let source = SourceRepository::open(
//!     Arc::new(MemoryConnector::new().with_repository(repo)),
//!     "mem://facade",
//!     &config,
//! )
//! .unwrap();
//! assert_eq!(source.layout().name(), "trunk0");
//! let trunk = svnbridge::core::types::BranchPath::new("trunk").unwrap();
//! let revid = source.generate_revision_id(&trunk, 1).unwrap();
//! let (branch, revnum, _) = source.lookup_revision_id(&revid).unwrap();
//! assert_eq!((branch.as_str(), revnum), ("trunk", 1));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::core::config::{Config, ConfigError};
use crate::core::errors::{BridgeError, ErrorKind};
use crate::core::ops::lock::BranchLock;
use crate::core::types::{BranchPath, RepositoryUuid, RevNum, RevisionId};
use crate::core::Result;
use crate::history::{CacheOptions, DirectLogWalker, HistoryCache, LogWalker};
use crate::layout::{guess_layout, layout_from_name, PathLister, RepositoryLayout, WildcardLayout};
use crate::mapping::{MappingRegistry, MappingScheme};
use crate::revmeta::{RevmetaContext, RevmetaProvider, RevisionMetadata};
use crate::target::Revision;
use crate::transport::{
    url_join, ConnectionPool, Connector, NodeKind, PooledConnection, PropMap, SessionLister,
};

/// Custom revision ids found by scanning history, up to `scanned_to`.
#[derive(Default)]
struct RoundtripMap {
    scanned_to: RevNum,
    ids: HashMap<RevisionId, (BranchPath, RevNum)>,
}

/// One source repository, opened for fetching and pushing.
pub struct SourceRepository {
    pool: Arc<ConnectionPool>,
    root_url: String,
    uuid: RepositoryUuid,
    config: Config,
    walker: Arc<dyn LogWalker>,
    cache: Option<Arc<HistoryCache>>,
    layout: Arc<dyn RepositoryLayout>,
    registry: Arc<MappingRegistry>,
    revmeta: Arc<RevmetaProvider>,
    roundtrip: Mutex<RoundtripMap>,
}

impl std::fmt::Debug for SourceRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRepository")
            .field("root_url", &self.root_url)
            .field("uuid", &self.uuid)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl SourceRepository {
    /// Open the repository containing `url`.
    ///
    /// The history cache lives under the configured cache root unless the
    /// cache is disabled, in which case every history query goes to the
    /// server.
    pub fn open(connector: Arc<dyn Connector>, url: &str, config: &Config) -> Result<Self> {
        let pool = ConnectionPool::new(connector);
        let (uuid, root_url, latest) = {
            let conn = pool.get(url)?;
            (conn.get_uuid()?, conn.get_repos_root()?, conn.get_latest_revnum()?)
        };
        let root_url = root_url.trim_end_matches('/').to_string();

        let cache = if config.cache_enabled() {
            let path = config.paths()?.cache_db_path(&uuid);
            Some(Arc::new(HistoryCache::open(
                &path,
                Arc::clone(&pool),
                &root_url,
                CacheOptions::from_config(config),
            )?))
        } else {
            debug!("history cache disabled");
            None
        };
        let walker: Arc<dyn LogWalker> = match &cache {
            Some(cache) => cache.clone(),
            None => Arc::new(DirectLogWalker::new(Arc::clone(&pool), &root_url)),
        };

        let layout = Self::resolve_layout(config, &pool, &root_url, latest)?;
        let registry = Arc::new(MappingRegistry::new(config.default_mapping())?);
        let revmeta = RevmetaProvider::new(RevmetaContext {
            pool: Arc::clone(&pool),
            repos_url: root_url.clone(),
            uuid: uuid.clone(),
            walker: Arc::clone(&walker),
            default_mapping: registry.default_mapping_for(layout.as_ref()),
            registry: Arc::clone(&registry),
            strip_trailing_newline: config.log_strip_trailing_newline(),
        });
        info!(url = %root_url, %uuid, layout = %layout.name(), "opened source repository");

        Ok(Self {
            pool,
            root_url,
            uuid,
            config: config.clone(),
            walker,
            cache,
            layout,
            registry,
            revmeta,
            roundtrip: Mutex::new(RoundtripMap::default()),
        })
    }

    /// Wildcard lists win over a layout name; with neither, guess from the
    /// top two levels of the latest tree.
    fn resolve_layout(
        config: &Config,
        pool: &Arc<ConnectionPool>,
        root_url: &str,
        latest: RevNum,
    ) -> Result<Arc<dyn RepositoryLayout>> {
        if let Some((branches, tags)) = config.wildcard_lists() {
            return Ok(Arc::new(WildcardLayout::new(branches, tags)));
        }
        if let Some(name) = config.layout_name() {
            return layout_from_name(name).map(Arc::from).ok_or_else(|| {
                ConfigError::InvalidValue(format!("unknown layout '{name}'")).into()
            });
        }
        let conn = pool.get(root_url)?;
        let lister = SessionLister(&*conn);
        let mut candidates = Vec::new();
        for top in lister.list_subdirs("", latest)?.unwrap_or_default() {
            for child in lister.list_subdirs(&top, latest)?.unwrap_or_default() {
                candidates.push(format!("{top}/{child}"));
            }
            candidates.push(top);
        }
        let layout = guess_layout(candidates.iter().map(String::as_str));
        debug!(layout = %layout.name(), "guessed repository layout");
        Ok(Arc::from(layout))
    }

    pub fn uuid(&self) -> &RepositoryUuid {
        &self.uuid
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &dyn RepositoryLayout {
        self.layout.as_ref()
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn revmeta(&self) -> &RevmetaProvider {
        &self.revmeta
    }

    pub fn walker(&self) -> &dyn LogWalker {
        self.walker.as_ref()
    }

    /// The persisted history cache, when enabled.
    pub fn history_cache(&self) -> Option<&HistoryCache> {
        self.cache.as_deref()
    }

    /// Scheme used for revisions pushed to this repository.
    pub fn default_mapping(&self) -> Arc<dyn MappingScheme> {
        Arc::clone(&self.revmeta.context().default_mapping)
    }

    /// A pooled session anchored at the repository root.
    pub fn connection(&self) -> Result<PooledConnection> {
        self.pool.get(&self.root_url)
    }

    /// A pooled session anchored at `path` below the root.
    pub fn connection_at(&self, path: &str) -> Result<PooledConnection> {
        self.pool.get(&self.branch_url(path))
    }

    pub fn branch_url(&self, path: &str) -> String {
        url_join(&self.root_url, path)
    }

    pub fn latest_revnum(&self) -> Result<RevNum> {
        self.revmeta.check_watermark()
    }

    /// Forget everything derived from the latest revision.
    pub fn invalidate_cache(&self) {
        self.revmeta.invalidate();
    }

    pub fn lock_branch(&self, branch: &BranchPath) -> Result<BranchLock> {
        let paths = self.config.paths()?;
        Ok(BranchLock::acquire(&paths, &self.uuid, branch)?)
    }

    pub fn revision_metadata(&self, branch: &BranchPath, revnum: RevNum) -> Arc<RevisionMetadata> {
        self.revmeta.get(branch, revnum)
    }

    /// Revision id of `branch@revnum`, custom if one was recorded.
    pub fn generate_revision_id(&self, branch: &BranchPath, revnum: RevNum) -> Result<RevisionId> {
        self.revmeta.get(branch, revnum).get_revision_id()
    }

    /// Resolve a revision id to the branch and revision it names.
    ///
    /// Generated ids are parsed; custom ids written by a push are found by
    /// scanning history for revision-id metadata.
    pub fn lookup_revision_id(
        &self,
        revid: &RevisionId,
    ) -> Result<(BranchPath, RevNum, Arc<dyn MappingScheme>)> {
        match self.registry.parse_revision_id(revid) {
            Ok((foreign, scheme)) if foreign.uuid == self.uuid => {
                if self.branch_exists(&foreign.branch_path, foreign.revnum)? {
                    return Ok((foreign.branch_path, foreign.revnum, scheme));
                }
                debug!(%revid, "branch of parsed revision id does not exist");
            }
            Ok((foreign, _)) => {
                debug!(%revid, uuid = %foreign.uuid, "revision id from another repository");
            }
            Err(e) if e.kind() == ErrorKind::MalformedMetadata => {}
            Err(e) => return Err(e),
        }
        match self.lookup_roundtrip(revid)? {
            Some((branch, revnum)) => {
                let scheme = self.revmeta.get(&branch, revnum).mapping()?;
                Ok((branch, revnum, scheme))
            }
            None => Err(BridgeError::RevisionIdNotFound {
                revid: revid.to_string(),
            }),
        }
    }

    fn branch_exists(&self, branch: &BranchPath, revnum: RevNum) -> Result<bool> {
        if revnum > self.latest_revnum()? {
            return Ok(false);
        }
        Ok(self.connection()?.check_path(branch.as_str(), revnum)? == NodeKind::Dir)
    }

    fn lookup_roundtrip(&self, revid: &RevisionId) -> Result<Option<(BranchPath, RevNum)>> {
        let latest = self.latest_revnum()?;
        let mut map = self.roundtrip.lock();
        let start = map.scanned_to + 1;
        for revnum in start..=latest {
            let changes = self.walker.revision_paths(revnum, None)?;
            let roots: BTreeSet<BranchPath> = changes
                .keys()
                .filter_map(|path| self.layout.classify(path).location().map(|l| l.branch_root.clone()))
                .collect();
            for root in roots {
                let meta = self.revmeta.get(&root, revnum);
                if meta.original_mapping()?.is_none() {
                    continue;
                }
                let id = meta.get_revision_id()?;
                map.ids.insert(id, (root, revnum));
            }
            map.scanned_to = revnum;
        }
        if latest >= start {
            debug!(from = start, to = latest, custom = map.ids.len(), "scanned for custom revision ids");
        }
        Ok(map.ids.get(revid).cloned())
    }

    /// Target-side revision for a revision id.
    pub fn get_revision(&self, revid: &RevisionId) -> Result<Revision> {
        let (branch, revnum, _) = self.lookup_revision_id(revid)?;
        self.revmeta.get(&branch, revnum).get_revision()
    }

    /// Properties of the directory at `path@revnum`.
    pub fn branch_fileprops(&self, path: &str, revnum: RevNum) -> Result<PropMap> {
        Ok(self.connection()?.get_dir(path, revnum)?.props)
    }

    /// Every path below `path@revnum`, depth first.
    pub fn find_children(&self, path: &str, revnum: RevNum) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut found = Vec::new();
        let mut worklist = vec![path.trim_matches('/').to_string()];
        while let Some(dir) = worklist.pop() {
            let listing = conn.get_dir(&dir, revnum)?;
            for (name, entry) in listing.entries.into_iter().rev() {
                let child = if dir.is_empty() { name } else { format!("{dir}/{name}") };
                if entry.kind == NodeKind::Dir {
                    worklist.push(child.clone());
                }
                found.push(child);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Branches of the layout that exist at `revnum`.
    pub fn find_branches(&self, revnum: RevNum, project: Option<&str>) -> Result<Vec<BranchPath>> {
        let conn = self.connection()?;
        let lister = SessionLister(&*conn);
        Ok(self
            .layout
            .enumerate_branches(&lister as &dyn PathLister, revnum, project)?
            .into_iter()
            .map(|info| info.path)
            .collect())
    }
}
