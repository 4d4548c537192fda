//! mapping::v3
//!
//! Revision ids name the branching scheme they were created under:
//! `svn-v3-<scheme>:<uuid>:<branch>:<revnum>`. Metadata lives in file
//! properties on the branch root.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::core::errors::BridgeError;
use crate::core::types::{BranchPath, FileId, ForeignRevision, RepositoryUuid, RevNum, RevisionId};
use crate::core::Result;
use crate::layout::{RepositoryLayout, TrunkLayout};
use crate::target::Revision;
use crate::transport::PropMap;

use super::props::{escape_svn_path, unescape};
use super::storage::{ExportedProps, FilePropStore, RevisionExport};
use super::{invalid_revid, MappingScheme};

/// Scheme name for ids whose branching scheme was never recorded.
pub const UNDEFINED_SCHEME: &str = "undefined";

/// Longest file id before the path is replaced by its digest.
const MAX_FILE_ID_LEN: usize = 150;

/// How branches were laid out when the ids were generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchingScheme {
    /// The repository root is the only branch.
    None,
    /// `trunk`, `branches/*`, `tags/*` below `level` project components.
    Trunk(usize),
    Undefined,
}

impl BranchingScheme {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::None),
            UNDEFINED_SCHEME => Ok(Self::Undefined),
            _ => name
                .strip_prefix("trunk")
                .and_then(|level| level.parse().ok())
                .map(Self::Trunk)
                .ok_or_else(|| BridgeError::unsupported(format!("unknown branching scheme '{name}'"))),
        }
    }

    fn is_branch(self, path: &str) -> bool {
        let path = path.trim_matches('/');
        match self {
            Self::None => path.is_empty(),
            Self::Trunk(level) => TrunkLayout::new(level).is_branch(path),
            Self::Undefined => {
                let parts: Vec<&str> = path.split('/').collect();
                path.is_empty()
                    || parts.last() == Some(&"trunk")
                    || (parts.len() >= 2 && parts[parts.len() - 2] == "branches")
            }
        }
    }

    fn is_tag(self, path: &str) -> bool {
        let path = path.trim_matches('/');
        match self {
            Self::None => false,
            Self::Trunk(level) => TrunkLayout::new(level).is_tag(path),
            Self::Undefined => {
                let parts: Vec<&str> = path.split('/').collect();
                parts.len() >= 2 && parts[parts.len() - 2] == "tags"
            }
        }
    }
}

impl std::fmt::Display for BranchingScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Trunk(level) => write!(f, "trunk{level}"),
            Self::Undefined => write!(f, "{UNDEFINED_SCHEME}"),
        }
    }
}

/// The v3 scheme for one branching scheme.
#[derive(Debug, Clone)]
pub struct MappingV3 {
    scheme: BranchingScheme,
    store: FilePropStore,
}

impl MappingV3 {
    pub fn new(scheme: &str) -> Result<Self> {
        Ok(Self::with_scheme(BranchingScheme::parse(scheme)?))
    }

    pub fn with_scheme(scheme: BranchingScheme) -> Self {
        Self {
            scheme,
            store: FilePropStore::new(format!("v3-{scheme}")),
        }
    }

    /// The scheme that matches a repository layout.
    pub fn for_layout(layout: &dyn RepositoryLayout) -> Result<Self> {
        let name = layout.name();
        match name.as_str() {
            "root" => Ok(Self::with_scheme(BranchingScheme::None)),
            _ => Self::new(&name),
        }
    }

    pub fn scheme(&self) -> BranchingScheme {
        self.scheme
    }

    /// Decode any v3 revision id, recovering the scheme it names.
    pub fn parse(revid: &RevisionId) -> Result<(ForeignRevision, Self)> {
        let rest = revid
            .as_str()
            .strip_prefix("svn-v3-")
            .ok_or_else(|| invalid_revid(revid))?;
        let parts: Vec<&str> = rest.split(':').collect();
        let [scheme, uuid, branch, revnum] = parts[..] else {
            return Err(invalid_revid(revid));
        };
        let mapping = Self::new(scheme).map_err(|_| invalid_revid(revid))?;
        let revnum: RevNum = revnum.parse().map_err(|_| invalid_revid(revid))?;
        let uuid = RepositoryUuid::new(uuid).map_err(|_| invalid_revid(revid))?;
        let branch = unescape(branch, "revision id")
            .ok()
            .and_then(|b| BranchPath::new(b).ok())
            .ok_or_else(|| invalid_revid(revid))?;
        Ok((ForeignRevision::new(uuid, branch, revnum), mapping))
    }
}

impl MappingScheme for MappingV3 {
    fn name(&self) -> String {
        format!("v3-{}", self.scheme)
    }

    fn revision_id_foreign_to_target(&self, foreign: &ForeignRevision) -> RevisionId {
        let id = format!(
            "svn-v3-{}:{}:{}:{}",
            self.scheme,
            foreign.uuid,
            escape_svn_path(foreign.branch_path.as_str()),
            foreign.revnum
        );
        RevisionId::new(id).unwrap_or_else(|_| RevisionId::null())
    }

    fn revision_id_target_to_foreign(&self, revid: &RevisionId) -> Result<ForeignRevision> {
        let (foreign, mapping) = Self::parse(revid)?;
        if mapping.scheme != self.scheme {
            return Err(invalid_revid(revid));
        }
        Ok(foreign)
    }

    fn generate_file_id(
        &self,
        uuid: &RepositoryUuid,
        revnum: RevNum,
        branch: &BranchPath,
        path: &str,
    ) -> FileId {
        let branch = escape_svn_path(branch.as_str());
        let mut id = format!("{revnum}@{uuid}:{branch}:{}", escape_svn_path(path));
        if id.len() > MAX_FILE_ID_LEN {
            let digest = hex::encode(Sha256::digest(path.as_bytes()));
            id = format!("{revnum}@{uuid}:{branch};{digest}");
        }
        FileId::new(id).unwrap_or_else(|_| FileId::tree_root())
    }

    fn is_branch(&self, path: &str) -> bool {
        self.scheme.is_branch(path)
    }

    fn is_tag(&self, path: &str) -> bool {
        self.scheme.is_tag(path)
    }

    fn supports_roundtripping(&self) -> bool {
        true
    }

    fn supports_custom_fileprops(&self) -> bool {
        true
    }

    fn import_revision(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
        foreign: &ForeignRevision,
        rev: &mut Revision,
    ) -> Result<()> {
        self.store.import_revision(revprops, fileprops, foreign, rev)
    }

    fn import_fileid_map(
        &self,
        _revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<BTreeMap<String, FileId>> {
        self.store.import_fileid_map(fileprops)
    }

    fn import_text_parents(
        &self,
        _revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<BTreeMap<String, RevisionId>> {
        self.store.import_text_parents(fileprops)
    }

    fn get_rhs_parents(
        &self,
        _branch: &BranchPath,
        _revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<Vec<RevisionId>> {
        Ok(self.store.get_rhs_parents(fileprops))
    }

    fn get_revision_id(
        &self,
        _branch: &BranchPath,
        _revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<Option<(u64, RevisionId)>> {
        self.store.get_revision_id(fileprops)
    }

    fn is_bzr_revision_fileprops(&self, changed_fileprops: &PropMap) -> bool {
        self.store.is_bzr_revision(changed_fileprops)
    }

    fn export_revision(&self, export: &RevisionExport<'_>, props: &mut ExportedProps) -> Result<()> {
        props.use_revprops = false;
        self.store.export_revision(export, props)
    }

    fn export_fileid_map(
        &self,
        map: &BTreeMap<String, FileId>,
        props: &mut ExportedProps,
    ) -> Result<()> {
        self.store.export_fileid_map(map, props);
        Ok(())
    }

    fn export_text_parents(
        &self,
        map: &BTreeMap<String, RevisionId>,
        props: &mut ExportedProps,
    ) -> Result<()> {
        self.store.export_text_parents(map, props);
        Ok(())
    }

    fn export_message(&self, message: &str, props: &mut ExportedProps) -> Result<()> {
        self.store.export_message(message, props);
        Ok(())
    }
}
