//! mapping
//!
//! Revision identity and metadata schemes.
//!
//! # Overview
//!
//! A mapping scheme translates between a foreign revision coordinate
//! (uuid, branch path, revnum) and a target revision id, derives stable file
//! ids, and stores target-only metadata (committer, timestamps, merge
//! parents, file ids) in source properties.
//!
//! | Scheme | Revision id | Metadata lives in | Roundtrip |
//! |---|---|---|---|
//! | v1, v2 | `svn-v1:<revnum>@<uuid>-<branch>` | `bzr:merge` fileprop | import only |
//! | v3 | `svn-v3-<scheme>:<uuid>:<branch>:<revnum>` | branch-root fileprops | yes |
//! | v4 | `svn-v4:<uuid>:<branch>:<revnum>` | revprops, fileprops fallback | yes |
//!
//! A history may mix schemes; [`MappingRegistry::find_mapping`] resolves
//! the scheme of each revision from its properties.
//!
//! # Example
//!
//! ```
//! use svnbridge::core::types::{BranchPath, ForeignRevision, RepositoryUuid};
//! use svnbridge::mapping::MappingRegistry;
//!
//! let registry = MappingRegistry::default();
//! let foreign = ForeignRevision::new(
//!     RepositoryUuid::new("6e7a5c1a").unwrap(),
//!     BranchPath::new("trunk").unwrap(),
//!     42,
//! );
//! let revid = registry.default_mapping().revision_id_foreign_to_target(&foreign);
//! assert_eq!(revid.as_str(), "svn-v4:6e7a5c1a:trunk:42");
//!
//! let (parsed, scheme) = registry.parse_revision_id(&revid).unwrap();
//! assert_eq!(parsed, foreign);
//! assert_eq!(scheme.name(), "v4");
//! ```

pub mod props;
pub mod storage;
pub mod v1;
pub mod v3;
pub mod v4;

pub use storage::{ExportedProps, RevisionExport};
pub use v1::{MappingV1, MappingV2};
pub use v3::MappingV3;
pub use v4::MappingV4;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::errors::BridgeError;
use crate::core::types::{BranchPath, FileId, ForeignRevision, RepositoryUuid, RevNum, RevisionId};
use crate::core::Result;
use crate::layout::RepositoryLayout;
use crate::target::Revision;
use crate::transport::PropMap;

/// A versioned revision-id and metadata algorithm.
pub trait MappingScheme: fmt::Debug + Send + Sync {
    /// Registry name, e.g. `v4` or `v3-trunk0`.
    fn name(&self) -> String;

    /// Encode a foreign coordinate as a revision id.
    fn revision_id_foreign_to_target(&self, foreign: &ForeignRevision) -> RevisionId;

    /// Decode a revision id produced by this scheme.
    ///
    /// # Errors
    ///
    /// `InvalidRevisionId` if the id does not follow this scheme's grammar.
    fn revision_id_target_to_foreign(&self, revid: &RevisionId) -> Result<ForeignRevision>;

    /// File id for `path` (relative to `branch`) first seen at `revnum`.
    fn generate_file_id(
        &self,
        uuid: &RepositoryUuid,
        revnum: RevNum,
        branch: &BranchPath,
        path: &str,
    ) -> FileId;

    /// Whether the scheme considers `path` a branch root.
    fn is_branch(&self, path: &str) -> bool;

    /// Whether the scheme considers `path` a tag root.
    fn is_tag(&self, path: &str) -> bool;

    fn supports_roundtripping(&self) -> bool {
        false
    }

    fn supports_custom_revprops(&self) -> bool {
        false
    }

    fn supports_custom_fileprops(&self) -> bool {
        false
    }

    fn supports_hidden(&self) -> bool {
        false
    }

    /// Old schemes that only exist for reading historic revisions.
    fn is_deprecated(&self) -> bool {
        false
    }

    /// Fill `rev` from the revision and branch-root properties.
    fn import_revision(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
        foreign: &ForeignRevision,
        rev: &mut Revision,
    ) -> Result<()>;

    /// Explicit file ids recorded for this revision.
    fn import_fileid_map(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<BTreeMap<String, FileId>>;

    /// Explicit per-file text parents recorded for this revision.
    fn import_text_parents(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<BTreeMap<String, RevisionId>>;

    /// Explicitly recorded left-hand parent (`null:` when parentless).
    fn get_lhs_parent(
        &self,
        _branch: &BranchPath,
        _revprops: &PropMap,
        _fileprops: &PropMap,
    ) -> Result<Option<RevisionId>> {
        Ok(None)
    }

    /// Merge parents recorded for this revision.
    fn get_rhs_parents(
        &self,
        branch: &BranchPath,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<Vec<RevisionId>>;

    /// Custom revision id and revno recorded when the revision was pushed.
    fn get_revision_id(
        &self,
        branch: &BranchPath,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<Option<(u64, RevisionId)>>;

    /// `Some(true)` if the revprops mark a pushed revision, `Some(false)`
    /// if they mark one to skip, `None` if they say nothing.
    fn is_bzr_revision_revprops(&self, _revprops: &PropMap) -> Option<bool> {
        None
    }

    /// Whether the changed branch-root fileprops mark a pushed revision.
    fn is_bzr_revision_fileprops(&self, _changed_fileprops: &PropMap) -> bool {
        false
    }

    fn is_hidden(&self, _revprops: &PropMap, _changed_fileprops: &PropMap) -> bool {
        false
    }

    fn export_revision(&self, _export: &RevisionExport<'_>, _props: &mut ExportedProps) -> Result<()> {
        Err(import_only(&self.name()))
    }

    fn export_fileid_map(
        &self,
        _map: &BTreeMap<String, FileId>,
        _props: &mut ExportedProps,
    ) -> Result<()> {
        Err(import_only(&self.name()))
    }

    fn export_text_parents(
        &self,
        _map: &BTreeMap<String, RevisionId>,
        _props: &mut ExportedProps,
    ) -> Result<()> {
        Err(import_only(&self.name()))
    }

    fn export_message(&self, _message: &str, _props: &mut ExportedProps) -> Result<()> {
        Err(import_only(&self.name()))
    }

    fn export_hidden(&self, _props: &mut ExportedProps) -> Result<()> {
        Err(BridgeError::unsupported(format!(
            "mapping {} cannot hide revisions",
            self.name()
        )))
    }
}

fn import_only(name: &str) -> BridgeError {
    BridgeError::unsupported(format!("mapping {name} is import-only"))
}

fn invalid_revid(revid: &RevisionId) -> BridgeError {
    BridgeError::InvalidRevisionId {
        revid: revid.to_string(),
    }
}

/// Structural import used when a revision has no recognized metadata.
pub fn import_plain_revision(revprops: &PropMap, rev: &mut Revision) -> Result<()> {
    props::parse_svn_revprops(revprops, rev)
}

/// All known schemes, plus the default used for new revisions.
///
/// The deprecation warning for v1/v2 is logged at most once per registry.
#[derive(Debug)]
pub struct MappingRegistry {
    default: String,
    warned_deprecated: AtomicBool,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self {
            default: "v4".to_string(),
            warned_deprecated: AtomicBool::new(false),
        }
    }
}

impl MappingRegistry {
    /// Base names the registry knows.
    pub const NAMES: &'static [&'static str] = &["v1", "v2", "v3", "v4"];

    /// A registry whose default scheme is `default`.
    pub fn new(default: &str) -> Result<Self> {
        let registry = Self {
            default: default.to_string(),
            warned_deprecated: AtomicBool::new(false),
        };
        let scheme = registry.get(default)?;
        if !scheme.supports_roundtripping() {
            return Err(BridgeError::unsupported(format!(
                "mapping {default} cannot be used for new revisions"
            )));
        }
        Ok(registry)
    }

    /// Look up a scheme by name (`v3` takes an optional `-<scheme>` suffix).
    pub fn get(&self, name: &str) -> Result<Arc<dyn MappingScheme>> {
        let (base, rest) = match name.split_once('-') {
            Some((base, rest)) => (base, Some(rest)),
            None => (name, None),
        };
        let scheme: Arc<dyn MappingScheme> = match (base, rest) {
            ("v1", None) => Arc::new(MappingV1),
            ("v2", None) => Arc::new(MappingV2),
            ("v3", rest) => Arc::new(MappingV3::new(rest.unwrap_or(v3::UNDEFINED_SCHEME))?),
            ("v4", None) => Arc::new(MappingV4),
            _ => {
                return Err(BridgeError::unsupported(format!("unknown mapping '{name}'")));
            }
        };
        self.note_scheme(scheme.as_ref());
        Ok(scheme)
    }

    /// The scheme used for new revisions.
    pub fn default_mapping(&self) -> Arc<dyn MappingScheme> {
        self.get(&self.default)
            .unwrap_or_else(|_| Arc::new(MappingV4) as Arc<dyn MappingScheme>)
    }

    /// The default scheme, specialized for a repository's layout.
    pub fn default_mapping_for(&self, layout: &dyn RepositoryLayout) -> Arc<dyn MappingScheme> {
        if self.default == "v3" {
            if let Ok(scheme) = MappingV3::for_layout(layout) {
                return Arc::new(scheme);
            }
        }
        self.default_mapping()
    }

    /// Decode a revision id with whichever scheme produced it.
    ///
    /// # Errors
    ///
    /// `InvalidRevisionId` if no scheme accepts the id.
    pub fn parse_revision_id(
        &self,
        revid: &RevisionId,
    ) -> Result<(ForeignRevision, Arc<dyn MappingScheme>)> {
        let id = revid.as_str();
        let rest = id.strip_prefix("svn-").ok_or_else(|| invalid_revid(revid))?;
        let scheme: Arc<dyn MappingScheme> = if rest.starts_with("v1:") {
            Arc::new(MappingV1)
        } else if rest.starts_with("v2:") {
            Arc::new(MappingV2)
        } else if rest.starts_with("v3-") {
            let (foreign, scheme) = MappingV3::parse(revid)?;
            return Ok((foreign, Arc::new(scheme)));
        } else if rest.starts_with("v4:") {
            Arc::new(MappingV4)
        } else {
            return Err(invalid_revid(revid));
        };
        let foreign = scheme.revision_id_target_to_foreign(revid)?;
        self.note_scheme(scheme.as_ref());
        Ok((foreign, scheme))
    }

    /// Determine which scheme wrote a revision.
    ///
    /// Checks the `bzr:mapping-version` revision property first, then
    /// `bzr:revision-id:<name>` keys among the changed branch-root file
    /// properties. `None` means the revision carries no metadata.
    pub fn find_mapping(
        &self,
        revprops: &PropMap,
        changed_fileprops: &PropMap,
    ) -> Option<Arc<dyn MappingScheme>> {
        if let Some(version) = revprops.get(props::REVPROP_MAPPING_VERSION) {
            match self.get(version) {
                Ok(scheme) if scheme.supports_custom_revprops() => return Some(scheme),
                Ok(_) => debug!(version, "mapping cannot use revision properties"),
                Err(e) => debug!(version, error = %e, "ignoring unknown mapping version"),
            }
        }
        for key in changed_fileprops.keys() {
            if let Some(name) = key.strip_prefix(props::PROP_REVISION_ID) {
                match self.get(name) {
                    Ok(scheme) => return Some(scheme),
                    Err(e) => debug!(name, error = %e, "ignoring unknown mapping"),
                }
            }
        }
        None
    }

    fn note_scheme(&self, scheme: &dyn MappingScheme) {
        if scheme.is_deprecated() && !self.warned_deprecated.swap(true, Ordering::Relaxed) {
            warn!(
                mapping = %scheme.name(),
                "repository contains revisions from a deprecated mapping; \
                 they can be read but not written"
            );
        }
    }

    /// Whether the deprecation warning has been logged.
    pub fn warned_deprecated(&self) -> bool {
        self.warned_deprecated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign(branch: &str, revnum: RevNum) -> ForeignRevision {
        ForeignRevision::new(
            RepositoryUuid::new("uuid-1").unwrap(),
            BranchPath::new(branch).unwrap(),
            revnum,
        )
    }

    #[test]
    fn parse_dispatches_on_prefix() {
        let registry = MappingRegistry::default();
        for name in ["v1", "v2", "v3-trunk0", "v4"] {
            let scheme = registry.get(name).unwrap();
            let f = foreign("branches/my-feature", 7);
            let revid = scheme.revision_id_foreign_to_target(&f);
            let (parsed, found) = registry.parse_revision_id(&revid).unwrap();
            assert_eq!(parsed, f, "{name}");
            assert_eq!(found.name(), scheme.name());
        }
    }

    #[test]
    fn garbage_is_invalid() {
        let registry = MappingRegistry::default();
        for id in ["bzr-rev-1", "svn-v9:1@x-y", "svn-v4:only:two"] {
            let err = registry
                .parse_revision_id(&RevisionId::new(id).unwrap())
                .unwrap_err();
            assert!(matches!(err, BridgeError::InvalidRevisionId { .. }), "{id}");
        }
    }

    #[test]
    fn deprecation_warning_once() {
        let registry = MappingRegistry::default();
        assert!(!registry.warned_deprecated());
        registry.get("v4").unwrap();
        assert!(!registry.warned_deprecated());
        registry.get("v1").unwrap();
        registry.get("v2").unwrap();
        assert!(registry.warned_deprecated());
    }

    #[test]
    fn find_mapping_order() {
        let registry = MappingRegistry::default();
        let mut revprops = PropMap::new();
        let mut fileprops = PropMap::new();
        assert!(registry.find_mapping(&revprops, &fileprops).is_none());

        fileprops.insert("bzr:revision-id:v3-trunk0".into(), "1 x\n".into());
        assert_eq!(
            registry.find_mapping(&revprops, &fileprops).unwrap().name(),
            "v3-trunk0"
        );

        revprops.insert("bzr:mapping-version".into(), "v4".into());
        assert_eq!(registry.find_mapping(&revprops, &fileprops).unwrap().name(), "v4");

        revprops.insert("bzr:mapping-version".into(), "v17".into());
        fileprops.clear();
        assert!(registry.find_mapping(&revprops, &fileprops).is_none());
    }

    #[test]
    fn default_must_roundtrip() {
        assert!(MappingRegistry::new("v4").is_ok());
        assert!(MappingRegistry::new("v3").is_ok());
        assert!(MappingRegistry::new("v2").is_err());
        assert!(MappingRegistry::new("v5").is_err());
    }
}
