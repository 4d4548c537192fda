//! mapping::v1
//!
//! The two earliest schemes. Revision ids put the revnum first and the
//! strictly escaped branch last: `svn-v1:<revnum>@<uuid>-<branch>`. They
//! carry no metadata beyond merge parents and cannot be written.

use std::collections::BTreeMap;

use crate::core::types::{BranchPath, FileId, ForeignRevision, RepositoryUuid, RevNum, RevisionId};
use crate::core::Result;
use crate::target::Revision;
use crate::transport::PropMap;

use super::props::{escape_strict, parse_merge_line, parse_svn_revprops, unescape, PROP_MERGE};
use super::{invalid_revid, MappingScheme};

/// `svn-v1:` revision ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingV1;

/// `svn-v2:` revision ids; same rules as v1 under a new prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingV2;

fn encode(version: u8, foreign: &ForeignRevision) -> RevisionId {
    let id = format!(
        "svn-v{version}:{}@{}-{}",
        foreign.revnum,
        foreign.uuid,
        escape_strict(foreign.branch_path.as_str())
    );
    // every component is escaped or validated, so this cannot fail
    RevisionId::new(id).unwrap_or_else(|_| RevisionId::null())
}

fn decode(version: u8, revid: &RevisionId) -> Result<ForeignRevision> {
    let prefix = format!("svn-v{version}:");
    let rest = revid
        .as_str()
        .strip_prefix(&prefix)
        .ok_or_else(|| invalid_revid(revid))?;
    let (revnum, rest) = rest.split_once('@').ok_or_else(|| invalid_revid(revid))?;
    let (uuid, branch) = rest.rsplit_once('-').ok_or_else(|| invalid_revid(revid))?;
    let revnum: RevNum = revnum.parse().map_err(|_| invalid_revid(revid))?;
    let uuid = RepositoryUuid::new(uuid).map_err(|_| invalid_revid(revid))?;
    let branch = unescape(branch, "revision id")
        .ok()
        .and_then(|b| BranchPath::new(b).ok())
        .ok_or_else(|| invalid_revid(revid))?;
    Ok(ForeignRevision::new(uuid, branch, revnum))
}

fn file_id(version: u8, uuid: &RepositoryUuid, revnum: RevNum, branch: &BranchPath, path: &str) -> FileId {
    if path.is_empty() {
        return FileId::tree_root();
    }
    let revid = encode(version, &ForeignRevision::new(uuid.clone(), branch.clone(), revnum));
    FileId::new(format!("{revid}-{}", escape_strict(path))).unwrap_or_else(|_| FileId::tree_root())
}

/// `""`, `…/trunk`, and direct children of `branches`, `tags` or `hooks`.
fn is_branch(path: &str) -> bool {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return true;
    }
    let parts: Vec<&str> = path.split('/').collect();
    parts.last() == Some(&"trunk")
        || (parts.len() >= 2 && matches!(parts[parts.len() - 2], "branches" | "tags" | "hooks"))
}

fn merge_parents(fileprops: &PropMap) -> Vec<RevisionId> {
    fileprops
        .get(PROP_MERGE)
        .and_then(|text| text.lines().last())
        .map(parse_merge_line)
        .unwrap_or_default()
}

macro_rules! legacy_mapping {
    ($ty:ty, $version:literal) => {
        impl MappingScheme for $ty {
            fn name(&self) -> String {
                concat!("v", $version).to_string()
            }

            fn revision_id_foreign_to_target(&self, foreign: &ForeignRevision) -> RevisionId {
                encode($version, foreign)
            }

            fn revision_id_target_to_foreign(&self, revid: &RevisionId) -> Result<ForeignRevision> {
                decode($version, revid)
            }

            fn generate_file_id(
                &self,
                uuid: &RepositoryUuid,
                revnum: RevNum,
                branch: &BranchPath,
                path: &str,
            ) -> FileId {
                file_id($version, uuid, revnum, branch, path)
            }

            fn is_branch(&self, path: &str) -> bool {
                is_branch(path)
            }

            fn is_tag(&self, _path: &str) -> bool {
                false
            }

            fn is_deprecated(&self) -> bool {
                true
            }

            fn import_revision(
                &self,
                revprops: &PropMap,
                _fileprops: &PropMap,
                _foreign: &ForeignRevision,
                rev: &mut Revision,
            ) -> Result<()> {
                parse_svn_revprops(revprops, rev)
            }

            fn import_fileid_map(
                &self,
                _revprops: &PropMap,
                _fileprops: &PropMap,
            ) -> Result<BTreeMap<String, FileId>> {
                Ok(BTreeMap::new())
            }

            fn import_text_parents(
                &self,
                _revprops: &PropMap,
                _fileprops: &PropMap,
            ) -> Result<BTreeMap<String, RevisionId>> {
                Ok(BTreeMap::new())
            }

            fn get_rhs_parents(
                &self,
                _branch: &BranchPath,
                _revprops: &PropMap,
                fileprops: &PropMap,
            ) -> Result<Vec<RevisionId>> {
                Ok(merge_parents(fileprops))
            }

            fn get_revision_id(
                &self,
                _branch: &BranchPath,
                _revprops: &PropMap,
                _fileprops: &PropMap,
            ) -> Result<Option<(u64, RevisionId)>> {
                Ok(None)
            }
        }
    };
}

legacy_mapping!(MappingV1, 1);
legacy_mapping!(MappingV2, 2);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::BridgeError;
    use crate::mapping::ExportedProps;

    fn foreign(branch: &str) -> ForeignRevision {
        ForeignRevision::new(
            RepositoryUuid::new("6e7a5c1a-1f2b-4c3d").unwrap(),
            BranchPath::new(branch).unwrap(),
            12,
        )
    }

    #[test]
    fn revid_format() {
        let revid = MappingV1.revision_id_foreign_to_target(&foreign("branches/my-feature"));
        assert_eq!(
            revid.as_str(),
            "svn-v1:12@6e7a5c1a-1f2b-4c3d-branches%2Fmy%2Dfeature"
        );
        assert_eq!(MappingV1.revision_id_target_to_foreign(&revid).unwrap(), foreign("branches/my-feature"));

        let v2 = MappingV2.revision_id_foreign_to_target(&foreign(""));
        assert_eq!(v2.as_str(), "svn-v2:12@6e7a5c1a-1f2b-4c3d-");
        assert_eq!(MappingV2.revision_id_target_to_foreign(&v2).unwrap(), foreign(""));
    }

    #[test]
    fn rejects_other_prefix() {
        let revid = MappingV2.revision_id_foreign_to_target(&foreign("trunk"));
        assert!(MappingV1.revision_id_target_to_foreign(&revid).is_err());
        let bad = RevisionId::new("svn-v1:x@uuid-trunk").unwrap();
        assert!(MappingV1.revision_id_target_to_foreign(&bad).is_err());
    }

    #[test]
    fn file_ids() {
        let f = foreign("trunk");
        assert_eq!(
            MappingV1.generate_file_id(&f.uuid, 3, &f.branch_path, ""),
            FileId::tree_root()
        );
        let id = MappingV1.generate_file_id(&f.uuid, 3, &f.branch_path, "src/a-b.c");
        assert_eq!(id.as_str(), "svn-v1:3@6e7a5c1a-1f2b-4c3d-trunk-src%2Fa%2Db.c");
    }

    #[test]
    fn branch_shapes() {
        for path in ["", "trunk", "proj/trunk", "branches/x", "tags/1.0", "hooks/h"] {
            assert!(MappingV1.is_branch(path), "{path}");
        }
        for path in ["trunk/src", "branches", "random"] {
            assert!(!MappingV1.is_branch(path), "{path}");
        }
        assert!(!MappingV1.is_tag("tags/1.0"));
    }

    #[test]
    fn import_only() {
        let mut props = ExportedProps::default();
        let err = MappingV2.export_message("m", &mut props).unwrap_err();
        assert!(matches!(err, BridgeError::Unsupported { .. }));
        assert!(!MappingV1.supports_roundtripping());
    }

    #[test]
    fn merge_parents_from_last_line() {
        let mut fileprops = PropMap::new();
        fileprops.insert("bzr:merge".into(), "old-a\nnew-a\tnew-b\n".into());
        let parents = MappingV1
            .get_rhs_parents(&BranchPath::root(), &PropMap::new(), &fileprops)
            .unwrap();
        assert_eq!(
            parents,
            vec![RevisionId::new("new-a").unwrap(), RevisionId::new("new-b").unwrap()]
        );
    }
}
