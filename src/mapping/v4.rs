//! mapping::v4
//!
//! The current scheme: `svn-v4:<uuid>:<branch>:<revnum>`. Metadata is
//! written to revision properties when the server accepts them and to
//! branch-root file properties otherwise; reads check which one a
//! revision used.

use std::collections::BTreeMap;

use crate::core::types::{BranchPath, FileId, ForeignRevision, RepositoryUuid, RevNum, RevisionId};
use crate::core::Result;
use crate::target::Revision;
use crate::transport::PropMap;

use super::props::{
    check_required_features, escape_minimal, escape_svn_path, unescape, PROP_HIDDEN,
    PROP_REQUIRED_FEATURES, REVPROP_HIDDEN, REVPROP_MAPPING_VERSION, REVPROP_REQUIRED_FEATURES,
};
use super::storage::{ExportedProps, FilePropStore, RevPropStore, RevisionExport};
use super::{invalid_revid, MappingScheme};

const NAME: &str = "v4";

#[derive(Debug, Clone, Copy, Default)]
pub struct MappingV4;

impl MappingV4 {
    fn fileprops(&self) -> FilePropStore {
        FilePropStore::new(NAME)
    }

    fn uses_revprops(revprops: &PropMap) -> bool {
        revprops.contains_key(REVPROP_MAPPING_VERSION)
    }
}

impl MappingScheme for MappingV4 {
    fn name(&self) -> String {
        NAME.to_string()
    }

    fn revision_id_foreign_to_target(&self, foreign: &ForeignRevision) -> RevisionId {
        let id = format!(
            "svn-v4:{}:{}:{}",
            foreign.uuid,
            escape_minimal(foreign.branch_path.as_str()),
            foreign.revnum
        );
        RevisionId::new(id).unwrap_or_else(|_| RevisionId::null())
    }

    fn revision_id_target_to_foreign(&self, revid: &RevisionId) -> Result<ForeignRevision> {
        let parts: Vec<&str> = revid.as_str().split(':').collect();
        let ["svn-v4", uuid, branch, revnum] = parts[..] else {
            return Err(invalid_revid(revid));
        };
        let revnum: RevNum = revnum.parse().map_err(|_| invalid_revid(revid))?;
        let uuid = RepositoryUuid::new(uuid).map_err(|_| invalid_revid(revid))?;
        let branch = unescape(branch, "revision id")
            .ok()
            .and_then(|b| BranchPath::new(b).ok())
            .ok_or_else(|| invalid_revid(revid))?;
        Ok(ForeignRevision::new(uuid, branch, revnum))
    }

    fn generate_file_id(
        &self,
        uuid: &RepositoryUuid,
        revnum: RevNum,
        branch: &BranchPath,
        path: &str,
    ) -> FileId {
        let joined = format!("{}/{}", branch.as_str(), path);
        FileId::new(format!("{revnum}@{uuid}:{}", escape_svn_path(&joined)))
            .unwrap_or_else(|_| FileId::tree_root())
    }

    /// v4 leaves branch detection to the layout.
    fn is_branch(&self, _path: &str) -> bool {
        true
    }

    fn is_tag(&self, _path: &str) -> bool {
        true
    }

    fn supports_roundtripping(&self) -> bool {
        true
    }

    fn supports_custom_revprops(&self) -> bool {
        true
    }

    fn supports_custom_fileprops(&self) -> bool {
        true
    }

    fn supports_hidden(&self) -> bool {
        true
    }

    fn import_revision(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
        foreign: &ForeignRevision,
        rev: &mut Revision,
    ) -> Result<()> {
        if Self::uses_revprops(revprops) {
            if let Some(features) = revprops.get(REVPROP_REQUIRED_FEATURES) {
                check_required_features(features)?;
            }
            RevPropStore.import_revision(revprops, rev)
        } else {
            if let Some(features) = fileprops.get(PROP_REQUIRED_FEATURES) {
                check_required_features(features)?;
            }
            self.fileprops().import_revision(revprops, fileprops, foreign, rev)
        }
    }

    fn import_fileid_map(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<BTreeMap<String, FileId>> {
        if Self::uses_revprops(revprops) {
            RevPropStore.import_fileid_map(revprops)
        } else {
            self.fileprops().import_fileid_map(fileprops)
        }
    }

    fn import_text_parents(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<BTreeMap<String, RevisionId>> {
        if Self::uses_revprops(revprops) {
            RevPropStore.import_text_parents(revprops)
        } else {
            self.fileprops().import_text_parents(fileprops)
        }
    }

    fn get_lhs_parent(
        &self,
        _branch: &BranchPath,
        revprops: &PropMap,
        _fileprops: &PropMap,
    ) -> Result<Option<RevisionId>> {
        RevPropStore.get_lhs_parent(revprops)
    }

    fn get_rhs_parents(
        &self,
        branch: &BranchPath,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<Vec<RevisionId>> {
        if Self::uses_revprops(revprops) {
            Ok(RevPropStore.get_rhs_parents(branch, revprops))
        } else {
            Ok(self.fileprops().get_rhs_parents(fileprops))
        }
    }

    fn get_revision_id(
        &self,
        branch: &BranchPath,
        revprops: &PropMap,
        fileprops: &PropMap,
    ) -> Result<Option<(u64, RevisionId)>> {
        if Self::uses_revprops(revprops) {
            RevPropStore.get_revision_id(branch, revprops)
        } else {
            self.fileprops().get_revision_id(fileprops)
        }
    }

    fn is_bzr_revision_revprops(&self, revprops: &PropMap) -> Option<bool> {
        RevPropStore.is_bzr_revision(revprops)
    }

    fn is_bzr_revision_fileprops(&self, changed_fileprops: &PropMap) -> bool {
        self.fileprops().is_bzr_revision(changed_fileprops)
    }

    fn is_hidden(&self, revprops: &PropMap, changed_fileprops: &PropMap) -> bool {
        revprops.contains_key(REVPROP_HIDDEN) || changed_fileprops.contains_key(PROP_HIDDEN)
    }

    fn export_revision(&self, export: &RevisionExport<'_>, props: &mut ExportedProps) -> Result<()> {
        if props.use_revprops {
            RevPropStore.export_revision(NAME, export, props)
        } else {
            self.fileprops().export_revision(export, props)
        }
    }

    fn export_fileid_map(
        &self,
        map: &BTreeMap<String, FileId>,
        props: &mut ExportedProps,
    ) -> Result<()> {
        if props.use_revprops {
            RevPropStore.export_fileid_map(map, props);
        } else {
            self.fileprops().export_fileid_map(map, props);
        }
        Ok(())
    }

    fn export_text_parents(
        &self,
        map: &BTreeMap<String, RevisionId>,
        props: &mut ExportedProps,
    ) -> Result<()> {
        if props.use_revprops {
            RevPropStore.export_text_parents(map, props);
        } else {
            self.fileprops().export_text_parents(map, props);
        }
        Ok(())
    }

    fn export_message(&self, message: &str, props: &mut ExportedProps) -> Result<()> {
        if props.use_revprops {
            RevPropStore.export_message(message, props);
        } else {
            self.fileprops().export_message(message, props);
        }
        Ok(())
    }

    fn export_hidden(&self, props: &mut ExportedProps) -> Result<()> {
        if props.use_revprops {
            RevPropStore.export_hidden(props);
        } else {
            self.fileprops().export_hidden(props);
        }
        Ok(())
    }
}
