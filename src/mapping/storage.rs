//! mapping::storage
//!
//! Where a scheme keeps its metadata: branch-root file properties or
//! revision properties. v3 uses file properties only; v4 writes revision
//! properties and reads either.

use std::collections::BTreeMap;

use crate::core::errors::BridgeError;
use crate::core::types::{BranchPath, FileId, ForeignRevision, RevisionId};
use crate::core::Result;
use crate::target::Revision;
use crate::transport::PropMap;

use super::props::{self, *};

/// Inputs for writing one revision's metadata.
#[derive(Debug, Clone)]
pub struct RevisionExport<'a> {
    pub branch_root: &'a BranchPath,
    pub timestamp: Option<f64>,
    pub timezone: i32,
    pub committer: Option<&'a str>,
    pub properties: &'a BTreeMap<String, String>,
    pub revision_id: Option<&'a RevisionId>,
    pub revno: u64,
    pub parent_ids: &'a [RevisionId],
}

/// Properties a mapping wants set for a new revision.
///
/// `fileprops` holds only changes to the branch root; `base_fileprops` is
/// what the root carried before, so append-style properties can extend it.
#[derive(Debug, Clone, Default)]
pub struct ExportedProps {
    pub use_revprops: bool,
    pub revprops: PropMap,
    pub fileprops: PropMap,
    pub base_fileprops: PropMap,
}

impl ExportedProps {
    /// Metadata goes into revision properties.
    pub fn revprops(base_fileprops: PropMap) -> Self {
        Self {
            use_revprops: true,
            base_fileprops,
            ..Self::default()
        }
    }

    /// Metadata goes into branch-root file properties.
    pub fn fileprops(base_fileprops: PropMap) -> Self {
        Self {
            use_revprops: false,
            base_fileprops,
            ..Self::default()
        }
    }

    /// Current value of a branch-root property, pending changes included.
    pub fn fileprop(&self, name: &str) -> Option<&str> {
        self.fileprops
            .get(name)
            .or_else(|| self.base_fileprops.get(name))
            .map(String::as_str)
    }

    fn append_fileprop(&mut self, name: &str, text: &str) {
        let mut value = self.fileprop(name).unwrap_or_default().to_string();
        value.push_str(text);
        self.fileprops.insert(name.to_string(), value);
    }

    /// Set `name` to `text`, or blank it if it existed and `text` is empty.
    fn replace_fileprop(&mut self, name: &str, text: String) {
        if !text.is_empty() || self.fileprop(name).is_some() {
            self.fileprops.insert(name.to_string(), text);
        }
    }
}

/// Metadata in `bzr:*` file properties on the branch root, keyed by the
/// scheme name where a value accumulates one line per revision.
#[derive(Debug, Clone)]
pub struct FilePropStore {
    name: String,
}

impl FilePropStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn revision_id_key(&self) -> String {
        format!("{PROP_REVISION_ID}{}", self.name)
    }

    fn ancestry_key(&self) -> String {
        format!("{PROP_ANCESTRY}{}", self.name)
    }

    pub fn import_revision(
        &self,
        revprops: &PropMap,
        fileprops: &PropMap,
        _foreign: &ForeignRevision,
        rev: &mut Revision,
    ) -> Result<()> {
        parse_svn_revprops(revprops, rev)?;
        if let Some(log) = fileprops.get(PROP_LOG) {
            rev.message = log.clone();
        }
        if let Some(info) = fileprops.get(PROP_REVISION_INFO) {
            parse_revision_metadata(info, rev)?;
        }
        Ok(())
    }

    pub fn get_rhs_parents(&self, fileprops: &PropMap) -> Vec<RevisionId> {
        fileprops
            .get(&self.ancestry_key())
            .and_then(|text| text.lines().last())
            .map(parse_merge_line)
            .unwrap_or_default()
    }

    pub fn get_revision_id(&self, fileprops: &PropMap) -> Result<Option<(u64, RevisionId)>> {
        match fileprops.get(&self.revision_id_key()) {
            Some(text) => last_revid_line(text),
            None => Ok(None),
        }
    }

    pub fn import_fileid_map(&self, fileprops: &PropMap) -> Result<BTreeMap<String, FileId>> {
        match fileprops.get(PROP_FILEIDS) {
            Some(text) => parse_fileid_property(text),
            None => Ok(BTreeMap::new()),
        }
    }

    pub fn import_text_parents(&self, fileprops: &PropMap) -> Result<BTreeMap<String, RevisionId>> {
        match fileprops.get(PROP_TEXT_PARENTS) {
            Some(text) => parse_text_parents_property(text),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Whether the changed properties carry a revision id for this scheme.
    pub fn is_bzr_revision(&self, changed_fileprops: &PropMap) -> bool {
        changed_fileprops.contains_key(&self.revision_id_key())
    }

    pub fn export_revision(&self, export: &RevisionExport<'_>, out: &mut ExportedProps) -> Result<()> {
        if export.timestamp.is_some() || export.committer.is_some() || !export.properties.is_empty() {
            let info = generate_revision_metadata(
                export.timestamp,
                export.timezone,
                export.committer,
                export.properties,
            );
            out.fileprops.insert(PROP_REVISION_INFO.to_string(), info);
        }
        if let Some(revid) = export.revision_id {
            out.append_fileprop(&self.revision_id_key(), &generate_revid_line(export.revno, revid));
        }
        let merges = export.parent_ids.get(1..).unwrap_or_default();
        if !merges.is_empty() {
            let line = merges
                .iter()
                .map(RevisionId::as_str)
                .collect::<Vec<_>>()
                .join("\t");
            out.append_fileprop(&self.ancestry_key(), &format!("{line}\n"));
        }
        Ok(())
    }

    pub fn export_fileid_map(&self, map: &BTreeMap<String, FileId>, out: &mut ExportedProps) {
        out.replace_fileprop(PROP_FILEIDS, generate_fileid_property(map));
    }

    pub fn export_text_parents(&self, map: &BTreeMap<String, RevisionId>, out: &mut ExportedProps) {
        out.replace_fileprop(PROP_TEXT_PARENTS, generate_text_parents_property(map));
    }

    pub fn export_message(&self, message: &str, out: &mut ExportedProps) {
        out.fileprops.insert(PROP_LOG.to_string(), message.to_string());
    }

    /// Hiding bumps a counter so the property always changes.
    pub fn export_hidden(&self, out: &mut ExportedProps) {
        let count: u64 = out
            .fileprop(PROP_HIDDEN)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        out.fileprops
            .insert(PROP_HIDDEN.to_string(), (count + 1).to_string());
    }
}

/// Metadata in `bzr:*` revision properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevPropStore;

impl RevPropStore {
    pub fn import_revision(&self, revprops: &PropMap, rev: &mut Revision) -> Result<()> {
        parse_svn_revprops(revprops, rev)?;
        parse_bzr_revprops(revprops, rev)
    }

    /// Revision properties only describe the branch named in `bzr:root`.
    fn describes(&self, branch: &BranchPath, revprops: &PropMap) -> bool {
        revprops
            .get(REVPROP_ROOT)
            .is_some_and(|root| root.trim_matches('/') == branch.as_str())
    }

    pub fn get_lhs_parent(&self, revprops: &PropMap) -> Result<Option<RevisionId>> {
        revprops
            .get(REVPROP_BASE_REVISION)
            .map(|base| {
                RevisionId::new(base.as_str())
                    .map_err(|e| BridgeError::malformed(REVPROP_BASE_REVISION, e.to_string()))
            })
            .transpose()
    }

    pub fn get_rhs_parents(&self, branch: &BranchPath, revprops: &PropMap) -> Vec<RevisionId> {
        if !self.describes(branch, revprops) {
            return Vec::new();
        }
        revprops
            .get(REVPROP_MERGE)
            .map(|text| text.lines().flat_map(parse_merge_line).collect())
            .unwrap_or_default()
    }

    pub fn get_revision_id(
        &self,
        branch: &BranchPath,
        revprops: &PropMap,
    ) -> Result<Option<(u64, RevisionId)>> {
        if !self.describes(branch, revprops) {
            return Ok(None);
        }
        let Some(revid) = revprops.get(REVPROP_REVISION_ID) else {
            return Ok(None);
        };
        let revno = revprops
            .get(REVPROP_REVNO)
            .ok_or_else(|| BridgeError::malformed(REVPROP_REVNO, "missing alongside revision id"))?;
        parse_revid_line(&format!("{} {}", revno.trim(), revid.trim())).map(Some)
    }

    pub fn import_fileid_map(&self, revprops: &PropMap) -> Result<BTreeMap<String, FileId>> {
        match revprops.get(REVPROP_FILEIDS) {
            Some(text) => parse_fileid_property(text),
            None => Ok(BTreeMap::new()),
        }
    }

    pub fn import_text_parents(&self, revprops: &PropMap) -> Result<BTreeMap<String, RevisionId>> {
        match revprops.get(REVPROP_TEXT_PARENTS) {
            Some(text) => parse_text_parents_property(text),
            None => Ok(BTreeMap::new()),
        }
    }

    pub fn is_bzr_revision(&self, revprops: &PropMap) -> Option<bool> {
        if revprops.contains_key(REVPROP_MAPPING_VERSION) {
            Some(true)
        } else if revprops.contains_key(REVPROP_SKIP) {
            Some(false)
        } else {
            None
        }
    }

    pub fn export_revision(
        &self,
        mapping_version: &str,
        export: &RevisionExport<'_>,
        out: &mut ExportedProps,
    ) -> Result<()> {
        let revprops = &mut out.revprops;
        if let Some(timestamp) = export.timestamp {
            revprops.insert(
                REVPROP_TIMESTAMP.to_string(),
                props::format_highres_date(timestamp, export.timezone),
            );
        }
        if let Some(committer) = export.committer {
            revprops.insert(REVPROP_COMMITTER.to_string(), committer.to_string());
        }
        for (key, value) in export.properties {
            revprops.insert(format!("{REVPROP_REVPROP_PREFIX}{key}"), value.clone());
        }
        revprops.insert(REVPROP_ROOT.to_string(), export.branch_root.to_string());
        if let Some(revid) = export.revision_id {
            revprops.insert(REVPROP_REVISION_ID.to_string(), revid.to_string());
        }
        let merges = export.parent_ids.get(1..).unwrap_or_default();
        if !merges.is_empty() {
            let text: String = merges.iter().map(|m| format!("{m}\n")).collect();
            revprops.insert(REVPROP_MERGE.to_string(), text);
        }
        let base = export
            .parent_ids
            .first()
            .cloned()
            .unwrap_or_else(RevisionId::null);
        revprops.insert(REVPROP_BASE_REVISION.to_string(), base.to_string());
        revprops.insert(REVPROP_REVNO.to_string(), export.revno.to_string());
        revprops.insert(REVPROP_MAPPING_VERSION.to_string(), mapping_version.to_string());
        Ok(())
    }

    pub fn export_fileid_map(&self, map: &BTreeMap<String, FileId>, out: &mut ExportedProps) {
        if !map.is_empty() {
            out.revprops
                .insert(REVPROP_FILEIDS.to_string(), generate_fileid_property(map));
        }
    }

    pub fn export_text_parents(&self, map: &BTreeMap<String, RevisionId>, out: &mut ExportedProps) {
        if !map.is_empty() {
            out.revprops.insert(
                REVPROP_TEXT_PARENTS.to_string(),
                generate_text_parents_property(map),
            );
        }
    }

    pub fn export_message(&self, message: &str, out: &mut ExportedProps) {
        out.revprops
            .insert(REVPROP_LOG.to_string(), message.to_string());
    }

    pub fn export_hidden(&self, out: &mut ExportedProps) {
        out.revprops.insert(REVPROP_HIDDEN.to_string(), String::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepositoryUuid;

    fn rid(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn export<'a>(
        branch: &'a BranchPath,
        revid: Option<&'a RevisionId>,
        parents: &'a [RevisionId],
        properties: &'a BTreeMap<String, String>,
    ) -> RevisionExport<'a> {
        RevisionExport {
            branch_root: branch,
            timestamp: Some(1234567890.5),
            timezone: 3600,
            committer: Some("Jane <jane@example.com>"),
            properties,
            revision_id: revid,
            revno: 3,
            parent_ids: parents,
        }
    }

    #[test]
    fn fileprops_accumulate_lines() {
        let store = FilePropStore::new("v3-trunk0");
        let branch = BranchPath::new("trunk").unwrap();
        let mut base = PropMap::new();
        base.insert("bzr:revision-id:v3-trunk0".into(), "1 first\n".into());
        base.insert("bzr:ancestry:v3-trunk0".into(), "m0\n".into());
        let mut out = ExportedProps::fileprops(base);
        let revid = rid("mine");
        let parents = [rid("lhs"), rid("m1"), rid("m2")];
        let properties = BTreeMap::new();
        store
            .export_revision(&export(&branch, Some(&revid), &parents, &properties), &mut out)
            .unwrap();
        assert_eq!(out.fileprops["bzr:revision-id:v3-trunk0"], "1 first\n3 mine\n");
        assert_eq!(out.fileprops["bzr:ancestry:v3-trunk0"], "m0\nm1\tm2\n");
        assert!(out.fileprops["bzr:revision-info"].contains("committer: Jane"));

        let mut merged = out.base_fileprops.clone();
        merged.extend(out.fileprops.clone());
        assert_eq!(
            store.get_revision_id(&merged).unwrap(),
            Some((3, rid("mine")))
        );
        assert_eq!(store.get_rhs_parents(&merged), vec![rid("m1"), rid("m2")]);
        assert!(store.is_bzr_revision(&out.fileprops));
    }

    #[test]
    fn fileprops_import_prefers_revision_info() {
        let store = FilePropStore::new("v3-none");
        let mut revprops = PropMap::new();
        revprops.insert("svn:author".into(), "svnuser".into());
        revprops.insert("svn:log".into(), "svn message".into());
        revprops.insert("svn:date".into(), "2009-02-13T23:31:30.000000Z".into());
        let mut fileprops = PropMap::new();
        fileprops.insert("bzr:log".into(), "real message".into());
        fileprops.insert(
            "bzr:revision-info".into(),
            "timestamp: 2009-02-14 00:31:30.500000000 +0100\ncommitter: Jane\nproperties: \n\tbranch-nick: trunk\n".into(),
        );
        let foreign = ForeignRevision::new(
            RepositoryUuid::new("u").unwrap(),
            BranchPath::root(),
            1,
        );
        let mut rev = Revision::default();
        store
            .import_revision(&revprops, &fileprops, &foreign, &mut rev)
            .unwrap();
        assert_eq!(rev.committer, "Jane");
        assert_eq!(rev.message, "real message");
        assert_eq!(rev.timestamp, 1234567890.5);
        assert_eq!(rev.timezone, 3600);
        assert_eq!(rev.properties["branch-nick"], "trunk");
    }

    #[test]
    fn empty_fileid_map_blanks_existing() {
        let store = FilePropStore::new("v3-none");
        let mut out = ExportedProps::fileprops(PropMap::new());
        store.export_fileid_map(&BTreeMap::new(), &mut out);
        assert!(out.fileprops.is_empty());

        let mut base = PropMap::new();
        base.insert("bzr:file-ids".into(), "a\tid-a\n".into());
        let mut out = ExportedProps::fileprops(base);
        store.export_fileid_map(&BTreeMap::new(), &mut out);
        assert_eq!(out.fileprops["bzr:file-ids"], "");
    }

    #[test]
    fn hidden_counter_increments() {
        let store = FilePropStore::new("v4");
        let mut base = PropMap::new();
        base.insert("bzr:hidden".into(), "2".into());
        let mut out = ExportedProps::fileprops(base);
        store.export_hidden(&mut out);
        assert_eq!(out.fileprops["bzr:hidden"], "3");
    }

    #[test]
    fn revprops_roundtrip() {
        let store = RevPropStore;
        let branch = BranchPath::new("branches/foo").unwrap();
        let revid = rid("custom-id");
        let parents = [rid("base"), rid("merged")];
        let mut properties = BTreeMap::new();
        properties.insert("branch-nick".to_string(), "foo".to_string());
        let mut out = ExportedProps::revprops(PropMap::new());
        store
            .export_revision("v4", &export(&branch, Some(&revid), &parents, &properties), &mut out)
            .unwrap();
        let revprops = &out.revprops;
        assert_eq!(revprops["bzr:root"], "branches/foo");
        assert_eq!(revprops["bzr:merge"], "merged\n");
        assert_eq!(revprops["bzr:base-revision"], "base");
        assert_eq!(revprops["bzr:revno"], "3");
        assert_eq!(revprops["bzr:mapping-version"], "v4");
        assert_eq!(revprops["bzr:revprop:branch-nick"], "foo");

        assert_eq!(store.is_bzr_revision(revprops), Some(true));
        assert_eq!(store.get_lhs_parent(revprops).unwrap(), Some(rid("base")));
        assert_eq!(store.get_rhs_parents(&branch, revprops), vec![rid("merged")]);
        assert_eq!(
            store.get_revision_id(&branch, revprops).unwrap(),
            Some((3, revid.clone()))
        );
        let other = BranchPath::new("trunk").unwrap();
        assert!(store.get_rhs_parents(&other, revprops).is_empty());
        assert_eq!(store.get_revision_id(&other, revprops).unwrap(), None);

        let mut rev = Revision::default();
        store.import_revision(revprops, &mut rev).unwrap();
        assert_eq!(rev.committer, "Jane <jane@example.com>");
        assert_eq!(rev.timezone, 3600);
        assert_eq!(rev.properties["branch-nick"], "foo");
    }

    #[test]
    fn parentless_base_is_null() {
        let branch = BranchPath::new("trunk").unwrap();
        let properties = BTreeMap::new();
        let mut out = ExportedProps::revprops(PropMap::new());
        RevPropStore
            .export_revision("v4", &export(&branch, None, &[], &properties), &mut out)
            .unwrap();
        assert_eq!(out.revprops["bzr:base-revision"], "null:");
        assert!(!out.revprops.contains_key("bzr:merge"));
        assert!(!out.revprops.contains_key("bzr:revision-id"));
    }

    #[test]
    fn skip_marker() {
        let mut revprops = PropMap::new();
        assert_eq!(RevPropStore.is_bzr_revision(&revprops), None);
        revprops.insert("bzr:skip".into(), String::new());
        assert_eq!(RevPropStore.is_bzr_revision(&revprops), Some(false));
    }
}
