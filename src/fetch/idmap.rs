//! fetch::idmap
//!
//! File ids for the paths a revision creates.
//!
//! Every path added or replaced below the branch root gets the id its
//! scheme generates for `(revnum, path)`. A branch root that was copied
//! keeps the identities it was copied with, so only an uncopied root gets a
//! fresh id. Ids recorded by a push (`bzr:file-ids`) override both.

use std::collections::BTreeMap;

use crate::core::types::{BranchPath, FileId, RepositoryUuid, RevNum};
use crate::mapping::MappingScheme;
use crate::transport::ChangedPaths;

/// Path of `path` relative to `branch`, if it lies inside it.
pub fn branch_relative(path: &str, branch: &BranchPath) -> Option<String> {
    let path = path.trim_matches('/');
    if branch.is_root() {
        return Some(path.to_string());
    }
    if path == branch.as_str() {
        return Some(String::new());
    }
    path.strip_prefix(branch.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

/// Ids for the paths `changes` creates below `branch`, keyed by
/// branch-relative path.
pub fn determine_fileid_map(
    mapping: &dyn MappingScheme,
    uuid: &RepositoryUuid,
    revnum: RevNum,
    branch: &BranchPath,
    changes: &ChangedPaths,
    overrides: &BTreeMap<String, FileId>,
) -> BTreeMap<String, FileId> {
    let mut map = BTreeMap::new();
    for (path, change) in changes {
        if !change.action.creates_node() {
            continue;
        }
        let Some(rel) = branch_relative(path, branch) else {
            continue;
        };
        if rel.is_empty() && change.copyfrom.is_some() {
            continue;
        }
        let id = mapping.generate_file_id(uuid, revnum, branch, &rel);
        map.insert(rel, id);
    }
    map.extend(overrides.iter().map(|(path, id)| (path.clone(), id.clone())));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingV4;
    use crate::transport::{ChangeAction, ChangedPath, CopyFrom};

    fn uuid() -> RepositoryUuid {
        RepositoryUuid::new("0000-1111").unwrap()
    }

    #[test]
    fn relative_paths() {
        let trunk = BranchPath::new("proj/trunk").unwrap();
        assert_eq!(branch_relative("proj/trunk", &trunk).as_deref(), Some(""));
        assert_eq!(branch_relative("proj/trunk/a/b", &trunk).as_deref(), Some("a/b"));
        assert_eq!(branch_relative("proj/trunkx", &trunk), None);
        assert_eq!(branch_relative("a", &BranchPath::root()).as_deref(), Some("a"));
    }

    #[test]
    fn generated_and_overridden_ids() {
        let trunk = BranchPath::new("trunk").unwrap();
        let mut changes = ChangedPaths::new();
        changes.insert("trunk/new".into(), ChangedPath::new(ChangeAction::Add));
        changes.insert("trunk/mod".into(), ChangedPath::new(ChangeAction::Modify));
        changes.insert(
            "trunk/copied".into(),
            ChangedPath::copied(ChangeAction::Add, CopyFrom::new("trunk/new", 3)),
        );
        changes.insert("branches/x".into(), ChangedPath::new(ChangeAction::Add));
        let mut overrides = BTreeMap::new();
        overrides.insert("copied".to_string(), FileId::new("kept-id").unwrap());

        let map = determine_fileid_map(&MappingV4, &uuid(), 4, &trunk, &changes, &overrides);
        assert_eq!(map.len(), 2);
        assert_eq!(map["new"].as_str(), "4@0000-1111:trunk%2Fnew");
        assert_eq!(map["copied"].as_str(), "kept-id");
    }

    #[test]
    fn copied_root_inherits() {
        let branch = BranchPath::new("branches/b").unwrap();
        let mut changes = ChangedPaths::new();
        changes.insert(
            "branches/b".into(),
            ChangedPath::copied(ChangeAction::Add, CopyFrom::new("trunk", 2)),
        );
        let map = determine_fileid_map(&MappingV4, &uuid(), 3, &branch, &changes, &BTreeMap::new());
        assert!(map.is_empty());

        changes.insert("branches/b".into(), ChangedPath::new(ChangeAction::Replace));
        let map = determine_fileid_map(&MappingV4, &uuid(), 3, &branch, &changes, &BTreeMap::new());
        assert_eq!(map[""].as_str(), "3@0000-1111:branches%2Fb%2F");
    }
}
