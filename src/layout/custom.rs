//! layout::custom
//!
//! Layouts configured with explicit branch and tag lists, and the wildcard
//! expansion used to enumerate branches at a historical revision.

use super::{BranchInfo, BranchLocation, Classification, PathLister, RepositoryLayout};
use crate::core::types::{BranchPath, RevNum};
use crate::core::{BridgeError, Result};

/// Whether `path` matches `pattern`, where a `*` segment matches any single
/// path component.
///
/// ```
/// use svnbridge::layout::wildcard_matches;
///
/// assert!(wildcard_matches("branches/foo", "branches/*"));
/// assert!(!wildcard_matches("branches/foo/bar", "branches/*"));
/// assert!(wildcard_matches("trunk", "trunk"));
/// ```
pub fn wildcard_matches(path: &str, pattern: &str) -> bool {
    let path = path.trim_matches('/');
    let pattern = pattern.trim_matches('/');
    if path.is_empty() || pattern.is_empty() {
        return path.is_empty() && pattern.is_empty();
    }
    let ps: Vec<&str> = path.split('/').collect();
    let pp: Vec<&str> = pattern.split('/').collect();
    ps.len() == pp.len() && ps.iter().zip(&pp).all(|(p, q)| *q == "*" || p == q)
}

/// Lazily expands one wildcard pattern into the existing paths it matches.
///
/// The traversal keeps an explicit stack of partially expanded prefixes, so
/// arbitrarily deep patterns never recurse. Results come out in the order
/// a depth-first walk of the directory listings would produce them. A
/// missing directory contributes no matches; any other listing error is
/// yielded once and ends the expansion.
pub struct BranchPatternExpander<'a> {
    lister: &'a dyn PathLister,
    revnum: RevNum,
    segments: Vec<String>,
    project: Option<String>,
    stack: Vec<Frame>,
    failed: bool,
}

enum Frame {
    /// Path components opened so far, and the index of the next pattern segment.
    Pending(Vec<String>, usize),
    /// A listed child of a final wildcard, already known to be a directory.
    Found(String),
}

impl<'a> BranchPatternExpander<'a> {
    pub fn new(
        lister: &'a dyn PathLister,
        revnum: RevNum,
        pattern: &str,
        project: Option<&str>,
    ) -> Self {
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            lister,
            revnum,
            segments,
            project: project
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            stack: vec![Frame::Pending(Vec::new(), 0)],
            failed: false,
        }
    }

    /// Whether a prefix can still lead to (or lie within) the project.
    fn within_project(&self, path: &str) -> bool {
        match &self.project {
            None => true,
            Some(project) => {
                path.is_empty()
                    || project == path
                    || project.starts_with(&format!("{path}/"))
                    || path.starts_with(&format!("{project}/"))
            }
        }
    }

    fn step(&mut self) -> Result<Option<String>> {
        while let Some(frame) = self.stack.pop() {
            let (begin, idx) = match frame {
                Frame::Found(path) => return Ok(Some(path)),
                Frame::Pending(begin, idx) => (begin, idx),
            };
            let path = begin.join("/");
            if !self.within_project(&path) {
                continue;
            }
            if idx == self.segments.len() {
                if self.lister.is_dir(&path, self.revnum)? {
                    return Ok(Some(path));
                }
                continue;
            }
            let segment = &self.segments[idx];
            if segment != "*" {
                let mut next = begin;
                next.push(segment.clone());
                self.stack.push(Frame::Pending(next, idx + 1));
                continue;
            }
            let Some(children) = self.lister.list_subdirs(&path, self.revnum)? else {
                continue;
            };
            let last = idx + 1 == self.segments.len();
            for child in children.into_iter().rev() {
                let mut next = begin.clone();
                next.push(child);
                let frame = if last {
                    Frame::Found(next.join("/"))
                } else {
                    Frame::Pending(next, idx + 1)
                };
                self.stack.push(frame);
            }
        }
        Ok(None)
    }
}

impl Iterator for BranchPatternExpander<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            match self.step() {
                Ok(Some(path)) if !self.within_project(&path) => continue,
                Ok(Some(path)) => return Some(Ok(path)),
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn prefix_match(path: &str, root: &str) -> Option<String> {
    let root = root.trim_matches('/');
    if path == root {
        return Some(String::new());
    }
    if root.is_empty() {
        return Some(path.to_string());
    }
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

/// Explicit lists of branch and tag paths.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomLayout {
    branches: Vec<String>,
    tags: Vec<String>,
}

impl CustomLayout {
    pub fn new(branches: Vec<String>, tags: Vec<String>) -> Self {
        let normalize = |mut list: Vec<String>| {
            for item in &mut list {
                *item = item.trim_matches('/').to_string();
            }
            list.sort();
            list.dedup();
            list
        };
        Self {
            branches: normalize(branches),
            tags: normalize(tags),
        }
    }

    fn locate(list: &[String], path: &str) -> Option<BranchLocation> {
        list.iter().find_map(|root| {
            let remainder = prefix_match(path, root)?;
            Some(BranchLocation {
                project: String::new(),
                branch_root: BranchPath::new(root).ok()?,
                remainder,
            })
        })
    }

    fn existing(
        list: &[String],
        lister: &dyn PathLister,
        revnum: RevNum,
    ) -> Result<Vec<BranchInfo>> {
        let mut found = Vec::new();
        for item in list {
            if lister.is_dir(item, revnum)? {
                found.push(BranchInfo {
                    project: String::new(),
                    path: BranchPath::new(item)?,
                    name: item.rsplit('/').next().unwrap_or_default().to_string(),
                });
            }
        }
        Ok(found)
    }
}

impl RepositoryLayout for CustomLayout {
    fn name(&self) -> String {
        "custom".to_string()
    }

    fn classify(&self, path: &str) -> Classification {
        let path = path.trim_matches('/');
        if let Some(loc) = Self::locate(&self.branches, path) {
            return Classification::Branch(loc);
        }
        if let Some(loc) = Self::locate(&self.tags, path) {
            return Classification::Tag(loc);
        }
        Classification::NotABranchPath
    }

    fn get_branch_path(&self, name: &str, _project: &str) -> Result<BranchPath> {
        Err(BridgeError::unsupported(format!(
            "custom layout cannot derive a path for branch '{name}'"
        )))
    }

    fn get_tag_path(&self, name: &str, _project: &str) -> Result<BranchPath> {
        Err(BridgeError::unsupported(format!(
            "custom layout cannot derive a path for tag '{name}'"
        )))
    }

    fn branch_patterns(&self, _project: Option<&str>) -> Vec<String> {
        self.branches.clone()
    }

    fn tag_patterns(&self, _project: Option<&str>) -> Vec<String> {
        self.tags.clone()
    }

    fn is_branch_parent(&self, _path: &str, _project: &str) -> bool {
        false
    }

    fn is_tag_parent(&self, _path: &str, _project: &str) -> bool {
        false
    }

    fn supports_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    fn enumerate_branches(
        &self,
        lister: &dyn PathLister,
        revnum: RevNum,
        _project: Option<&str>,
    ) -> Result<Vec<BranchInfo>> {
        Self::existing(&self.branches, lister, revnum)
    }

    fn enumerate_tags(
        &self,
        lister: &dyn PathLister,
        revnum: RevNum,
        _project: Option<&str>,
    ) -> Result<Vec<BranchInfo>> {
        Self::existing(&self.tags, lister, revnum)
    }
}

/// Branch and tag glob lists with whole-segment `*` wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WildcardLayout {
    branches: Vec<String>,
    tags: Vec<String>,
}

impl WildcardLayout {
    pub fn new(branches: Vec<String>, tags: Vec<String>) -> Self {
        let trim = |list: Vec<String>| {
            list.into_iter()
                .map(|p| p.trim_matches('/').to_string())
                .collect()
        };
        Self {
            branches: trim(branches),
            tags: trim(tags),
        }
    }

    fn matches_any(list: &[String], path: &str) -> bool {
        list.iter().any(|pattern| wildcard_matches(path, pattern))
    }
}

impl RepositoryLayout for WildcardLayout {
    fn name(&self) -> String {
        "wildcard".to_string()
    }

    fn classify(&self, path: &str) -> Classification {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Classification::NotABranchPath;
        }
        let parts: Vec<&str> = trimmed.split('/').collect();
        for i in 1..=parts.len() {
            let candidate = parts[..i].join("/");
            let is_branch = Self::matches_any(&self.branches, &candidate);
            let is_tag = !is_branch && Self::matches_any(&self.tags, &candidate);
            if !is_branch && !is_tag {
                continue;
            }
            let Ok(branch_root) = BranchPath::new(&candidate) else {
                return Classification::NotABranchPath;
            };
            let location = BranchLocation {
                project: String::new(),
                branch_root,
                remainder: parts[i..].join("/"),
            };
            return if is_branch {
                Classification::Branch(location)
            } else {
                Classification::Tag(location)
            };
        }
        Classification::NotABranchPath
    }

    fn get_branch_path(&self, name: &str, _project: &str) -> Result<BranchPath> {
        for pattern in &self.branches {
            if let Some(prefix) = pattern.strip_suffix("/*") {
                if !prefix.contains('*') {
                    return Ok(BranchPath::new(format!("{prefix}/{name}"))?);
                }
            }
        }
        Err(BridgeError::unsupported(format!(
            "no single-wildcard branch pattern to place '{name}'"
        )))
    }

    fn get_tag_path(&self, name: &str, _project: &str) -> Result<BranchPath> {
        for pattern in &self.tags {
            if let Some(prefix) = pattern.strip_suffix("/*") {
                if !prefix.contains('*') {
                    return Ok(BranchPath::new(format!("{prefix}/{name}"))?);
                }
            }
        }
        Err(BridgeError::unsupported(format!(
            "no single-wildcard tag pattern to place '{name}'"
        )))
    }

    fn branch_patterns(&self, _project: Option<&str>) -> Vec<String> {
        self.branches.clone()
    }

    fn tag_patterns(&self, _project: Option<&str>) -> Vec<String> {
        self.tags.clone()
    }

    fn is_branch_parent(&self, path: &str, _project: &str) -> bool {
        Self::matches_any(&self.branches, &format!("{}/aname", path.trim_matches('/')))
    }

    fn is_tag_parent(&self, path: &str, _project: &str) -> bool {
        Self::matches_any(&self.tags, &format!("{}/aname", path.trim_matches('/')))
    }

    fn supports_tags(&self) -> bool {
        !self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// A static directory tree for expansion tests.
    struct Tree {
        dirs: BTreeMap<String, Vec<String>>,
    }

    impl Tree {
        fn new(paths: &[&str]) -> Self {
            let mut dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
            dirs.insert(String::new(), Vec::new());
            for path in paths {
                let mut parent = String::new();
                for part in path.split('/') {
                    let child = if parent.is_empty() {
                        part.to_string()
                    } else {
                        format!("{parent}/{part}")
                    };
                    let entry = dirs.entry(parent.clone()).or_default();
                    if !entry.contains(&part.to_string()) {
                        entry.push(part.to_string());
                    }
                    dirs.entry(child.clone()).or_default();
                    parent = child;
                }
            }
            Self { dirs }
        }
    }

    impl PathLister for Tree {
        fn is_dir(&self, path: &str, _revnum: RevNum) -> Result<bool> {
            Ok(self.dirs.contains_key(path))
        }

        fn list_subdirs(&self, path: &str, _revnum: RevNum) -> Result<Option<Vec<String>>> {
            Ok(self.dirs.get(path).cloned())
        }
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_matches("trunk", "trunk"));
        assert!(wildcard_matches("a/b/c", "a/*/c"));
        assert!(!wildcard_matches("a/b", "a/*/c"));
        assert!(!wildcard_matches("a", ""));
        assert!(wildcard_matches("", ""));
    }

    #[test]
    fn expander_walks_in_order() {
        let tree = Tree::new(&["branches/a", "branches/b", "trunk", "tags/x"]);
        let found: Vec<String> = BranchPatternExpander::new(&tree, 1, "branches/*", None)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(found, vec!["branches/a".to_string(), "branches/b".to_string()]);
    }

    #[test]
    fn expander_missing_dir_yields_nothing() {
        let tree = Tree::new(&["trunk"]);
        let found: Vec<String> = BranchPatternExpander::new(&tree, 1, "branches/*", None)
            .collect::<Result<_>>()
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn expander_nested_wildcards_and_project_filter() {
        let tree = Tree::new(&["p1/branches/a", "p1/branches/b", "p2/branches/c"]);
        let all: Vec<String> = BranchPatternExpander::new(&tree, 1, "*/branches/*", None)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(all, vec!["p1/branches/a", "p1/branches/b", "p2/branches/c"]);

        let p2: Vec<String> = BranchPatternExpander::new(&tree, 1, "*/branches/*", Some("p2"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(p2, vec!["p2/branches/c"]);
    }

    #[test]
    fn expander_literal_pattern_checks_existence() {
        let tree = Tree::new(&["trunk"]);
        let found: Vec<String> = BranchPatternExpander::new(&tree, 1, "trunk", None)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(found, vec!["trunk"]);
        let missing: Vec<String> = BranchPatternExpander::new(&tree, 1, "stable", None)
            .collect::<Result<_>>()
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn custom_layout() {
        let layout = CustomLayout::new(vec!["/stable/".into(), "dev".into()], vec!["rel/1.0".into()]);
        assert!(layout.is_branch("stable"));
        assert!(layout.is_tag("rel/1.0"));
        match layout.classify("dev/src/a.c") {
            Classification::Branch(loc) => {
                assert_eq!(loc.branch_root.as_str(), "dev");
                assert_eq!(loc.remainder, "src/a.c");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(layout.classify("devel"), Classification::NotABranchPath);

        let tree = Tree::new(&["stable", "rel/1.0"]);
        let branches = layout.enumerate_branches(&tree, 1, None).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].path.as_str(), "stable");
        assert_eq!(layout.enumerate_tags(&tree, 1, None).unwrap().len(), 1);
    }

    #[test]
    fn wildcard_layout() {
        let layout = WildcardLayout::new(
            vec!["trunk".into(), "people/*/work".into()],
            vec!["tags/*".into()],
        );
        assert!(layout.is_branch("people/ann/work"));
        assert!(!layout.is_branch("people/ann"));
        assert!(layout.is_tag("tags/2.0"));
        match layout.classify("people/ann/work/x/y") {
            Classification::Branch(loc) => assert_eq!(loc.remainder, "x/y"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(layout.is_tag_parent("tags", ""));
        assert_eq!(layout.get_tag_path("3.0", "").unwrap().as_str(), "tags/3.0");
        assert!(layout.get_branch_path("x", "").is_err());

        let tree = Tree::new(&["trunk", "people/ann/work", "people/bob/work", "people/cy/play"]);
        let names: Vec<String> = layout
            .enumerate_branches(&tree, 1, None)
            .unwrap()
            .into_iter()
            .map(|b| b.path.to_string())
            .collect();
        assert_eq!(names, vec!["trunk", "people/ann/work", "people/bob/work"]);
    }
}
