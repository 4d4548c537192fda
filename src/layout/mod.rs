//! layout
//!
//! Branch layout classification.
//!
//! The source repository is one flat namespace; a layout decides which
//! paths are branch roots, which are tags, and which project each belongs
//! to.
//!
//! # Classification
//!
//! [`RepositoryLayout::classify`] returns a typed [`Classification`]. A path
//! outside every branch is `NotABranchPath`, a normal result rather than an
//! error, so callers can try another layout or skip the path. Real failures
//! (an unreachable server while enumerating) use the error channel.
//!
//! # Layouts
//!
//! - [`TrunkLayout`] - `<project…>/trunk`, `<project…>/branches/*`, `<project…>/tags/*`
//! - [`RootLayout`] - the whole repository is one branch
//! - [`CustomLayout`] - explicit branch and tag paths
//! - [`WildcardLayout`] - glob lists with whole-segment `*`
//! - [`InverseTrunkLayout`] - `trunk/<project…>`, `branches/*/<project…>`
//!
//! # Example
//!
//! ```
//! use svnbridge::layout::{Classification, RepositoryLayout, TrunkLayout};
//!
//! let layout = TrunkLayout::new(1);
//! match layout.classify("proj/branches/feature/src/main.rs") {
//!     Classification::Branch(loc) => {
//!         assert_eq!(loc.project, "proj");
//!         assert_eq!(loc.branch_root.as_str(), "proj/branches/feature");
//!         assert_eq!(loc.remainder, "src/main.rs");
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! assert!(layout.is_tag("proj/tags/1.0"));
//! assert!(!layout.is_branch("proj/trunk/src"));
//! ```

pub mod custom;
pub mod standard;

pub use custom::{wildcard_matches, BranchPatternExpander, CustomLayout, WildcardLayout};
pub use standard::{InverseTrunkLayout, RootLayout, TrunkLayout};

use std::fmt;

use crate::core::types::{BranchPath, RevNum};
use crate::core::Result;

/// Where a path sits relative to its branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLocation {
    /// Project the branch belongs to (empty if the layout has none).
    pub project: String,
    /// The branch or tag root.
    pub branch_root: BranchPath,
    /// Path below the branch root (empty for the root itself).
    pub remainder: String,
}

/// Result of classifying a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Branch(BranchLocation),
    Tag(BranchLocation),
    NotABranchPath,
}

impl Classification {
    /// The location, for branches and tags alike.
    pub fn location(&self) -> Option<&BranchLocation> {
        match self {
            Self::Branch(loc) | Self::Tag(loc) => Some(loc),
            Self::NotABranchPath => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }
}

/// A concrete branch or tag found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub project: String,
    pub path: BranchPath,
    pub name: String,
}

/// Read access to a historical tree, as needed for branch enumeration.
pub trait PathLister {
    /// Whether `path` is a directory at `revnum`.
    fn is_dir(&self, path: &str, revnum: RevNum) -> Result<bool>;

    /// Names of the subdirectories of `path`, or `None` if `path` is
    /// missing or not a directory.
    fn list_subdirs(&self, path: &str, revnum: RevNum) -> Result<Option<Vec<String>>>;
}

/// A branch/tag classifier for one repository.
pub trait RepositoryLayout: fmt::Debug + Send + Sync {
    /// Registry name of this layout.
    fn name(&self) -> String;

    /// Classify a repository path.
    fn classify(&self, path: &str) -> Classification;

    /// Path of the branch called `name` in `project`.
    fn get_branch_path(&self, name: &str, project: &str) -> Result<BranchPath>;

    /// Path of the tag called `name` in `project`.
    fn get_tag_path(&self, name: &str, project: &str) -> Result<BranchPath>;

    /// Glob patterns matching every branch root.
    fn branch_patterns(&self, project: Option<&str>) -> Vec<String>;

    /// Glob patterns matching every tag root.
    fn tag_patterns(&self, project: Option<&str>) -> Vec<String>;

    /// Whether new branches may be created below `path`.
    fn is_branch_parent(&self, path: &str, project: &str) -> bool;

    /// Whether new tags may be created below `path`.
    fn is_tag_parent(&self, path: &str, project: &str) -> bool;

    fn supports_tags(&self) -> bool {
        true
    }

    /// Tag name for a tag root.
    fn get_tag_name(&self, path: &str) -> String {
        path.trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Whether `path` is exactly a branch root.
    fn is_branch(&self, path: &str) -> bool {
        matches!(self.classify(path), Classification::Branch(loc) if loc.remainder.is_empty())
    }

    /// Whether `path` is exactly a tag root.
    fn is_tag(&self, path: &str) -> bool {
        matches!(self.classify(path), Classification::Tag(loc) if loc.remainder.is_empty())
    }

    fn is_branch_or_tag(&self, path: &str) -> bool {
        self.is_branch(path) || self.is_tag(path)
    }

    /// Branch roots that exist at `revnum`.
    fn enumerate_branches(
        &self,
        lister: &dyn PathLister,
        revnum: RevNum,
        project: Option<&str>,
    ) -> Result<Vec<BranchInfo>> {
        collect_roots(self, lister, revnum, &self.branch_patterns(project), project, false)
    }

    /// Tag roots that exist at `revnum`.
    fn enumerate_tags(
        &self,
        lister: &dyn PathLister,
        revnum: RevNum,
        project: Option<&str>,
    ) -> Result<Vec<BranchInfo>> {
        if !self.supports_tags() {
            return Ok(Vec::new());
        }
        collect_roots(self, lister, revnum, &self.tag_patterns(project), project, true)
    }
}

/// Expand `patterns` and keep the results the layout agrees with.
fn collect_roots<L: RepositoryLayout + ?Sized>(
    layout: &L,
    lister: &dyn PathLister,
    revnum: RevNum,
    patterns: &[String],
    project: Option<&str>,
    tags: bool,
) -> Result<Vec<BranchInfo>> {
    let mut found = Vec::new();
    for pattern in patterns {
        for path in BranchPatternExpander::new(lister, revnum, pattern, project) {
            let path = path?;
            let classification = layout.classify(&path);
            let keep = match &classification {
                Classification::Branch(loc) => !tags && loc.remainder.is_empty(),
                Classification::Tag(loc) => tags && loc.remainder.is_empty(),
                Classification::NotABranchPath => false,
            };
            if let (true, Some(loc)) = (keep, classification.location()) {
                found.push(BranchInfo {
                    project: loc.project.clone(),
                    name: layout.get_tag_name(&path),
                    path: loc.branch_root.clone(),
                });
            }
        }
    }
    Ok(found)
}

/// Build a layout from its registry name.
///
/// Known names: `root`, `none`, `trunk`, `trunkN`, `itrunkN`.
pub fn layout_from_name(name: &str) -> Option<Box<dyn RepositoryLayout>> {
    match name {
        "root" | "none" => Some(Box::new(RootLayout)),
        "trunk" => Some(Box::new(TrunkLayout::new(0))),
        _ => {
            if let Some(level) = name.strip_prefix("itrunk") {
                let level = level.parse().ok()?;
                return Some(Box::new(InverseTrunkLayout::new(level)));
            }
            let level = name.strip_prefix("trunk")?.parse().ok()?;
            Some(Box::new(TrunkLayout::new(level)))
        }
    }
}

/// Whether `name` is a valid registry name.
pub fn is_known_layout_name(name: &str) -> bool {
    layout_from_name(name).is_some()
}

/// Pick the layout that explains the most of the given paths.
///
/// Tries trunk layouts of increasing project depth; ties go to the
/// shallower layout. Falls back to [`RootLayout`] when no trunk layout
/// recognizes any path.
pub fn guess_layout<'a>(paths: impl IntoIterator<Item = &'a str>) -> Box<dyn RepositoryLayout> {
    const MAX_GUESS_LEVEL: usize = 3;
    let paths: Vec<&str> = paths.into_iter().collect();

    let mut best: Option<(usize, usize)> = None;
    for level in 0..=MAX_GUESS_LEVEL {
        let layout = TrunkLayout::new(level);
        let score = paths
            .iter()
            .filter(|p| layout.classify(p) != Classification::NotABranchPath)
            .count();
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((level, score));
        }
    }

    match best {
        Some((level, _)) => Box::new(TrunkLayout::new(level)),
        None => Box::new(RootLayout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names() {
        assert_eq!(layout_from_name("root").unwrap().name(), "root");
        assert_eq!(layout_from_name("none").unwrap().name(), "root");
        assert_eq!(layout_from_name("trunk").unwrap().name(), "trunk0");
        assert_eq!(layout_from_name("trunk2").unwrap().name(), "trunk2");
        assert_eq!(layout_from_name("itrunk1").unwrap().name(), "itrunk1");
        assert!(layout_from_name("trunkx").is_none());
        assert!(layout_from_name("wildcard").is_none());
        assert!(is_known_layout_name("trunk1"));
    }

    #[test]
    fn guess_prefers_matching_level() {
        let layout = guess_layout([
            "proj/trunk/a",
            "proj/branches/foo/b",
            "other/tags/1.0",
        ]);
        assert_eq!(layout.name(), "trunk1");
    }

    #[test]
    fn guess_falls_back_to_root() {
        let layout = guess_layout(["src/main.c", "README"]);
        assert_eq!(layout.name(), "root");
    }

    #[test]
    fn classification_location() {
        let layout = TrunkLayout::new(0);
        let c = layout.classify("tags/1.0/README");
        assert!(c.is_tag());
        assert_eq!(c.location().unwrap().remainder, "README");
        assert_eq!(layout.classify("random/path").location(), None);
    }
}
