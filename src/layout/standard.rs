//! layout::standard
//!
//! The conventional trunk/branches/tags layouts and the single-branch root
//! layout.

use super::{BranchInfo, BranchLocation, Classification, PathLister, RepositoryLayout};
use crate::core::types::{BranchPath, RevNum};
use crate::core::{BridgeError, Result};

fn join_parts(parts: &[&str]) -> String {
    parts.join("/")
}

fn project_prefix(project: &str, rest: &str) -> Result<BranchPath> {
    let joined = if project.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", project.trim_matches('/'), rest)
    };
    Ok(BranchPath::new(joined)?)
}

/// `<project>/trunk`, `<project>/branches/<name>`, `<project>/tags/<name>`,
/// where the project is exactly `level` path components deep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrunkLayout {
    level: usize,
}

impl TrunkLayout {
    pub fn new(level: usize) -> Self {
        Self { level }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    fn wildcard_prefix(&self, project: Option<&str>) -> String {
        match project {
            Some(p) if !p.is_empty() => format!("{}/", p.trim_matches('/')),
            Some(_) => String::new(),
            None => "*/".repeat(self.level),
        }
    }
}

impl RepositoryLayout for TrunkLayout {
    fn name(&self) -> String {
        format!("trunk{}", self.level)
    }

    fn classify(&self, path: &str) -> Classification {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Classification::NotABranchPath;
        }
        let parts: Vec<&str> = trimmed.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            let after_container = i > 0 && matches!(parts[i - 1], "branches" | "tags");
            if !after_container && *part != "trunk" {
                continue;
            }
            let (is_tag, project_end) = if i > 0 && parts[i - 1] == "tags" {
                (true, i - 1)
            } else if i > 0 && parts[i - 1] == "branches" {
                (false, i - 1)
            } else {
                (false, i)
            };
            if project_end != self.level {
                continue;
            }
            let Ok(branch_root) = BranchPath::new(join_parts(&parts[..=i])) else {
                return Classification::NotABranchPath;
            };
            let location = BranchLocation {
                project: join_parts(&parts[..project_end]),
                branch_root,
                remainder: join_parts(&parts[i + 1..]),
            };
            return if is_tag {
                Classification::Tag(location)
            } else {
                Classification::Branch(location)
            };
        }
        Classification::NotABranchPath
    }

    fn get_branch_path(&self, name: &str, project: &str) -> Result<BranchPath> {
        if name == "trunk" {
            project_prefix(project, "trunk")
        } else {
            project_prefix(project, &format!("branches/{name}"))
        }
    }

    fn get_tag_path(&self, name: &str, project: &str) -> Result<BranchPath> {
        project_prefix(project, &format!("tags/{name}"))
    }

    fn branch_patterns(&self, project: Option<&str>) -> Vec<String> {
        let prefix = self.wildcard_prefix(project);
        vec![format!("{prefix}trunk"), format!("{prefix}branches/*")]
    }

    fn tag_patterns(&self, project: Option<&str>) -> Vec<String> {
        vec![format!("{}tags/*", self.wildcard_prefix(project))]
    }

    fn is_branch_parent(&self, path: &str, _project: &str) -> bool {
        let trimmed = path.trim_matches('/');
        let depth = if trimmed.is_empty() {
            0
        } else {
            trimmed.split('/').count()
        };
        if depth <= self.level {
            return true;
        }
        self.is_branch(&format!("{trimmed}/trunk"))
    }

    fn is_tag_parent(&self, path: &str, _project: &str) -> bool {
        self.is_tag(&format!("{}/aname", path.trim_matches('/')))
    }
}

/// The whole repository is a single branch rooted at `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RootLayout;

impl RepositoryLayout for RootLayout {
    fn name(&self) -> String {
        "root".to_string()
    }

    fn classify(&self, path: &str) -> Classification {
        Classification::Branch(BranchLocation {
            project: String::new(),
            branch_root: BranchPath::root(),
            remainder: path.trim_matches('/').to_string(),
        })
    }

    fn get_branch_path(&self, _name: &str, _project: &str) -> Result<BranchPath> {
        Ok(BranchPath::root())
    }

    fn get_tag_path(&self, name: &str, _project: &str) -> Result<BranchPath> {
        Err(BridgeError::unsupported(format!(
            "root layout has no tags (requested '{name}')"
        )))
    }

    fn branch_patterns(&self, _project: Option<&str>) -> Vec<String> {
        vec![String::new()]
    }

    fn tag_patterns(&self, _project: Option<&str>) -> Vec<String> {
        Vec::new()
    }

    fn is_branch_parent(&self, _path: &str, _project: &str) -> bool {
        false
    }

    fn is_tag_parent(&self, _path: &str, _project: &str) -> bool {
        false
    }

    fn supports_tags(&self) -> bool {
        false
    }

    fn get_tag_name(&self, _path: &str) -> String {
        "trunk".to_string()
    }

    fn enumerate_branches(
        &self,
        lister: &dyn PathLister,
        revnum: RevNum,
        _project: Option<&str>,
    ) -> Result<Vec<BranchInfo>> {
        if !lister.is_dir("", revnum)? {
            return Ok(Vec::new());
        }
        Ok(vec![BranchInfo {
            project: String::new(),
            path: BranchPath::root(),
            name: "trunk".to_string(),
        }])
    }
}

/// `trunk/<project>`, `branches/<name>/<project>`, `tags/<name>/<project>`,
/// with projects exactly `level` components deep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseTrunkLayout {
    level: usize,
}

impl InverseTrunkLayout {
    pub fn new(level: usize) -> Self {
        Self { level }
    }
}

impl RepositoryLayout for InverseTrunkLayout {
    fn name(&self) -> String {
        format!("itrunk{}", self.level)
    }

    fn classify(&self, path: &str) -> Classification {
        let trimmed = path.trim_matches('/');
        let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
        let (root_len, is_tag) = match parts.first() {
            Some(&"trunk") => (1 + self.level, false),
            Some(&"branches") => (2 + self.level, false),
            Some(&"tags") => (2 + self.level, true),
            _ => return Classification::NotABranchPath,
        };
        if parts.len() < root_len {
            return Classification::NotABranchPath;
        }
        let Ok(branch_root) = BranchPath::new(join_parts(&parts[..root_len])) else {
            return Classification::NotABranchPath;
        };
        let location = BranchLocation {
            project: join_parts(&parts[root_len - self.level..root_len]),
            branch_root,
            remainder: join_parts(&parts[root_len..]),
        };
        if is_tag {
            Classification::Tag(location)
        } else {
            Classification::Branch(location)
        }
    }

    fn get_branch_path(&self, name: &str, project: &str) -> Result<BranchPath> {
        let base = if name == "trunk" {
            "trunk".to_string()
        } else {
            format!("branches/{name}")
        };
        Ok(BranchPath::new(base)?.join(project))
    }

    fn get_tag_path(&self, name: &str, project: &str) -> Result<BranchPath> {
        Ok(BranchPath::new(format!("tags/{name}"))?.join(project))
    }

    fn branch_patterns(&self, project: Option<&str>) -> Vec<String> {
        let suffix = match project {
            Some(p) if !p.is_empty() => format!("/{}", p.trim_matches('/')),
            Some(_) => String::new(),
            None => "/*".repeat(self.level),
        };
        vec![format!("trunk{suffix}"), format!("branches/*{suffix}")]
    }

    fn tag_patterns(&self, project: Option<&str>) -> Vec<String> {
        let suffix = match project {
            Some(p) if !p.is_empty() => format!("/{}", p.trim_matches('/')),
            Some(_) => String::new(),
            None => "/*".repeat(self.level),
        };
        vec![format!("tags/*{suffix}")]
    }

    fn is_branch_parent(&self, path: &str, _project: &str) -> bool {
        let trimmed = path.trim_matches('/');
        trimmed == "branches" || (trimmed.starts_with("branches/") && self.level > 0)
    }

    fn is_tag_parent(&self, path: &str, _project: &str) -> bool {
        let trimmed = path.trim_matches('/');
        trimmed == "tags" || (trimmed.starts_with("tags/") && self.level > 0)
    }

    fn get_tag_name(&self, path: &str) -> String {
        path.trim_matches('/')
            .split('/')
            .nth(1)
            .unwrap_or_default()
            .to_string()
    }
}
