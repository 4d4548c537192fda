//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`RevNum`] - Source revision number
//! - [`RepositoryUuid`] - Validated source repository UUID
//! - [`BranchPath`] - Normalized repository-relative path
//! - [`RevisionId`] - Target-side revision identifier
//! - [`FileId`] - Stable file identity across renames
//! - [`ForeignRevision`] - (uuid, branch path, revnum) coordinate
//!
//! # Validation
//!
//! These types enforce validity at construction time. A revision id with
//! embedded whitespace or a branch path with a `..` component cannot be
//! represented.
//!
//! # Examples
//!
//! ```
//! use svnbridge::core::types::{BranchPath, RepositoryUuid, RevisionId};
//!
//! let branch = BranchPath::new("/trunk/").unwrap();
//! assert_eq!(branch.as_str(), "trunk");
//!
//! assert!(RepositoryUuid::new("bad:uuid").is_err());
//! assert!(RevisionId::new("has space").is_err());
//! assert!(RevisionId::null().is_null());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A source revision number. Revision 0 is the empty initial revision.
pub type RevNum = u64;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository uuid: {0}")]
    InvalidUuid(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid revision id: {0}")]
    InvalidRevisionId(String),

    #[error("invalid file id: {0}")]
    InvalidFileId(String),
}

/// A validated source repository UUID.
///
/// UUIDs appear verbatim inside encoded revision ids, so they cannot contain
/// any of the separators used by the mapping schemes (`:`, `@`, `/`, `%`)
/// or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryUuid(String);

impl RepositoryUuid {
    /// Create a new validated repository UUID.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidUuid` if the value is empty or contains a
    /// reserved separator.
    pub fn new(uuid: impl Into<String>) -> Result<Self, TypeError> {
        let uuid = uuid.into();
        if uuid.is_empty() {
            return Err(TypeError::InvalidUuid("uuid cannot be empty".into()));
        }
        if let Some(c) = uuid
            .chars()
            .find(|c| matches!(c, ':' | '@' | '/' | '%') || !c.is_ascii_graphic())
        {
            return Err(TypeError::InvalidUuid(format!(
                "uuid cannot contain {c:?}"
            )));
        }
        Ok(Self(uuid))
    }

    /// Generate a fresh random repository UUID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the UUID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepositoryUuid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepositoryUuid> for String {
    fn from(uuid: RepositoryUuid) -> Self {
        uuid.0
    }
}

impl std::fmt::Display for RepositoryUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A normalized repository-relative path.
///
/// Leading and trailing slashes are stripped; the repository root is the
/// empty path. Paths never contain empty, `.` or `..` components, and never
/// contain a backslash.
///
/// # Example
///
/// ```
/// use svnbridge::core::types::BranchPath;
///
/// let p = BranchPath::new("branches/foo/").unwrap();
/// assert_eq!(p.as_str(), "branches/foo");
/// assert_eq!(p.join("src/lib.rs").as_str(), "branches/foo/src/lib.rs");
/// assert!(BranchPath::root().is_root());
/// assert!(BranchPath::new("a/../b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub struct BranchPath(String);

impl BranchPath {
    /// Create a new validated path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` for empty components, `.`/`..`
    /// components, backslashes, or control characters.
    pub fn new(path: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = path.as_ref().trim_matches('/');
        Self::validate(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    /// The repository root.
    pub fn root() -> Self {
        Self(String::new())
    }

    fn validate(path: &str) -> Result<(), TypeError> {
        if path.is_empty() {
            return Ok(());
        }
        if path.contains('\\') {
            return Err(TypeError::InvalidPath(format!(
                "'{path}' contains a backslash"
            )));
        }
        if path.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidPath(format!(
                "'{}' contains control characters",
                path.escape_debug()
            )));
        }
        for component in path.split('/') {
            match component {
                "" => {
                    return Err(TypeError::InvalidPath(format!(
                        "'{path}' contains an empty component"
                    )))
                }
                "." | ".." => {
                    return Err(TypeError::InvalidPath(format!(
                        "'{path}' contains a relative component"
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check whether this is the repository root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Join a relative path onto this one.
    ///
    /// The relative part is normalized the same way `new` does; components
    /// that would be rejected by `new` are kept verbatim, so callers that
    /// accept untrusted input should validate it first.
    pub fn join(&self, rel: &str) -> Self {
        let rel = rel.trim_matches('/');
        if rel.is_empty() {
            return self.clone();
        }
        if self.0.is_empty() {
            return Self(rel.to_string());
        }
        Self(format!("{}/{}", self.0, rel))
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    /// The last path component (empty for the root).
    pub fn basename(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Iterate over path components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchPath> for String {
    fn from(path: BranchPath) -> Self {
        path.0
    }
}

impl AsRef<str> for BranchPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target-side revision identifier.
///
/// Revision ids are opaque tokens. They never contain whitespace, so they
/// can be stored one per line in property values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

impl RevisionId {
    const NULL: &'static str = "null:";

    /// Create a new validated revision id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRevisionId` if the id is empty or contains
    /// whitespace or control characters.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidRevisionId(
                "revision id cannot be empty".into(),
            ));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidRevisionId(format!(
                "'{}' contains whitespace",
                id.escape_debug()
            )));
        }
        Ok(Self(id))
    }

    /// The reserved "no parent" revision id.
    pub fn null() -> Self {
        Self(Self::NULL.to_string())
    }

    /// Check whether this is the null revision.
    pub fn is_null(&self) -> bool {
        self.0 == Self::NULL
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RevisionId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.0
    }
}

impl AsRef<str> for RevisionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RevisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable file identity.
///
/// File ids are stored in tab-separated property lines, so tabs and
/// newlines are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Identity of the tree root in schemes that do not derive one.
    pub const TREE_ROOT: &'static str = "TREE_ROOT";

    /// Create a new validated file id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidFileId` if empty or containing a tab or
    /// newline.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidFileId("file id cannot be empty".into()));
        }
        if id.contains(['\t', '\n', '\r']) {
            return Err(TypeError::InvalidFileId(format!(
                "'{}' contains a separator",
                id.escape_debug()
            )));
        }
        Ok(Self(id))
    }

    /// The fixed root identity.
    pub fn tree_root() -> Self {
        Self(Self::TREE_ROOT.to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A foreign revision coordinate: one branch at one source revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignRevision {
    pub uuid: RepositoryUuid,
    pub branch_path: BranchPath,
    pub revnum: RevNum,
}

impl ForeignRevision {
    pub fn new(uuid: RepositoryUuid, branch_path: BranchPath, revnum: RevNum) -> Self {
        Self {
            uuid,
            branch_path,
            revnum,
        }
    }
}

impl std::fmt::Display for ForeignRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.branch_path, self.revnum, self.uuid)
    }
}
