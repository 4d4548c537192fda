//! fetch
//!
//! Import of source history into a target repository.
//!
//! [`FetchEngine`] walks a branch's left-hand history back to the first
//! revision the target already has, then rebuilds each missing revision
//! oldest first. A revision is rebuilt by driving a
//! [`RevisionBuildEditor`] over its parent snapshot, with `replay` when
//! the server supports it and a `switch` from the parent otherwise.

pub mod editor;
pub mod engine;
pub mod idmap;

pub use editor::{EditContext, RevisionBuildEditor};
pub use engine::{FetchEngine, FetchReport};
pub use idmap::{branch_relative, determine_fileid_map};
