//! commit
//!
//! Export of target revisions into the source.
//!
//! A [`CommitBuilder`] turns the difference between a base tree and a new
//! tree into one tree-delta drive against the source's commit editor,
//! recording the target's revision metadata with the active mapping. Any
//! failure aborts the edit, so no partial revision is ever created.

pub mod builder;
pub mod identity;

pub use builder::{
    create_branch_prefix, push_branch, push_revision, CommitBase, CommitBuilder, Committed,
};
pub use identity::{determine_texts_identity, TextsIdentity};
