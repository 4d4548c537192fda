//! core
//!
//! Core domain types, errors, configuration, and locking for svnbridge.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RepositoryUuid, BranchPath, RevisionId, FileId
//! - [`errors`] - The engine-wide error taxonomy
//! - [`ops`] - Per-branch write locking
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for svnbridge storage
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Errors carry a category that drives propagation policy

pub mod config;
pub mod errors;
pub mod ops;
pub mod paths;
pub mod types;

pub use errors::{BridgeError, ErrorKind, Result};
