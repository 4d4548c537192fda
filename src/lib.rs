//! svnbridge - a bidirectional bridge between Subversion history and a
//! DAG-based version control system
//!
//! svnbridge imports the history of a Subversion repository as a graph of
//! revisions with stable file identities, and exports new revisions back as
//! Subversion commits, so that a round trip preserves revision ids.
//!
//! # Architecture
//!
//! - [`cli`] - Debug command-line interface
//! - [`core`] - Domain types, errors, configuration, storage paths, locking
//! - [`layout`] - Which paths are branches, tags, and projects
//! - [`mapping`] - Versioned revision-id and metadata schemes (v1 to v4)
//! - [`delta`] - The svndiff0 content-delta codec
//! - [`transport`] - Repository access, the tree-delta editor protocol, the
//!   connection pool and an in-memory repository
//! - [`history`] - Changed-path history, cached in SQLite or walked directly
//! - [`revmeta`] - Lazily computed per-revision metadata
//! - [`repository`] - The facade tying the source pieces together
//! - [`target`] - Revisions and inventories on the DAG side
//! - [`fetch`] - Importing source revisions into the target
//! - [`commit`] - Exporting target revisions to the source
//!
//! # Correctness Invariants
//!
//! 1. A revision id decodes to the branch and revision it was generated from
//! 2. A file keeps its id across renames and copies within a branch
//! 3. A fetch or commit either completes or leaves no trace
//! 4. Cached history is append-only

pub mod cli;
pub mod commit;
pub mod core;
pub mod delta;
pub mod fetch;
pub mod history;
pub mod layout;
pub mod mapping;
pub mod repository;
pub mod revmeta;
pub mod target;
pub mod transport;
