//! core::ops
//!
//! Operation locking.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive per-branch write lock
//!
//! # Architecture
//!
//! Every fetch and every commit:
//! 1. Acquires the branch lock for the branch it mutates
//! 2. Performs its work inside a target write group or source transaction
//! 3. Releases the lock on drop, whether it succeeded or not

pub mod lock;

pub use lock::{BranchLock, LockError};
