//! Repository lock for chartbucket.
//!
//! At most one index mutation may run per repository at any instant, across
//! processes and machines. The lock is an object in the same store as the
//! index: acquiring it means creating the lock object with a create-if-absent
//! write, releasing it means deleting that object.
//!
//! # Architecture
//!
//! - [`RepositoryLock`] is the seam. [`StoreLock`] implements it on top of
//!   any [`chartbucket_store::ObjectStore`]; a backend with native
//!   conditional writes or an external coordination service can implement the
//!   trait instead.
//! - [`LockGuard`] pairs an acquisition with a guaranteed release. Explicit
//!   [`LockGuard::release`] is the normal path; dropping an unreleased guard
//!   (an error path or a cancelled future) schedules the release on the
//!   current tokio runtime.
//! - Each lock object holds a [`LockToken`] (owner, lease id, acquisition
//!   time, ttl). A token past its ttl is considered abandoned and is taken
//!   over.
//!
//! # Known weak point
//!
//! Stale-lock takeover is not atomic. Two clients that observe the same
//! expired token at the same moment may both delete it, and the slower one
//! can delete the lock the faster one has just created. The window is
//! bounded by one store round-trip and only opens after a holder has
//! exceeded its ttl. Deployments that need stronger guarantees should
//! implement [`RepositoryLock`] with a lease/fencing-token service.

pub mod config;
pub mod error;
pub mod guard;
pub mod store_lock;
pub mod token;
pub mod traits;

pub use config::LockConfig;
pub use error::{LockError, LockResult};
pub use guard::LockGuard;
pub use store_lock::StoreLock;
pub use token::{default_owner, LockToken};
pub use traits::{LockLease, RepositoryLock};
