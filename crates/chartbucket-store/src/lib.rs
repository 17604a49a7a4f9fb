//! Object storage capability for chartbucket.
//!
//! A chart repository lives under a key prefix in an object store. This
//! crate defines the narrow capability the publish protocol needs from such a
//! store and ships two local implementations plus a retry wrapper.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and embedding.
//!   Counts calls and can inject transient failures.
//! - [`FsObjectStore`] -- a local directory, addressed as `file:///path`.
//! - [`RetryingStore`] -- wraps any store and retries transient failures with
//!   bounded exponential backoff.
//!
//! # Design Rules
//!
//! 1. Every object carries size, content type and last-modified time.
//! 2. Overwriting an object strictly advances its last-modified time.
//! 3. `put_if_absent` is the only conditional write; it never overwrites.
//! 4. The store never interprets object contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod backoff;
pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod retry;
pub mod traits;

pub use backoff::Backoff;
pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{validate_key, ObjectMeta, StoredObject, DEFAULT_CONTENT_TYPE};
pub use retry::{RetryPolicy, RetryingStore};
pub use traits::ObjectStore;
