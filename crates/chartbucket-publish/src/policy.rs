use crate::error::{PublishError, PublishResult};

/// What to do when the target artifact already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Fail with `AlreadyExists`.
    #[default]
    Strict,
    /// Overwrite the artifact and replace the index entry.
    Force,
    /// Keep the existing artifact and report a skip.
    IgnoreIfExists,
}

/// Overwrite policy plus the orthogonal dry-run switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishPolicy {
    pub overwrite: OverwritePolicy,
    /// Evaluate everything but write nothing.
    pub dry_run: bool,
}

impl PublishPolicy {
    pub fn new(overwrite: OverwritePolicy, dry_run: bool) -> Self {
        Self { overwrite, dry_run }
    }

    /// Build a policy from command-line flags.
    ///
    /// `force` and `ignore_if_exists` are mutually exclusive. This check does
    /// no I/O and must run before anything touches the store.
    pub fn from_flags(force: bool, ignore_if_exists: bool, dry_run: bool) -> PublishResult<Self> {
        let overwrite = match (force, ignore_if_exists) {
            (true, true) => return Err(PublishError::FlagConflict),
            (true, false) => OverwritePolicy::Force,
            (false, true) => OverwritePolicy::IgnoreIfExists,
            (false, false) => OverwritePolicy::Strict,
        };
        Ok(Self { overwrite, dry_run })
    }
}
