use std::io;

use strata_refs::RefError;
use strata_types::ErrorKind;

/// Errors produced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The directory has no `.strata` metadata.
    #[error("not a strata repository")]
    NotARepository,

    /// A revision expression did not resolve to a commit.
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// An abbreviated hash matched more than one commit.
    #[error("ambiguous revision: {0}")]
    AmbiguousRevision(String),

    /// The path does not exist in the given revision.
    #[error("file {path} not found at revision {rev}")]
    FileNotFound { path: String, rev: String },

    /// No remote is configured under this name.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// The remote url uses a scheme with no transport.
    #[error("unsupported remote scheme: {0}")]
    UnsupportedRemote(String),

    /// Push would discard commits on the remote branch.
    #[error("push to {branch} rejected: not a fast-forward")]
    NotFastForward { branch: String },

    /// Uncommitted edits would be overwritten by a checkout.
    #[error("working tree has uncommitted changes: {}", .0.join(", "))]
    DirtyWorkingTree(Vec<String>),

    /// The branch has no commits yet.
    #[error("branch {0} has no commits")]
    EmptyBranch(String),

    /// A remote operation exceeded its timeout.
    #[error("{op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },

    /// The remote side failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Object store failure.
    #[error("store error: {0}")]
    Store(#[from] strata_store::StoreError),

    /// Ref store failure.
    #[error("ref error: {0}")]
    Refs(#[from] RefError),

    /// Snapshot comparison failed.
    #[error("diff error: {0}")]
    Diff(#[from] strata_diff::DiffError),

    /// Encoding or decoding repository metadata failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error in the working tree or metadata directory.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl RepoError {
    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RevisionNotFound(_)
            | Self::FileNotFound { .. }
            | Self::RemoteNotFound(_)
            | Self::EmptyBranch(_)
            | Self::Refs(RefError::NotFound { .. }) => ErrorKind::NotFound,
            Self::AmbiguousRevision(_)
            | Self::UnsupportedRemote(_)
            | Self::Refs(RefError::InvalidName { .. }) => ErrorKind::Validation,
            Self::NotFastForward { .. }
            | Self::DirtyWorkingTree(_)
            | Self::Refs(RefError::Stale { .. }) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
