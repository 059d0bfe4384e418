//! Versioned repositories for Strata tenants.
//!
//! Each tenant's content lives in a plain directory. A [`Repository`] turns
//! that directory into a history of snapshots: every commit records a flat
//! tree of file blobs and points at its parent, all stored content-addressed
//! under `.strata/`.
//!
//! # Key Types
//!
//! - [`VersionedBackend`] -- the operations the content layer relies on
//! - [`Repository`] -- filesystem implementation
//! - [`RepoManager`] -- one lazily opened repository per tenant
//! - [`RemoteTransport`] -- how objects and refs reach another repository
//! - [`Commit`] -- read-only view of one revision
//!
//! # Design Rules
//!
//! 1. Writers hold the repository lock across file edits and the commit.
//! 2. A commit's parent is always the branch tip it replaced.
//! 3. Objects are written before the ref that makes them reachable.
//! 4. Remote urls are stored without credentials.
//! 5. Pull only fast-forwards; diverged history is reported, never merged.

pub mod backend;
pub mod commit;
pub mod error;
pub mod manager;
pub mod remote;
pub mod repository;
pub mod sync;
pub mod transport;
mod walk;

pub use backend::VersionedBackend;
pub use commit::Commit;
pub use error::{RepoError, RepoResult};
pub use manager::RepoManager;
pub use remote::{inject_token_in_url, strip_credentials, Credential, RemoteKind};
pub use repository::{Repository, MAX_HISTORY, META_DIR};
pub use sync::{FetchResult, MergeStatus, PullResult, PushResult, RefUpdate};
pub use transport::{connect, LocalTransport, RemoteTransport};
