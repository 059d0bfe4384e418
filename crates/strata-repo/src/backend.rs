use std::path::Path;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use strata_types::Author;

use crate::commit::Commit;
use crate::error::RepoResult;
use crate::remote::RemoteKind;
use crate::repository::Repository;
use crate::sync::{FetchResult, PullResult, PushResult};

/// Versioning operations the content layer depends on.
///
/// [`Repository`] is the production implementation; tests wrap it to inject
/// failures.
#[async_trait]
pub trait VersionedBackend: Send + Sync {
    /// Working tree root.
    fn root(&self) -> &Path;

    /// Exclusive lock for writers. Hold the guard across file edits and
    /// [`commit_locked`](Self::commit_locked).
    fn lock(&self) -> RwLockWriteGuard<'_, ()>;

    /// Shared lock for readers of the working tree.
    fn read_lock(&self) -> RwLockReadGuard<'_, ()>;

    /// Commit the working tree. Caller holds [`lock`](Self::lock).
    fn commit_locked(&self, author: &Author, message: &str) -> RepoResult<Option<Commit>>;

    /// Lock and commit.
    fn commit_changes(&self, author: &Author, message: &str) -> RepoResult<Option<Commit>> {
        let _guard = self.lock();
        self.commit_locked(author, message)
    }

    fn history(&self, path: &str, limit: usize) -> RepoResult<Vec<Commit>>;

    fn file_at_revision(&self, path: &str, rev: &str) -> RepoResult<Vec<u8>>;

    fn head_commit(&self) -> RepoResult<Option<Commit>>;

    fn commit_count(&self) -> RepoResult<usize>;

    fn set_remote(&self, name: &str, url: &str) -> RepoResult<()>;

    fn set_remote_credentials(&self, name: &str, token: &str, kind: RemoteKind)
        -> RepoResult<()>;

    async fn push(&self, remote: &str, branch: &str) -> RepoResult<PushResult>;

    async fn fetch(&self, remote: &str, branch: &str) -> RepoResult<FetchResult>;

    async fn pull(&self, remote: &str, branch: &str) -> RepoResult<PullResult>;

    /// Second half of a pull: fast-forward to what `fetch` brought in.
    /// Caller holds [`lock`](Self::lock).
    fn fast_forward_locked(
        &self,
        remote: &str,
        branch: &str,
        fetch: FetchResult,
    ) -> RepoResult<PullResult>;
}

#[async_trait]
impl VersionedBackend for Repository {
    fn root(&self) -> &Path {
        Repository::root(self)
    }

    fn lock(&self) -> RwLockWriteGuard<'_, ()> {
        Repository::lock(self)
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        Repository::read_lock(self)
    }

    fn commit_locked(&self, author: &Author, message: &str) -> RepoResult<Option<Commit>> {
        Repository::commit_locked(self, author, message)
    }

    fn history(&self, path: &str, limit: usize) -> RepoResult<Vec<Commit>> {
        Repository::history(self, path, limit)
    }

    fn file_at_revision(&self, path: &str, rev: &str) -> RepoResult<Vec<u8>> {
        Repository::file_at_revision(self, path, rev)
    }

    fn head_commit(&self) -> RepoResult<Option<Commit>> {
        Repository::head_commit(self)
    }

    fn commit_count(&self) -> RepoResult<usize> {
        Repository::commit_count(self)
    }

    fn set_remote(&self, name: &str, url: &str) -> RepoResult<()> {
        Repository::set_remote(self, name, url)
    }

    fn set_remote_credentials(
        &self,
        name: &str,
        token: &str,
        kind: RemoteKind,
    ) -> RepoResult<()> {
        Repository::set_remote_credentials(self, name, token, kind)
    }

    async fn push(&self, remote: &str, branch: &str) -> RepoResult<PushResult> {
        Repository::push(self, remote, branch).await
    }

    async fn fetch(&self, remote: &str, branch: &str) -> RepoResult<FetchResult> {
        Repository::fetch(self, remote, branch).await
    }

    async fn pull(&self, remote: &str, branch: &str) -> RepoResult<PullResult> {
        Repository::pull(self, remote, branch).await
    }

    fn fast_forward_locked(
        &self,
        remote: &str,
        branch: &str,
        fetch: FetchResult,
    ) -> RepoResult<PullResult> {
        Repository::fast_forward_locked(self, remote, branch, fetch)
    }
}
