//! Fixtures shared by the unit tests.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use strata_query::{Property, PropertyType, RecordData, Value};
use strata_repo::{
    Commit, FetchResult, PullResult, PushResult, RemoteKind, RepoError, RepoResult, Repository,
    VersionedBackend,
};
use strata_types::Author;

use crate::config::QuotaLimits;
use crate::store::WorkspaceStore;

/// A repository whose commits fail while `fail` is set, after sleeping
/// for `delay_ms`.
pub(crate) struct FlakyBackend {
    inner: Repository,
    pub(crate) fail: AtomicBool,
    pub(crate) delay_ms: AtomicU64,
}

impl FlakyBackend {
    pub(crate) fn fail_commits(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn slow_commits(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionedBackend for FlakyBackend {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.lock()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read_lock()
    }

    fn commit_locked(&self, author: &Author, message: &str) -> RepoResult<Option<Commit>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Io(io::Error::other("disk full")));
        }
        self.inner.commit_locked(author, message)
    }

    fn history(&self, path: &str, limit: usize) -> RepoResult<Vec<Commit>> {
        self.inner.history(path, limit)
    }

    fn file_at_revision(&self, path: &str, rev: &str) -> RepoResult<Vec<u8>> {
        self.inner.file_at_revision(path, rev)
    }

    fn head_commit(&self) -> RepoResult<Option<Commit>> {
        self.inner.head_commit()
    }

    fn commit_count(&self) -> RepoResult<usize> {
        self.inner.commit_count()
    }

    fn set_remote(&self, name: &str, url: &str) -> RepoResult<()> {
        self.inner.set_remote(name, url)
    }

    fn set_remote_credentials(
        &self,
        name: &str,
        token: &str,
        kind: RemoteKind,
    ) -> RepoResult<()> {
        self.inner.set_remote_credentials(name, token, kind)
    }

    async fn push(&self, remote: &str, branch: &str) -> RepoResult<PushResult> {
        self.inner.push(remote, branch).await
    }

    async fn fetch(&self, remote: &str, branch: &str) -> RepoResult<FetchResult> {
        self.inner.fetch(remote, branch).await
    }

    async fn pull(&self, remote: &str, branch: &str) -> RepoResult<PullResult> {
        self.inner.pull(remote, branch).await
    }

    fn fast_forward_locked(
        &self,
        remote: &str,
        branch: &str,
        fetch: FetchResult,
    ) -> RepoResult<PullResult> {
        self.inner.fast_forward_locked(remote, branch, fetch)
    }
}

pub(crate) fn author() -> Author {
    Author::new("Tester", "tester@example.com")
}

pub(crate) fn workspace(dir: &Path) -> WorkspaceStore {
    workspace_with_quotas(dir, QuotaLimits::default())
}

pub(crate) fn workspace_with_quotas(dir: &Path, limits: QuotaLimits) -> WorkspaceStore {
    let repo = Repository::init(dir, "main").unwrap();
    WorkspaceStore::open("acme", Arc::new(repo))
        .unwrap()
        .with_quotas(limits)
}

pub(crate) fn flaky_workspace(dir: &Path) -> (WorkspaceStore, Arc<FlakyBackend>) {
    let backend = Arc::new(FlakyBackend {
        inner: Repository::init(dir, "main").unwrap(),
        fail: AtomicBool::new(false),
        delay_ms: AtomicU64::new(0),
    });
    let ws = WorkspaceStore::open("acme", Arc::clone(&backend) as Arc<dyn VersionedBackend>).unwrap();
    (ws, backend)
}

pub(crate) fn people_schema() -> Vec<Property> {
    vec![
        Property::new("Name", PropertyType::Text),
        Property::new("Age", PropertyType::Number),
    ]
}

pub(crate) fn person(name: &str, age: f64) -> RecordData {
    RecordData::from([
        ("Name".to_string(), Value::from(name)),
        ("Age".to_string(), Value::from(age)),
    ])
}
