use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use strata_refs::{FsRefStore, Ref, RefError, RefStore};
use strata_store::{FsObjectStore, ObjectStore, StoredObject};
use strata_types::ObjectId;
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::repository::META_DIR;
use crate::walk::missing_objects;

/// Wire-level operations against a remote repository.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Branch refs on the remote as `(canonical name, target)`.
    async fn list_refs(&self) -> RepoResult<Vec<(String, ObjectId)>>;

    /// Objects reachable from `wants` that are not reachable from `haves`.
    async fn fetch_objects(
        &self,
        wants: &[ObjectId],
        haves: &[ObjectId],
    ) -> RepoResult<Vec<StoredObject>>;

    /// Store objects on the remote. Returns how many were sent.
    async fn push_objects(&self, objects: Vec<StoredObject>) -> RepoResult<usize>;

    /// Move a remote ref from `old` to `new`, failing if it has moved.
    async fn update_ref(&self, name: &str, old: Option<ObjectId>, new: ObjectId)
        -> RepoResult<()>;
}

/// Open the transport for `url`.
///
/// `file://` urls and plain filesystem paths are served by
/// [`LocalTransport`]; every other scheme is rejected.
pub fn connect(url: &str) -> RepoResult<Box<dyn RemoteTransport>> {
    match url.split_once("://") {
        Some(("file", path)) => Ok(Box::new(LocalTransport::open(path)?)),
        Some((scheme, _)) => Err(RepoError::UnsupportedRemote(scheme.to_string())),
        None => Ok(Box::new(LocalTransport::open(url)?)),
    }
}

/// Remote that is another repository directory on this machine.
#[derive(Clone)]
pub struct LocalTransport {
    root: PathBuf,
    objects: FsObjectStore,
    refs: Arc<FsRefStore>,
}

impl LocalTransport {
    /// Attach to the repository at `root`.
    pub fn open(root: impl AsRef<Path>) -> RepoResult<Self> {
        let root = root.as_ref().to_path_buf();
        let meta = root.join(META_DIR);
        if !meta.is_dir() {
            return Err(RepoError::NotARepository);
        }
        Ok(Self {
            objects: FsObjectStore::open(meta.join("objects"))?,
            refs: Arc::new(FsRefStore::open(&meta)?),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn blocking<T, F>(&self, f: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(LocalTransport) -> RepoResult<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| RepoError::Transport(e.to_string()))?
    }
}

#[async_trait]
impl RemoteTransport for LocalTransport {
    async fn list_refs(&self) -> RepoResult<Vec<(String, ObjectId)>> {
        self.blocking(|t| {
            Ok(t.refs
                .branches()?
                .into_iter()
                .map(|(name, r)| (name, r.target()))
                .collect())
        })
        .await
    }

    async fn fetch_objects(
        &self,
        wants: &[ObjectId],
        haves: &[ObjectId],
    ) -> RepoResult<Vec<StoredObject>> {
        let (wants, haves) = (wants.to_vec(), haves.to_vec());
        self.blocking(move |t| missing_objects(&t.objects, &wants, &haves))
            .await
    }

    async fn push_objects(&self, objects: Vec<StoredObject>) -> RepoResult<usize> {
        self.blocking(move |t| {
            let ids = t.objects.write_batch(&objects)?;
            debug!(count = ids.len(), "objects received");
            Ok(ids.len())
        })
        .await
    }

    async fn update_ref(
        &self,
        name: &str,
        old: Option<ObjectId>,
        new: ObjectId,
    ) -> RepoResult<()> {
        let name = name.to_string();
        self.blocking(move |t| {
            if !t.objects.exists(&new)? {
                return Err(RepoError::Transport(format!(
                    "remote is missing commit {}",
                    new.short_hex()
                )));
            }
            let reference = Ref::from_canonical(&name, new).ok_or_else(|| {
                RepoError::Refs(RefError::InvalidName {
                    name: name.clone(),
                    reason: "not a branch ref".into(),
                })
            })?;
            t.refs.compare_and_swap(&name, old, &reference)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_schemes_are_rejected() {
        let err = connect("https://github.com/acme/notes.git")
            .err()
            .expect("https has no transport");
        assert!(matches!(err, RepoError::UnsupportedRemote(ref s) if s == "https"));
        assert_eq!(err.kind(), strata_types::ErrorKind::Validation);
    }

    #[test]
    fn plain_directory_must_be_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalTransport::open(dir.path()),
            Err(RepoError::NotARepository)
        ));
    }
}
