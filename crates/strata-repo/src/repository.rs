//! Filesystem-backed versioned repository.
//!
//! The working tree is the tenant directory itself. Metadata lives in
//! `.strata/` next to the content:
//!
//! ```text
//! .strata/HEAD            current branch
//! .strata/refs/...        branch and remote-tracking refs
//! .strata/objects/...     blobs, trees and commits (zstd, content-addressed)
//! .strata/remotes.json    remote urls (never credentials)
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use strata_diff::diff_tree_ids;
use strata_refs::{branch_ref_name, remote_ref_name, validate_branch_name, validate_remote_name};
use strata_refs::{FsRefStore, Ref, RefStore};
use strata_store::{Blob, CommitObject, EntryMode, FsObjectStore, ObjectStore, Tree, TreeEntry};
use strata_types::{Author, ObjectId};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::commit::{split_message, Commit};
use crate::error::{RepoError, RepoResult};
use crate::remote::{strip_credentials, Credential, RemoteConfig, RemoteEntry, RemoteKind};
use crate::walk::{load_commit, load_tree, walk_chain};

/// Name of the metadata directory inside every repository.
pub const META_DIR: &str = ".strata";

/// Upper bound (and default) for history queries.
pub const MAX_HISTORY: usize = 1000;

/// Shortest accepted abbreviated commit hash.
pub const MIN_ABBREV: usize = 7;

/// Default timeout for remote operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A working directory with content-addressed history.
pub struct Repository {
    pub(crate) root: PathBuf,
    meta: PathBuf,
    pub(crate) objects: FsObjectStore,
    pub(crate) refs: FsRefStore,
    remotes: RwLock<RemoteConfig>,
    credentials: RwLock<HashMap<String, Credential>>,
    tree_lock: RwLock<()>,
    author: Author,
    default_branch: String,
    pub(crate) timeout: Duration,
}

impl Repository {
    /// Create the metadata directory under `root` (if absent) and open it.
    ///
    /// `branch` becomes the current branch of a new repository; an existing
    /// repository keeps its `HEAD`.
    pub fn init(root: impl Into<PathBuf>, branch: &str) -> RepoResult<Self> {
        validate_branch_name(branch)?;
        let root = root.into();
        let meta = root.join(META_DIR);
        fs::create_dir_all(meta.join("objects"))?;
        let refs = FsRefStore::open(&meta)?;
        if refs.head()?.is_none() {
            refs.set_head(branch)?;
            info!(branch, "repository initialised");
        }
        Self::open(root)
    }

    /// Open an existing repository.
    pub fn open(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let root = root.into();
        let meta = root.join(META_DIR);
        if !meta.is_dir() {
            return Err(RepoError::NotARepository);
        }
        let refs = FsRefStore::open(&meta)?;
        let default_branch = refs.head()?.unwrap_or_else(|| "main".to_string());
        Ok(Self {
            objects: FsObjectStore::open(meta.join("objects"))?,
            refs,
            remotes: RwLock::new(RemoteConfig::load(&meta.join("remotes.json"))?),
            credentials: RwLock::new(HashMap::new()),
            tree_lock: RwLock::new(()),
            author: Author::default(),
            default_branch,
            timeout: DEFAULT_TIMEOUT,
            root,
            meta,
        })
    }

    /// Author used when a commit is made with an incomplete identity.
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    /// Timeout for push, fetch and pull.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The working tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_author(&self) -> &Author {
        &self.author
    }

    /// Take the repository lock exclusively. Writers hold it across their
    /// file edits and the commit.
    pub fn lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.tree_lock.write().expect("lock poisoned")
    }

    /// Take the repository lock shared. Readers holding it never see a
    /// write that has not been committed or rolled back.
    pub fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.tree_lock.read().expect("lock poisoned")
    }

    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Branch named by `HEAD`.
    pub fn current_branch(&self) -> RepoResult<String> {
        Ok(self
            .refs
            .head()?
            .unwrap_or_else(|| self.default_branch.clone()))
    }

    /// `branch`, or the current branch when empty.
    pub(crate) fn branch_or_current(&self, branch: &str) -> RepoResult<String> {
        if branch.is_empty() {
            return self.current_branch();
        }
        validate_branch_name(branch)?;
        Ok(branch.to_string())
    }

    pub(crate) fn branch_tip(&self, branch: &str) -> RepoResult<Option<ObjectId>> {
        Ok(self
            .refs
            .read_ref(&branch_ref_name(branch))?
            .map(|r| r.target()))
    }

    pub(crate) fn head_id(&self) -> RepoResult<Option<ObjectId>> {
        self.branch_tip(&self.current_branch()?)
    }

    /// Tip of the current branch.
    pub fn head_commit(&self) -> RepoResult<Option<Commit>> {
        let Some(id) = self.head_id()? else {
            return Ok(None);
        };
        let object = load_commit(&self.objects, &id)?;
        Ok(Some(Commit::from_object(id, &object)))
    }

    /// Resolve a revision expression to a commit id.
    ///
    /// Accepts `HEAD` (or empty), a branch name, `remote/branch`, a full
    /// hash, or an abbreviated hash of at least [`MIN_ABBREV`] characters
    /// reachable from `HEAD`.
    pub fn resolve(&self, rev: &str) -> RepoResult<ObjectId> {
        let not_found = || RepoError::RevisionNotFound(rev.to_string());
        if rev.is_empty() || rev == "HEAD" {
            return self.head_id()?.ok_or_else(not_found);
        }
        if validate_branch_name(rev).is_ok() {
            if let Some(r) = self.refs.read_ref(&branch_ref_name(rev))? {
                return Ok(r.target());
            }
            if let Some((remote, branch)) = rev.split_once('/') {
                if let Some(r) = self.refs.read_ref(&remote_ref_name(remote, branch))? {
                    return Ok(r.target());
                }
            }
        }
        if rev.len() < MIN_ABBREV || !rev.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(not_found());
        }
        let needle = rev.to_ascii_lowercase();
        if needle.len() == 64 {
            let id = ObjectId::from_hex(&needle).map_err(|_| not_found())?;
            load_commit(&self.objects, &id)?;
            return Ok(id);
        }
        let mut matches = Vec::new();
        walk_chain(&self.objects, self.head_id()?, |id, _| {
            if id.to_hex().starts_with(&needle) {
                matches.push(id);
            }
            Ok(true)
        })?;
        match matches.as_slice() {
            [] => Err(not_found()),
            [id] => Ok(*id),
            _ => Err(RepoError::AmbiguousRevision(rev.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    /// Snapshot the working tree and commit it. The caller must hold
    /// [`lock`](Self::lock).
    ///
    /// Returns `Ok(None)` when the snapshot equals the current tip's tree.
    pub fn commit_locked(&self, author: &Author, message: &str) -> RepoResult<Option<Commit>> {
        let tree = self.snapshot()?;
        let tree_obj = tree.to_stored_object()?;
        let tree_id = tree_obj.compute_id();

        let branch = self.current_branch()?;
        let parent = self.branch_tip(&branch)?;
        let parent_tree = parent
            .map(|p| load_commit(&self.objects, &p).map(|c| c.tree))
            .transpose()?;
        if parent_tree == Some(tree_id) || (parent.is_none() && tree.is_empty()) {
            debug!(branch = %branch, "nothing to commit");
            return Ok(None);
        }

        let (subject, body) = split_message(message);
        let object = CommitObject {
            tree: tree_id,
            parent,
            author: author.clone().or(&self.author),
            message: subject,
            body,
            timestamp: Utc::now(),
        };

        // Objects first; the branch ref moves last.
        self.objects.write(&tree_obj)?;
        let id = self.objects.write(&object.to_stored_object()?)?;
        self.refs
            .compare_and_swap(&branch_ref_name(&branch), parent, &Ref::branch(&branch, id))?;

        info!(
            commit = %id.short_hex(),
            branch = %branch,
            files = tree.len(),
            message = %object.message,
            "committed"
        );
        Ok(Some(Commit::from_object(id, &object)))
    }

    /// Take the write lock and commit whatever changed.
    pub fn commit_changes(&self, author: &Author, message: &str) -> RepoResult<Option<Commit>> {
        let _guard = self.lock();
        self.commit_locked(author, message)
    }

    /// Flat tree of every regular file outside `.strata/`, writing blobs as
    /// it goes. Dot-files (including in-flight temp files) are skipped.
    fn snapshot(&self) -> RepoResult<Tree> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| RepoError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = relative_path(&self.root, entry.path());
            let data = fs::read(entry.path())?;
            let size = data.len() as u64;
            let id = self.objects.write(&Blob::new(data).to_stored_object())?;
            entries.push(TreeEntry::new(entry_mode(&entry)?, path, id, size));
        }
        Ok(Tree::new(entries))
    }

    /// Paths whose working-tree content differs from the tip.
    pub fn uncommitted_changes(&self) -> RepoResult<Vec<String>> {
        let tree = self.snapshot()?;
        let head_tree = match self.head_id()? {
            Some(id) => Some(load_tree(&self.objects, &load_commit(&self.objects, &id)?.tree)?),
            None => None,
        };
        let diff = strata_diff::diff_trees(head_tree.as_ref(), &tree);
        Ok(diff.paths().map(str::to_string).collect())
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Commits touching `path` (or anything below it), newest first.
    ///
    /// An empty `path` lists the whole branch. A `limit` of zero or above
    /// [`MAX_HISTORY`] is treated as [`MAX_HISTORY`].
    pub fn history(&self, path: &str, limit: usize) -> RepoResult<Vec<Commit>> {
        let limit = if limit == 0 { MAX_HISTORY } else { limit.min(MAX_HISTORY) };
        let path = path.trim_matches('/');
        let mut out = Vec::new();
        walk_chain(&self.objects, self.head_id()?, |id, commit| {
            let touched = path.is_empty() || {
                let parent_tree = commit
                    .parent
                    .map(|p| load_commit(&self.objects, &p).map(|c| c.tree))
                    .transpose()?;
                diff_tree_ids(&self.objects, parent_tree.as_ref(), &commit.tree)?.touches(path)
            };
            if touched {
                out.push(Commit::from_object(id, commit));
            }
            Ok(out.len() < limit)
        })?;
        Ok(out)
    }

    /// Number of commits on the current branch.
    pub fn commit_count(&self) -> RepoResult<usize> {
        let mut count = 0;
        walk_chain(&self.objects, self.head_id()?, |_, _| {
            count += 1;
            Ok(true)
        })?;
        Ok(count)
    }

    /// Exact bytes of `path` as of `rev`.
    pub fn file_at_revision(&self, path: &str, rev: &str) -> RepoResult<Vec<u8>> {
        let id = self.resolve(rev)?;
        let commit = load_commit(&self.objects, &id)?;
        let tree = load_tree(&self.objects, &commit.tree)?;
        let path = path.trim_matches('/');
        let entry = tree.get(path).ok_or_else(|| RepoError::FileNotFound {
            path: path.to_string(),
            rev: rev.to_string(),
        })?;
        let blob = Blob::from_stored_object(&self.objects.read_required(&entry.object_id)?)?;
        Ok(blob.data)
    }

    // -----------------------------------------------------------------------
    // Remotes
    // -----------------------------------------------------------------------

    /// Add, change or (with an empty `url`) remove a remote.
    ///
    /// Any credentials embedded in `url` are dropped before it is stored.
    pub fn set_remote(&self, name: &str, url: &str) -> RepoResult<()> {
        validate_remote_name(name)?;
        let mut remotes = self.remotes.write().expect("lock poisoned");
        let mut next = remotes.clone();
        if url.is_empty() {
            next.remotes.remove(name);
            self.credentials
                .write()
                .expect("lock poisoned")
                .remove(name);
        } else {
            next.remotes.insert(
                name.to_string(),
                RemoteEntry {
                    url: strip_credentials(url),
                },
            );
        }
        next.save(&self.meta.join("remotes.json"))?;
        *remotes = next;
        info!(remote = name, removed = url.is_empty(), "remote configured");
        Ok(())
    }

    /// Stored url of a remote.
    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.remotes
            .read()
            .expect("lock poisoned")
            .url(name)
            .map(str::to_string)
    }

    /// Names of configured remotes.
    pub fn remotes(&self) -> Vec<String> {
        self.remotes
            .read()
            .expect("lock poisoned")
            .remotes
            .keys()
            .cloned()
            .collect()
    }

    /// Attach a token to a remote for this process only.
    pub fn set_remote_credentials(
        &self,
        name: &str,
        token: &str,
        kind: RemoteKind,
    ) -> RepoResult<()> {
        if self.remote_url(name).is_none() {
            return Err(RepoError::RemoteNotFound(name.to_string()));
        }
        self.credentials.write().expect("lock poisoned").insert(
            name.to_string(),
            Credential {
                token: token.to_string(),
                kind,
            },
        );
        Ok(())
    }

    /// Remote url with credentials spliced in, for opening a transport.
    pub(crate) fn authenticated_url(&self, name: &str) -> RepoResult<String> {
        let url = self
            .remote_url(name)
            .ok_or_else(|| RepoError::RemoteNotFound(name.to_string()))?;
        let creds = self.credentials.read().expect("lock poisoned");
        Ok(match creds.get(name) {
            Some(c) => crate::remote::inject_token_in_url(&url, &c.token, c.kind),
            None => url,
        })
    }

    // -----------------------------------------------------------------------
    // Working tree
    // -----------------------------------------------------------------------

    /// Make the working tree match `to`, starting from `from`.
    ///
    /// Returns the paths that changed. If any path cannot be written, the
    /// paths already touched get their previous content back and the error
    /// is returned.
    pub(crate) fn checkout(&self, from: Option<&Tree>, to: &Tree) -> RepoResult<Vec<String>> {
        let diff = strata_diff::diff_trees(from, to);
        let mut touched = Vec::new();
        for change in &diff.changes {
            if let Err(e) = self.apply_change(change, to, &mut touched) {
                warn!(error = %e, restored = touched.len(), "checkout failed, restoring working tree");
                self.restore(touched);
                return Err(e);
            }
        }
        Ok(diff.paths().map(str::to_string).collect())
    }

    /// Apply one change, recording the prior content of the path in
    /// `touched` before it is modified.
    fn apply_change(
        &self,
        change: &strata_diff::TreeChange,
        to: &Tree,
        touched: &mut Vec<(PathBuf, Option<Vec<u8>>)>,
    ) -> RepoResult<()> {
        let rel = change.path();
        let target = self.worktree_path(rel)?;
        let prior = match fs::read(&target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        match change {
            strata_diff::TreeChange::Deleted { .. } => {
                touched.push((target.clone(), prior));
                match fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                self.prune_empty_dirs(&target);
            }
            strata_diff::TreeChange::Added { new_id, .. }
            | strata_diff::TreeChange::Modified { new_id, .. } => {
                let blob = Blob::from_stored_object(&self.objects.read_required(new_id)?)?;
                let executable = to.get(rel).map(|e| e.mode) == Some(EntryMode::Executable);
                touched.push((target.clone(), prior));
                write_worktree_file(&target, &blob.data, executable)?;
            }
        }
        Ok(())
    }

    /// Put back what [`apply_change`](Self::apply_change) recorded, newest
    /// first.
    fn restore(&self, touched: Vec<(PathBuf, Option<Vec<u8>>)>) {
        for (path, prior) in touched.into_iter().rev() {
            let result = match prior {
                Some(bytes) => write_worktree_file(&path, &bytes, false),
                None => match fs::remove_file(&path) {
                    Ok(()) => {
                        self.prune_empty_dirs(&path);
                        Ok(())
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                },
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "could not restore file");
            }
        }
    }

    fn worktree_path(&self, rel: &str) -> RepoResult<PathBuf> {
        let candidate = Path::new(rel);
        let safe = !rel.is_empty()
            && candidate
                .components()
                .all(|c| matches!(c, Component::Normal(s) if !s.to_string_lossy().starts_with('.')));
        if !safe {
            return Err(RepoError::Transport(format!("refusing unsafe path {rel:?}")));
        }
        Ok(self.root.join(candidate))
    }

    fn prune_empty_dirs(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("remotes", &self.remotes())
            .finish()
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn entry_mode(entry: &walkdir::DirEntry) -> RepoResult<EntryMode> {
    use std::os::unix::fs::PermissionsExt;
    let mode = entry
        .metadata()
        .map_err(|e| RepoError::Io(e.into()))?
        .permissions()
        .mode();
    Ok(if mode & 0o111 != 0 {
        EntryMode::Executable
    } else {
        EntryMode::Regular
    })
}

#[cfg(not(unix))]
fn entry_mode(_entry: &walkdir::DirEntry) -> RepoResult<EntryMode> {
    Ok(EntryMode::Regular)
}

fn write_worktree_file(path: &Path, data: &[u8], executable: bool) -> RepoResult<()> {
    use std::io::Write;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
