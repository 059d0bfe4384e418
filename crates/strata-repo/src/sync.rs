//! Push, fetch and pull against a remote repository.
//!
//! Every remote operation runs under the repository's timeout. Objects are
//! transferred before any ref moves, so an interrupted operation leaves the
//! local branch at its last successful commit.

use std::collections::BTreeSet;
use std::future::Future;

use serde::Serialize;
use strata_diff::diff_trees;
use strata_refs::{branch_ref_name, remote_ref_name, Ref, RefStore};
use strata_store::{ObjectStore, Tree};
use strata_types::ObjectId;
use tracing::{debug, info, warn};

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;
use crate::transport::{connect, RemoteTransport};
use crate::walk::{is_ancestor, load_commit, load_tree, merge_base, missing_objects};

/// A ref that moved during a sync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefUpdate {
    pub name: String,
    pub old: Option<ObjectId>,
    pub new: ObjectId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub objects_received: usize,
    /// Remote branch tip, `None` when the remote has no such branch.
    pub remote_tip: Option<ObjectId>,
    pub refs_updated: Vec<RefUpdate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub objects_sent: usize,
    pub refs_updated: Vec<RefUpdate>,
    pub up_to_date: bool,
}

/// How a pull reconciled local and remote history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeStatus {
    #[default]
    UpToDate,
    FastForward,
    /// Both sides changed since their common ancestor; nothing was applied.
    Conflict { files: Vec<String> },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PullResult {
    pub status: MergeStatus,
    pub fetch: FetchResult,
    /// Working-tree paths written or removed.
    pub files: Vec<String>,
}

impl PullResult {
    /// Whether the working tree changed.
    pub fn changed(&self) -> bool {
        !self.files.is_empty()
    }
}

impl Repository {
    /// Publish `branch` (empty for the current branch) to `remote`.
    pub async fn push(&self, remote: &str, branch: &str) -> RepoResult<PushResult> {
        let branch = self.branch_or_current(branch)?;
        let transport = self.transport(remote)?;
        self.bounded("push", self.push_with(transport.as_ref(), remote, &branch))
            .await
    }

    /// Download `branch` from `remote` into its remote-tracking ref.
    pub async fn fetch(&self, remote: &str, branch: &str) -> RepoResult<FetchResult> {
        let branch = self.branch_or_current(branch)?;
        let transport = self.transport(remote)?;
        self.bounded("fetch", self.fetch_with(transport.as_ref(), remote, &branch))
            .await
    }

    /// Fetch, then fast-forward the local branch and working tree.
    pub async fn pull(&self, remote: &str, branch: &str) -> RepoResult<PullResult> {
        let branch = self.branch_or_current(branch)?;
        let transport = self.transport(remote)?;
        self.bounded("pull", self.pull_with(transport.as_ref(), remote, &branch))
            .await
    }

    fn transport(&self, remote: &str) -> RepoResult<Box<dyn RemoteTransport>> {
        connect(&self.authenticated_url(remote)?)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RepoResult<T>>,
    ) -> RepoResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let secs = self.timeout.as_secs();
                warn!(op, secs, "remote operation timed out");
                Err(RepoError::Timeout { op, secs })
            }
        }
    }

    pub(crate) async fn push_with(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
        branch: &str,
    ) -> RepoResult<PushResult> {
        let local = self
            .branch_tip(branch)?
            .ok_or_else(|| RepoError::EmptyBranch(branch.to_string()))?;
        let name = branch_ref_name(branch);
        let remote_tip = remote_tip(transport, &name).await?;

        if remote_tip == Some(local) {
            debug!(remote, branch, "remote already up to date");
            self.track(remote, branch, local)?;
            return Ok(PushResult {
                up_to_date: true,
                ..Default::default()
            });
        }
        if let Some(theirs) = remote_tip {
            if !self.objects.exists(&theirs)? || !is_ancestor(&self.objects, theirs, local)? {
                return Err(RepoError::NotFastForward {
                    branch: branch.to_string(),
                });
            }
        }

        let known: Vec<ObjectId> = remote_tip.into_iter().collect();
        let objects = missing_objects(&self.objects, &[local], &known)?;
        let objects_sent = transport.push_objects(objects).await?;
        transport.update_ref(&name, remote_tip, local).await?;
        let tracking = self.track(remote, branch, local)?;

        info!(
            remote,
            branch,
            objects = objects_sent,
            tip = %local.short_hex(),
            "pushed"
        );
        Ok(PushResult {
            objects_sent,
            refs_updated: vec![
                RefUpdate {
                    name,
                    old: remote_tip,
                    new: local,
                },
                tracking,
            ],
            up_to_date: false,
        })
    }

    pub(crate) async fn fetch_with(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
        branch: &str,
    ) -> RepoResult<FetchResult> {
        let Some(tip) = remote_tip(transport, &branch_ref_name(branch)).await? else {
            debug!(remote, branch, "remote has no such branch");
            return Ok(FetchResult::default());
        };

        let tracking = remote_ref_name(remote, branch);
        let previous = self.refs.read_ref(&tracking)?.map(|r| r.target());
        let mut objects_received = 0;
        if !self.objects.exists(&tip)? {
            let haves: Vec<ObjectId> = [self.branch_tip(branch)?, previous]
                .into_iter()
                .flatten()
                .collect();
            let objects = transport.fetch_objects(&[tip], &haves).await?;
            objects_received = self.objects.write_batch(&objects)?.len();
            if !self.objects.exists(&tip)? {
                return Err(RepoError::Transport(format!(
                    "remote did not send commit {}",
                    tip.short_hex()
                )));
            }
        }

        let mut refs_updated = Vec::new();
        if previous != Some(tip) {
            refs_updated.push(self.track(remote, branch, tip)?);
        }
        info!(remote, branch, objects = objects_received, "fetched");
        Ok(FetchResult {
            objects_received,
            remote_tip: Some(tip),
            refs_updated,
        })
    }

    pub(crate) async fn pull_with(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
        branch: &str,
    ) -> RepoResult<PullResult> {
        let fetch = self.fetch_with(transport, remote, branch).await?;
        let _guard = self.lock();
        self.fast_forward_locked(remote, branch, fetch)
    }

    /// Bring `branch` and the working tree up to the tip `fetch` brought in.
    /// Caller holds [`lock`](Self::lock), so whatever it caches from the
    /// working tree can be reloaded before any writer runs.
    ///
    /// Diverged histories are reported as [`MergeStatus::Conflict`] and
    /// nothing is applied.
    pub fn fast_forward_locked(
        &self,
        remote: &str,
        branch: &str,
        fetch: FetchResult,
    ) -> RepoResult<PullResult> {
        let branch = self.branch_or_current(branch)?;
        let Some(theirs) = fetch.remote_tip else {
            return Ok(PullResult {
                fetch,
                ..Default::default()
            });
        };

        let ours = self.branch_tip(&branch)?;
        let up_to_date = match ours {
            Some(ours) => ours == theirs || is_ancestor(&self.objects, theirs, ours)?,
            None => false,
        };
        if up_to_date {
            debug!(remote, branch = %branch, "already up to date");
            return Ok(PullResult {
                fetch,
                ..Default::default()
            });
        }

        let fast_forward = match ours {
            Some(ours) => is_ancestor(&self.objects, ours, theirs)?,
            None => true,
        };
        if !fast_forward {
            let files = self.conflicting_paths(ours, theirs)?;
            warn!(remote, branch = %branch, files = files.len(), "histories diverged");
            return Ok(PullResult {
                status: MergeStatus::Conflict { files },
                fetch,
                files: Vec::new(),
            });
        }

        let dirty = self.uncommitted_changes()?;
        if !dirty.is_empty() {
            return Err(RepoError::DirtyWorkingTree(dirty));
        }
        let from = match ours {
            Some(id) => Some(load_tree(&self.objects, &load_commit(&self.objects, &id)?.tree)?),
            None => None,
        };
        let to = load_tree(&self.objects, &load_commit(&self.objects, &theirs)?.tree)?;
        let files = self.checkout(from.as_ref(), &to)?;
        if let Err(e) = self
            .refs
            .compare_and_swap(&branch_ref_name(&branch), ours, &Ref::branch(&branch, theirs))
        {
            self.checkout(Some(&to), from.as_ref().unwrap_or(&Tree::empty()))?;
            return Err(e.into());
        }

        info!(
            remote,
            branch = %branch,
            files = files.len(),
            tip = %theirs.short_hex(),
            "fast-forwarded"
        );
        Ok(PullResult {
            status: MergeStatus::FastForward,
            fetch,
            files,
        })
    }

    /// Paths changed on both sides since the merge base.
    fn conflicting_paths(&self, ours: Option<ObjectId>, theirs: ObjectId) -> RepoResult<Vec<String>> {
        let Some(ours) = ours else {
            return Ok(Vec::new());
        };
        let base_tree = match merge_base(&self.objects, ours, theirs)? {
            Some(base) => Some(load_tree(&self.objects, &load_commit(&self.objects, &base)?.tree)?),
            None => None,
        };
        let changed = |tip: ObjectId| -> RepoResult<BTreeSet<String>> {
            let tree = load_tree(&self.objects, &load_commit(&self.objects, &tip)?.tree)?;
            Ok(diff_trees(base_tree.as_ref(), &tree)
                .paths()
                .map(str::to_string)
                .collect())
        };
        let ours = changed(ours)?;
        let theirs = changed(theirs)?;
        Ok(ours.intersection(&theirs).cloned().collect())
    }

    fn track(&self, remote: &str, branch: &str, tip: ObjectId) -> RepoResult<RefUpdate> {
        let name = remote_ref_name(remote, branch);
        let old = self.refs.read_ref(&name)?.map(|r| r.target());
        self.refs.write_ref(&name, &Ref::remote(remote, branch, tip))?;
        Ok(RefUpdate { name, old, new: tip })
    }
}

async fn remote_tip(transport: &dyn RemoteTransport, name: &str) -> RepoResult<Option<ObjectId>> {
    Ok(transport
        .list_refs()
        .await?
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, id)| id))
}
