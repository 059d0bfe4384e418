//! Detached background push and pull.
//!
//! A sync started on behalf of a request keeps running when the request
//! goes away: the task is spawned onto the runtime, holds its own permit
//! from a bounded pool, and runs under its own timeout. Failures are
//! logged and recorded in [`SyncStatus`]; they never reach the caller that
//! started the sync.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_repo::{MergeStatus, RepoError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ContentError, ContentResult};
use crate::tenants::{validate_tenant_id, ContentStore};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error,
    /// Local and remote histories diverged.
    Conflict,
}

/// Outcome of the most recent background sync of one tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Bounded pool of detached sync tasks.
#[derive(Clone)]
pub struct SyncWorker {
    content: Arc<ContentStore>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    status: Arc<RwLock<HashMap<String, SyncStatus>>>,
}

impl SyncWorker {
    /// Pool size and timeout come from the store's configuration.
    pub fn new(content: Arc<ContentStore>) -> Self {
        let sync = content.config().sync;
        Self {
            permits: Arc::new(Semaphore::new(sync.workers.max(1))),
            timeout: sync.timeout(),
            content,
            status: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn status(&self, tenant: &str) -> SyncStatus {
        self.status
            .read()
            .expect("lock poisoned")
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    /// Pull `branch` (empty for the current one) from `remote` in the
    /// background. Dropping the handle does not cancel the task.
    pub fn spawn_pull(
        &self,
        tenant: &str,
        remote: &str,
        branch: &str,
    ) -> ContentResult<JoinHandle<()>> {
        validate_tenant_id(tenant)?;
        let worker = self.clone();
        let (tenant, remote, branch) = (tenant.to_string(), remote.to_string(), branch.to_string());
        Ok(tokio::spawn(async move {
            let pull = worker.content.pull(&tenant, &remote, &branch);
            match worker.run(&tenant, "pull", pull).await {
                Ok(result) => {
                    if let MergeStatus::Conflict { files } = &result.status {
                        warn!(
                            tenant = %tenant,
                            remote = %remote,
                            files = files.len(),
                            "pull found diverged histories"
                        );
                        let detail = format!("diverged on {} file(s)", files.len());
                        worker.set(&tenant, SyncState::Conflict, Some(detail));
                        return;
                    }
                    info!(
                        tenant = %tenant,
                        remote = %remote,
                        files = result.files.len(),
                        "background pull finished"
                    );
                    worker.set(&tenant, SyncState::Idle, None);
                }
                Err(e) => worker.failed(&tenant, "pull", e),
            }
        }))
    }

    /// Push `branch` (empty for the current one) to `remote` in the
    /// background. Dropping the handle does not cancel the task.
    pub fn spawn_push(
        &self,
        tenant: &str,
        remote: &str,
        branch: &str,
    ) -> ContentResult<JoinHandle<()>> {
        validate_tenant_id(tenant)?;
        let worker = self.clone();
        let (tenant, remote, branch) = (tenant.to_string(), remote.to_string(), branch.to_string());
        Ok(tokio::spawn(async move {
            let repo = match worker.content.repository(&tenant) {
                Ok(repo) => repo,
                Err(e) => return worker.failed(&tenant, "push", e),
            };
            match worker.run(&tenant, "push", repo.push(&remote, &branch)).await {
                Ok(result) => {
                    info!(
                        tenant = %tenant,
                        remote = %remote,
                        objects = result.objects_sent,
                        up_to_date = result.up_to_date,
                        "background push finished"
                    );
                    worker.set(&tenant, SyncState::Idle, None);
                }
                Err(e) => worker.failed(&tenant, "push", e),
            }
        }))
    }

    /// Wait for a permit, then run `op` under the worker's timeout.
    async fn run<T, E>(
        &self,
        tenant: &str,
        op: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> ContentResult<T>
    where
        ContentError: From<E>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RepoError::Transport("sync pool is closed".into()))?;
        self.set(tenant, SyncState::Syncing, None);
        debug!(tenant, op, "background sync started");
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RepoError::Timeout {
                op,
                secs: self.timeout.as_secs(),
            }
            .into()),
        }
    }

    fn failed(&self, tenant: &str, op: &str, error: ContentError) {
        warn!(tenant, op, error = %error, "background sync failed");
        self.set(tenant, SyncState::Error, Some(error.to_string()));
    }

    fn set(&self, tenant: &str, state: SyncState, error: Option<String>) {
        let mut status = self.status.write().expect("lock poisoned");
        let entry = status.entry(tenant.to_string()).or_default();
        entry.state = state;
        if state != SyncState::Syncing {
            entry.last_error = error;
            entry.last_sync = Some(Utc::now());
        }
    }
}
