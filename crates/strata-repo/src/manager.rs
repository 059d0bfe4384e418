use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use strata_types::Author;
use tracing::debug;

use crate::error::RepoResult;
use crate::repository::{Repository, DEFAULT_TIMEOUT};

/// Lazily opened repositories, one per tenant directory under `root`.
pub struct RepoManager {
    root: PathBuf,
    author: Author,
    branch: String,
    timeout: Duration,
    repos: RwLock<HashMap<String, Arc<Repository>>>,
}

impl RepoManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            author: Author::default(),
            branch: "main".to_string(),
            timeout: DEFAULT_TIMEOUT,
            repos: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `tenant`'s working tree.
    pub fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.root.join(tenant)
    }

    /// Repository for `tenant`, initialising it on first use.
    ///
    /// Callers validate the tenant id.
    pub fn get(&self, tenant: &str) -> RepoResult<Arc<Repository>> {
        if let Some(repo) = self.repos.read().expect("lock poisoned").get(tenant) {
            return Ok(Arc::clone(repo));
        }

        let mut repos = self.repos.write().expect("lock poisoned");
        if let Some(repo) = repos.get(tenant) {
            return Ok(Arc::clone(repo));
        }
        let repo = Repository::init(self.tenant_dir(tenant), &self.branch)?
            .with_author(self.author.clone())
            .with_timeout(self.timeout);
        debug!(tenant, "repository opened");
        let repo = Arc::new(repo);
        repos.insert(tenant.to_string(), Arc::clone(&repo));
        Ok(repo)
    }

    /// Tenants with an open repository handle.
    pub fn open_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .repos
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        tenants.sort();
        tenants
    }
}
