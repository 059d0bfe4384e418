use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use strata_repo::{FetchResult, PullResult, RepoManager, Repository, VersionedBackend};
use tracing::debug;

use crate::cache::ContentCache;
use crate::config::StoreConfig;
use crate::error::{ContentError, ContentResult};
use crate::store::WorkspaceStore;

/// Tenant ids are used as directory names.
pub fn validate_tenant_id(tenant: &str) -> ContentResult<()> {
    if tenant.trim().is_empty()
        || tenant.contains(['/', '\\', '\0'])
        || tenant.starts_with('.')
    {
        return Err(ContentError::InvalidTenant(tenant.to_string()));
    }
    Ok(())
}

/// Entry point for all tenants under one root directory.
///
/// Each tenant gets its own repository and [`WorkspaceStore`], opened on
/// first use. The cache is shared; locks are not.
pub struct ContentStore {
    config: StoreConfig,
    repos: RepoManager,
    cache: Arc<ContentCache>,
    workspaces: RwLock<HashMap<String, Arc<WorkspaceStore>>>,
}

impl ContentStore {
    pub fn new(config: StoreConfig) -> Self {
        let repos = RepoManager::new(config.root.clone())
            .with_author(config.default_author.clone())
            .with_branch(config.branch.clone())
            .with_timeout(config.sync.timeout());
        Self {
            cache: Arc::new(ContentCache::new(config.cache)),
            repos,
            config,
            workspaces: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Repository of `tenant`, without opening its content.
    pub fn repository(&self, tenant: &str) -> ContentResult<Arc<Repository>> {
        validate_tenant_id(tenant)?;
        Ok(self.repos.get(tenant)?)
    }

    /// Content of `tenant`, opened on first use.
    pub fn workspace(&self, tenant: &str) -> ContentResult<Arc<WorkspaceStore>> {
        validate_tenant_id(tenant)?;
        if let Some(ws) = self.workspaces.read().expect("lock poisoned").get(tenant) {
            return Ok(Arc::clone(ws));
        }

        // Repository lock before the map, the same order as `pull`.
        let repo = self.repos.get(tenant)?;
        let _tree = repo.read_lock();
        let mut workspaces = self.workspaces.write().expect("lock poisoned");
        if let Some(ws) = workspaces.get(tenant) {
            return Ok(Arc::clone(ws));
        }
        let ws = WorkspaceStore::open(tenant, Arc::clone(&repo) as Arc<dyn VersionedBackend>)?
            .with_cache(Arc::clone(&self.cache))
            .with_quotas(self.config.quotas);
        debug!(tenant, "workspace ready");
        let ws = Arc::new(ws);
        workspaces.insert(tenant.to_string(), Arc::clone(&ws));
        Ok(ws)
    }

    /// The workspace of `tenant` if it has been opened.
    pub fn open_workspace(&self, tenant: &str) -> Option<Arc<WorkspaceStore>> {
        self.workspaces
            .read()
            .expect("lock poisoned")
            .get(tenant)
            .cloned()
    }

    /// Pull `branch` (empty for the current one) of `tenant` from `remote`.
    ///
    /// Moving the working tree and reloading the open workspace happen under
    /// one hold of the repository lock, so no write can land in between.
    pub async fn pull(&self, tenant: &str, remote: &str, branch: &str) -> ContentResult<PullResult> {
        let repo = self.repository(tenant)?;
        let fetch = repo.fetch(remote, branch).await?;
        self.fast_forward(tenant, &repo, remote, branch, fetch)
    }

    fn fast_forward(
        &self,
        tenant: &str,
        repo: &Repository,
        remote: &str,
        branch: &str,
        fetch: FetchResult,
    ) -> ContentResult<PullResult> {
        let _guard = repo.lock();
        let result = repo.fast_forward_locked(remote, branch, fetch)?;
        if result.changed() {
            match self.open_workspace(tenant) {
                Some(ws) => ws.reload_locked()?,
                None => self.cache.invalidate_tenant(tenant),
            }
            debug!(tenant, files = result.files.len(), "pulled");
        }
        Ok(result)
    }

    /// Tenants with a repository opened in this process.
    pub fn tenants(&self) -> Vec<String> {
        self.repos.open_tenants()
    }
}

#[cfg(test)]
mod tests {
    use strata_types::{ErrorKind, Id};

    use super::*;
    use crate::models::{NodeType, NodeUpdate};
    use crate::testing::author;

    fn store() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default().with_root(dir.path());
        (dir, ContentStore::new(config))
    }

    #[test]
    fn tenant_ids() {
        for ok in ["acme", "org-42", "team_a"] {
            validate_tenant_id(ok).unwrap();
        }
        for bad in ["", " ", "a/b", "..", ".hidden", "a\\b"] {
            let err = validate_tenant_id(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn workspace_is_opened_once() {
        let (_dir, store) = store();
        let a = store.workspace("acme").unwrap();
        let b = store.workspace("acme").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.open_workspace("other").is_none());
        assert!(store.workspace("../escape").is_err());
    }

    #[test]
    fn tenants_are_isolated() {
        let (dir, store) = store();
        let acme = store.workspace("acme").unwrap();
        let globex = store.workspace("globex").unwrap();
        acme.create_node(&author(), Id::ZERO, "Acme notes", NodeType::Document, "hi", vec![])
            .unwrap();

        assert_eq!(acme.list_nodes().unwrap().len(), 1);
        assert!(globex.list_nodes().unwrap().is_empty());
        assert!(dir.path().join("acme/nodes.jsonl").is_file());
        assert_eq!(store.tenants(), vec!["acme", "globex"]);
        assert!(Arc::ptr_eq(acme.cache(), globex.cache()));
    }

    #[tokio::test]
    async fn pull_reloads_the_open_workspace() {
        let (dir, store) = store();
        store.repository("origin").unwrap();
        let origin_url = dir.path().join("origin").to_string_lossy().into_owned();

        let writer = store.workspace("writer").unwrap();
        let node = writer
            .create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "v1", vec![])
            .unwrap();
        writer.backend().set_remote("origin", &origin_url).unwrap();
        writer.backend().push("origin", "").await.unwrap();

        store.repository("reader").unwrap().set_remote("origin", &origin_url).unwrap();
        assert!(store.pull("reader", "origin", "").await.unwrap().changed());
        let reader = store.workspace("reader").unwrap();
        assert_eq!(reader.get_node(node.id).unwrap().content, "v1");
        assert_eq!(reader.list_nodes().unwrap().len(), 1);

        writer
            .update_node(
                &author(),
                node.id,
                NodeUpdate {
                    content: Some("v2".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        writer.backend().push("origin", "").await.unwrap();

        assert!(store.pull("reader", "origin", "").await.unwrap().changed());
        assert_eq!(reader.get_node(node.id).unwrap().content, "v2");
        assert!(!store.pull("reader", "origin", "").await.unwrap().changed());

        // A local write after the pull builds on the pulled catalog.
        reader
            .create_node(&author(), Id::ZERO, "Local", NodeType::Document, "", vec![])
            .unwrap();
        assert_eq!(reader.list_nodes().unwrap().len(), 2);
        assert_eq!(reader.backend().commit_count().unwrap(), 3);
    }

    #[test]
    fn quotas_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::default().with_root(dir.path());
        config.quotas.max_pages = 1;
        let store = ContentStore::new(config);
        let ws = store.workspace("acme").unwrap();
        ws.create_node(&author(), Id::ZERO, "one", NodeType::Document, "", vec![])
            .unwrap();
        let err = ws
            .create_node(&author(), Id::ZERO, "two", NodeType::Document, "", vec![])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    }
}
