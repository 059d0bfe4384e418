use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use strata_diff::{diff_blobs, BlobDiff};
use strata_query::{validate_schema, Property};
use strata_repo::{Commit, RepoError, VersionedBackend, META_DIR};
use strata_table::Table;
use strata_types::{Author, Id};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::ContentCache;
use crate::config::QuotaLimits;
use crate::error::{ContentError, ContentResult};
use crate::frontmatter::Page;
use crate::journal::Journal;
use crate::links::LinkIndex;
use crate::models::{
    Backlink, DataRecord, Node, NodeRow, NodeType, NodeUpdate, NodeVersion, TableMeta,
};
use crate::quota::QuotaChecker;

/// Node catalog, one row per node.
pub const CATALOG_FILE: &str = "nodes.jsonl";
/// Directory holding one sub-directory per node.
pub const NODES_DIR: &str = "nodes";
/// Front matter and markdown body of a page.
pub const PAGE_FILE: &str = "index.md";
/// Properties and views of a table.
pub const METADATA_FILE: &str = "metadata.json";
/// Records of a table.
pub const RECORDS_FILE: &str = "data.jsonl";

pub(crate) fn node_dir(id: Id) -> String {
    format!("{NODES_DIR}/{id}")
}

pub(crate) fn node_file(id: Id, name: &str) -> String {
    format!("{NODES_DIR}/{id}/{name}")
}

/// Content of one tenant: nodes, records, views and assets, stored as files
/// in the tenant's versioned repository.
///
/// Every write holds the repository lock exclusively from the quota checks
/// through the commit. If anything fails after the first file is touched,
/// the files and tables are put back as they were and nothing is committed.
/// Reads hold the same lock shared, so they only ever see committed
/// content, and only committed content reaches the cache.
pub struct WorkspaceStore {
    tenant: String,
    backend: Arc<dyn VersionedBackend>,
    catalog: Arc<Table<NodeRow>>,
    tables: RwLock<HashMap<Id, Arc<Table<DataRecord>>>>,
    pub(crate) cache: Arc<ContentCache>,
    pub(crate) quota: QuotaChecker,
    links: LinkIndex,
}

impl WorkspaceStore {
    /// Open the content of `tenant` stored in `backend`.
    ///
    /// The catalog file is created if missing; it is committed with the
    /// first write.
    pub fn open(tenant: impl Into<String>, backend: Arc<dyn VersionedBackend>) -> ContentResult<Self> {
        let tenant = tenant.into();
        let catalog = Table::open(backend.root().join(CATALOG_FILE))?;
        debug!(tenant = %tenant, nodes = catalog.len(), "workspace opened");
        Ok(Self {
            tenant,
            backend,
            catalog: Arc::new(catalog),
            tables: RwLock::new(HashMap::new()),
            cache: Arc::new(ContentCache::default()),
            quota: QuotaChecker::default(),
            links: LinkIndex::default(),
        })
    }

    /// Share a cache with other workspaces.
    pub fn with_cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_quotas(mut self, limits: QuotaLimits) -> Self {
        self.quota = QuotaChecker::new(limits);
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn backend(&self) -> &Arc<dyn VersionedBackend> {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Re-read everything from disk, e.g. after a pull changed the working
    /// tree.
    pub fn reload(&self) -> ContentResult<()> {
        let _guard = self.backend.lock();
        self.reload_locked()
    }

    /// [`reload`](Self::reload) for a caller that already holds the
    /// repository lock.
    pub(crate) fn reload_locked(&self) -> ContentResult<()> {
        self.catalog.reload()?;
        self.forget();
        debug!(tenant = %self.tenant, "workspace reloaded");
        Ok(())
    }

    /// Drop everything derived from the files: open tables, cached reads
    /// and the link index.
    fn forget(&self) {
        self.tables.write().expect("lock poisoned").clear();
        self.cache.invalidate_tenant(&self.tenant);
        self.links.clear();
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// All nodes as a forest, roots first, children nested in id order.
    ///
    /// A node whose parent is missing from the catalog is listed as a root.
    pub fn list_nodes(&self) -> ContentResult<Vec<Node>> {
        let _guard = self.backend.read_lock();
        if let Some(tree) = self.cache.node_tree(&self.tenant) {
            return Ok(tree.as_ref().clone());
        }
        let rows = self.catalog.rows();
        let known: HashSet<Id> = rows.iter().map(|r| r.id).collect();
        let mut children: HashMap<Id, Vec<NodeRow>> = HashMap::new();
        let mut roots = Vec::new();
        for row in rows {
            if row.parent_id.is_zero() || !known.contains(&row.parent_id) {
                roots.push(row);
            } else {
                children.entry(row.parent_id).or_default().push(row);
            }
        }
        let tree: Vec<Node> = roots
            .into_iter()
            .map(|row| build_tree(row, &mut children))
            .collect();
        debug!(tenant = %self.tenant, roots = tree.len(), "node tree rebuilt");
        Ok(self.cache.put_node_tree(&self.tenant, tree).as_ref().clone())
    }

    /// One node with its page body, schema and views.
    pub fn get_node(&self, id: Id) -> ContentResult<Node> {
        let _guard = self.backend.read_lock();
        let row = self.row(id)?;
        let kind = row.kind;
        let mut node = Node::from_row(row);
        if kind.has_page() {
            node.content = self.read_page(id)?.body;
        }
        if kind.has_table() {
            let meta = self.read_meta(id)?;
            node.properties = meta.properties;
            node.views = meta.views;
        }
        node.has_children = !self.catalog.filter(|r| r.parent_id == id).is_empty();
        Ok(node)
    }

    /// Create a node under `parent` ([`Id::ZERO`] for a root).
    ///
    /// `content` applies to pages and `properties` to tables; passing either
    /// to a node type that has no use for it is rejected.
    pub fn create_node(
        &self,
        author: &Author,
        parent: Id,
        title: &str,
        kind: NodeType,
        content: &str,
        properties: Vec<Property>,
    ) -> ContentResult<Node> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ContentError::Validation("title is required".into()));
        }
        if !kind.has_page() && !content.is_empty() {
            return Err(ContentError::Validation(format!("{kind} nodes have no content")));
        }
        if !kind.has_table() && !properties.is_empty() {
            return Err(ContentError::Validation(format!("{kind} nodes have no properties")));
        }
        if kind.has_table() {
            validate_schema(&properties)?;
        }

        let now = Utc::now();
        let id = Id::new();
        let row = NodeRow {
            id,
            parent_id: parent,
            title: title.to_string(),
            kind,
            tags: Vec::new(),
            icon: String::new(),
            cover: String::new(),
            created: now,
            modified: now,
        };
        let mut files = Vec::new();
        if kind.has_page() {
            let page = Page {
                id,
                title: row.title.clone(),
                created: Some(now),
                modified: Some(now),
                tags: Vec::new(),
                body: content.to_string(),
            };
            files.push((node_file(id, PAGE_FILE), page.format().into_bytes()));
        }
        let columns = properties.len() as u64;
        if kind.has_table() {
            let meta = TableMeta {
                properties,
                views: Vec::new(),
            };
            files.push((node_file(id, METADATA_FILE), serde_json::to_vec_pretty(&meta)?));
        }
        let catalog_line = serde_json::to_vec(&row)?.len() as u64 + 1;

        self.write(author, |journal| {
            if !parent.is_zero() && !self.catalog.contains(parent) {
                return Err(ContentError::NodeNotFound(parent));
            }
            self.quota.check_page_count(self.catalog.len() as u64)?;
            if kind.has_table() {
                self.quota.check_columns(columns)?;
            }
            let growth = files.iter().map(|(_, b)| b.len() as u64).sum::<u64>() + catalog_line;
            self.quota.check_storage(self.usage()?, growth)?;

            journal.track_table(&self.catalog);
            self.catalog.append(row.clone())?;
            for (rel, bytes) in &files {
                journal.write(rel, bytes)?;
            }
            if kind.has_table() {
                journal.track(&node_file(id, RECORDS_FILE))?;
                self.records_table(id)?;
            }
            if kind.has_page() {
                self.links.update(id, content);
            }
            Ok((format!("create: {kind} {id} - {}", row.title), ()))
        })?;
        self.cache.invalidate_node_tree(&self.tenant);
        self.get_node(id)
    }

    /// Apply `update` and return the node as stored.
    ///
    /// Changing the schema re-checks every saved view against it.
    pub fn update_node(&self, author: &Author, id: Id, update: NodeUpdate) -> ContentResult<Node> {
        if update.is_empty() {
            return self.get_node(id);
        }
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(ContentError::Validation("title is required".into()));
            }
        }
        if let Some(properties) = &update.properties {
            validate_schema(properties)?;
        }

        self.write(author, |journal| {
            let row = self.row(id)?;
            let kind = row.kind;
            if update.content.is_some() && !kind.has_page() {
                return Err(ContentError::Validation(format!("{kind} nodes have no content")));
            }
            if update.properties.is_some() && !kind.has_table() {
                return Err(ContentError::Validation(format!("{kind} nodes have no properties")));
            }

            let mut updated = row.clone();
            if let Some(title) = &update.title {
                updated.title = title.trim().to_string();
            }
            if let Some(tags) = &update.tags {
                updated.tags = tags.clone();
            }
            if let Some(icon) = &update.icon {
                updated.icon = icon.clone();
            }
            if let Some(cover) = &update.cover {
                updated.cover = cover.clone();
            }
            updated.modified = Utc::now();

            let mut files = Vec::new();
            if kind.has_page() {
                let old = self.read_page(id)?;
                let page = Page {
                    id,
                    title: updated.title.clone(),
                    created: Some(row.created),
                    modified: Some(updated.modified),
                    tags: updated.tags.clone(),
                    body: update.content.clone().unwrap_or(old.body),
                };
                files.push((node_file(id, PAGE_FILE), page.format().into_bytes()));
            }
            if let Some(properties) = &update.properties {
                self.quota.check_columns(properties.len() as u64)?;
                let mut meta = self.read_meta(id)?;
                for view in &meta.views {
                    view.validate(properties)?;
                }
                meta.properties = properties.clone();
                files.push((node_file(id, METADATA_FILE), serde_json::to_vec_pretty(&meta)?));
            }
            self.check_growth(&files)?;

            journal.track_table(&self.catalog);
            self.catalog.update(updated)?;
            for (rel, bytes) in &files {
                journal.write(rel, bytes)?;
            }
            if let Some(content) = &update.content {
                self.links.update(id, content);
            }
            Ok((format!("update: {kind} {id}"), ()))
        })?;
        self.cache.invalidate_node_tree(&self.tenant);
        self.get_node(id)
    }

    /// Delete a node and everything below it: children, records and assets.
    ///
    /// Returns the ids removed, the node itself first.
    pub fn delete_node(&self, author: &Author, id: Id) -> ContentResult<Vec<Id>> {
        let removed = self.write(author, |journal| {
            let row = self.row(id)?;
            let ids = self.subtree(id);
            journal.track_table(&self.catalog);
            for node in &ids {
                journal.remove_dir(&node_dir(*node))?;
            }
            let doomed: HashSet<Id> = ids.iter().copied().collect();
            self.catalog.delete_where(|r| doomed.contains(&r.id))?;
            for node in &ids {
                self.links.remove(*node);
            }
            Ok((format!("delete: {} {id}", row.kind), ids))
        })?;

        let mut tables = self.tables.write().expect("lock poisoned");
        for node in &removed {
            tables.remove(node);
            self.cache.invalidate_records(&self.tenant, *node);
        }
        drop(tables);
        self.cache.invalidate_node_tree(&self.tenant);
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Revisions that touched the node's files, newest first.
    ///
    /// History outlives the node: a deleted node still has its history.
    pub fn get_node_history(&self, id: Id, limit: usize) -> ContentResult<Vec<Commit>> {
        Ok(self.backend.history(&node_dir(id), limit)?)
    }

    /// Title and page body as of `rev`, without the storage header.
    pub fn get_node_version(&self, id: Id, rev: &str) -> ContentResult<NodeVersion> {
        let bytes = match self.backend.file_at_revision(&node_file(id, PAGE_FILE), rev) {
            Ok(bytes) => bytes,
            Err(RepoError::FileNotFound { .. }) => {
                return Err(ContentError::VersionNotFound {
                    node: id,
                    rev: rev.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let page = Page::parse(&String::from_utf8_lossy(&bytes));
        Ok(NodeVersion {
            id,
            rev: rev.to_string(),
            title: page.title,
            content: page.body,
        })
    }

    /// Line diff of the page body between `rev` and the working tree.
    pub fn diff_node(&self, id: Id, rev: &str) -> ContentResult<BlobDiff> {
        let old = self.get_node_version(id, rev)?.content;
        let _guard = self.backend.read_lock();
        let new = match self.catalog.get(id) {
            Some(row) if row.kind.has_page() => self.read_page(id)?.body,
            _ => String::new(),
        };
        Ok(diff_blobs(old.as_bytes(), new.as_bytes()))
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// Pages whose body links to `id`, in the order they first linked.
    ///
    /// The link index is built from every page on first use and kept up to
    /// date by the writes that follow.
    pub fn backlinks(&self, id: Id) -> ContentResult<Vec<Backlink>> {
        let _guard = self.backend.read_lock();
        self.row(id)?;
        if !self.links.is_built() {
            let mut pages = Vec::new();
            for row in self.catalog.rows().into_iter().filter(|r| r.kind.has_page()) {
                pages.push((row.id, self.read_page(row.id)?.body));
            }
            self.links.build(pages);
            debug!(tenant = %self.tenant, "link index built");
        }
        Ok(self
            .links
            .backlinks(id)
            .into_iter()
            .filter_map(|source| self.catalog.get(source))
            .map(|row| Backlink {
                node_id: row.id,
                title: row.title,
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Usage
    // -----------------------------------------------------------------------

    /// Bytes used by content files, excluding repository metadata.
    pub fn storage_usage(&self) -> ContentResult<u64> {
        let _guard = self.backend.read_lock();
        self.usage()
    }

    /// [`storage_usage`](Self::storage_usage) without taking the lock.
    pub(crate) fn usage(&self) -> ContentResult<u64> {
        let mut total = 0;
        let walker = WalkDir::new(self.backend.root())
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name() != META_DIR);
        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(io::Error::other)?.len();
            }
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Internals shared by the other write paths
    // -----------------------------------------------------------------------

    /// Run one write under the repository lock and commit it.
    ///
    /// `f` performs the quota checks, then the writes through `journal`, and
    /// returns the commit message. On any failure the journal is rolled back
    /// while the lock is still held; a failed commit surfaces as
    /// [`ContentError::Commit`].
    pub(crate) fn write<T>(
        &self,
        author: &Author,
        f: impl FnOnce(&mut Journal) -> ContentResult<(String, T)>,
    ) -> ContentResult<T> {
        let _guard = self.backend.lock();
        let mut journal = Journal::new(self.backend.root());
        let (message, value) = match f(&mut journal) {
            Ok(done) => done,
            Err(e) => {
                self.undo(journal);
                return Err(e);
            }
        };
        match self.backend.commit_locked(author, &message) {
            Ok(Some(commit)) => {
                info!(tenant = %self.tenant, commit = %commit.short_hash(), "{message}");
                Ok(value)
            }
            Ok(None) => {
                debug!(tenant = %self.tenant, "{message}: nothing changed");
                Ok(value)
            }
            Err(e) => {
                warn!(tenant = %self.tenant, error = %e, "commit failed, rolling back");
                self.undo(journal);
                Err(ContentError::Commit(e.to_string()))
            }
        }
    }

    fn undo(&self, journal: Journal) {
        journal.rollback();
        self.forget();
    }

    /// Fail if writing `files` would take the tenant over its storage quota.
    pub(crate) fn check_growth(&self, files: &[(String, Vec<u8>)]) -> ContentResult<()> {
        let mut growth: i128 = 0;
        for (rel, bytes) in files {
            let current = match fs::metadata(self.backend.root().join(rel)) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
            growth += bytes.len() as i128 - current as i128;
        }
        if growth > 0 {
            self.quota.check_storage(self.usage()?, growth as u64)?;
        }
        Ok(())
    }

    pub(crate) fn row(&self, id: Id) -> ContentResult<NodeRow> {
        self.catalog.get(id).ok_or(ContentError::NodeNotFound(id))
    }

    /// The catalog row of `id`, which must be a table or hybrid node.
    pub(crate) fn table_row(&self, id: Id) -> ContentResult<NodeRow> {
        let row = self.row(id)?;
        if !row.kind.has_table() {
            return Err(ContentError::Validation(format!("node {id} is not a table")));
        }
        Ok(row)
    }

    pub(crate) fn catalog(&self) -> &Table<NodeRow> {
        &self.catalog
    }

    pub(crate) fn read_page(&self, id: Id) -> ContentResult<Page> {
        match fs::read_to_string(self.backend.root().join(node_file(id, PAGE_FILE))) {
            Ok(text) => Ok(Page::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Page::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn read_meta(&self, id: Id) -> ContentResult<TableMeta> {
        match fs::read(self.backend.root().join(node_file(id, METADATA_FILE))) {
            Ok(bytes) => self.parse_meta(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(TableMeta::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn parse_meta(&self, bytes: &[u8]) -> ContentResult<TableMeta> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Open handle on the record table of `id`, creating the file if needed.
    pub(crate) fn records_table(&self, id: Id) -> ContentResult<Arc<Table<DataRecord>>> {
        if let Some(table) = self.tables.read().expect("lock poisoned").get(&id) {
            return Ok(Arc::clone(table));
        }
        let mut tables = self.tables.write().expect("lock poisoned");
        if let Some(table) = tables.get(&id) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(Table::open(
            self.backend.root().join(node_file(id, RECORDS_FILE)),
        )?);
        tables.insert(id, Arc::clone(&table));
        Ok(table)
    }

    /// `id` and all of its descendants, breadth first.
    fn subtree(&self, id: Id) -> Vec<Id> {
        let rows = self.catalog.rows();
        let mut out = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(parent) = queue.pop_front() {
            for row in rows.iter().filter(|r| r.parent_id == parent) {
                if !out.contains(&row.id) {
                    out.push(row.id);
                    queue.push_back(row.id);
                }
            }
        }
        out
    }
}

fn build_tree(row: NodeRow, children: &mut HashMap<Id, Vec<NodeRow>>) -> Node {
    let kids = children.remove(&row.id).unwrap_or_default();
    let mut node = Node::from_row(row);
    node.children = kids
        .into_iter()
        .map(|child| build_tree(child, children))
        .collect();
    node.has_children = !node.children.is_empty();
    node
}

impl std::fmt::Debug for WorkspaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceStore")
            .field("tenant", &self.tenant)
            .field("nodes", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use strata_types::ErrorKind;

    use super::*;
    use crate::models::QueryPage;
    use crate::quota::MAX_STORAGE_BYTES;
    use crate::testing::{
        author, flaky_workspace, people_schema, person, workspace, workspace_with_quotas,
    };

    fn commits(ws: &WorkspaceStore) -> usize {
        ws.backend().commit_count().unwrap()
    }

    fn node_dirs(ws: &WorkspaceStore) -> usize {
        match fs::read_dir(ws.backend().root().join(NODES_DIR)) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    #[test]
    fn create_and_get_document() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let node = ws
            .create_node(&author(), Id::ZERO, "  Welcome ", NodeType::Document, "# Hello", vec![])
            .unwrap();
        assert_eq!(node.title, "Welcome");
        assert_eq!(node.content, "# Hello");
        assert!(node.parent_id.is_zero());

        let text = fs::read_to_string(dir.path().join(node_file(node.id, PAGE_FILE))).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.ends_with("# Hello"));
        assert_eq!(commits(&ws), 1);
    }

    #[test]
    fn create_validates_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let cases = [
            ws.create_node(&author(), Id::ZERO, " ", NodeType::Document, "", vec![]),
            ws.create_node(&author(), Id::ZERO, "T", NodeType::Table, "body", vec![]),
            ws.create_node(&author(), Id::ZERO, "D", NodeType::Document, "", people_schema()),
            ws.create_node(&author(), Id::new(), "Orphan", NodeType::Document, "", vec![]),
        ];
        for result in cases {
            assert!(result.is_err());
        }
        assert_eq!(node_dirs(&ws), 0);
        assert_eq!(commits(&ws), 0);
        assert!(ws.list_nodes().unwrap().is_empty());
    }

    #[test]
    fn tree_nests_children() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let root = ws
            .create_node(&author(), Id::ZERO, "Root", NodeType::Document, "", vec![])
            .unwrap();
        let a = ws
            .create_node(&author(), root.id, "A", NodeType::Document, "", vec![])
            .unwrap();
        let b = ws
            .create_node(&author(), root.id, "B", NodeType::Table, "", people_schema())
            .unwrap();
        ws.create_node(&author(), a.id, "A1", NodeType::Hybrid, "", vec![])
            .unwrap();

        let tree = ws.list_nodes().unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree[0].has_children);
        let titles: Vec<_> = tree[0].children.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
        assert_eq!(tree[0].children[0].children[0].title, "A1");
        assert!(!tree[0].children[1].has_children);
        assert_eq!(tree[0].children[1].id, b.id);
        assert!(ws.get_node(root.id).unwrap().has_children);
    }

    #[test]
    fn list_nodes_sees_every_write() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        assert!(ws.list_nodes().unwrap().is_empty());

        let node = ws
            .create_node(&author(), Id::ZERO, "First", NodeType::Document, "", vec![])
            .unwrap();
        assert_eq!(ws.list_nodes().unwrap()[0].title, "First");

        ws.update_node(
            &author(),
            node.id,
            NodeUpdate {
                title: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ws.list_nodes().unwrap()[0].title, "Renamed");

        ws.delete_node(&author(), node.id).unwrap();
        assert!(ws.list_nodes().unwrap().is_empty());
        assert!(ws.cache().stats().hits > 0);
    }

    #[test]
    fn update_rejects_fields_of_other_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let doc = ws
            .create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "", vec![])
            .unwrap();
        let table = ws
            .create_node(&author(), Id::ZERO, "People", NodeType::Table, "", people_schema())
            .unwrap();

        let err = ws
            .update_node(
                &author(),
                doc.id,
                NodeUpdate {
                    properties: Some(people_schema()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = ws
            .update_node(
                &author(),
                table.id,
                NodeUpdate {
                    content: Some("text".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(commits(&ws), 2);
    }

    #[test]
    fn update_unknown_node() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let err = ws
            .update_node(
                &author(),
                Id::new(),
                NodeUpdate {
                    title: Some("x".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ContentError::NodeNotFound(_)));
    }

    #[test]
    fn delete_removes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let root = ws
            .create_node(&author(), Id::ZERO, "Root", NodeType::Document, "", vec![])
            .unwrap();
        let table = ws
            .create_node(&author(), root.id, "People", NodeType::Table, "", people_schema())
            .unwrap();
        ws.append_record(&author(), table.id, person("Alice", 25.0)).unwrap();
        let keep = ws
            .create_node(&author(), Id::ZERO, "Keep", NodeType::Document, "", vec![])
            .unwrap();

        let removed = ws.delete_node(&author(), root.id).unwrap();
        assert_eq!(removed, vec![root.id, table.id]);
        assert_eq!(node_dirs(&ws), 1);
        assert!(ws.get_node(table.id).is_err());
        assert!(ws.get_node(keep.id).is_ok());
        assert!(matches!(
            ws.list_records(table.id, 0, 0).unwrap_err(),
            ContentError::NodeNotFound(_)
        ));
        // The history of a deleted node stays readable.
        assert!(!ws.get_node_history(table.id, 0).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Commit coupling
    // -----------------------------------------------------------------------

    #[test]
    fn every_write_is_one_commit() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let node = ws
            .create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "v1", vec![])
            .unwrap();
        ws.update_node(
            &author(),
            node.id,
            NodeUpdate {
                content: Some("v2".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(commits(&ws), 2);

        let history = ws.get_node_history(node.id, 0).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].message.starts_with("update: document"));
        assert!(history[1].message.starts_with("create: document"));
        assert_eq!(ws.get_node_history(node.id, 1).unwrap().len(), 1);
    }

    #[test]
    fn failed_commit_restores_files_and_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let (ws, backend) = flaky_workspace(dir.path());
        let node = ws
            .create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "kept", vec![])
            .unwrap();
        let page = dir.path().join(node_file(node.id, PAGE_FILE));
        let before = fs::read(&page).unwrap();

        backend.fail_commits(true);
        let err = ws
            .update_node(
                &author(),
                node.id,
                NodeUpdate {
                    title: Some("Lost".into()),
                    content: Some("lost".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ContentError::Commit(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(fs::read(&page).unwrap(), before);
        assert_eq!(ws.get_node(node.id).unwrap().title, "Doc");

        let err = ws
            .create_node(&author(), Id::ZERO, "Table", NodeType::Table, "", people_schema())
            .unwrap_err();
        assert!(matches!(err, ContentError::Commit(_)));
        assert_eq!(ws.list_nodes().unwrap().len(), 1);
        assert_eq!(node_dirs(&ws), 1);

        backend.fail_commits(false);
        assert_eq!(ws.get_node_history(node.id, 0).unwrap().len(), 1);
        assert_eq!(commits(&ws), 1);
    }

    #[test]
    fn failed_commit_restores_records() {
        let dir = tempfile::tempdir().unwrap();
        let (ws, backend) = flaky_workspace(dir.path());
        let table = ws
            .create_node(&author(), Id::ZERO, "People", NodeType::Table, "", people_schema())
            .unwrap();
        ws.append_record(&author(), table.id, person("Alice", 25.0)).unwrap();

        backend.fail_commits(true);
        assert!(ws.append_record(&author(), table.id, person("Bob", 10.0)).is_err());
        assert_eq!(ws.list_records(table.id, 0, 0).unwrap().total, 1);
        let on_disk = fs::read_to_string(dir.path().join(node_file(table.id, RECORDS_FILE))).unwrap();
        assert_eq!(on_disk.lines().count(), 1);
        assert_eq!(commits(&ws), 2);
    }

    // -----------------------------------------------------------------------
    // Quotas
    // -----------------------------------------------------------------------

    #[test]
    fn page_quota_blocks_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let limits = QuotaLimits {
            max_pages: 1,
            ..Default::default()
        };
        let ws = workspace_with_quotas(dir.path(), limits);
        ws.create_node(&author(), Id::ZERO, "One", NodeType::Document, "", vec![])
            .unwrap();
        let catalog_before = fs::read(dir.path().join(CATALOG_FILE)).unwrap();

        let err = ws
            .create_node(&author(), Id::ZERO, "Two", NodeType::Document, "", vec![])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(fs::read(dir.path().join(CATALOG_FILE)).unwrap(), catalog_before);
        assert_eq!(node_dirs(&ws), 1);
        assert_eq!(commits(&ws), 1);
    }

    #[test]
    fn storage_quota_counts_content_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let limits = QuotaLimits {
            max_storage_bytes: 2_000,
            ..Default::default()
        };
        let ws = workspace_with_quotas(dir.path(), limits);
        let node = ws
            .create_node(&author(), Id::ZERO, "Small", NodeType::Document, "tiny", vec![])
            .unwrap();
        assert!(ws.storage_usage().unwrap() < 2_000);

        let big = "x".repeat(4_000);
        let err = ws
            .update_node(
                &author(),
                node.id,
                NodeUpdate {
                    content: Some(big),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ContentError::QuotaExceeded { limit: MAX_STORAGE_BYTES, .. }));
        assert_eq!(ws.get_node(node.id).unwrap().content, "tiny");
        assert_eq!(commits(&ws), 1);
    }

    #[test]
    fn column_quota() {
        let dir = tempfile::tempdir().unwrap();
        let limits = QuotaLimits {
            max_columns_per_table: 1,
            ..Default::default()
        };
        let ws = workspace_with_quotas(dir.path(), limits);
        let err = ws
            .create_node(&author(), Id::ZERO, "Wide", NodeType::Table, "", people_schema())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(node_dirs(&ws), 0);
    }

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    #[test]
    fn node_version_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let parent = ws
            .create_node(&author(), Id::ZERO, "Parent", NodeType::Document, "", vec![])
            .unwrap();
        let child = ws
            .create_node(&author(), parent.id, "Child", NodeType::Document, "child content", vec![])
            .unwrap();
        ws.update_node(
            &author(),
            child.id,
            NodeUpdate {
                content: Some("child content v2".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let history = ws.get_node_history(child.id, 0).unwrap();
        let latest = ws.get_node_version(child.id, &history[0].hash).unwrap();
        assert_eq!(latest.title, "Child");
        assert_eq!(latest.content, "child content v2");
        assert!(!latest.content.contains("---"));
        assert!(!latest.content.contains("title:"));

        let first = ws.get_node_version(child.id, &history[1].hash).unwrap();
        assert_eq!(first.content, "child content");
    }

    #[test]
    fn node_version_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let node = ws
            .create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "", vec![])
            .unwrap();
        let head = ws.backend().head_commit().unwrap().unwrap();
        let err = ws.get_node_version(Id::new(), &head.hash).unwrap_err();
        assert!(matches!(err, ContentError::VersionNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ws.get_node_version(node.id, &head.hash).is_ok());
    }

    #[test]
    fn reload_picks_up_external_changes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        ws.create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "", vec![])
            .unwrap();
        assert_eq!(ws.list_nodes().unwrap().len(), 1);

        fs::write(dir.path().join(CATALOG_FILE), "").unwrap();
        assert_eq!(ws.list_nodes().unwrap().len(), 1);
        ws.reload().unwrap();
        assert!(ws.list_nodes().unwrap().is_empty());
    }

    #[test]
    fn diff_against_an_earlier_revision() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let node = ws
            .create_node(&author(), Id::ZERO, "Doc", NodeType::Document, "one\ntwo\n", vec![])
            .unwrap();
        let first = ws.get_node_history(node.id, 0).unwrap()[0].hash.clone();
        assert!(ws.diff_node(node.id, &first).unwrap().is_empty());

        ws.update_node(
            &author(),
            node.id,
            NodeUpdate {
                content: Some("one\nthree\n".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let diff = ws.diff_node(node.id, &first).unwrap();
        assert_eq!((diff.additions(), diff.deletions()), (1, 1));
        let text = diff.to_unified("before", "now");
        assert!(text.contains("-two"));
        assert!(text.contains("+three"));

        let err = ws.diff_node(Id::new(), &first).unwrap_err();
        assert!(matches!(err, ContentError::VersionNotFound { .. }));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn readers_never_cache_a_write_that_fails_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let (ws, backend) = flaky_workspace(dir.path());
        let table = ws
            .create_node(&author(), Id::ZERO, "People", NodeType::Table, "", people_schema())
            .unwrap();
        ws.append_record(&author(), table.id, person("Alice", 25.0)).unwrap();

        backend.slow_commits(Duration::from_millis(200));
        backend.fail_commits(true);
        let seen = thread::scope(|s| {
            let writer = s.spawn(|| ws.append_record(&author(), table.id, person("Ghost", 1.0)));
            thread::sleep(Duration::from_millis(50));
            let seen = ws.list_records(table.id, 0, 0).unwrap();
            assert!(writer.join().unwrap().is_err());
            seen
        });
        let names = |page: &QueryPage| -> Vec<String> {
            page.records.iter().map(|r| r.data["Name"].to_string()).collect()
        };
        assert_eq!(names(&seen), ["Alice"]);

        backend.slow_commits(Duration::ZERO);
        backend.fail_commits(false);
        assert_eq!(names(&ws.list_records(table.id, 0, 0).unwrap()), ["Alice"]);
        ws.append_record(&author(), table.id, person("Bob", 30.0)).unwrap();
        assert_eq!(names(&ws.list_records(table.id, 0, 0).unwrap()), ["Alice", "Bob"]);
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    fn link_to(id: Id) -> String {
        format!("See [it](../{id}/index.md).")
    }

    #[test]
    fn backlinks_follow_page_edits() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let target = ws
            .create_node(&author(), Id::ZERO, "Target", NodeType::Document, "", vec![])
            .unwrap();
        let a = ws
            .create_node(&author(), Id::ZERO, "A", NodeType::Document, &link_to(target.id), vec![])
            .unwrap();
        assert_eq!(
            ws.backlinks(target.id).unwrap(),
            [Backlink {
                node_id: a.id,
                title: "A".into()
            }]
        );
        assert!(ws.backlinks(a.id).unwrap().is_empty());

        let b = ws
            .create_node(&author(), a.id, "B", NodeType::Hybrid, &link_to(target.id), vec![])
            .unwrap();
        let sources = |ws: &WorkspaceStore| -> Vec<Id> {
            ws.backlinks(target.id)
                .unwrap()
                .into_iter()
                .map(|b| b.node_id)
                .collect()
        };
        assert_eq!(sources(&ws), [a.id, b.id]);

        ws.update_node(
            &author(),
            b.id,
            NodeUpdate {
                title: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ws.backlinks(target.id).unwrap()[1].title, "Renamed");

        ws.update_node(
            &author(),
            a.id,
            NodeUpdate {
                content: Some("no links".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(sources(&ws), [b.id]);

        ws.update_node(
            &author(),
            a.id,
            NodeUpdate {
                content: Some(link_to(target.id)),
                ..Default::default()
            },
        )
        .unwrap();
        // Deleting `a` takes its child `b` with it.
        ws.delete_node(&author(), a.id).unwrap();
        assert!(sources(&ws).is_empty());
        assert!(matches!(
            ws.backlinks(Id::new()).unwrap_err(),
            ContentError::NodeNotFound(_)
        ));
    }

    #[test]
    fn backlinks_ignore_a_failed_edit() {
        let dir = tempfile::tempdir().unwrap();
        let (ws, backend) = flaky_workspace(dir.path());
        let target = ws
            .create_node(&author(), Id::ZERO, "Target", NodeType::Document, "", vec![])
            .unwrap();
        let source = ws
            .create_node(&author(), Id::ZERO, "Source", NodeType::Document, &link_to(target.id), vec![])
            .unwrap();
        assert_eq!(ws.backlinks(target.id).unwrap().len(), 1);

        backend.fail_commits(true);
        let unlink = NodeUpdate {
            content: Some("gone".into()),
            ..Default::default()
        };
        assert!(ws.update_node(&author(), source.id, unlink).is_err());
        assert!(ws.delete_node(&author(), source.id).is_err());
        assert_eq!(ws.backlinks(target.id).unwrap()[0].node_id, source.id);
    }
}
