use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use strata_types::Id;
use tracing::debug;

use crate::config::CacheConfig;
use crate::models::{DataRecord, Node};

type TableKey = (String, Id);

/// Advisory cache of derived reads, shared by every tenant.
///
/// Holds the reconstructed node tree of each tenant and the record list of
/// recently read tables. Entries are dropped by the write paths after their
/// commit succeeds; a miss is always recomputed from disk.
pub struct ContentCache {
    max_record_tables: usize,
    trees: RwLock<HashMap<String, Arc<Vec<Node>>>>,
    records: RwLock<RecordEntries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Default)]
struct RecordEntries {
    map: HashMap<TableKey, Arc<Vec<DataRecord>>>,
    /// Insertion order, oldest first.
    order: VecDeque<TableKey>,
}

/// Hit and miss counts since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            max_record_tables: config.max_record_tables,
            trees: RwLock::new(HashMap::new()),
            records: RwLock::new(RecordEntries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn node_tree(&self, tenant: &str) -> Option<Arc<Vec<Node>>> {
        let tree = self
            .trees
            .read()
            .expect("lock poisoned")
            .get(tenant)
            .cloned();
        self.count(tree.is_some());
        tree
    }

    pub fn put_node_tree(&self, tenant: &str, tree: Vec<Node>) -> Arc<Vec<Node>> {
        let tree = Arc::new(tree);
        self.trees
            .write()
            .expect("lock poisoned")
            .insert(tenant.to_string(), Arc::clone(&tree));
        tree
    }

    pub fn records(&self, tenant: &str, node: Id) -> Option<Arc<Vec<DataRecord>>> {
        let records = self
            .records
            .read()
            .expect("lock poisoned")
            .map
            .get(&(tenant.to_string(), node))
            .cloned();
        self.count(records.is_some());
        records
    }

    /// Cache the records of one table, evicting the oldest table when full.
    /// A limit of zero disables record caching.
    pub fn put_records(
        &self,
        tenant: &str,
        node: Id,
        records: Vec<DataRecord>,
    ) -> Arc<Vec<DataRecord>> {
        let records = Arc::new(records);
        if self.max_record_tables == 0 {
            return records;
        }
        let key = (tenant.to_string(), node);
        let mut entries = self.records.write().expect("lock poisoned");
        if entries.map.insert(key.clone(), Arc::clone(&records)).is_none() {
            entries.order.push_back(key);
        }
        while entries.map.len() > self.max_record_tables {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.map.remove(&oldest);
            debug!(tenant = %oldest.0, node = %oldest.1, "evicted cached records");
        }
        records
    }

    pub fn invalidate_node_tree(&self, tenant: &str) {
        self.trees.write().expect("lock poisoned").remove(tenant);
    }

    pub fn invalidate_records(&self, tenant: &str, node: Id) {
        let key = (tenant.to_string(), node);
        let mut entries = self.records.write().expect("lock poisoned");
        if entries.map.remove(&key).is_some() {
            entries.order.retain(|k| *k != key);
        }
    }

    /// Drop everything cached for `tenant`.
    pub fn invalidate_tenant(&self, tenant: &str) {
        self.invalidate_node_tree(tenant);
        let mut entries = self.records.write().expect("lock poisoned");
        entries.map.retain(|(t, _), _| t != tenant);
        entries.order.retain(|(t, _)| t != tenant);
    }

    pub fn invalidate_all(&self) {
        self.trees.write().expect("lock poisoned").clear();
        let mut entries = self.records.write().expect("lock poisoned");
        entries.map.clear();
        entries.order.clear();
        debug!("cache cleared");
    }

    pub fn cached_record_tables(&self) -> usize {
        self.records.read().expect("lock poisoned").map.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn count(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
