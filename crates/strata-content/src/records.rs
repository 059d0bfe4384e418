//! Records and views of table nodes.

use std::sync::Arc;

use chrono::Utc;
use strata_query::{
    coerce_record_data, group_records, page, resolve_query, Query, RecordData, RecordGroup, View,
};
use strata_types::{Author, Id};

use crate::error::{ContentError, ContentResult};
use crate::journal::Journal;
use crate::models::{DataRecord, QueryPage, RecordQuery, TableMeta};
use crate::store::{node_file, WorkspaceStore, METADATA_FILE};

impl WorkspaceStore {
    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Records of a table in append order. A `limit` of zero means all.
    pub fn list_records(&self, node: Id, offset: usize, limit: usize) -> ContentResult<QueryPage> {
        let _guard = self.backend().read_lock();
        let records = self.cached_records(node)?;
        Ok(QueryPage {
            total: records.len(),
            records: page(records.as_ref().clone(), offset, limit),
        })
    }

    pub fn get_record(&self, node: Id, id: Id) -> ContentResult<DataRecord> {
        let _guard = self.backend().read_lock();
        self.table_row(node)?;
        self.records_table(node)?
            .get(id)
            .ok_or(ContentError::RecordNotFound { node, record: id })
    }

    /// Add a record. Values are coerced to the declared property types and
    /// required properties must be present.
    pub fn append_record(
        &self,
        author: &Author,
        node: Id,
        data: RecordData,
    ) -> ContentResult<DataRecord> {
        let record = self.write(author, |journal| {
            self.table_row(node)?;
            let meta = self.read_meta(node)?;
            let record = DataRecord::new(coerce_record_data(data, &meta.properties)?);
            let table = self.records_table(node)?;
            self.quota.check_record_count(table.len() as u64)?;
            let line = serde_json::to_vec(&record)?.len() as u64 + 1;
            self.quota.check_storage(self.usage()?, line)?;

            journal.track_table(&table);
            let record = table.append(record)?;
            Ok((format!("create: record {} in {node}", record.id), record))
        })?;
        self.cache.invalidate_records(self.tenant(), node);
        Ok(record)
    }

    /// Replace the data of a record and bump its modification time.
    pub fn update_record(
        &self,
        author: &Author,
        node: Id,
        id: Id,
        data: RecordData,
    ) -> ContentResult<DataRecord> {
        let record = self.write(author, |journal| {
            self.table_row(node)?;
            let meta = self.read_meta(node)?;
            let data = coerce_record_data(data, &meta.properties)?;
            let table = self.records_table(node)?;
            let current = table
                .get(id)
                .ok_or(ContentError::RecordNotFound { node, record: id })?;
            let mut updated = current.clone();
            updated.data = data;
            updated.modified = Utc::now();
            let old_len = serde_json::to_vec(&current)?.len();
            let new_len = serde_json::to_vec(&updated)?.len();
            if new_len > old_len {
                self.quota
                    .check_storage(self.usage()?, (new_len - old_len) as u64)?;
            }

            journal.track_table(&table);
            let record = table.update(updated)?;
            Ok((format!("update: record {id} in {node}"), record))
        })?;
        self.cache.invalidate_records(self.tenant(), node);
        Ok(record)
    }

    pub fn delete_record(&self, author: &Author, node: Id, id: Id) -> ContentResult<DataRecord> {
        let record = self.write(author, |journal| {
            self.table_row(node)?;
            let table = self.records_table(node)?;
            if !table.contains(id) {
                return Err(ContentError::RecordNotFound { node, record: id });
            }
            journal.track_table(&table);
            let record = table.delete(id)?;
            Ok((format!("delete: record {id} in {node}"), record))
        })?;
        self.cache.invalidate_records(self.tenant(), node);
        Ok(record)
    }

    /// Records of `node` from the cache, loading them on a miss. Caller
    /// holds the repository lock, shared or exclusive.
    fn cached_records(&self, node: Id) -> ContentResult<Arc<Vec<DataRecord>>> {
        self.table_row(node)?;
        if let Some(records) = self.cache.records(self.tenant(), node) {
            return Ok(records);
        }
        let rows = self.records_table(node)?.rows();
        Ok(self.cache.put_records(self.tenant(), node, rows))
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Save a new view. A zero id is replaced by a fresh one. Marking the
    /// view as default clears the flag on the others.
    pub fn create_view(&self, author: &Author, node: Id, view: View) -> ContentResult<View> {
        self.write(author, |journal| {
            self.table_row(node)?;
            let mut meta = self.read_meta(node)?;
            let mut view = view;
            if view.id.is_zero() {
                view.id = Id::new();
            }
            if meta.views.iter().any(|v| v.id == view.id) {
                return Err(ContentError::Validation(format!(
                    "view {} already exists on {node}",
                    view.id
                )));
            }
            view.validate(&meta.properties)?;
            if view.default {
                meta.views.iter_mut().for_each(|v| v.default = false);
            }
            meta.views.push(view.clone());
            self.save_meta(journal, node, &meta)?;
            Ok((format!("create: view {} on {node}", view.id), view))
        })
    }

    pub fn update_view(&self, author: &Author, node: Id, view: View) -> ContentResult<View> {
        self.write(author, |journal| {
            self.table_row(node)?;
            let mut meta = self.read_meta(node)?;
            let pos = meta
                .views
                .iter()
                .position(|v| v.id == view.id)
                .ok_or(ContentError::ViewNotFound {
                    node,
                    view: view.id,
                })?;
            view.validate(&meta.properties)?;
            if view.default {
                meta.views.iter_mut().for_each(|v| v.default = false);
            }
            meta.views[pos] = view.clone();
            self.save_meta(journal, node, &meta)?;
            Ok((format!("update: view {} on {node}", view.id), view))
        })
    }

    pub fn delete_view(&self, author: &Author, node: Id, view: Id) -> ContentResult<()> {
        self.write(author, |journal| {
            self.table_row(node)?;
            let mut meta = self.read_meta(node)?;
            let before = meta.views.len();
            meta.views.retain(|v| v.id != view);
            if meta.views.len() == before {
                return Err(ContentError::ViewNotFound { node, view });
            }
            self.save_meta(journal, node, &meta)?;
            Ok((format!("delete: view {view} on {node}"), ()))
        })
    }

    /// Filter, sort and page the records of a table.
    ///
    /// With a view, its filters and sorts are used unless the request
    /// carries its own: non-empty ad-hoc filters replace the view's filters
    /// and non-empty ad-hoc sorts replace its sorts.
    pub fn query_records(&self, node: Id, request: RecordQuery) -> ContentResult<QueryPage> {
        let _guard = self.backend().read_lock();
        let (query, _) = self.prepare_query(node, &request)?;
        let matched = query.apply(self.cached_records(node)?.as_ref().clone());
        Ok(QueryPage {
            total: matched.len(),
            records: page(matched, request.offset, request.limit),
        })
    }

    /// Like [`query_records`](Self::query_records) without paging, bucketed
    /// by the view's first group.
    pub fn group_view_records(
        &self,
        node: Id,
        request: RecordQuery,
    ) -> ContentResult<Vec<RecordGroup<DataRecord>>> {
        let _guard = self.backend().read_lock();
        let (query, view) = self.prepare_query(node, &request)?;
        let groups = view.map(|v| v.groups).unwrap_or_default();
        let matched = query.apply(self.cached_records(node)?.as_ref().clone());
        Ok(group_records(matched, &groups))
    }

    fn prepare_query(
        &self,
        node: Id,
        request: &RecordQuery,
    ) -> ContentResult<(Query, Option<View>)> {
        self.table_row(node)?;
        let meta = self.read_meta(node)?;
        let view = match request.view {
            Some(id) => Some(
                meta.views
                    .iter()
                    .find(|v| v.id == id)
                    .cloned()
                    .ok_or(ContentError::ViewNotFound { node, view: id })?,
            ),
            None => None,
        };
        let query = resolve_query(
            view.as_ref(),
            Query {
                filters: request.filters.clone(),
                sorts: request.sorts.clone(),
            },
        );
        query.validate(&meta.properties)?;
        Ok((query, view))
    }

    fn save_meta(
        &self,
        journal: &mut Journal,
        node: Id,
        meta: &TableMeta,
    ) -> ContentResult<()> {
        let file = (node_file(node, METADATA_FILE), serde_json::to_vec_pretty(meta)?);
        self.check_growth(std::slice::from_ref(&file))?;
        journal.write(&file.0, &file.1)?;
        Ok(())
    }
}
