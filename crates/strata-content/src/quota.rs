//! Resource ceilings.
//!
//! Every check is a pure predicate over the current usage and the requested
//! change. Callers run them while holding the tenant's write lock and before
//! touching any file, so two writers cannot both pass a check that only one
//! of them should.

use crate::config::QuotaLimits;
use crate::error::{ContentError, ContentResult};

pub const MAX_PAGES: &str = "max_pages";
pub const MAX_STORAGE_BYTES: &str = "max_storage_bytes";
pub const MAX_RECORDS_PER_TABLE: &str = "max_records_per_table";
pub const MAX_COLUMNS_PER_TABLE: &str = "max_columns_per_table";
pub const MAX_ASSET_SIZE_BYTES: &str = "max_asset_size_bytes";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuotaChecker {
    limits: QuotaLimits,
}

impl QuotaChecker {
    pub fn new(limits: QuotaLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    /// Room for one more node, given `count` existing nodes.
    pub fn check_page_count(&self, count: u64) -> ContentResult<()> {
        at_most(MAX_PAGES, self.limits.max_pages, count >= self.limits.max_pages)
    }

    /// Room for `delta` more bytes on top of `usage`.
    pub fn check_storage(&self, usage: u64, delta: u64) -> ContentResult<()> {
        let max = self.limits.max_storage_bytes;
        at_most(MAX_STORAGE_BYTES, max, usage.saturating_add(delta) > max)
    }

    /// Room for one more record, given `count` existing records.
    pub fn check_record_count(&self, count: u64) -> ContentResult<()> {
        let max = self.limits.max_records_per_table;
        at_most(MAX_RECORDS_PER_TABLE, max, count >= max)
    }

    /// A schema of `count` columns.
    pub fn check_columns(&self, count: u64) -> ContentResult<()> {
        let max = self.limits.max_columns_per_table;
        at_most(MAX_COLUMNS_PER_TABLE, max, count > max)
    }

    /// One asset of `size` bytes.
    pub fn check_asset_size(&self, size: u64) -> ContentResult<()> {
        let max = self.limits.max_asset_size_bytes;
        at_most(MAX_ASSET_SIZE_BYTES, max, size > max)
    }
}

fn at_most(limit: &'static str, ceiling: u64, exceeded: bool) -> ContentResult<()> {
    if ceiling == 0 || !exceeded {
        Ok(())
    } else {
        Err(ContentError::QuotaExceeded { limit, ceiling })
    }
}
