//! Hierarchical content for Strata tenants.
//!
//! A tenant's content is a tree of nodes (pages, tables, or both) kept as
//! plain files inside the tenant's versioned repository. Tables own an
//! append-only record file and a list of saved views; any node may carry
//! assets. Every write is one commit.
//!
//! ```text
//! <tenant>/
//!   nodes.jsonl             node catalog
//!   nodes/<id>/index.md     front matter + markdown body
//!   nodes/<id>/metadata.json  properties and views
//!   nodes/<id>/data.jsonl   records
//!   nodes/<id>/<asset>      assets
//! ```
//!
//! # Key Types
//!
//! - [`ContentStore`] -- all tenants under one root
//! - [`WorkspaceStore`] -- one tenant's nodes, records, views and assets
//! - [`ContentCache`] -- shared cache of node trees and record lists
//! - [`Backlink`] -- a page linking to a node, from the link index
//! - [`QuotaChecker`] -- ceilings checked before any write
//! - [`SyncWorker`] -- detached background push and pull
//! - [`StoreConfig`] -- TOML configuration
//!
//! # Design Rules
//!
//! 1. Quota and validation failures happen before the first file is written.
//! 2. A write that fails at any later step, commit included, is rolled back
//!    and leaves history untouched.
//! 3. Caches are invalidated after the commit they reflect, never before.
//!    Reads hold the repository lock shared, so they never fill a cache
//!    from files a write has not committed yet.
//! 4. Errors never contain absolute paths.

pub mod assets;
pub mod cache;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod links;
pub mod models;
pub mod quota;
pub mod search;
pub mod store;
pub mod sync;
pub mod tenants;

mod journal;
mod records;

#[cfg(test)]
mod testing;

pub use assets::{mime_type, validate_asset_name};
pub use cache::{CacheStats, ContentCache};
pub use config::{CacheConfig, QuotaLimits, StoreConfig, SyncConfig};
pub use error::{ContentError, ContentResult};
pub use frontmatter::Page;
pub use links::linked_node_ids;
pub use models::{
    Asset, Backlink, DataRecord, Node, NodeRow, NodeType, NodeUpdate, NodeVersion, QueryPage, RecordQuery,
    TableMeta,
};
pub use quota::QuotaChecker;
pub use search::{SearchKind, SearchOptions, SearchResult};
pub use store::WorkspaceStore;
pub use sync::{SyncState, SyncStatus, SyncWorker};
pub use tenants::{validate_tenant_id, ContentStore};
