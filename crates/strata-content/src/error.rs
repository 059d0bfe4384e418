use std::io;

use strata_query::QueryError;
use strata_repo::RepoError;
use strata_table::TableError;
use strata_types::{ErrorKind, Id};

/// Errors produced by the content store.
///
/// Messages name nodes, records and files relative to the tenant root and
/// never include absolute paths.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// No node with this id.
    #[error("node not found: {0}")]
    NodeNotFound(Id),

    /// The table node has no record with this id.
    #[error("record {record} not found in {node}")]
    RecordNotFound { node: Id, record: Id },

    /// The table node has no view with this id.
    #[error("view {view} not found on {node}")]
    ViewNotFound { node: Id, view: Id },

    /// The node has no asset with this name.
    #[error("asset {name} not found on {node}")]
    AssetNotFound { node: Id, name: String },

    /// The node exists but has no page body at the requested revision.
    #[error("node {node} has no page at revision {rev}")]
    VersionNotFound { node: Id, rev: String },

    /// Malformed input rejected before anything was written.
    #[error("{0}")]
    Validation(String),

    /// Filter, sort, schema or record data rejected by the query engine.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A configured ceiling would be exceeded.
    #[error("quota exceeded: {limit} (limit {ceiling})")]
    QuotaExceeded { limit: &'static str, ceiling: u64 },

    /// The tenant id is empty or not a plain directory name.
    #[error("invalid tenant id: {0:?}")]
    InvalidTenant(String),

    /// Files were written but the revision could not be recorded; the
    /// write was rolled back.
    #[error("commit failed: {0}")]
    Commit(String),

    /// Table failure.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Repository failure outside of a write.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// The configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Encoding or decoding stored metadata failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error inside the tenant directory.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ContentError {
    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound(_)
            | Self::RecordNotFound { .. }
            | Self::ViewNotFound { .. }
            | Self::AssetNotFound { .. }
            | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) | Self::InvalidTenant(_) | Self::Config(_) => {
                ErrorKind::Validation
            }
            Self::Query(e) => e.kind(),
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::Table(e) => e.kind(),
            Self::Repo(e) => e.kind(),
            Self::Commit(_) | Self::Serialization(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for ContentError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias for content store results.
pub type ContentResult<T> = Result<T, ContentError>;
