use std::io;

use strata_types::{ErrorKind, Id};

/// Errors produced by table operations.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// No row with this id.
    #[error("row not found: {0}")]
    NotFound(Id),

    /// A row with this id already exists.
    #[error("duplicate row id: {0}")]
    DuplicateId(Id),

    /// Rows must carry a non-zero id.
    #[error("row has no id")]
    ZeroId,

    /// `Row::validate` rejected the row.
    #[error("invalid row {id}: {reason}")]
    Invalid { id: Id, reason: String },

    /// A mutation tried to change the row's id.
    #[error("row id changed from {expected} to {actual}")]
    IdChanged { expected: Id, actual: Id },

    /// The table file could not be parsed.
    #[error("table {table} is corrupt at line {line}: {reason}")]
    Corrupt {
        table: String,
        line: usize,
        reason: String,
    },

    /// Encoding a row failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing the table file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl TableError {
    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateId(_) => ErrorKind::Conflict,
            Self::ZeroId | Self::Invalid { .. } | Self::IdChanged { .. } => ErrorKind::Validation,
            Self::Corrupt { .. } | Self::Serialization(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience alias for table results.
pub type TableResult<T> = Result<T, TableError>;
