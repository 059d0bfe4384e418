use strata_types::ErrorKind;

/// Errors raised while validating or applying a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A filter tree is malformed or does not fit the schema.
    #[error("invalid filter: {0}")]
    Filter(String),

    /// A sort list is malformed or does not fit the schema.
    #[error("invalid sort: {0}")]
    Sort(String),

    /// A group specification names an unknown property.
    #[error("invalid group: {0}")]
    Group(String),

    /// Record data violates the schema.
    #[error("invalid record: {0}")]
    Record(String),

    /// A property definition is malformed.
    #[error("invalid schema: {0}")]
    Schema(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Filter(m) | Self::Sort(m) | Self::Group(m) | Self::Record(m) | Self::Schema(m) => {
                m
            }
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
