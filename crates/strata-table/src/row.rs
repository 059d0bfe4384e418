use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_types::Id;

/// Version string written into every table header.
pub const TABLE_FORMAT_VERSION: &str = "1.0";

/// A value that can be stored in a [`Table`](crate::Table).
pub trait Row: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary key. Must be non-zero.
    fn id(&self) -> Id;

    /// Check the row before it is written.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Column names recorded in the table header.
    fn columns() -> Vec<String> {
        Vec::new()
    }
}

/// First line of a table file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableHeader {
    pub version: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl TableHeader {
    /// Header for rows of type `T`.
    pub fn for_row<T: Row>() -> Self {
        Self {
            version: TABLE_FORMAT_VERSION.to_string(),
            columns: T::columns(),
        }
    }
}
