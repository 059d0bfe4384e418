use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable classification of every failure a caller can observe.
///
/// Crate-level error enums map onto one of these through a `kind()` method so
/// that outer layers can choose a response without matching on internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Entity or revision absent.
    NotFound,
    /// Malformed filter, sort, schema mismatch, or missing required field.
    Validation,
    /// A configured ceiling was reached.
    QuotaExceeded,
    /// Duplicate of something that must be unique.
    Conflict,
    /// I/O, version-control, or serialization failure.
    Internal,
}

impl ErrorKind {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
