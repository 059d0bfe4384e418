//! Append-only record tables for Strata.
//!
//! A [`Table`] is one file of line-delimited JSON: a schema header line
//! followed by one row per line, ordered by [`Id`](strata_types::Id). The
//! whole table is mirrored in memory; every write goes to disk first and only
//! then becomes visible to readers.
//!
//! # Key Types
//!
//! - [`Row`] -- what a table can hold (id, validation, column list)
//! - [`Table`] -- the file-backed table
//! - [`TableObserver`] -- post-write notifications
//! - [`TableHeader`] -- the first line of every table file
//!
//! # Design Rules
//!
//! 1. Ids are never reused; a duplicate append is rejected.
//! 2. New rows with the highest id are appended and fsynced in place.
//! 3. Every other mutation rewrites the file via temp file + fsync + rename.
//! 4. A failed write leaves both the file and the mirror as they were.
//! 5. Readers take a shared lock; writers are serialized per table.

pub mod error;
pub mod row;
pub mod table;

pub use error::{TableError, TableResult};
pub use row::{Row, TableHeader, TABLE_FORMAT_VERSION};
pub use table::{Table, TableObserver};
