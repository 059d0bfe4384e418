//! Diff engine for Strata repositories.
//!
//! # Key Types
//!
//! - [`TreeDiff`] / [`TreeChange`] -- which paths differ between two snapshots
//! - [`BlobDiff`] / [`DiffHunk`] / [`DiffLine`] -- line-level diff of one file

pub mod blob_diff;
pub mod error;
pub mod tree_diff;

pub use blob_diff::{diff_blobs, diff_blobs_with_context, BlobDiff, DiffHunk, DiffLine};
pub use error::{DiffError, DiffResult};
pub use tree_diff::{diff_tree_ids, diff_trees, TreeChange, TreeDiff};
