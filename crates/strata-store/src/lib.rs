//! Content-addressed object storage for Strata repositories.
//!
//! This crate implements a hash-keyed object store analogous to git's
//! `.git/objects/` directory. File contents, snapshot trees and commits are
//! stored as immutable objects identified by their BLAKE3 hash
//! (domain-separated by object kind).
//!
//! # Object Types
//!
//! - [`Blob`] -- raw file content
//! - [`Tree`] -- flat snapshot mapping relative paths to blobs
//! - [`CommitObject`] -- one revision: tree, parent, author, message, time
//!
//! # Storage Backends
//!
//! Objects live in [`FsObjectStore`], zstd-compressed loose files on disk,
//! behind the [`ObjectStore`] trait.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: write objects first, then move references.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. The store never interprets object contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use object::{
    path_is_under, Blob, CommitObject, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry,
};
pub use traits::ObjectStore;
