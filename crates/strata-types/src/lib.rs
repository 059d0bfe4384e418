//! Foundation types for Strata.
//!
//! This crate provides the identity and classification types shared by every
//! other Strata crate.
//!
//! # Key Types
//!
//! - [`Id`]: Time-sortable 64-bit record identifier with an 11-character text form
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`Author`]: Name and email attached to every revision
//! - [`ErrorKind`]: Stable, user-facing error classification

pub mod author;
pub mod error;
pub mod id;
pub mod kind;
pub mod object;

pub use author::Author;
pub use error::TypeError;
pub use id::Id;
pub use kind::ErrorKind;
pub use object::ObjectId;
