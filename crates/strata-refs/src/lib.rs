//! Reference management for Strata repositories.
//!
//! References are the human-readable entry points into a repository's
//! commit chain, analogous to git refs.
//!
//! # Architecture
//!
//! - **Branches** are mutable pointers to commit chain tips. They advance as
//!   new commits are created.
//! - **Remote refs** track branches on a remote and are only updated by
//!   fetch, pull and push.
//! - **HEAD** names the current branch.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`types`]: Core ref type: [`Ref`]
//! - [`traits`]: The [`RefStore`] trait defining the storage interface
//! - [`names`]: Branch/remote name validation
//! - [`fs`]: File-backed [`FsRefStore`]

pub mod error;
pub mod fs;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use fs::FsRefStore;
pub use names::{validate_branch_name, validate_remote_name};
pub use traits::RefStore;
pub use types::{branch_ref_name, remote_ref_name, Ref};
