//! Core reference types.
//!
//! References are named pointers into the commit chain. They come in two
//! flavors: local branches and remote tracking refs.

use serde::{Deserialize, Serialize};
use strata_types::ObjectId;

/// A named reference to a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ref {
    /// A branch is a mutable pointer to a commit chain tip.
    Branch {
        /// Branch name (e.g. "main").
        name: String,
        /// Commit at the tip of this branch.
        target: ObjectId,
    },

    /// A remote tracking ref mirrors a branch on a remote.
    ///
    /// Remote refs are only updated by sync operations, never directly.
    Remote {
        /// Name of the remote (e.g. "origin").
        remote: String,
        /// Branch name on the remote.
        branch: String,
        /// Commit at the remote branch tip.
        target: ObjectId,
    },
}

impl Ref {
    pub fn branch(name: impl Into<String>, target: ObjectId) -> Self {
        Ref::Branch {
            name: name.into(),
            target,
        }
    }

    pub fn remote(remote: impl Into<String>, branch: impl Into<String>, target: ObjectId) -> Self {
        Ref::Remote {
            remote: remote.into(),
            branch: branch.into(),
            target,
        }
    }

    /// Returns the canonical name for this ref (e.g. "refs/heads/main").
    pub fn canonical_name(&self) -> String {
        match self {
            Ref::Branch { name, .. } => branch_ref_name(name),
            Ref::Remote { remote, branch, .. } => remote_ref_name(remote, branch),
        }
    }

    /// Returns the short name of this ref (without the refs/ prefix).
    pub fn short_name(&self) -> &str {
        match self {
            Ref::Branch { name, .. } => name,
            Ref::Remote { branch, .. } => branch,
        }
    }

    /// Returns `true` if this is a branch ref.
    pub fn is_branch(&self) -> bool {
        matches!(self, Ref::Branch { .. })
    }

    /// Returns `true` if this is a remote tracking ref.
    pub fn is_remote(&self) -> bool {
        matches!(self, Ref::Remote { .. })
    }

    /// Returns the commit this ref points to.
    pub fn target(&self) -> ObjectId {
        match self {
            Ref::Branch { target, .. } | Ref::Remote { target, .. } => *target,
        }
    }

    /// Rebuild a ref from its canonical name and target.
    pub fn from_canonical(name: &str, target: ObjectId) -> Option<Self> {
        if let Some(branch) = name.strip_prefix("refs/heads/") {
            return Some(Ref::branch(branch, target));
        }
        let rest = name.strip_prefix("refs/remotes/")?;
        let (remote, branch) = rest.split_once('/')?;
        Some(Ref::remote(remote, branch, target))
    }
}

/// Canonical name of a local branch.
pub fn branch_ref_name(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// Canonical name of a remote tracking branch.
pub fn remote_ref_name(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{remote}/{branch}")
}
