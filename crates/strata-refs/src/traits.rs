//! The [`RefStore`] trait defining the reference storage interface.

use strata_types::ObjectId;

use crate::error::Result;
use crate::types::Ref;

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`) and provide atomic
/// read/write/delete operations on named refs. The namespace follows a
/// hierarchical layout:
///
/// - `refs/heads/*` for branches
/// - `refs/remotes/{remote}/*` for remote tracking refs
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name (e.g. "refs/heads/main").
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Write (create or update) a ref at the given canonical name.
    fn write_ref(&self, name: &str, reference: &Ref) -> Result<()>;

    /// Atomically replace a ref only if its current target is `expected`.
    ///
    /// `expected == None` means the ref must not exist yet. Fails with
    /// [`RefError::Stale`](crate::RefError::Stale) otherwise.
    fn compare_and_swap(&self, name: &str, expected: Option<ObjectId>, reference: &Ref)
        -> Result<()>;

    /// Delete a ref by canonical name.
    ///
    /// Returns `Ok(true)` if the ref existed and was deleted.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// List all refs whose canonical name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>>;

    /// Name of the current branch, if HEAD has been set.
    fn head(&self) -> Result<Option<String>>;

    /// Point HEAD at a branch.
    fn set_head(&self, branch: &str) -> Result<()>;

    /// List all branch refs.
    fn branches(&self) -> Result<Vec<(String, Ref)>> {
        self.list_refs("refs/heads/")
    }

    /// List all known remote names.
    fn remotes(&self) -> Result<Vec<String>> {
        let refs = self.list_refs("refs/remotes/")?;
        let mut remotes: Vec<String> = refs
            .iter()
            .filter_map(|(name, _)| {
                let rest = name.strip_prefix("refs/remotes/")?;
                let remote = rest.split('/').next()?;
                Some(remote.to_string())
            })
            .collect();
        remotes.sort();
        remotes.dedup();
        Ok(remotes)
    }
}
