//! Snapshot diff: which paths were added, removed or changed between two
//! flat trees.
//!
//! Trees are sorted by path, so the comparison is a single merge walk.

use std::cmp::Ordering;

use strata_store::{path_is_under, ObjectStore, Tree, TreeEntry};
use strata_types::ObjectId;

use crate::error::{DiffError, DiffResult};

/// Changes between two snapshots, in path order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub changes: Vec<TreeChange>,
}

impl TreeDiff {
    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changed paths, in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(TreeChange::path)
    }

    /// Returns `true` if any change is at `prefix` or below it.
    pub fn touches(&self, prefix: &str) -> bool {
        self.paths().any(|p| path_is_under(p, prefix))
    }
}

/// A single path-level change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChange {
    Added {
        path: String,
        new_id: ObjectId,
    },
    Deleted {
        path: String,
        old_id: ObjectId,
    },
    /// Same path, different content or mode.
    Modified {
        path: String,
        old_id: ObjectId,
        new_id: ObjectId,
    },
}

impl TreeChange {
    /// Path affected by this change.
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Deleted { path, .. } | Self::Modified { path, .. } => {
                path
            }
        }
    }
}

/// Compare two decoded trees. `None` stands for the empty tree.
pub fn diff_trees(old: Option<&Tree>, new: &Tree) -> TreeDiff {
    let empty: &[TreeEntry] = &[];
    let old_entries = old.map_or(empty, |t| t.entries.as_slice());
    let new_entries = new.entries.as_slice();

    let mut changes = Vec::new();
    let (mut i, mut j) = (0, 0);
    loop {
        match (old_entries.get(i), new_entries.get(j)) {
            (None, None) => break,
            (Some(o), None) => {
                changes.push(deleted(o));
                i += 1;
            }
            (None, Some(n)) => {
                changes.push(added(n));
                j += 1;
            }
            (Some(o), Some(n)) => match o.path.cmp(&n.path) {
                Ordering::Less => {
                    changes.push(deleted(o));
                    i += 1;
                }
                Ordering::Greater => {
                    changes.push(added(n));
                    j += 1;
                }
                Ordering::Equal => {
                    if o.object_id != n.object_id || o.mode != n.mode {
                        changes.push(TreeChange::Modified {
                            path: n.path.clone(),
                            old_id: o.object_id,
                            new_id: n.object_id,
                        });
                    }
                    i += 1;
                    j += 1;
                }
            },
        }
    }
    TreeDiff { changes }
}

/// Load two trees from `store` by id and compare them.
pub fn diff_tree_ids(
    store: &dyn ObjectStore,
    old: Option<&ObjectId>,
    new: &ObjectId,
) -> DiffResult<TreeDiff> {
    let new_tree = load_tree(store, new)?;
    let old_tree = old.map(|id| load_tree(store, id)).transpose()?;
    Ok(diff_trees(old_tree.as_ref(), &new_tree))
}

fn load_tree(store: &dyn ObjectStore, id: &ObjectId) -> DiffResult<Tree> {
    let obj = store.read(id)?.ok_or(DiffError::ObjectNotFound(*id))?;
    Ok(Tree::from_stored_object(&obj)?)
}

fn added(e: &TreeEntry) -> TreeChange {
    TreeChange::Added {
        path: e.path.clone(),
        new_id: e.object_id,
    }
}

fn deleted(e: &TreeEntry) -> TreeChange {
    TreeChange::Deleted {
        path: e.path.clone(),
        old_id: e.object_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{EntryMode, FsObjectStore};

    fn entry(path: &str, content: &[u8]) -> TreeEntry {
        TreeEntry::new(
            EntryMode::Regular,
            path,
            ObjectId::from_bytes(content),
            content.len() as u64,
        )
    }

    #[test]
    fn identical_trees_have_no_changes() {
        let t = Tree::new(vec![entry("a.md", b"a"), entry("b.md", b"b")]);
        assert!(diff_trees(Some(&t), &t).is_empty());
    }

    #[test]
    fn against_empty_everything_is_added() {
        let t = Tree::new(vec![entry("nodes.jsonl", b"x"), entry("nodes/n1/index.md", b"y")]);
        let diff = diff_trees(None, &t);
        assert_eq!(diff.len(), 2);
        assert!(diff
            .changes
            .iter()
            .all(|c| matches!(c, TreeChange::Added { .. })));
    }

    #[test]
    fn classifies_each_kind_of_change() {
        let old = Tree::new(vec![
            entry("keep.md", b"same"),
            entry("edit.md", b"before"),
            entry("gone.md", b"bye"),
        ]);
        let new = Tree::new(vec![
            entry("keep.md", b"same"),
            entry("edit.md", b"after"),
            entry("new.md", b"hi"),
        ]);
        let diff = diff_trees(Some(&old), &new);
        let paths: Vec<&str> = diff.paths().collect();
        assert_eq!(paths, vec!["edit.md", "gone.md", "new.md"]);
        assert!(matches!(diff.changes[0], TreeChange::Modified { .. }));
        assert!(matches!(diff.changes[1], TreeChange::Deleted { .. }));
        assert!(matches!(diff.changes[2], TreeChange::Added { .. }));
    }

    #[test]
    fn mode_change_counts_as_modified() {
        let old = Tree::new(vec![entry("run.sh", b"x")]);
        let mut e = entry("run.sh", b"x");
        e.mode = EntryMode::Executable;
        let diff = diff_trees(Some(&old), &Tree::new(vec![e]));
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn touches_respects_path_boundaries() {
        let old = Tree::empty();
        let new = Tree::new(vec![entry("nodes/abc/index.md", b"x")]);
        let diff = diff_trees(Some(&old), &new);
        assert!(diff.touches("nodes/abc"));
        assert!(diff.touches("nodes/abc/index.md"));
        assert!(!diff.touches("nodes/ab"));
        assert!(!diff.touches("nodes/abcd"));
    }

    #[test]
    fn diff_by_id_reads_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let t1 = Tree::new(vec![entry("a", b"1")]);
        let t2 = Tree::new(vec![entry("a", b"2")]);
        let id1 = store.write(&t1.to_stored_object().unwrap()).unwrap();
        let id2 = store.write(&t2.to_stored_object().unwrap()).unwrap();

        let diff = diff_tree_ids(&store, Some(&id1), &id2).unwrap();
        assert_eq!(diff.len(), 1);

        let missing = ObjectId::from_bytes(b"missing");
        assert!(matches!(
            diff_tree_ids(&store, None, &missing),
            Err(DiffError::ObjectNotFound(_))
        ));
    }
}
