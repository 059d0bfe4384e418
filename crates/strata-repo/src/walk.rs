//! Commit-graph traversal over an object store.

use std::collections::HashSet;

use strata_store::{CommitObject, ObjectStore, StoredObject, Tree};
use strata_types::ObjectId;

use crate::error::{RepoError, RepoResult};

pub(crate) fn load_commit(store: &dyn ObjectStore, id: &ObjectId) -> RepoResult<CommitObject> {
    let obj = store
        .read(id)?
        .ok_or_else(|| RepoError::RevisionNotFound(id.to_hex()))?;
    Ok(CommitObject::from_stored_object(&obj)?)
}

pub(crate) fn load_tree(store: &dyn ObjectStore, id: &ObjectId) -> RepoResult<Tree> {
    Ok(Tree::from_stored_object(&store.read_required(id)?)?)
}

/// Visit the first-parent chain from `start`, newest first, until `visit`
/// returns `false` or the root commit is reached.
pub(crate) fn walk_chain(
    store: &dyn ObjectStore,
    start: Option<ObjectId>,
    mut visit: impl FnMut(ObjectId, &CommitObject) -> RepoResult<bool>,
) -> RepoResult<()> {
    let mut cursor = start;
    while let Some(id) = cursor {
        let commit = load_commit(store, &id)?;
        if !visit(id, &commit)? {
            break;
        }
        cursor = commit.parent;
    }
    Ok(())
}

/// Returns `true` if `ancestor` is `descendant` or one of its parents.
pub(crate) fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: ObjectId,
    descendant: ObjectId,
) -> RepoResult<bool> {
    let mut found = false;
    walk_chain(store, Some(descendant), |id, _| {
        found = id == ancestor;
        Ok(!found)
    })?;
    Ok(found)
}

/// Most recent commit shared by both chains.
pub(crate) fn merge_base(
    store: &dyn ObjectStore,
    a: ObjectId,
    b: ObjectId,
) -> RepoResult<Option<ObjectId>> {
    let mut ancestors = HashSet::new();
    walk_chain(store, Some(a), |id, _| Ok(ancestors.insert(id)))?;
    let mut base = None;
    walk_chain(store, Some(b), |id, _| {
        if ancestors.contains(&id) {
            base = Some(id);
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(base)
}

/// Every object reachable from `tips` that the holder of `known` commits
/// lacks, in dependency order per commit (blobs, tree, commit).
///
/// Walking stops at any commit in `known`; blobs and trees already
/// referenced by a known commit that exists in `store` are skipped.
pub(crate) fn missing_objects(
    store: &dyn ObjectStore,
    tips: &[ObjectId],
    known: &[ObjectId],
) -> RepoResult<Vec<StoredObject>> {
    let stop: HashSet<ObjectId> = known.iter().copied().collect();
    let mut seen: HashSet<ObjectId> = HashSet::new();
    for id in known {
        if store.exists(id)? {
            let commit = load_commit(store, id)?;
            seen.insert(commit.tree);
            seen.extend(load_tree(store, &commit.tree)?.entries.iter().map(|e| e.object_id));
        }
    }

    let mut out = Vec::new();
    for tip in tips {
        let mut cursor = Some(*tip);
        while let Some(id) = cursor {
            if stop.contains(&id) || !seen.insert(id) {
                break;
            }
            let commit_obj = store.read_required(&id)?;
            let commit = CommitObject::from_stored_object(&commit_obj)?;
            if seen.insert(commit.tree) {
                let tree_obj = store.read_required(&commit.tree)?;
                let tree = Tree::from_stored_object(&tree_obj)?;
                for entry in &tree.entries {
                    if seen.insert(entry.object_id) {
                        out.push(store.read_required(&entry.object_id)?);
                    }
                }
                out.push(tree_obj);
            }
            out.push(commit_obj);
            cursor = commit.parent;
        }
    }
    Ok(out)
}
