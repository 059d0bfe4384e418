//! File-backed reference store.
//!
//! Layout under the store root:
//!
//! ```text
//! HEAD                          "ref: refs/heads/<branch>\n"
//! refs/heads/<branch>           "<64 hex chars>\n"
//! refs/remotes/<remote>/<name>  "<64 hex chars>\n"
//! ```
//!
//! Every file is replaced by write-to-temp + rename, so a crash leaves either
//! the old or the new target, never a torn one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use strata_types::ObjectId;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{RefError, Result};
use crate::names::{validate_branch_name, validate_ref};
use crate::traits::RefStore;
use crate::types::{branch_ref_name, Ref};

const HEAD_PREFIX: &str = "ref: refs/heads/";

/// [`RefStore`] persisted as small text files.
#[derive(Debug)]
pub struct FsRefStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsRefStore {
    /// Open (creating if needed) a ref directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("refs"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_target(&self, name: &str) -> Result<Option<ObjectId>> {
        let text = match fs::read_to_string(self.ref_path(name)) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let id = ObjectId::from_hex(text.trim()).map_err(|e| RefError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(id))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_unlocked(&self, name: &str, reference: &Ref) -> Result<()> {
        validate_ref(reference)?;
        let target = reference.target();
        self.write_file(&self.ref_path(name), &format!("{}\n", target.to_hex()))?;
        debug!(name, target = %target.short_hex(), "ref updated");
        Ok(())
    }
}

impl RefStore for FsRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        let Some(target) = self.read_target(name)? else {
            return Ok(None);
        };
        Ref::from_canonical(name, target)
            .map(Some)
            .ok_or_else(|| RefError::Corrupt {
                name: name.to_string(),
                reason: "unrecognised ref namespace".into(),
            })
    }

    fn write_ref(&self, name: &str, reference: &Ref) -> Result<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        self.write_unlocked(name, reference)
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        reference: &Ref,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        if self.read_target(name)? != expected {
            return Err(RefError::Stale {
                name: name.to_string(),
            });
        }
        self.write_unlocked(name, reference)
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        if let Some(current) = self.head()? {
            if name == branch_ref_name(&current) {
                return Err(RefError::DeleteCurrentBranch { name: current });
            }
        }
        match fs::remove_file(self.ref_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>> {
        let mut result = Vec::new();
        for entry in WalkDir::new(self.root.join("refs")).sort_by_file_name() {
            let entry = entry.map_err(|e| RefError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // Leftover temp files from an interrupted write are not refs.
            if name.rsplit('/').next().is_some_and(|f| f.starts_with('.')) {
                continue;
            }
            if !name.starts_with(prefix) {
                continue;
            }
            if let Some(r) = self.read_ref(&name)? {
                result.push((name, r));
            }
        }
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    fn head(&self) -> Result<Option<String>> {
        let text = match fs::read_to_string(self.root.join("HEAD")) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let branch = text
            .trim()
            .strip_prefix(HEAD_PREFIX)
            .ok_or_else(|| RefError::Corrupt {
                name: "HEAD".into(),
                reason: format!("unexpected contents {:?}", text.trim()),
            })?;
        Ok(Some(branch.to_string()))
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        validate_branch_name(branch)?;
        let _guard = self.write_lock.lock().expect("lock poisoned");
        self.write_file(&self.root.join("HEAD"), &format!("{HEAD_PREFIX}{branch}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seed: &[u8]) -> ObjectId {
        ObjectId::from_bytes(seed)
    }

    #[test]
    fn refs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsRefStore::open(dir.path()).unwrap();
            store
                .write_ref("refs/heads/main", &Ref::branch("main", id(b"a")))
                .unwrap();
            store.set_head("main").unwrap();
        }
        let store = FsRefStore::open(dir.path()).unwrap();
        assert_eq!(store.head().unwrap().as_deref(), Some("main"));
        assert_eq!(
            store.read_ref("refs/heads/main").unwrap(),
            Some(Ref::branch("main", id(b"a")))
        );
    }

    #[test]
    fn missing_head_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).unwrap();
        assert!(store.head().unwrap().is_none());
        assert!(store.read_ref("refs/heads/main").unwrap().is_none());
    }

    #[test]
    fn list_refs_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).unwrap();
        let refs = [
            Ref::branch("main", id(b"1")),
            Ref::branch("feature/x", id(b"2")),
            Ref::remote("origin", "main", id(b"3")),
        ];
        for r in &refs {
            store.write_ref(&r.canonical_name(), r).unwrap();
        }

        let branches: Vec<String> = store
            .branches()
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(branches, vec!["refs/heads/feature/x", "refs/heads/main"]);
        assert_eq!(store.remotes().unwrap(), vec!["origin"]);
        assert_eq!(store.list_refs("").unwrap().len(), 3);
    }

    #[test]
    fn compare_and_swap_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).unwrap();
        let name = "refs/remotes/origin/main";
        let r1 = Ref::remote("origin", "main", id(b"1"));
        let r2 = Ref::remote("origin", "main", id(b"2"));
        store.compare_and_swap(name, None, &r1).unwrap();
        assert!(matches!(
            store.compare_and_swap(name, Some(id(b"9")), &r2),
            Err(RefError::Stale { .. })
        ));
        store.compare_and_swap(name, Some(id(b"1")), &r2).unwrap();
        assert_eq!(store.read_ref(name).unwrap(), Some(r2));
    }

    #[test]
    fn corrupt_ref_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/main"), "zz\n").unwrap();
        assert!(matches!(
            store.read_ref("refs/heads/main"),
            Err(RefError::Corrupt { .. })
        ));
    }
}
