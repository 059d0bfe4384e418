//! On-disk loose object store.
//!
//! Layout: `<root>/<first two hex chars>/<remaining 62 hex chars>`. Each file
//! holds a zstd frame whose plaintext is a one-byte [`ObjectKind`] tag followed
//! by the object data. Files are written to a temporary name in the same
//! directory and renamed into place, so a reader never sees a partial object.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use strata_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Default zstd compression level.
const DEFAULT_LEVEL: i32 = 3;

/// Loose-object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    level: i32,
}

impl FsObjectStore {
    /// Open (creating if needed) an object directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            level: DEFAULT_LEVEL,
        })
    }

    /// Override the zstd compression level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn encode(&self, object: &StoredObject) -> io::Result<Vec<u8>> {
        let mut plain = Vec::with_capacity(object.data.len() + 1);
        plain.push(object.kind.tag());
        plain.extend_from_slice(&object.data);
        zstd::encode_all(plain.as_slice(), self.level)
    }

    fn decode(id: &ObjectId, bytes: &[u8]) -> StoreResult<StoredObject> {
        let plain = zstd::decode_all(bytes).map_err(|e| StoreError::CorruptObject {
            id: *id,
            reason: format!("decompression failed: {e}"),
        })?;
        let (&tag, data) = plain.split_first().ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: "empty object".into(),
        })?;
        let kind = ObjectKind::from_tag(tag).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unknown kind tag {tag}"),
        })?;
        Ok(StoredObject::new(kind, data.to_vec()))
    }
}

impl ObjectStore for FsObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let bytes = match fs::read(self.object_path(id)) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = Self::decode(id, &bytes)?;
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(object))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let encoded = self.encode(object)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        if let Err(e) = tmp.persist(&path) {
            // A concurrent writer may have linked the same object first.
            if !path.exists() {
                return Err(e.error.into());
            }
        }
        debug!(id = %id.short_hex(), kind = %object.kind, size = object.size, "object written");
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, Tree};

    #[test]
    fn write_then_read_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let obj = Blob::new(b"persisted".to_vec()).to_stored_object();
        let id = {
            let store = FsObjectStore::open(dir.path()).unwrap();
            store.write(&obj).unwrap()
        };

        let store = FsObjectStore::open(dir.path()).unwrap();
        assert!(store.exists(&id).unwrap());
        assert_eq!(store.read(&id).unwrap().unwrap(), obj);
    }

    #[test]
    fn objects_are_fanned_out_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let id = store
            .write(&Tree::empty().to_stored_object().unwrap())
            .unwrap();
        let hex = id.to_hex();
        assert!(dir.path().join(&hex[..2]).join(&hex[2..]).is_file());
    }

    #[test]
    fn write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap().with_level(1);
        let obj = Blob::new(vec![7u8; 4096]).to_stored_object();
        let id1 = store.write(&obj).unwrap();
        let id2 = store.write(&obj).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn missing_object_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        assert!(store
            .read(&ObjectId::from_bytes(b"nothing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn tampered_object_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let id = store
            .write(&Blob::new(b"original".to_vec()).to_stored_object())
            .unwrap();

        let forged = store
            .encode(&Blob::new(b"forged".to_vec()).to_stored_object())
            .unwrap();
        fs::write(store.object_path(&id), forged).unwrap();

        assert!(matches!(
            store.read(&id).unwrap_err(),
            StoreError::HashMismatch { .. }
        ));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let id = ObjectId::from_bytes(b"garbage");
        let path = store.object_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not zstd").unwrap();
        assert!(matches!(
            store.read(&id).unwrap_err(),
            StoreError::CorruptObject { .. }
        ));
    }
}
