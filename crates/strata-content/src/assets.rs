use std::fs;
use std::io;

use chrono::{DateTime, Utc};
use strata_types::{Author, Id};

use crate::error::{ContentError, ContentResult};
use crate::models::Asset;
use crate::store::{node_dir, node_file, WorkspaceStore, METADATA_FILE, PAGE_FILE, RECORDS_FILE};

const RESERVED_NAMES: [&str; 3] = [PAGE_FILE, METADATA_FILE, RECORDS_FILE];

/// An asset name must be a plain file name that does not collide with the
/// node's own files.
pub fn validate_asset_name(name: &str) -> ContentResult<()> {
    let problem = if name.trim().is_empty() {
        Some("asset name is empty")
    } else if name.contains(['/', '\\', '\0']) {
        Some("asset name may not contain path separators")
    } else if name.starts_with('.') {
        Some("asset name may not start with a dot")
    } else if RESERVED_NAMES.contains(&name) {
        Some("asset name is reserved")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(ContentError::Validation(format!("{problem}: {name:?}"))),
        None => Ok(()),
    }
}

/// MIME type guessed from the file extension.
pub fn mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

impl WorkspaceStore {
    /// Store `bytes` as `name` on `node`, replacing an existing asset of
    /// that name.
    pub fn save_asset(
        &self,
        author: &Author,
        node: Id,
        name: &str,
        bytes: &[u8],
    ) -> ContentResult<Asset> {
        validate_asset_name(name)?;
        self.write(author, |journal| {
            self.row(node)?;
            self.quota.check_asset_size(bytes.len() as u64)?;
            let file = (node_file(node, name), bytes.to_vec());
            self.check_growth(std::slice::from_ref(&file))?;
            journal.write(&file.0, bytes)?;
            Ok((format!("create: asset {name} on {node}"), self.asset(node, name)?))
        })
    }

    /// Assets of `node`, by name.
    pub fn list_assets(&self, node: Id) -> ContentResult<Vec<Asset>> {
        let _guard = self.backend().read_lock();
        self.row(node)?;
        let entries = match fs::read_dir(self.backend().root().join(node_dir(node))) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_asset_name(&name).is_err() {
                continue;
            }
            assets.push(to_asset(name, &entry.metadata()?));
        }
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(assets)
    }

    pub fn get_asset(&self, node: Id, name: &str) -> ContentResult<Vec<u8>> {
        validate_asset_name(name)?;
        let _guard = self.backend().read_lock();
        self.row(node)?;
        match fs::read(self.backend().root().join(node_file(node, name))) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ContentError::AssetNotFound {
                node,
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_asset(&self, author: &Author, node: Id, name: &str) -> ContentResult<()> {
        validate_asset_name(name)?;
        self.write(author, |journal| {
            self.row(node)?;
            let rel = node_file(node, name);
            if !self.backend().root().join(&rel).is_file() {
                return Err(ContentError::AssetNotFound {
                    node,
                    name: name.to_string(),
                });
            }
            journal.remove(&rel)?;
            Ok((format!("delete: asset {name} on {node}"), ()))
        })
    }

    fn asset(&self, node: Id, name: &str) -> ContentResult<Asset> {
        let meta = fs::metadata(self.backend().root().join(node_file(node, name)))?;
        Ok(to_asset(name.to_string(), &meta))
    }
}

fn to_asset(name: String, meta: &fs::Metadata) -> Asset {
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Asset {
        mime_type: mime_type(&name).to_string(),
        size: meta.len(),
        name,
        created,
    }
}
