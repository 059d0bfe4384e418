use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_table::{Row, Table, TableResult};
use tracing::{debug, warn};
use walkdir::WalkDir;

type Restore = Box<dyn FnOnce() -> TableResult<()> + Send>;

/// Prior state of everything one write touches.
///
/// Files are captured the first time they are written or removed; tables are
/// captured as a row snapshot. [`rollback`](Journal::rollback) puts both
/// back.
pub(crate) struct Journal {
    root: PathBuf,
    seen: HashSet<PathBuf>,
    files: Vec<(PathBuf, Option<Vec<u8>>)>,
    tables: Vec<(String, Restore)>,
}

impl Journal {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            seen: HashSet::new(),
            files: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Remember the current bytes (or absence) of `rel`.
    pub(crate) fn track(&mut self, rel: &str) -> io::Result<()> {
        let path = self.root.join(rel);
        if !self.seen.insert(path.clone()) {
            return Ok(());
        }
        let prior = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        self.files.push((path, prior));
        Ok(())
    }

    /// Remember the rows of `table` so they can be put back with `replace`.
    pub(crate) fn track_table<T: Row>(&mut self, table: &Arc<Table<T>>) {
        let rows = table.rows();
        let table = Arc::clone(table);
        self.tables
            .push((table.name().to_string(), Box::new(move || table.replace(rows))));
    }

    /// Write `bytes` to `rel` through a temp file in the same directory.
    pub(crate) fn write(&mut self, rel: &str, bytes: &[u8]) -> io::Result<()> {
        self.track(rel)?;
        let path = self.root.join(rel);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    pub(crate) fn remove(&mut self, rel: &str) -> io::Result<()> {
        self.track(rel)?;
        match fs::remove_file(self.root.join(rel)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Remove a directory and everything below it.
    pub(crate) fn remove_dir(&mut self, rel: &str) -> io::Result<()> {
        let dir = self.root.join(rel);
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    self.track(&rel.to_string_lossy())?;
                }
            }
        }
        fs::remove_dir_all(dir)
    }

    /// Put every tracked file and table back as it was.
    ///
    /// Keeps going past individual failures so that as much as possible is
    /// restored; each failure is logged.
    pub(crate) fn rollback(self) {
        let mut restored = 0;
        for (path, prior) in self.files.into_iter().rev() {
            let result = match prior {
                Some(bytes) => path
                    .parent()
                    .map_or(Ok(()), fs::create_dir_all)
                    .and_then(|_| fs::write(&path, bytes)),
                None => match fs::remove_file(&path) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                    _ => {
                        prune_empty_dirs(&path, &self.root);
                        Ok(())
                    }
                },
            };
            match result {
                Ok(()) => restored += 1,
                Err(e) => warn!(error = %e, "failed to restore file during rollback"),
            }
        }
        for (name, restore) in self.tables.into_iter().rev() {
            if let Err(e) = restore() {
                warn!(table = %name, error = %e, "failed to restore table during rollback");
            }
        }
        debug!(files = restored, "rolled back write");
    }
}

fn prune_empty_dirs(path: &Path, root: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}
