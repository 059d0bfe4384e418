use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use strata_types::Id;
use tracing::{debug, warn};

use crate::error::{TableError, TableResult};
use crate::row::{Row, TableHeader};

/// Receives a callback after each successful write.
///
/// Callbacks run after the table lock is released, so an observer may read
/// the table. They never run for writes that failed.
pub trait TableObserver<T>: Send + Sync {
    fn on_append(&self, _row: &T) {}

    fn on_update(&self, _old: &T, _new: &T) {}

    fn on_delete(&self, _row: &T) {}

    /// The whole row set was substituted.
    fn on_replace(&self, _rows: usize) {}
}

/// File-backed, id-ordered table of `T`.
pub struct Table<T: Row> {
    path: PathBuf,
    /// File name only; used in logs and errors.
    name: String,
    rows: RwLock<Vec<T>>,
    observers: RwLock<Vec<Arc<dyn TableObserver<T>>>>,
}

impl<T: Row> Table<T> {
    /// Open the table at `path`, creating an empty one if the file is absent.
    ///
    /// Rows out of id order are sorted and a torn final line is dropped; in
    /// both cases the file is rewritten. Any other unparsable line, or a zero
    /// or repeated id, fails with [`TableError::Corrupt`].
    pub fn open(path: impl Into<PathBuf>) -> TableResult<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let table = Self {
            path,
            name,
            rows: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
        };
        fs::create_dir_all(table.dir())?;
        let rows = table.load()?;
        *table.rows.write().expect("lock poisoned") = rows;
        Ok(table)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the backing file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an observer.
    pub fn subscribe(&self, observer: Arc<dyn TableObserver<T>>) {
        self.observers
            .write()
            .expect("lock poisoned")
            .push(observer);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: Id) -> Option<T> {
        let rows = self.rows.read().expect("lock poisoned");
        position(rows.as_slice(), id).map(|i| rows[i].clone())
    }

    pub fn contains(&self, id: Id) -> bool {
        let rows = self.rows.read().expect("lock poisoned");
        position(rows.as_slice(), id).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().expect("lock poisoned").is_empty()
    }

    /// Row with the highest id.
    pub fn last(&self) -> Option<T> {
        self.rows.read().expect("lock poisoned").last().cloned()
    }

    /// Rows with an id greater than `start_after`, in id order.
    ///
    /// The rows are copied out under the read lock, so the iterator reflects
    /// the table at call time and is unaffected by later writes. Pass
    /// [`Id::ZERO`] to start from the beginning.
    pub fn iter(&self, start_after: Id) -> impl Iterator<Item = T> {
        let rows = self.rows.read().expect("lock poisoned");
        let start = rows.partition_point(|r| r.id() <= start_after);
        rows[start..].to_vec().into_iter()
    }

    /// All rows, in id order.
    pub fn rows(&self) -> Vec<T> {
        self.rows.read().expect("lock poisoned").clone()
    }

    /// Rows matching `pred`, in id order.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|r| pred(*r))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Add a new row and return the stored copy.
    pub fn append(&self, row: T) -> TableResult<T> {
        check_row(&row)?;
        let id = row.id();
        let mut rows = self.rows.write().expect("lock poisoned");
        match rows.binary_search_by_key(&id, |r| r.id()) {
            Ok(_) => return Err(TableError::DuplicateId(id)),
            Err(pos) if pos == rows.len() => {
                self.append_line(&row)?;
                rows.push(row.clone());
            }
            Err(pos) => {
                let mut next = rows.clone();
                next.insert(pos, row.clone());
                self.write_file(&next)?;
                *rows = next;
            }
        }
        drop(rows);
        self.notify(|o| o.on_append(&row));
        Ok(row)
    }

    /// Apply `f` to the row with `id` and rewrite the table.
    ///
    /// `f` works on a copy. If `f` fails, the result changes the id, fails
    /// validation, or the file cannot be written, the table is left exactly
    /// as it was.
    pub fn modify<F, E>(&self, id: Id, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<TableError>,
    {
        let mut rows = self.rows.write().expect("lock poisoned");
        let pos = position(rows.as_slice(), id).ok_or(TableError::NotFound(id))?;
        let old = rows[pos].clone();
        let mut updated = old.clone();
        f(&mut updated)?;
        if updated.id() != id {
            return Err(TableError::IdChanged {
                expected: id,
                actual: updated.id(),
            }
            .into());
        }
        check_row(&updated)?;

        let mut next = rows.clone();
        next[pos] = updated.clone();
        self.write_file(&next)?;
        *rows = next;
        drop(rows);
        self.notify(|o| o.on_update(&old, &updated));
        Ok(updated)
    }

    /// Replace the stored row that has the same id as `row`.
    pub fn update(&self, row: T) -> TableResult<T> {
        self.modify(row.id(), |current| {
            *current = row;
            Ok::<(), TableError>(())
        })
    }

    /// Remove the row with `id` and return it.
    pub fn delete(&self, id: Id) -> TableResult<T> {
        let mut rows = self.rows.write().expect("lock poisoned");
        let pos = position(rows.as_slice(), id).ok_or(TableError::NotFound(id))?;
        let mut next = rows.clone();
        let removed = next.remove(pos);
        self.write_file(&next)?;
        *rows = next;
        drop(rows);
        self.notify(|o| o.on_delete(&removed));
        Ok(removed)
    }

    /// Remove every row matching `pred`. Returns how many were removed.
    pub fn delete_where(&self, pred: impl Fn(&T) -> bool) -> TableResult<usize> {
        let mut rows = self.rows.write().expect("lock poisoned");
        let (removed, kept): (Vec<T>, Vec<T>) = rows.iter().cloned().partition(|r| pred(r));
        if removed.is_empty() {
            return Ok(0);
        }
        self.write_file(&kept)?;
        *rows = kept;
        drop(rows);
        for row in &removed {
            self.notify(|o| o.on_delete(row));
        }
        Ok(removed.len())
    }

    /// Substitute the full row set.
    ///
    /// Rows are validated and sorted; a repeated id is rejected before
    /// anything is written.
    pub fn replace(&self, mut new_rows: Vec<T>) -> TableResult<()> {
        for row in &new_rows {
            check_row(row)?;
        }
        new_rows.sort_by_key(|r| r.id());
        if let Some(pair) = new_rows.windows(2).find(|w| w[0].id() == w[1].id()) {
            return Err(TableError::DuplicateId(pair[0].id()));
        }
        let mut rows = self.rows.write().expect("lock poisoned");
        self.write_file(&new_rows)?;
        let count = new_rows.len();
        *rows = new_rows;
        drop(rows);
        self.notify(|o| o.on_replace(count));
        Ok(())
    }

    /// Discard the mirror and read the file again.
    pub fn reload(&self) -> TableResult<()> {
        let mut rows = self.rows.write().expect("lock poisoned");
        *rows = self.load()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // File handling
    // -----------------------------------------------------------------------

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    fn load(&self) -> TableResult<Vec<T>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.write_file(&[])?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let (rows, rewrite) = self.parse(&text)?;
        if rewrite {
            self.write_file(&rows)?;
        }
        debug!(table = %self.name, rows = rows.len(), "table loaded");
        Ok(rows)
    }

    /// Parse file contents. The flag is set when the file should be rewritten.
    fn parse(&self, text: &str) -> TableResult<(Vec<T>, bool)> {
        let mut rewrite = text.is_empty();
        let torn_tail = !text.is_empty() && !text.ends_with('\n');
        let line_count = text.lines().count();
        let mut rows: Vec<T> = Vec::new();
        let mut seen = HashSet::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            if idx == 0 {
                if serde_json::from_str::<TableHeader>(line).is_ok() {
                    continue;
                }
                rewrite = true;
            }
            let row: T = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) if torn_tail && line_no == line_count => {
                    warn!(table = %self.name, line = line_no, error = %e, "dropping torn final line");
                    rewrite = true;
                    continue;
                }
                Err(e) => return Err(self.corrupt(line_no, e.to_string())),
            };
            let id = row.id();
            if id.is_zero() {
                return Err(self.corrupt(line_no, "row has no id".into()));
            }
            if !seen.insert(id) {
                return Err(self.corrupt(line_no, format!("duplicate id {id}")));
            }
            rows.push(row);
        }

        if !rows.windows(2).all(|w| w[0].id() < w[1].id()) {
            rows.sort_by_key(|r| r.id());
            rewrite = true;
        }
        Ok((rows, rewrite))
    }

    fn corrupt(&self, line: usize, reason: String) -> TableError {
        TableError::Corrupt {
            table: self.name.clone(),
            line,
            reason,
        }
    }

    /// Append one line in place and fsync. A partial line is truncated away
    /// on failure.
    fn append_line(&self, row: &T) -> TableResult<()> {
        let line = encode_line(row)?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let before = file.metadata()?.len();
        if let Err(e) = file.write_all(&line).and_then(|()| file.sync_data()) {
            let _ = file.set_len(before);
            return Err(e.into());
        }
        debug!(table = %self.name, id = %row.id(), "row appended");
        Ok(())
    }

    /// Write header + `rows` to a temp file, fsync, and rename over the table.
    fn write_file(&self, rows: &[T]) -> TableResult<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(self.dir())?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            out.write_all(&encode_line(&TableHeader::for_row::<T>())?)?;
            for row in rows {
                out.write_all(&encode_line(row)?)?;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(table = %self.name, rows = rows.len(), "table rewritten");
        Ok(())
    }

    fn notify(&self, f: impl Fn(&dyn TableObserver<T>)) {
        let observers = self.observers.read().expect("lock poisoned").clone();
        for o in &observers {
            f(o.as_ref());
        }
    }
}

impl<T: Row> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("rows", &self.len())
            .finish()
    }
}

fn position<T: Row>(rows: &[T], id: Id) -> Option<usize> {
    rows.binary_search_by_key(&id, |r| r.id()).ok()
}

fn check_row<T: Row>(row: &T) -> TableResult<()> {
    let id = row.id();
    if id.is_zero() {
        return Err(TableError::ZeroId);
    }
    row.validate()
        .map_err(|reason| TableError::Invalid { id, reason })
}

fn encode_line<S: Serialize>(value: &S) -> TableResult<Vec<u8>> {
    let mut line =
        serde_json::to_vec(value).map_err(|e| TableError::Serialization(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serializer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Id,
        #[serde(serialize_with = "refuse_poison")]
        text: String,
    }

    /// Lets a test make serialization fail part-way through a rewrite.
    #[allow(clippy::ptr_arg)]
    fn refuse_poison<S: Serializer>(text: &String, s: S) -> Result<S::Ok, S::Error> {
        if text == "poison" {
            return Err(serde::ser::Error::custom("poisoned row"));
        }
        s.serialize_str(text)
    }

    impl Row for Note {
        fn id(&self) -> Id {
            self.id
        }

        fn validate(&self) -> Result<(), String> {
            if self.text.is_empty() {
                return Err("text is required".into());
            }
            Ok(())
        }

        fn columns() -> Vec<String> {
            vec!["id".into(), "text".into()]
        }
    }

    fn note(raw: u64, text: &str) -> Note {
        Note {
            id: Id::from_raw(raw),
            text: text.into(),
        }
    }

    fn open(dir: &tempfile::TempDir) -> Table<Note> {
        Table::open(dir.path().join("notes.jsonl")).unwrap()
    }

    fn ids(table: &Table<Note>) -> Vec<u64> {
        table.iter(Id::ZERO).map(|n| n.id.as_u64()).collect()
    }

    // -----------------------------------------------------------------------
    // Open / header
    // -----------------------------------------------------------------------

    #[test]
    fn open_creates_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        assert!(table.is_empty());
        let text = fs::read_to_string(table.path()).unwrap();
        assert_eq!(text, "{\"version\":\"1.0\",\"columns\":[\"id\",\"text\"]}\n");
    }

    #[test]
    fn headerless_file_is_accepted_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jsonl");
        let line = serde_json::to_string(&note(5, "legacy")).unwrap();
        fs::write(&path, format!("{line}\n")).unwrap();

        let table: Table<Note> = Table::open(&path).unwrap();
        assert_eq!(ids(&table), vec![5]);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\"version\""));
    }

    // -----------------------------------------------------------------------
    // Append
    // -----------------------------------------------------------------------

    #[test]
    fn iteration_follows_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        let mut appended = Vec::new();
        for i in 0..100 {
            let row = table
                .append(Note {
                    id: Id::new(),
                    text: format!("note {i}"),
                })
                .unwrap();
            appended.push(row.id);
        }
        let seen: Vec<Id> = table.iter(Id::ZERO).map(|n| n.id).collect();
        assert_eq!(seen, appended);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let reopened = open(&dir);
        let persisted: Vec<Id> = reopened.iter(Id::ZERO).map(|n| n.id).collect();
        assert_eq!(persisted, appended);
    }

    #[test]
    fn out_of_order_append_is_inserted_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        table.append(note(30, "c")).unwrap();
        table.append(note(10, "a")).unwrap();
        table.append(note(20, "b")).unwrap();
        assert_eq!(ids(&table), vec![10, 20, 30]);
        assert_eq!(ids(&open(&dir)), vec![10, 20, 30]);
        assert_eq!(table.last().unwrap().text, "c");
    }

    #[test]
    fn append_rejects_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        table.append(note(1, "a")).unwrap();
        let before = fs::read(table.path()).unwrap();

        let dup = table.append(note(1, "again")).unwrap_err();
        assert!(matches!(dup, TableError::DuplicateId(_)));
        assert_eq!(dup.kind(), strata_types::ErrorKind::Conflict);
        assert!(matches!(
            table.append(note(0, "zero")),
            Err(TableError::ZeroId)
        ));
        assert!(matches!(
            table.append(note(2, "")),
            Err(TableError::Invalid { .. })
        ));
        assert!(table.append(note(3, "poison")).is_err());

        assert_eq!(fs::read(table.path()).unwrap(), before);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn iter_starts_after_given_id() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        for raw in [1, 2, 3, 4] {
            table.append(note(raw, "x")).unwrap();
        }
        let tail: Vec<u64> = table
            .iter(Id::from_raw(2))
            .map(|n| n.id.as_u64())
            .collect();
        assert_eq!(tail, vec![3, 4]);
        assert_eq!(table.iter(Id::from_raw(9)).count(), 0);
    }

    #[test]
    fn iterator_is_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        table.append(note(1, "x")).unwrap();
        let it = table.iter(Id::ZERO);
        table.append(note(2, "y")).unwrap();
        assert_eq!(it.count(), 1);
    }

    // -----------------------------------------------------------------------
    // Modify / update / delete / replace
    // -----------------------------------------------------------------------

    #[test]
    fn modify_persists_change() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        table.append(note(1, "draft")).unwrap();
        let updated = table
            .modify(Id::from_raw(1), |n| {
                n.text = "final".into();
                Ok::<(), TableError>(())
            })
            .unwrap();
        assert_eq!(updated.text, "final");
        assert_eq!(open(&dir).get(Id::from_raw(1)).unwrap().text, "final");
    }

    #[test]
    fn modify_missing_row_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        let err = table.update(note(7, "x")).unwrap_err();
        assert!(matches!(err, TableError::NotFound(_)));
        assert_eq!(err.kind(), strata_types::ErrorKind::NotFound);
    }

    #[test]
    fn modify_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        for raw in 1..=5 {
            table.append(note(raw, &format!("row {raw}"))).unwrap();
        }
        let before_rows = table.rows();
        let before_file = fs::read(table.path()).unwrap();

        // Failure half-way through writing the replacement file.
        assert!(table
            .modify(Id::from_raw(3), |n| {
                n.text = "poison".into();
                Ok::<(), TableError>(())
            })
            .is_err());
        // Mutator refuses.
        let refused: Result<Note, TableError> = table.modify(Id::from_raw(2), |_| {
            Err(TableError::Invalid {
                id: Id::from_raw(2),
                reason: "refused".into(),
            })
        });
        assert!(refused.is_err());
        // Id change.
        assert!(matches!(
            table.modify(Id::from_raw(4), |n| {
                n.id = Id::from_raw(40);
                Ok::<(), TableError>(())
            }),
            Err(TableError::IdChanged { .. })
        ));

        assert_eq!(table.rows(), before_rows);
        assert_eq!(fs::read(table.path()).unwrap(), before_file);
        assert_eq!(open(&dir).rows(), before_rows);
    }

    #[test]
    fn delete_and_delete_where() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        for raw in 1..=6 {
            table.append(note(raw, if raw % 2 == 0 { "even" } else { "odd" })).unwrap();
        }
        let removed = table.delete(Id::from_raw(1)).unwrap();
        assert_eq!(removed.text, "odd");
        assert!(matches!(
            table.delete(Id::from_raw(1)),
            Err(TableError::NotFound(_))
        ));

        assert_eq!(table.delete_where(|n| n.text == "even").unwrap(), 3);
        assert_eq!(table.delete_where(|n| n.text == "none").unwrap(), 0);
        assert_eq!(ids(&open(&dir)), vec![3, 5]);
    }

    #[test]
    fn replace_sorts_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        table.append(note(1, "old")).unwrap();

        assert!(matches!(
            table.replace(vec![note(2, "a"), note(2, "b")]),
            Err(TableError::DuplicateId(_))
        ));
        assert_eq!(ids(&table), vec![1]);

        table
            .replace(vec![note(9, "z"), note(4, "m"), note(6, "p")])
            .unwrap();
        assert_eq!(ids(&table), vec![4, 6, 9]);
        assert_eq!(ids(&open(&dir)), vec![4, 6, 9]);
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    #[test]
    fn torn_final_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jsonl");
        {
            let table: Table<Note> = Table::open(&path).unwrap();
            table.append(note(1, "kept")).unwrap();
        }
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("{\"id\":\"----------");
        fs::write(&path, &text).unwrap();

        let table: Table<Note> = Table::open(&path).unwrap();
        assert_eq!(ids(&table), vec![1]);
        let repaired = fs::read_to_string(&path).unwrap();
        assert!(repaired.ends_with('\n'));
        assert_eq!(repaired.lines().count(), 2);
    }

    #[test]
    fn corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jsonl");
        let good = serde_json::to_string(&note(1, "a")).unwrap();
        fs::write(
            &path,
            format!("{{\"version\":\"1.0\",\"columns\":[]}}\n{good}\nnot json\n"),
        )
        .unwrap();
        let err = Table::<Note>::open(&path).unwrap_err();
        match err {
            TableError::Corrupt { table, line, .. } => {
                assert_eq!(table, "notes.jsonl");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_on_disk_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jsonl");
        let line = serde_json::to_string(&note(1, "a")).unwrap();
        fs::write(&path, format!("{line}\n{line}\n")).unwrap();
        assert!(matches!(
            Table::<Note>::open(&path),
            Err(TableError::Corrupt { .. })
        ));
    }

    #[test]
    fn reload_picks_up_external_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let a = open(&dir);
        let b = open(&dir);
        a.append(note(1, "from a")).unwrap();
        assert!(b.is_empty());
        b.reload().unwrap();
        assert_eq!(b.get(Id::from_raw(1)).unwrap().text, "from a");
    }

    // -----------------------------------------------------------------------
    // Observers and concurrency
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct Counter {
        appends: AtomicUsize,
        updates: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl TableObserver<Note> for Counter {
        fn on_append(&self, _row: &Note) {
            self.appends.fetch_add(1, Ordering::SeqCst);
        }

        fn on_update(&self, old: &Note, new: &Note) {
            assert_eq!(old.id, new.id);
            self.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn on_delete(&self, _row: &Note) {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observers_see_successful_writes_only() {
        let dir = tempfile::tempdir().unwrap();
        let table = open(&dir);
        let counter = Arc::new(Counter::default());
        table.subscribe(counter.clone());

        table.append(note(1, "a")).unwrap();
        table.append(note(2, "b")).unwrap();
        let _ = table.append(note(2, "dup"));
        table.update(note(1, "a2")).unwrap();
        let _ = table.update(note(1, "poison"));
        table.delete(Id::from_raw(2)).unwrap();

        assert_eq!(counter.appends.load(Ordering::SeqCst), 2);
        assert_eq!(counter.updates.load(Ordering::SeqCst), 1);
        assert_eq!(counter.deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(open(&dir));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..50 {
                        table
                            .append(Note {
                                id: Id::new(),
                                text: format!("{t}-{i}"),
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(table.len(), 400);

        let reopened = open(&dir);
        let ids: Vec<Id> = reopened.iter(Id::ZERO).map(|n| n.id).collect();
        assert_eq!(ids.len(), 400);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
