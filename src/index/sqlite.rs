use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{IndexerError, Result};
use crate::index::migrations::{self, CURRENT_FORMAT_VERSION};
use crate::index::{
    FileOccurrences, IndexStats, Occurrence, OccurrenceIndex, Relation, RelationFilter, SymbolKind,
};

/// Maximum number of pooled read connections.
const READ_POOL_SIZE: u32 = 4;

/// How `open_or_rebuild` obtained the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// An existing, compatible index was opened.
    Existing,
    /// No index existed; a new empty one was created.
    Created,
    /// The stored index was incompatible or unreadable and was replaced.
    Recreated,
}

impl OpenOutcome {
    /// True when the store holds nothing yet and needs a full build.
    pub fn needs_full_build(&self) -> bool {
        !matches!(self, OpenOutcome::Existing)
    }
}

/// Occurrence index stored in a single SQLite file.
///
/// Writes go through one connection behind a mutex, so writers are serialized.
/// Reads use a small pool of read-only connections; the database runs in WAL
/// mode and every lookup reads inside its own transaction, so readers never see
/// a half-applied batch.
pub struct SqliteIndex {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Pool<SqliteConnectionManager>,
}

impl SqliteIndex {
    /// Opens the index at `db_path`, creating it if it does not exist.
    ///
    /// Fails with `FormatMismatch` when the stored format is newer than this
    /// build understands and with `Corrupt` when the file cannot be read.
    pub fn open_or_create(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(version) = migrations::probe_format_version(&path)? {
            migrations::check_supported(version)?;
        }

        let conn = Connection::open(&path).map_err(classify_sqlite_error)?;
        Self::configure_pragmas(&conn).map_err(classify_sqlite_error)?;
        Self::verify_integrity(&conn)?;
        migrations::run_migrations(&conn)?;

        let manager = SqliteConnectionManager::file(&path).with_init(|c| {
            c.execute_batch(
                r#"
                PRAGMA busy_timeout = 5000;
                PRAGMA query_only = ON;
                "#,
            )
        });
        let readers = Pool::builder().max_size(READ_POOL_SIZE).build(manager)?;

        tracing::debug!("Opened index {}", path.display());

        Ok(Self {
            path,
            writer: Mutex::new(conn),
            readers,
        })
    }

    /// Opens the index, replacing it with an empty one when it is incompatible
    /// or corrupt. The outcome tells the caller whether a full build is due.
    pub fn open_or_rebuild(db_path: impl AsRef<Path>) -> Result<(Self, OpenOutcome)> {
        let path = db_path.as_ref();
        let existed = migrations::probe_format_version(path).ok().flatten().is_some();

        match Self::open_or_create(path) {
            Ok(index) => {
                let outcome = if existed {
                    OpenOutcome::Existing
                } else {
                    OpenOutcome::Created
                };
                Ok((index, outcome))
            }
            Err(e) if e.requires_rebuild() => {
                tracing::warn!("Discarding index {}: {}", path.display(), e);
                Self::delete_files(path)?;
                Ok((Self::open_or_create(path)?, OpenOutcome::Recreated))
            }
            Err(e) => Err(e),
        }
    }

    /// Removes the database file together with its WAL side files.
    pub fn delete_files(db_path: &Path) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let mut name = db_path.as_os_str().to_owned();
            name.push(suffix);
            match std::fs::remove_file(PathBuf::from(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Configure SQLite PRAGMA settings.
    /// - WAL mode: readers keep a consistent snapshot while a batch is written
    /// - FULL synchronous: a committed batch survives a crash
    /// - busy_timeout: readers wait out checkpoints instead of failing
    fn configure_pragmas(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
    }

    fn verify_integrity(conn: &Connection) -> Result<()> {
        let verdict: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(classify_sqlite_error)?;
        if verdict != "ok" {
            return Err(IndexerError::Corrupt(verdict));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| IndexerError::Index("index writer lock poisoned".into()))
    }

    pub fn format_version(&self) -> Result<u32> {
        let conn = self.writer()?;
        migrations::get_format_version(&conn)
    }

    /// Longest common ancestor of all indexed files, if anything was indexed.
    pub fn root(&self) -> Result<Option<PathBuf>> {
        let conn = self.readers.get()?;
        Ok(read_root(&conn)?.map(PathBuf::from))
    }

    /// Computes the xxh3 hash of file content.
    pub fn compute_content_hash(content: &[u8]) -> String {
        format!("{:016x}", xxh3_64(content))
    }

    /// Stored content hash of a file, `None` if the file is not indexed.
    pub fn get_file_content_hash(&self, file_path: &str) -> Result<Option<String>> {
        let conn = self.readers.get()?;
        let root = read_root(&conn)?.unwrap_or_default();
        let hash: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM files WHERE path = ?1",
                params![relativize(Path::new(&root), file_path)],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(hash)
    }

    fn query_occurrences(
        &self,
        predicate: &str,
        value: &str,
        filter: RelationFilter,
    ) -> Result<Vec<Occurrence>> {
        let mut conn = self.readers.get()?;
        let tx = conn.transaction()?;
        let root = read_root(&tx)?.unwrap_or_default();

        let mut sql = format!(
            r#"
            SELECT identifier, file_path, line, column_num, kind, relation, classifier
            FROM occurrences
            WHERE {}
            "#,
            predicate
        );
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&value];
        let relation_code = filter.code();
        if let Some(ref code) = relation_code {
            sql.push_str(" AND relation = ?2");
            params_vec.push(code);
        }
        sql.push_str(" ORDER BY file_path, line, column_num, identifier, relation, kind");

        let occurrences = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_vec.as_slice(), |row| occurrence_from_row(row, &root))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.commit()?;

        Ok(occurrences)
    }

    /// Widens the stored root so it covers `files`, rewriting stored paths
    /// when it moves. Returns the root to relativize new entries against.
    fn widen_root<'a>(
        tx: &Connection,
        files: impl Iterator<Item = &'a str>,
    ) -> Result<PathBuf> {
        let old_root = read_root(tx)?.map(PathBuf::from);
        let parents: Vec<PathBuf> = files
            .map(|f| {
                Path::new(f)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            })
            .collect();

        if parents.is_empty() {
            return Ok(old_root.unwrap_or_default());
        }

        let new_root = common_ancestor(
            old_root
                .iter()
                .map(PathBuf::as_path)
                .chain(parents.iter().map(PathBuf::as_path)),
        )
        .unwrap_or_default();

        if old_root.as_ref() == Some(&new_root) {
            return Ok(new_root);
        }

        if let Some(old_root) = old_root {
            let prefix = old_root
                .strip_prefix(&new_root)
                .map_err(|_| IndexerError::Index("index root is not an ancestor".into()))?;
            if !prefix.as_os_str().is_empty() {
                let prefix = format!("{}{}", prefix.to_string_lossy(), MAIN_SEPARATOR_STR);
                tracing::debug!(
                    "Widening index root {} -> {}",
                    old_root.display(),
                    new_root.display()
                );
                // Two passes keep the UNIQUE constraints from colliding mid-update
                for table_column in [("occurrences", "file_path"), ("files", "path")] {
                    let (table, column) = table_column;
                    tx.execute(
                        &format!("UPDATE {table} SET {column} = char(1) || {column}"),
                        [],
                    )?;
                    tx.execute(
                        &format!("UPDATE {table} SET {column} = ?1 || substr({column}, 2)"),
                        params![prefix],
                    )?;
                }
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('root', ?1)",
            params![new_root.to_string_lossy()],
        )?;
        Ok(new_root)
    }
}

impl OccurrenceIndex for SqliteIndex {
    fn replace_files(&self, occurrences_by_file: BTreeMap<String, Vec<Occurrence>>) -> Result<usize> {
        let batch = occurrences_by_file
            .into_iter()
            .map(|(file, occurrences)| FileOccurrences::new(file, occurrences))
            .collect();
        self.replace_file_batch(batch)
    }

    fn replace_file_batch(&self, batch: Vec<FileOccurrences>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        let root = Self::widen_root(&tx, batch.iter().map(|entry| entry.file.as_str()))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let mut total = 0;
        for entry in &batch {
            let rel = relativize(&root, &entry.file);
            tx.execute("DELETE FROM occurrences WHERE file_path = ?1", params![rel])?;

            let mut inserted = 0;
            {
                let mut stmt = tx.prepare_cached(
                    r#"
                    INSERT OR IGNORE INTO occurrences
                    (identifier, file_path, line, column_num, kind, relation, classifier)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )?;
                for occurrence in &entry.occurrences {
                    if occurrence.identifier.is_empty() || occurrence.line == 0 || occurrence.column == 0 {
                        tracing::debug!("Skipping malformed occurrence {:?}", occurrence);
                        continue;
                    }
                    inserted += stmt.execute(params![
                        occurrence.identifier,
                        rel,
                        occurrence.line,
                        occurrence.column,
                        occurrence.kind.code(),
                        occurrence.relation.code(),
                        occurrence.classifier,
                    ])?;
                }
            }

            tx.execute(
                r#"
                INSERT OR REPLACE INTO files (path, dialect, content_hash, occurrence_count, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    rel,
                    entry.dialect.map(|d| d.as_str()),
                    entry.content_hash,
                    inserted as i64,
                    now,
                ],
            )?;
            total += inserted;
        }

        tx.commit()?;
        Ok(total)
    }

    fn remove_files(&self, files: &[String]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        let root = PathBuf::from(read_root(&tx)?.unwrap_or_default());

        for file in files {
            let rel = relativize(&root, file);
            tx.execute("DELETE FROM occurrences WHERE file_path = ?1", params![rel])?;
            tx.execute("DELETE FROM files WHERE path = ?1", params![rel])?;
        }

        tx.commit()?;
        Ok(())
    }

    fn lookup(&self, identifier: &str, filter: RelationFilter) -> Result<Vec<Occurrence>> {
        self.query_occurrences("identifier = ?1", identifier, filter)
    }

    fn lookup_matching(&self, pattern: &str, filter: RelationFilter) -> Result<Vec<Occurrence>> {
        self.query_occurrences("identifier GLOB ?1", pattern, filter)
    }

    fn indexed_files(&self) -> Result<Vec<String>> {
        let mut conn = self.readers.get()?;
        let tx = conn.transaction()?;
        let root = read_root(&tx)?.unwrap_or_default();
        let files = {
            let mut stmt = tx.prepare("SELECT path FROM files ORDER BY path")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.commit()?;

        Ok(files
            .into_iter()
            .map(|rel| qualify(Path::new(&root), &rel))
            .collect())
    }

    fn file_needs_reindex(&self, file_path: &str, new_content_hash: &str) -> Result<bool> {
        match self.get_file_content_hash(file_path)? {
            Some(stored_hash) => Ok(stored_hash != new_content_hash),
            None => Ok(true),
        }
    }

    fn stats(&self) -> Result<IndexStats> {
        let mut conn = self.readers.get()?;
        let tx = conn.transaction()?;

        let format_version = migrations::get_format_version(&tx)?;
        let root = read_root(&tx)?;
        let total_files: i64 = tx.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let total_occurrences: i64 =
            tx.query_row("SELECT COUNT(*) FROM occurrences", [], |row| row.get(0))?;
        let total_identifiers: i64 = tx.query_row(
            "SELECT COUNT(DISTINCT identifier) FROM occurrences",
            [],
            |row| row.get(0),
        )?;

        let grouped = |sql: &str| -> rusqlite::Result<Vec<(String, usize)>> {
            let mut stmt = tx.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        };
        let occurrences_by_relation = grouped(
            "SELECT relation, COUNT(*) FROM occurrences GROUP BY relation ORDER BY COUNT(*) DESC",
        )?;
        let files_by_dialect = grouped(
            "SELECT COALESCE(dialect, 'unknown'), COUNT(*) FROM files GROUP BY 1 ORDER BY COUNT(*) DESC",
        )?;
        tx.commit()?;

        Ok(IndexStats {
            format_version,
            root,
            total_files: total_files as usize,
            total_identifiers: total_identifiers as usize,
            total_occurrences: total_occurrences as usize,
            occurrences_by_relation,
            files_by_dialect,
        })
    }

    fn is_empty(&self) -> Result<bool> {
        let conn = self.readers.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    fn reset(&self) -> Result<()> {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            r#"
            DELETE FROM occurrences;
            DELETE FROM files;
            DELETE FROM meta WHERE key = 'root';
            "#,
        )?;
        tx.pragma_update(None, "user_version", CURRENT_FORMAT_VERSION)?;
        tx.commit()?;
        tracing::info!("Reset index {}", self.path.display());
        Ok(())
    }
}

fn read_root(conn: &Connection) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = 'root'", [], |row| {
        row.get(0)
    })
    .optional()
}

fn occurrence_from_row(row: &rusqlite::Row, root: &str) -> rusqlite::Result<Occurrence> {
    let file: String = row.get(1)?;
    let kind: String = row.get(4)?;
    let relation: String = row.get(5)?;

    Ok(Occurrence {
        identifier: row.get(0)?,
        file: qualify(Path::new(root), &file),
        line: row.get(2)?,
        column: row.get(3)?,
        kind: SymbolKind::from_code(&kind),
        relation: Relation::from_code(&relation),
        classifier: row.get(6)?,
    })
}

/// Maps SQLite's "not a database" / "corrupt" failures to `Corrupt`.
fn classify_sqlite_error(e: rusqlite::Error) -> IndexerError {
    match e.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
            IndexerError::Corrupt(e.to_string())
        }
        _ => IndexerError::Database(e),
    }
}

/// Path of `file` relative to `root`; unchanged when it is not under `root`.
pub fn relativize(root: &Path, file: &str) -> String {
    match Path::new(file).strip_prefix(root) {
        Ok(rel) if !root.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
        _ => file.to_string(),
    }
}

/// Re-qualifies a stored relative path with the index root.
pub fn qualify(root: &Path, rel: &str) -> String {
    if root.as_os_str().is_empty() {
        rel.to_string()
    } else {
        root.join(rel).to_string_lossy().into_owned()
    }
}

/// Longest common ancestor of `paths`, compared component by component.
pub fn common_ancestor<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut iter = paths.into_iter();
    let mut prefix: Vec<Component<'a>> = iter.next()?.components().collect();

    for path in iter {
        let shared = prefix
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        prefix.truncate(shared);
    }

    Some(prefix.iter().map(|c| c.as_os_str()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Dialect;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteIndex {
        SqliteIndex::open_or_create(dir.path().join("index.db")).unwrap()
    }

    fn occ(id: &str, file: &str, line: u32, col: u32, relation: Relation) -> Occurrence {
        Occurrence::new(id, file, line, col, SymbolKind::Function, relation)
    }

    fn batch(entries: Vec<(&str, Vec<Occurrence>)>) -> BTreeMap<String, Vec<Occurrence>> {
        entries
            .into_iter()
            .map(|(file, occs)| (file.to_string(), occs))
            .collect()
    }

    #[test]
    fn test_open_creates_current_version() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        assert_eq!(index.format_version().unwrap(), CURRENT_FORMAT_VERSION);
        assert!(index.is_empty().unwrap());
        assert_eq!(index.root().unwrap(), None);
    }

    #[test]
    fn test_replace_and_lookup() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);

        let stored = index
            .replace_files(batch(vec![(
                "/proj/src/foo.c",
                vec![
                    occ("bar", "/proj/src/foo.c", 10, 5, Relation::Definition),
                    occ("bar", "/proj/src/foo.c", 3, 1, Relation::Declaration),
                ],
            )]))
            .unwrap();
        assert_eq!(stored, 2);

        let found = index.lookup("bar", RelationFilter::Any).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line, 3);
        assert_eq!(found[1].line, 10);
        assert_eq!(found[0].file, "/proj/src/foo.c");
    }

    #[test]
    fn test_lookup_filters_relation() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![
                    occ("f", "/p/a.c", 1, 1, Relation::Definition),
                    occ("f", "/p/a.c", 5, 3, Relation::Reference),
                    occ("f", "/p/a.c", 7, 3, Relation::Reference),
                ],
            )]))
            .unwrap();

        assert_eq!(index.lookup("f", RelationFilter::Reference).unwrap().len(), 2);
        assert_eq!(index.lookup("f", RelationFilter::Definition).unwrap().len(), 1);
        assert!(index.lookup("f", RelationFilter::Declaration).unwrap().is_empty());
    }

    #[test]
    fn test_same_position_different_relations_are_distinct() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![(
                "foo.c",
                vec![
                    occ("bar", "foo.c", 10, 5, Relation::Definition),
                    occ("bar", "foo.c", 10, 5, Relation::Reference),
                ],
            )]))
            .unwrap();

        assert_eq!(index.lookup("bar", RelationFilter::Definition).unwrap().len(), 1);
        assert_eq!(index.lookup("bar", RelationFilter::Reference).unwrap().len(), 1);
        assert_eq!(index.lookup("bar", RelationFilter::Any).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_occurrences_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        let stored = index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![
                    occ("x", "/p/a.c", 2, 2, Relation::Reference),
                    occ("x", "/p/a.c", 2, 2, Relation::Reference),
                ],
            )]))
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(index.lookup("x", RelationFilter::Any).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_removes_previous_occurrences_of_file() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![occ("old", "/p/a.c", 1, 1, Relation::Definition)],
            )]))
            .unwrap();
        index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![occ("new", "/p/a.c", 1, 1, Relation::Definition)],
            )]))
            .unwrap();

        assert!(index.lookup("old", RelationFilter::Any).unwrap().is_empty());
        assert_eq!(index.lookup("new", RelationFilter::Any).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_with_empty_list_clears_file() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![occ("gone", "/p/a.c", 1, 1, Relation::Reference)],
            )]))
            .unwrap();
        index.replace_files(batch(vec![("/p/a.c", vec![])])).unwrap();

        assert!(index.lookup("gone", RelationFilter::Any).unwrap().is_empty());
        assert_eq!(index.indexed_files().unwrap(), vec!["/p/a.c".to_string()]);
    }

    #[test]
    fn test_malformed_occurrences_are_skipped() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        let stored = index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![
                    occ("", "/p/a.c", 1, 1, Relation::Reference),
                    occ("ok", "/p/a.c", 0, 1, Relation::Reference),
                    occ("ok", "/p/a.c", 1, 1, Relation::Reference),
                ],
            )]))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn test_root_is_common_ancestor() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![
                ("/proj/src/a.c", vec![occ("a", "/proj/src/a.c", 1, 1, Relation::Definition)]),
                ("/proj/include/a.h", vec![occ("a", "/proj/include/a.h", 1, 1, Relation::Declaration)]),
            ]))
            .unwrap();

        assert_eq!(index.root().unwrap(), Some(PathBuf::from("/proj")));
    }

    #[test]
    fn test_root_widens_and_rewrites_paths() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![(
                "/proj/src/a.c",
                vec![occ("a", "/proj/src/a.c", 1, 1, Relation::Definition)],
            )]))
            .unwrap();
        assert_eq!(index.root().unwrap(), Some(PathBuf::from("/proj/src")));

        index
            .replace_files(batch(vec![(
                "/proj/lib/b.c",
                vec![occ("a", "/proj/lib/b.c", 4, 2, Relation::Reference)],
            )]))
            .unwrap();
        assert_eq!(index.root().unwrap(), Some(PathBuf::from("/proj")));

        let found = index.lookup("a", RelationFilter::Any).unwrap();
        let files: Vec<&str> = found.iter().map(|o| o.file.as_str()).collect();
        assert_eq!(files, vec!["/proj/lib/b.c", "/proj/src/a.c"]);
    }

    #[test]
    fn test_root_widening_with_nested_names() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![
                ("/r/a/x.c", vec![occ("x", "/r/a/x.c", 1, 1, Relation::Definition)]),
                ("/r/a/a/x.c", vec![occ("x", "/r/a/a/x.c", 1, 1, Relation::Definition)]),
            ]))
            .unwrap();
        index
            .replace_files(batch(vec![(
                "/r/b.c",
                vec![occ("x", "/r/b.c", 1, 1, Relation::Reference)],
            )]))
            .unwrap();

        let files: Vec<String> = index
            .lookup("x", RelationFilter::Any)
            .unwrap()
            .into_iter()
            .map(|o| o.file)
            .collect();
        assert_eq!(files, vec!["/r/a/a/x.c", "/r/a/x.c", "/r/b.c"]);
    }

    #[test]
    fn test_remove_files() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![
                ("/p/a.c", vec![occ("s", "/p/a.c", 1, 1, Relation::Definition)]),
                ("/p/b.c", vec![occ("s", "/p/b.c", 1, 1, Relation::Reference)]),
            ]))
            .unwrap();

        index.remove_files(&["/p/a.c".to_string()]).unwrap();

        let found = index.lookup("s", RelationFilter::Any).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file, "/p/b.c");
        assert_eq!(index.indexed_files().unwrap(), vec!["/p/b.c".to_string()]);
    }

    #[test]
    fn test_lookup_matching_glob() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![(
                "/p/a.c",
                vec![
                    occ("list_add", "/p/a.c", 1, 1, Relation::Definition),
                    occ("list_del", "/p/a.c", 9, 1, Relation::Definition),
                    occ("hash_add", "/p/a.c", 20, 1, Relation::Definition),
                ],
            )]))
            .unwrap();

        assert_eq!(index.lookup_matching("list_*", RelationFilter::Any).unwrap().len(), 2);
        assert_eq!(index.lookup_matching("*_add", RelationFilter::Any).unwrap().len(), 2);
        assert_eq!(index.lookup_matching("list_de?", RelationFilter::Any).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_codes_survive_storage() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        let odd = Occurrence::new(
            "w",
            "/p/a.c",
            1,
            1,
            SymbolKind::Other("WIDGET".into()),
            Relation::Other("USE".into()),
        )
        .with_classifier("opaque-token");
        index.replace_files(batch(vec![("/p/a.c", vec![odd.clone()])])).unwrap();

        let found = index.lookup("w", RelationFilter::Any).unwrap();
        assert_eq!(found, vec![odd]);
        assert!(index.lookup("w", RelationFilter::Reference).unwrap().is_empty());
    }

    #[test]
    fn test_content_hash_tracking() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        let hash = SqliteIndex::compute_content_hash(b"int main(void) { return 0; }");

        let mut entry = FileOccurrences::new("/p/main.c", vec![]);
        entry.content_hash = Some(hash.clone());
        entry.dialect = Some(Dialect::C);
        index.replace_file_batch(vec![entry]).unwrap();

        assert!(!index.file_needs_reindex("/p/main.c", &hash).unwrap());
        assert!(index.file_needs_reindex("/p/main.c", "0000").unwrap());
        assert!(index.file_needs_reindex("/p/other.c", &hash).unwrap());
    }

    #[test]
    fn test_compute_content_hash_deterministic() {
        let a = SqliteIndex::compute_content_hash(b"int x;");
        let b = SqliteIndex::compute_content_hash(b"int x;");
        let c = SqliteIndex::compute_content_hash(b"int y;");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        let mut entry = FileOccurrences::new(
            "/p/a.cpp",
            vec![
                occ("a", "/p/a.cpp", 1, 1, Relation::Definition),
                occ("b", "/p/a.cpp", 2, 1, Relation::Reference),
                occ("b", "/p/a.cpp", 3, 1, Relation::Reference),
            ],
        );
        entry.dialect = Some(Dialect::Cpp);
        index.replace_file_batch(vec![entry]).unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_occurrences, 3);
        assert_eq!(stats.total_identifiers, 2);
        assert_eq!(stats.occurrences_by_relation[0], ("REF".to_string(), 2));
        assert_eq!(stats.files_by_dialect, vec![("c++".to_string(), 1)]);
        assert_eq!(stats.root.as_deref(), Some("/p"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_files(batch(vec![("/p/a.c", vec![occ("a", "/p/a.c", 1, 1, Relation::Reference)])]))
            .unwrap();

        index.reset().unwrap();

        assert!(index.is_empty().unwrap());
        assert_eq!(index.root().unwrap(), None);
        assert!(index.lookup("a", RelationFilter::Any).unwrap().is_empty());
        assert_eq!(index.format_version().unwrap(), CURRENT_FORMAT_VERSION);
    }

    #[test]
    fn test_common_ancestor() {
        let paths = [Path::new("/a/b/c"), Path::new("/a/b/d/e"), Path::new("/a/b")];
        assert_eq!(common_ancestor(paths), Some(PathBuf::from("/a/b")));
        assert_eq!(
            common_ancestor([Path::new("/x/y"), Path::new("/z")]),
            Some(PathBuf::from("/"))
        );
        assert_eq!(common_ancestor(Vec::<&Path>::new()), None);
    }

    #[test]
    fn test_relativize_and_qualify() {
        let root = Path::new("/proj");
        assert_eq!(relativize(root, "/proj/src/a.c"), "src/a.c");
        assert_eq!(relativize(root, "/elsewhere/a.c"), "/elsewhere/a.c");
        assert_eq!(relativize(Path::new(""), "a.c"), "a.c");
        assert_eq!(qualify(root, "src/a.c"), "/proj/src/a.c");
        assert_eq!(qualify(Path::new(""), "a.c"), "a.c");
    }
}
