//! Versioned schema for the occurrence index.
//!
//! The format version lives in SQLite's `user_version` header field, so it can
//! be read straight from the first 100 bytes of the file without opening the
//! database. Each migration has a version number and runs exactly once.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use rusqlite::Connection;

use crate::error::{IndexerError, Result};

/// Current format version. Increment when adding new migrations.
pub const CURRENT_FORMAT_VERSION: u32 = 2;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const HEADER_LEN: usize = 100;
const USER_VERSION_OFFSET: usize = 60;

/// Migration function type.
type MigrationFn = fn(&Connection) -> Result<()>;

/// All migrations in order. Index + 1 = version number.
const MIGRATIONS: &[MigrationFn] = &[migration_v1_base_schema, migration_v2_position_index];

/// Runs all pending migrations on the database.
///
/// Fails with `FormatMismatch` when the database was written by a newer
/// format than this build understands; nothing is modified in that case.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_format_version(conn)?;
    check_supported(current_version)?;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version > current_version {
            let tx = conn.unchecked_transaction()?;
            migration(&tx)?;
            set_format_version(&tx, version)?;
            tx.commit()?;
            tracing::debug!("Applied index migration v{}", version);
        }
    }

    Ok(())
}

/// Gets the format version stamped in the database header.
pub fn get_format_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version.max(0) as u32)
}

fn set_format_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Rejects versions newer than `CURRENT_FORMAT_VERSION`.
pub fn check_supported(version: u32) -> Result<()> {
    if version > CURRENT_FORMAT_VERSION {
        return Err(IndexerError::FormatMismatch(format!(
            "index format version {} is newer than supported version {}",
            version, CURRENT_FORMAT_VERSION
        )));
    }
    Ok(())
}

/// Reads the format version from the file header without opening the database.
///
/// Returns `None` when the file does not exist or is empty (a fresh index),
/// and `Corrupt` when the header is not an SQLite header.
pub fn probe_format_version(path: &Path) -> Result<Option<u32>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut header = Vec::with_capacity(HEADER_LEN);
    file.by_ref().take(HEADER_LEN as u64).read_to_end(&mut header)?;

    if header.is_empty() {
        return Ok(None);
    }
    if header.len() < HEADER_LEN || &header[..SQLITE_MAGIC.len()] != SQLITE_MAGIC {
        return Err(IndexerError::Corrupt(format!(
            "{} is not an index database",
            path.display()
        )));
    }

    let mut raw = [0u8; 4];
    raw.copy_from_slice(&header[USER_VERSION_OFFSET..USER_VERSION_OFFSET + 4]);
    Ok(Some(u32::from_be_bytes(raw)))
}

// ============================================================================
// Migrations
// ============================================================================

/// V1: occurrences, indexed files and the meta table.
fn migration_v1_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- One row per (identifier, file, position, relation)
        CREATE TABLE IF NOT EXISTS occurrences (
            id INTEGER PRIMARY KEY,
            identifier TEXT NOT NULL,
            file_path TEXT NOT NULL,
            line INTEGER NOT NULL,
            column_num INTEGER NOT NULL,
            kind TEXT NOT NULL,
            relation TEXT NOT NULL,
            classifier TEXT NOT NULL DEFAULT '',
            UNIQUE(identifier, file_path, line, column_num, relation)
        );

        CREATE INDEX IF NOT EXISTS idx_occurrences_identifier ON occurrences(identifier, relation);
        CREATE INDEX IF NOT EXISTS idx_occurrences_file ON occurrences(file_path);

        -- Files table, paths relative to the root stored in meta
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            dialect TEXT,
            content_hash TEXT,
            occurrence_count INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// V2: composite index matching the (file, line, column) result order.
fn migration_v2_position_index(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occurrences_position ON occurrences(identifier, file_path, line, column_num)",
        [],
    )?;
    Ok(())
}
