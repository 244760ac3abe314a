pub mod migrations;
pub mod models;
pub mod sqlite;

use std::collections::BTreeMap;

use crate::error::Result;
pub use migrations::{probe_format_version, CURRENT_FORMAT_VERSION};
pub use models::*;
pub use sqlite::{OpenOutcome, SqliteIndex};

/// Persistent identifier → occurrence store.
///
/// Implementations serialize writers internally and must hand readers a
/// consistent snapshot: a lookup never observes part of a batch.
pub trait OccurrenceIndex: Send + Sync {
    /// Atomically replaces every file key in the map: old occurrences of those
    /// files are removed, the new ones inserted, and the batch is durable once
    /// this returns. Returns the number of occurrences stored.
    fn replace_files(&self, occurrences_by_file: BTreeMap<String, Vec<Occurrence>>) -> Result<usize>;
    /// Like `replace_files`, also recording content hash and dialect per file.
    fn replace_file_batch(&self, batch: Vec<FileOccurrences>) -> Result<usize>;
    fn remove_files(&self, files: &[String]) -> Result<()>;

    /// Occurrences of exactly `identifier`, ordered by (file, line, column).
    fn lookup(&self, identifier: &str, filter: RelationFilter) -> Result<Vec<Occurrence>>;
    /// Occurrences whose identifier matches a `*`/`?` wildcard pattern.
    fn lookup_matching(&self, pattern: &str, filter: RelationFilter) -> Result<Vec<Occurrence>>;

    fn indexed_files(&self) -> Result<Vec<String>>;
    fn file_needs_reindex(&self, file_path: &str, new_content_hash: &str) -> Result<bool>;
    fn stats(&self) -> Result<IndexStats>;
    fn is_empty(&self) -> Result<bool>;
    /// Drops all indexed data, keeping the store open at the current format.
    fn reset(&self) -> Result<()>;
}
