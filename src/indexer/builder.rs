use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::Settings;
use crate::error::{IndexerError, Result};
use crate::index::{Dialect, FileOccurrences, OccurrenceIndex, SqliteIndex};
use crate::indexer::dialect::{partition, DialectTally};
use crate::indexer::extractor::{ExtractionRequest, OccurrenceExtractor};
use crate::indexer::progress::IndexingProgress;
use crate::indexer::walker::FileWalker;

/// Outcome of one build request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub files_indexed: usize,
    /// Unchanged since the last build.
    pub files_skipped: usize,
    pub files_removed: usize,
    pub occurrences: usize,
    pub failed_batches: Vec<String>,
    pub rebuilt_after_mismatch: bool,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Drives the extractor over the project and commits its output.
pub struct IndexBuilder {
    index: Arc<dyn OccurrenceIndex>,
    extractor: Arc<dyn OccurrenceExtractor>,
    walker: FileWalker,
    roots: Vec<PathBuf>,
    working_dir: PathBuf,
    batch_size: usize,
    progress: IndexingProgress,
}

impl IndexBuilder {
    /// `roots[0]` is the directory the extractor runs in.
    pub fn new(
        index: Arc<dyn OccurrenceIndex>,
        extractor: Arc<dyn OccurrenceExtractor>,
        roots: &[PathBuf],
        settings: &Settings,
    ) -> Result<Self> {
        let roots: Vec<PathBuf> = roots.iter().map(|r| absolute(r)).collect();
        let working_dir = roots.first().cloned().ok_or(IndexerError::NoProject)?;

        Ok(Self {
            index,
            extractor,
            walker: FileWalker::new(settings.extensions()),
            roots,
            working_dir,
            batch_size: settings.batch_size.max(1),
            progress: IndexingProgress::new(),
        })
    }

    pub fn with_progress(mut self, progress: IndexingProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &IndexingProgress {
        &self.progress
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn extensions(&self) -> &[String] {
        self.walker.extensions()
    }

    /// Indexes every recognized file under the roots and drops entries for
    /// files that no longer exist.
    pub fn full_build(&self) -> Result<BuildReport> {
        self.run_with_recovery(None)
    }

    /// Re-indexes `files` whose content changed; missing files are removed.
    pub fn incremental_build(&self, files: &[PathBuf]) -> Result<BuildReport> {
        self.run_with_recovery(Some(files))
    }

    fn run_with_recovery(&self, files: Option<&[PathBuf]>) -> Result<BuildReport> {
        let _finish = FinishOnDrop(&self.progress);

        match self.run(files) {
            Err(IndexerError::FormatMismatch(msg)) => {
                tracing::warn!("Index format mismatch ({}), rebuilding from scratch", msg);
                self.index.reset()?;
                let mut report = self.run(None)?;
                report.rebuilt_after_mismatch = true;
                Ok(report)
            }
            other => other,
        }
    }

    fn run(&self, files: Option<&[PathBuf]>) -> Result<BuildReport> {
        self.progress.begin_phase("Indexing");
        let mut report = BuildReport::default();

        let project_files = self.walker.walk_all(&self.roots)?;
        let tally = DialectTally::from_paths(&project_files);
        let project_dialect = tally.project_dialect();
        tracing::debug!(
            "Dialect tally: {} C, {} C++ -> ambiguous headers as {}",
            tally.c_files,
            tally.cpp_files,
            project_dialect
        );

        let (targets, removed, batch_size) = match files {
            None => {
                let present: BTreeSet<String> = project_files.iter().map(|p| path_key(p)).collect();
                let removed: Vec<String> = self
                    .index
                    .indexed_files()?
                    .into_iter()
                    .filter(|f| !present.contains(f))
                    .collect();
                (project_files, removed, None)
            }
            Some(files) => {
                let mut targets = Vec::new();
                let mut removed = Vec::new();
                for file in files {
                    let file = self.normalize(file);
                    if !self.walker.is_supported(&file) {
                        continue;
                    }
                    if file.is_file() {
                        targets.push(file);
                    } else {
                        removed.push(path_key(&file));
                    }
                }
                targets.sort();
                targets.dedup();
                (targets, removed, Some(self.batch_size))
            }
        };

        if !removed.is_empty() {
            tracing::debug!("Removing {} vanished files from the index", removed.len());
            self.index.remove_files(&removed)?;
            report.files_removed = removed.len();
        }

        let mut hashes = HashMap::with_capacity(targets.len());
        let mut pending = Vec::with_capacity(targets.len());
        for file in targets {
            let content = match std::fs::read(&file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", file.display(), e);
                    continue;
                }
            };
            let hash = SqliteIndex::compute_content_hash(&content);
            if batch_size.is_some() && !self.index.file_needs_reindex(&path_key(&file), &hash)? {
                report.files_skipped += 1;
                continue;
            }
            hashes.insert(file.clone(), hash);
            pending.push(file);
        }

        self.progress.start(pending.len());

        for part in partition(&pending, project_dialect) {
            let chunk_size = batch_size.unwrap_or(part.files.len()).max(1);
            for chunk in part.files.chunks(chunk_size) {
                match self.index_batch(chunk, part.dialect, &hashes) {
                    Ok(stored) => {
                        report.files_indexed += chunk.len();
                        report.occurrences += stored;
                        self.progress.inc(chunk.len(), stored);
                    }
                    Err(e @ (IndexerError::ExtractorUnavailable(_) | IndexerError::FormatMismatch(_))) => {
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Skipping batch of {} {} files starting at {}: {}",
                            chunk.len(),
                            part.dialect,
                            chunk[0].display(),
                            e
                        );
                        report.failed_batches.push(e.to_string());
                        self.progress.inc_error(chunk.len());
                    }
                }
            }
        }

        tracing::info!(
            "Indexed {} files ({} occurrences), {} unchanged, {} removed, {} failed batches",
            report.files_indexed,
            report.occurrences,
            report.files_skipped,
            report.files_removed,
            report.failed_batches.len()
        );
        Ok(report)
    }

    /// Runs the extractor over one chunk and commits all of its files atomically.
    fn index_batch(
        &self,
        chunk: &[PathBuf],
        dialect: Dialect,
        hashes: &HashMap<PathBuf, String>,
    ) -> Result<usize> {
        let extraction = self.extractor.extract(&ExtractionRequest {
            files: chunk,
            dialect,
            working_dir: &self.working_dir,
        })?;

        let mut by_file: HashMap<String, FileOccurrences> = chunk
            .iter()
            .map(|file| {
                let key = path_key(file);
                let mut entry = FileOccurrences::new(key.clone(), Vec::new());
                entry.content_hash = hashes.get(file).cloned();
                entry.dialect = Some(dialect);
                (key, entry)
            })
            .collect();

        let mut resolved: HashMap<String, String> = HashMap::new();
        for mut occurrence in extraction.occurrences {
            let key = match resolved.get(&occurrence.file) {
                Some(key) => key.clone(),
                None => {
                    let key = path_key(&self.normalize(Path::new(&occurrence.file)));
                    resolved.insert(occurrence.file.clone(), key.clone());
                    key
                }
            };
            match by_file.get_mut(&key) {
                Some(entry) => {
                    occurrence.file = key;
                    entry.occurrences.push(occurrence);
                }
                None => tracing::debug!("Ignoring occurrence outside batch: {}", occurrence.position()),
            }
        }

        let mut batch: Vec<FileOccurrences> = by_file.into_values().collect();
        batch.sort_by(|a, b| a.file.cmp(&b.file));
        self.index.replace_file_batch(batch)
    }

    /// Resolves `path` against the project and canonicalizes it, so every
    /// spelling of a file maps to the key the walker produces. Deleted files
    /// keep their name under the canonical parent.
    fn normalize(&self, path: &Path) -> PathBuf {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        };
        if let Ok(canonical) = std::fs::canonicalize(&path) {
            return canonical;
        }
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => std::fs::canonicalize(parent)
                .map(|parent| parent.join(name))
                .unwrap_or(path),
            _ => path,
        }
    }
}

struct FinishOnDrop<'a>(&'a IndexingProgress);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}
