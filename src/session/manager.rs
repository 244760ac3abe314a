//! Per-window session handle.
//!
//! Owns the index, the background job slot, the navigation history and the
//! failure notifications of one editor window (or one CLI invocation).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{locate_index_root, Settings};
use crate::error::Result;
use crate::index::{OccurrenceIndex, OpenOutcome, RelationFilter, SqliteIndex};
use crate::indexer::{
    BuildReport, IndexBuilder, IndexingProgress, OccurrenceExtractor, ProgressSnapshot,
    ToksExtractor,
};
use crate::navigation::{Location, NavigationHistory};
use crate::query::{to_rows, QueryEngine, ResultRow, RipgrepSearch, SearchTool};
use crate::session::notify::{Notifier, Trigger};

/// What a build job covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildScope {
    Full,
    Files(Vec<PathBuf>),
}

pub struct Session {
    settings: Settings,
    index_root: PathBuf,
    index: Arc<SqliteIndex>,
    builder: Arc<IndexBuilder>,
    engine: Arc<QueryEngine>,
    progress: IndexingProgress,
    busy: Arc<AtomicBool>,
    notifier: Notifier,
    history: NavigationHistory,
    pre_lookup: Option<Location>,
    open_outcome: OpenOutcome,
}

impl Session {
    /// Opens the project formed by `folders` with the configured extractor
    /// and search tool.
    pub fn open(folders: &[PathBuf]) -> Result<Self> {
        Self::open_configured(folders, Settings::discover(folders)?)
    }

    pub fn open_configured(folders: &[PathBuf], settings: Settings) -> Result<Self> {
        let extractor = Arc::new(ToksExtractor::from_settings(&settings));
        let search = Arc::new(RipgrepSearch::new(settings.search_command.clone()));
        Self::open_with(folders, settings, extractor, search)
    }

    pub fn open_with(
        folders: &[PathBuf],
        settings: Settings,
        extractor: Arc<dyn OccurrenceExtractor>,
        search: Arc<dyn SearchTool>,
    ) -> Result<Self> {
        let index_root = locate_index_root(folders, &settings.index_file)?;
        let (index, open_outcome) = SqliteIndex::open_or_rebuild(settings.index_path(&index_root))?;
        if open_outcome == OpenOutcome::Recreated {
            tracing::warn!(
                "Replaced incompatible index at {}; a full build is required",
                index.path().display()
            );
        }
        let index = Arc::new(index);

        let progress = IndexingProgress::new();
        let builder = Arc::new(
            IndexBuilder::new(index.clone(), extractor, folders, &settings)?
                .with_progress(progress.clone()),
        );
        let engine = Arc::new(QueryEngine::new(
            index.clone(),
            builder.clone(),
            search,
            settings.search_mode,
        ));

        Ok(Self {
            settings,
            index_root,
            index,
            builder,
            engine,
            progress,
            busy: Arc::new(AtomicBool::new(false)),
            notifier: Notifier::new(),
            history: NavigationHistory::new(),
            pre_lookup: None,
            open_outcome,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    /// Project folders, absolute.
    pub fn roots(&self) -> &[PathBuf] {
        self.builder.roots()
    }

    pub fn index(&self) -> &Arc<SqliteIndex> {
        &self.index
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    pub fn open_outcome(&self) -> OpenOutcome {
        self.open_outcome
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn take_notifications(&self) -> Vec<String> {
        self.notifier.take()
    }

    /// Starts a build on a blocking worker. Returns `None` without doing
    /// anything while another job of this session is still running.
    pub fn spawn_build(
        &self,
        trigger: Trigger,
        scope: BuildScope,
    ) -> Option<JoinHandle<Result<BuildReport>>> {
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("Session busy, dropping {:?} build request", trigger);
            return None;
        };
        let builder = self.builder.clone();
        let notifier = self.notifier.clone();

        Some(tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let result = match scope {
                BuildScope::Full => builder.full_build(),
                BuildScope::Files(files) => builder.incremental_build(&files),
            };
            if let Err(e) = &result {
                notifier.report(trigger, e);
            }
            result
        }))
    }

    /// Runs a user query on a blocking worker; `None` while busy.
    pub fn spawn_query(
        &self,
        identifier: &str,
        filter: RelationFilter,
    ) -> Option<JoinHandle<Result<Vec<ResultRow>>>> {
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("Session busy, dropping query for {}", identifier);
            return None;
        };
        let engine = self.engine.clone();
        let index = self.index.clone();
        let notifier = self.notifier.clone();
        let identifier = identifier.to_string();

        Some(tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let result = engine.query(&identifier, filter).and_then(|occurrences| {
                let root = index.root()?;
                Ok(to_rows(&occurrences, root.as_deref()))
            });
            if let Err(e) = &result {
                notifier.report(Trigger::Explicit, e);
            }
            result
        }))
    }

    /// Drops every indexed occurrence.
    pub fn clear(&self) -> Result<()> {
        self.index.reset()
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    /// Remembers where the cursor was before a result list is shown.
    pub fn begin_lookup(&mut self, current: Location) {
        self.pre_lookup = Some(current);
    }

    /// Ends a lookup. Choosing a result records a jump from the pre-lookup
    /// position and returns the result; cancelling returns the pre-lookup
    /// position without touching the history.
    pub fn finish_lookup(&mut self, selection: Option<&ResultRow>) -> Option<Location> {
        let origin = self.pre_lookup.take();
        match (selection, origin) {
            (Some(row), Some(origin)) => {
                self.history.record_jump(&origin, &row.target);
                Some(row.target.clone())
            }
            (Some(row), None) => Some(row.target.clone()),
            (None, origin) => origin,
        }
    }

    pub fn go_back(&mut self, current: &Location) -> Option<Location> {
        self.history.go_back(current)
    }

    pub fn go_forward(&mut self, current: &Location) -> Option<Location> {
        self.history.go_forward(current)
    }
}

/// Holds the session's busy flag for as long as a job runs.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
