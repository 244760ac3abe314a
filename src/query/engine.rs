use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::QueryMode;
use crate::error::Result;
use crate::index::{Occurrence, OccurrenceIndex, RelationFilter};
use crate::indexer::IndexBuilder;
use crate::query::search::{self, SearchTool};

/// Answers identifier queries, indexing whatever the mode requires first.
pub struct QueryEngine {
    index: Arc<dyn OccurrenceIndex>,
    builder: Arc<IndexBuilder>,
    search: Arc<dyn SearchTool>,
    mode: QueryMode,
}

impl QueryEngine {
    pub fn new(
        index: Arc<dyn OccurrenceIndex>,
        builder: Arc<IndexBuilder>,
        search: Arc<dyn SearchTool>,
        mode: QueryMode,
    ) -> Self {
        Self {
            index,
            builder,
            search,
            mode,
        }
    }

    /// Files under the project roots whose text may contain `pattern`.
    pub fn candidate_files(&self, pattern: &str) -> Result<BTreeSet<PathBuf>> {
        search::candidate_files(
            self.search.as_ref(),
            pattern,
            self.builder.roots(),
            self.builder.extensions(),
        )
    }

    /// Occurrences of `identifier` ordered by (file, line, column). Patterns
    /// with `*` or `?` match any identifier of that shape.
    pub fn query(&self, identifier: &str, filter: RelationFilter) -> Result<Vec<Occurrence>> {
        match self.mode {
            QueryMode::Indexed => {
                if self.index.is_empty()? {
                    tracing::info!("Index is empty, building it before the first query");
                    self.builder.full_build()?;
                }
            }
            QueryMode::SearchThenIndex => {
                self.builder.progress().begin_phase("Searching");
                let candidates = self
                    .candidate_files(identifier)
                    .inspect_err(|_| self.builder.progress().finish())?;
                tracing::debug!("{} candidate files for {}", candidates.len(), identifier);
                if !candidates.is_empty() {
                    let files: Vec<PathBuf> = candidates.into_iter().collect();
                    self.builder.incremental_build(&files)?;
                }
                self.builder.progress().finish();
            }
        }

        let results = if search::has_wildcards(identifier) {
            self.index.lookup_matching(identifier, filter)?
        } else {
            self.index.lookup(identifier, filter)?
        };
        tracing::debug!(
            "{} {} results for {}",
            results.len(),
            filter.as_str(),
            identifier
        );
        Ok(results)
    }
}
