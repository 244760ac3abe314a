pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod navigation;
pub mod query;
pub mod session;

pub use config::{locate_index_root, QueryMode, Settings};
pub use error::{IndexerError, Result};
pub use index::sqlite::SqliteIndex;
pub use index::{
    probe_format_version, Dialect, FileOccurrences, IndexStats, Occurrence, OccurrenceIndex,
    OpenOutcome, Relation, RelationFilter, SymbolKind, CURRENT_FORMAT_VERSION,
};
pub use indexer::{
    BuildReport, FileWalker, IndexBuilder, IndexingProgress, OccurrenceExtractor, ToksExtractor,
};
pub use navigation::{Location, NavigationHistory};
pub use query::{QueryEngine, ResultRow, RipgrepSearch, SearchTool};
pub use session::{BuildScope, Session, Trigger};
