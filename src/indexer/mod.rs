pub mod builder;
pub mod dialect;
pub mod extractor;
pub mod progress;
pub mod walker;
pub mod watcher;

pub use builder::{BuildReport, IndexBuilder};
pub use dialect::{DialectTally, FileRole, Partition};
pub use extractor::{
    parse_occurrence_line, Extraction, ExtractionRequest, OccurrenceExtractor, ToksExtractor,
};
pub use progress::{IndexingProgress, ProgressSnapshot};
pub use walker::FileWalker;
pub use watcher::FileWatcher;
