pub mod engine;
pub mod format;
pub mod search;

pub use engine::QueryEngine;
pub use format::{describe, to_rows, ResultRow};
pub use search::{candidate_files, has_wildcards, wildcard_to_regex, RipgrepSearch, SearchTool};
