//! Project settings.
//!
//! Settings live in `.toks.toml` at the project root; every key is optional
//! and falls back to the defaults below. The index database sits next to it.
//!
//! ```toml
//! filename_extensions = "c|h|cpp|hpp"
//! prompt_before_searching = true
//! batch_size = 16
//! search_mode = "search"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

pub const CONFIG_FILENAME: &str = ".toks.toml";
pub const DEFAULT_INDEX_FILENAME: &str = ".toks-index.db";
pub const DEFAULT_EXTENSIONS: &str = "c|h|cc|cpp|cxx|c++|hh|hpp|hxx|h++|inl";
pub const DEFAULT_MISMATCH_MARKER: &str = "index format version too old";

/// How queries make sure the files they read are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Query a project-wide index that is kept up to date on save.
    #[default]
    Indexed,
    /// Shortlist files with the search tool and index only those first.
    #[serde(rename = "search")]
    SearchThenIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pipe-delimited list of extensions treated as source code.
    pub filename_extensions: String,
    /// Ask the user to edit the detected identifier before querying.
    pub prompt_before_searching: bool,
    pub extractor_command: String,
    pub extractor_args: Vec<String>,
    /// Diagnostic substring the extractor prints when the on-disk format is too old.
    pub format_mismatch_marker: String,
    pub search_command: String,
    /// Files per extractor invocation for incremental builds.
    pub batch_size: usize,
    pub index_file: String,
    pub search_mode: QueryMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filename_extensions: DEFAULT_EXTENSIONS.to_string(),
            prompt_before_searching: false,
            extractor_command: "toks".to_string(),
            extractor_args: vec!["-F".to_string(), "-".to_string()],
            format_mismatch_marker: DEFAULT_MISMATCH_MARKER.to_string(),
            search_command: "rg".to_string(),
            batch_size: 8,
            index_file: DEFAULT_INDEX_FILENAME.to_string(),
            search_mode: QueryMode::Indexed,
        }
    }
}

impl Settings {
    /// Loads `.toks.toml` from `project_root`, or defaults when it is absent.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let settings = Self::from_toml_str(&content)
            .map_err(|e| IndexerError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings of the project formed by `folders`, read from the folder that
    /// holds (or will hold) the index. Each folder is checked for the index
    /// file its own configuration names.
    pub fn discover(folders: &[PathBuf]) -> Result<Self> {
        for folder in folders {
            let settings = Self::load(folder)?;
            if settings.index_path(folder).is_file() {
                return Ok(settings);
            }
        }
        let first = folders.first().ok_or(IndexerError::NoProject)?;
        Self::load(first)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| IndexerError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be at least 1".into()));
        }
        if self.extensions().is_empty() {
            return Err(IndexerError::Config(
                "filename_extensions must name at least one extension".into(),
            ));
        }
        if self.index_file.trim().is_empty() {
            return Err(IndexerError::Config("index_file must not be empty".into()));
        }
        Ok(())
    }

    /// Recognized extensions without leading dots, in configuration order.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = Vec::new();
        for ext in self.filename_extensions.split('|') {
            let ext = ext.trim().trim_start_matches('.');
            if !ext.is_empty() && !extensions.iter().any(|e| e == ext) {
                extensions.push(ext.to_string());
            }
        }
        extensions
    }

    pub fn index_path(&self, index_root: &Path) -> PathBuf {
        index_root.join(&self.index_file)
    }
}

/// Picks the folder that owns the index: the first project folder already
/// holding an index file, otherwise the first folder.
pub fn locate_index_root(folders: &[PathBuf], index_file: &str) -> Result<PathBuf> {
    folders
        .iter()
        .find(|dir| dir.join(index_file).is_file())
        .or_else(|| folders.first())
        .cloned()
        .ok_or(IndexerError::NoProject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.prompt_before_searching);
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.search_mode, QueryMode::Indexed);
        assert!(settings.extensions().contains(&"c".to_string()));
        assert!(settings.extensions().contains(&"hpp".to_string()));
    }

    #[test]
    fn test_extensions_parsing() {
        let settings = Settings {
            filename_extensions: " .c | h||cpp|c ".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.extensions(), vec!["c", "h", "cpp"]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            filename_extensions = "c|h"
            prompt_before_searching = true
            search_mode = "search"
            "#,
        )
        .unwrap();
        assert_eq!(settings.extensions(), vec!["c", "h"]);
        assert!(settings.prompt_before_searching);
        assert_eq!(settings.search_mode, QueryMode::SearchThenIndex);
        assert_eq!(settings.extractor_command, "toks");
        assert_eq!(settings.batch_size, 8);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(Settings::from_toml_str("batch_size = 0").is_err());
        assert!(Settings::from_toml_str("filename_extensions = \"|\"").is_err());
        assert!(Settings::from_toml_str("batch_size = \"many\"").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Settings::load(dir.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_from_project() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "batch_size = 3\n").unwrap();
        assert_eq!(Settings::load(dir.path()).unwrap().batch_size, 3);
    }

    #[test]
    fn test_discover_reads_index_root_settings() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join(DEFAULT_INDEX_FILENAME), b"").unwrap();
        std::fs::write(second.path().join(CONFIG_FILENAME), "batch_size = 5\n").unwrap();

        let folders = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(Settings::discover(&folders).unwrap().batch_size, 5);
    }

    #[test]
    fn test_discover_honours_custom_index_file() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(
            second.path().join(CONFIG_FILENAME),
            "index_file = \"symbols.db\"\nbatch_size = 3\n",
        )
        .unwrap();
        std::fs::write(second.path().join("symbols.db"), b"").unwrap();

        let folders = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let settings = Settings::discover(&folders).unwrap();
        assert_eq!(settings.batch_size, 3);
        assert_eq!(
            locate_index_root(&folders, &settings.index_file).unwrap(),
            second.path()
        );
    }

    #[test]
    fn test_discover_without_folders() {
        assert!(matches!(Settings::discover(&[]), Err(IndexerError::NoProject)));
    }

    #[test]
    fn test_locate_index_root_prefers_existing_index() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join(DEFAULT_INDEX_FILENAME), b"").unwrap();

        let folders = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let root = locate_index_root(&folders, DEFAULT_INDEX_FILENAME).unwrap();
        assert_eq!(root, second.path());
    }

    #[test]
    fn test_locate_index_root_falls_back_to_first() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let folders = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let root = locate_index_root(&folders, DEFAULT_INDEX_FILENAME).unwrap();
        assert_eq!(root, first.path());
    }

    #[test]
    fn test_locate_index_root_without_folders() {
        let err = locate_index_root(&[], DEFAULT_INDEX_FILENAME).unwrap_err();
        assert!(matches!(err, IndexerError::NoProject));
    }
}
