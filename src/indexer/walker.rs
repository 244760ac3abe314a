use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::Result;

/// Collects source files with a recognized extension under the project roots.
pub struct FileWalker {
    extensions: Vec<String>,
}

impl FileWalker {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if path.is_file() && self.is_supported(path) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Walks every root, dropping files reachable from more than one of them.
    pub fn walk_all(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for root in roots {
            files.extend(self.walk(root)?);
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Extension match is case-sensitive: `.C` is C++, `.c` is C.
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}
