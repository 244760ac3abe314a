use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{IndexerError, Result};

/// Shortlists files that may mention an identifier.
pub trait SearchTool: Send + Sync {
    /// Files under `roots` with one of `extensions` whose text matches `regex`.
    fn search(&self, regex: &str, extensions: &[String], roots: &[PathBuf]) -> Result<BTreeSet<PathBuf>>;
}

/// ripgrep in files-with-matches mode.
pub struct RipgrepSearch {
    program: String,
}

impl RipgrepSearch {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for RipgrepSearch {
    fn default() -> Self {
        Self::new("rg")
    }
}

impl SearchTool for RipgrepSearch {
    fn search(&self, regex: &str, extensions: &[String], roots: &[PathBuf]) -> Result<BTreeSet<PathBuf>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-l", "--no-messages", "-e", regex]);
        for ext in extensions {
            cmd.arg("-g").arg(format!("*.{}", ext));
        }
        cmd.args(roots);

        tracing::debug!("Searching for /{}/ with {}", regex, self.program);
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| IndexerError::SearchToolUnavailable(format!("{}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            // rg exits 1 when nothing matched and 2 on unreadable files
            tracing::debug!("{} exited with {} and no matches", self.program, output.status);
            return Ok(BTreeSet::new());
        }

        let base = roots.first().map(PathBuf::as_path).unwrap_or(Path::new(""));
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                let path = Path::new(l);
                if path.is_absolute() || roots.iter().any(|r| path.starts_with(r)) {
                    path.to_path_buf()
                } else {
                    base.join(path)
                }
            })
            .collect())
    }
}

pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Turns an identifier pattern into a whole-word regex: `*` matches any run
/// of identifier characters, `?` exactly one.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::from(r"\b");
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str("[A-Za-z0-9_]*"),
            '?' => regex.push_str("[A-Za-z0-9_]"),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    regex.push_str(r"\b");
    regex
}

/// Candidate files for `pattern`; an empty set is a valid answer.
pub fn candidate_files(
    tool: &dyn SearchTool,
    pattern: &str,
    roots: &[PathBuf],
    extensions: &[String],
) -> Result<BTreeSet<PathBuf>> {
    let regex = wildcard_to_regex(pattern);
    tool.search(&regex, extensions, roots)
}
