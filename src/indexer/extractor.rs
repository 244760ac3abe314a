use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Settings;
use crate::error::{IndexerError, Result};
use crate::index::{Dialect, Occurrence, Relation, SymbolKind};

/// `path:line:col identifier KIND RELATION opaque`
static OCCURRENCE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+):(\d+):(\d+) (\S+) (\S+) (\S+) (\S.*?)\s*$").expect("valid regex")
});

pub struct ExtractionRequest<'a> {
    pub files: &'a [PathBuf],
    pub dialect: Dialect,
    /// Directory the extractor runs in; relative output paths resolve against it.
    pub working_dir: &'a Path,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub occurrences: Vec<Occurrence>,
    pub diagnostics: Vec<String>,
}

/// Turns a batch of source files into classified occurrences.
pub trait OccurrenceExtractor: Send + Sync {
    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction>;
}

/// Runs the external `toks` lexer in batch mode.
pub struct ToksExtractor {
    program: String,
    args: Vec<String>,
    mismatch_marker: String,
}

impl ToksExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>, mismatch_marker: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            mismatch_marker: mismatch_marker.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.extractor_command.clone(),
            settings.extractor_args.clone(),
            settings.format_mismatch_marker.clone(),
        )
    }
}

impl OccurrenceExtractor for ToksExtractor {
    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--lang")
            .arg(request.dialect.as_str())
            .current_dir(request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IndexerError::ExtractorUnavailable(format!("{}: {}", self.program, e)))?;

        let input = file_list(request.files);
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                tracing::warn!("Failed to write file list to {}: {}", self.program, e)
            }
            Err(_) => tracing::warn!("File list writer for {} panicked", self.program),
            _ => {}
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            if stderr.contains(&self.mismatch_marker) || stdout.contains(&self.mismatch_marker) {
                return Err(IndexerError::FormatMismatch(format!(
                    "{} reported: {}",
                    self.program, self.mismatch_marker
                )));
            }
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty() && parse_occurrence_line(l).is_none())
                .unwrap_or("no diagnostics");
            return Err(IndexerError::ExtractorFailed(format!(
                "{} exited with {}: {}",
                self.program, output.status, detail
            )));
        }

        let mut extraction = Extraction::default();
        for line in stderr.lines().chain(stdout.lines()) {
            match parse_occurrence_line(line) {
                Some(mut occurrence) => {
                    let path = Path::new(&occurrence.file);
                    if path.is_relative() {
                        occurrence.file = request.working_dir.join(path).to_string_lossy().into_owned();
                    }
                    extraction.occurrences.push(occurrence);
                }
                None if !line.trim().is_empty() => {
                    tracing::debug!("{}: {}", self.program, line);
                    extraction.diagnostics.push(line.to_string());
                }
                None => {}
            }
        }

        Ok(extraction)
    }
}

fn file_list(files: &[PathBuf]) -> String {
    let mut input = String::new();
    for file in files {
        input.push_str(&file.to_string_lossy());
        input.push('\n');
    }
    input
}

/// Parses one extractor output line; `None` for diagnostics and malformed
/// positions.
pub fn parse_occurrence_line(line: &str) -> Option<Occurrence> {
    let caps = OCCURRENCE_LINE.captures(line.trim_end_matches('\r'))?;
    let line_no: u32 = caps[2].parse().ok()?;
    let column: u32 = caps[3].parse().ok()?;

    let occurrence = Occurrence::new(
        &caps[4],
        &caps[1],
        line_no,
        column,
        SymbolKind::from_code(&caps[5]),
        Relation::from_code(&caps[6]),
    )
    .with_classifier(&caps[7]);

    occurrence.is_valid().then_some(occurrence)
}
