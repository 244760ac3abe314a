//! Back/forward history over source locations.
//!
//! Both stacks are kept most-recent-last internally and exposed
//! most-recent-first. A location without a file (an unsaved buffer) is never
//! recorded and never compares equal to anything, including itself.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub file: Option<PathBuf>,
    /// 1-based
    pub line: u32,
    /// 1-based
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }

    /// A position in a buffer that has no file on disk.
    pub fn unsaved(line: u32, column: u32) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn is_recordable(&self) -> bool {
        self.file.is_some()
    }

    /// `file:line:col`, the form editors accept for "open at position".
    pub fn encoded(&self) -> Option<String> {
        self.file
            .as_ref()
            .map(|f| format!("{}:{}:{}", f.display(), self.line, self.column))
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        match (&self.file, &other.file) {
            (Some(a), Some(b)) => a == b && self.line == other.line && self.column == other.column,
            _ => false,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file.display(), self.line, self.column),
            None => write!(f, "<unsaved>:{}:{}", self.line, self.column),
        }
    }
}

impl FromStr for Location {
    type Err = String;

    /// Parses `file:line:col`; the file part may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let column = parts.next();
        let line = parts.next();
        let file = parts.next();
        match (file, line, column) {
            (Some(file), Some(line), Some(column)) if !file.is_empty() => {
                let line = line.parse().map_err(|_| format!("invalid line in {s:?}"))?;
                let column = column.parse().map_err(|_| format!("invalid column in {s:?}"))?;
                Ok(Location::new(file, line, column))
            }
            _ => Err(format!("expected file:line:col, got {s:?}")),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct NavigationHistory {
    back: Vec<Location>,
    forward: Vec<Location>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a jump from `source` to `destination`; clears the forward stack.
    pub fn record_jump(&mut self, source: &Location, destination: &Location) {
        push_unless_top(&mut self.back, source);
        push_unless_top(&mut self.back, destination);
        self.forward.clear();
    }

    /// Returns where to navigate, or `None` when there is no history.
    pub fn go_back(&mut self, current: &Location) -> Option<Location> {
        if self.back.is_empty() {
            return None;
        }

        push_unless_top(&mut self.forward, current);
        while self.back.len() > 1 && self.back.last() == Some(current) {
            self.back.pop();
        }

        let destination = self.back.last()?.clone();
        while self.forward.len() > 1 && self.forward.last() == Some(&destination) {
            self.forward.pop();
        }
        Some(destination)
    }

    pub fn go_forward(&mut self, current: &Location) -> Option<Location> {
        let destination = self.forward.pop()?;
        push_unless_top(&mut self.back, current);
        push_unless_top(&mut self.back, &destination);
        Some(destination)
    }

    /// Most recent first.
    pub fn back(&self) -> impl Iterator<Item = &Location> {
        self.back.iter().rev()
    }

    /// Most recent first.
    pub fn forward(&self) -> impl Iterator<Item = &Location> {
        self.forward.iter().rev()
    }

    pub fn can_go_back(&self) -> bool {
        !self.back.is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }

    pub fn clear(&mut self) {
        self.back.clear();
        self.forward.clear();
    }
}

fn push_unless_top(stack: &mut Vec<Location>, location: &Location) {
    if location.is_recordable() && stack.last() != Some(location) {
        stack.push(location.clone());
    }
}
