//! C vs C++ classification of the files handed to the extractor.
//!
//! Headers such as `.h` carry no dialect of their own. They follow the
//! project: when C++-style files outnumber pure C files across the whole tree,
//! ambiguous headers are parsed as C++, otherwise as C.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::index::Dialect;

const C_SOURCE: &[&str] = &["c"];
const CPP_SOURCE: &[&str] = &["cc", "cpp", "cxx", "c++", "C"];
const CPP_HEADER: &[&str] = &["hh", "hpp", "hxx", "h++"];
/// Included fragments with no dialect of their own; they never count toward the tally.
const AMBIGUOUS_HEADER: &[&str] = &["h", "inl", "ipp", "tcc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileRole {
    Source,
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtensionClass {
    CSource,
    CppSource,
    CppHeader,
    AmbiguousHeader,
    Other,
}

fn classify(path: &Path) -> ExtensionClass {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if C_SOURCE.contains(&ext) {
        ExtensionClass::CSource
    } else if CPP_SOURCE.contains(&ext) {
        ExtensionClass::CppSource
    } else if CPP_HEADER.contains(&ext) {
        ExtensionClass::CppHeader
    } else if AMBIGUOUS_HEADER.contains(&ext) {
        ExtensionClass::AmbiguousHeader
    } else {
        ExtensionClass::Other
    }
}

pub fn role_of(path: &Path) -> FileRole {
    match classify(path) {
        ExtensionClass::CppHeader | ExtensionClass::AmbiguousHeader => FileRole::Header,
        _ => FileRole::Source,
    }
}

/// Dialect of one file given the project-wide dialect for ambiguous files.
pub fn dialect_of(path: &Path, project: Dialect) -> Dialect {
    match classify(path) {
        ExtensionClass::CSource => Dialect::C,
        ExtensionClass::CppSource | ExtensionClass::CppHeader => Dialect::Cpp,
        ExtensionClass::AmbiguousHeader | ExtensionClass::Other => project,
    }
}

/// Count of pure C versus C++-style files in a project tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialectTally {
    pub c_files: usize,
    pub cpp_files: usize,
}

impl DialectTally {
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        let mut tally = Self::default();
        for path in paths {
            match classify(path) {
                ExtensionClass::CSource => tally.c_files += 1,
                ExtensionClass::CppSource | ExtensionClass::CppHeader => tally.cpp_files += 1,
                _ => {}
            }
        }
        tally
    }

    /// Ties go to C.
    pub fn project_dialect(&self) -> Dialect {
        if self.cpp_files > self.c_files {
            Dialect::Cpp
        } else {
            Dialect::C
        }
    }
}

/// Files that are handed to the extractor in one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub role: FileRole,
    pub dialect: Dialect,
    pub files: Vec<PathBuf>,
}

/// Splits `files` into header/source partitions per dialect, in a stable order.
pub fn partition(files: &[PathBuf], project: Dialect) -> Vec<Partition> {
    let mut groups: BTreeMap<(FileRole, Dialect), Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        groups
            .entry((role_of(file), dialect_of(file, project)))
            .or_default()
            .push(file.clone());
    }

    groups
        .into_iter()
        .map(|((role, dialect), files)| Partition {
            role,
            dialect,
            files,
        })
        .collect()
}
