use std::path::Path;

use serde::Serialize;

use crate::index::{Occurrence, Relation, SymbolKind};
use crate::navigation::Location;

/// One query result ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    /// `file:line:col`, relative to the index root when possible.
    pub location: String,
    pub identifier: String,
    /// e.g. `Function definition`
    pub label: String,
    pub target: Location,
}

impl ResultRow {
    pub fn from_occurrence(occurrence: &Occurrence, root: Option<&Path>) -> Self {
        let display_file = root
            .and_then(|root| Path::new(&occurrence.file).strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|| occurrence.file.clone());

        Self {
            location: format!("{}:{}:{}", display_file, occurrence.line, occurrence.column),
            identifier: occurrence.identifier.clone(),
            label: describe(&occurrence.kind, &occurrence.relation),
            target: Location::new(&occurrence.file, occurrence.line, occurrence.column),
        }
    }

    /// Compact single-line form: `location <identifier>`.
    pub fn summary(&self) -> String {
        format!("{} <{}>", self.location, self.identifier)
    }
}

/// `"<Kind label> <relation label>"`. If either code is unknown both are
/// shown as raw codes instead.
pub fn describe(kind: &SymbolKind, relation: &Relation) -> String {
    match (kind.label(), relation.label()) {
        (Some(kind), Some(relation)) => format!("{} {}", kind, relation),
        _ => format!("{} {}", kind.code(), relation.code()),
    }
}

pub fn to_rows(occurrences: &[Occurrence], root: Option<&Path>) -> Vec<ResultRow> {
    occurrences
        .iter()
        .map(|occurrence| ResultRow::from_occurrence(occurrence, root))
        .collect()
}
