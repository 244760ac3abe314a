use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification the extractor attaches to each identifier occurrence.
///
/// Codes the extractor emits but this build does not know are kept verbatim in
/// `Other` so they survive storage and can still be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    Identifier,
    Macro,
    MacroFunction,
    Function,
    Struct,
    Union,
    Enum,
    EnumValue,
    Class,
    StructType,
    UnionType,
    EnumType,
    FunctionType,
    Type,
    Var,
    Namespace,
    Other(String),
}

impl SymbolKind {
    /// Wire code as written by the extractor and stored in the index.
    pub fn code(&self) -> &str {
        match self {
            SymbolKind::Identifier => "IDENTIFIER",
            SymbolKind::Macro => "MACRO",
            SymbolKind::MacroFunction => "MACRO_FUNCTION",
            SymbolKind::Function => "FUNCTION",
            SymbolKind::Struct => "STRUCT",
            SymbolKind::Union => "UNION",
            SymbolKind::Enum => "ENUM",
            SymbolKind::EnumValue => "ENUM_VAL",
            SymbolKind::Class => "CLASS",
            SymbolKind::StructType => "STRUCT_TYPE",
            SymbolKind::UnionType => "UNION_TYPE",
            SymbolKind::EnumType => "ENUM_TYPE",
            SymbolKind::FunctionType => "FUNCTION_TYPE",
            SymbolKind::Type => "TYPE",
            SymbolKind::Var => "VAR",
            SymbolKind::Namespace => "NAMESPACE",
            SymbolKind::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "IDENTIFIER" => SymbolKind::Identifier,
            "MACRO" => SymbolKind::Macro,
            "MACRO_FUNCTION" => SymbolKind::MacroFunction,
            "FUNCTION" => SymbolKind::Function,
            "STRUCT" => SymbolKind::Struct,
            "UNION" => SymbolKind::Union,
            "ENUM" => SymbolKind::Enum,
            "ENUM_VAL" => SymbolKind::EnumValue,
            "CLASS" => SymbolKind::Class,
            "STRUCT_TYPE" => SymbolKind::StructType,
            "UNION_TYPE" => SymbolKind::UnionType,
            "ENUM_TYPE" => SymbolKind::EnumType,
            "FUNCTION_TYPE" => SymbolKind::FunctionType,
            "TYPE" => SymbolKind::Type,
            "VAR" => SymbolKind::Var,
            "NAMESPACE" => SymbolKind::Namespace,
            other => SymbolKind::Other(other.to_string()),
        }
    }

    /// Human readable label, `None` for unknown codes.
    pub fn label(&self) -> Option<&'static str> {
        let label = match self {
            SymbolKind::Identifier => "Identifier",
            SymbolKind::Macro => "Macro",
            SymbolKind::MacroFunction => "Macro function",
            SymbolKind::Function => "Function",
            SymbolKind::Struct => "Structure",
            SymbolKind::Union => "Union",
            SymbolKind::Enum => "Enum",
            SymbolKind::EnumValue => "Enum value",
            SymbolKind::Class => "Class",
            SymbolKind::StructType => "Structure type",
            SymbolKind::UnionType => "Union type",
            SymbolKind::EnumType => "Enum type",
            SymbolKind::FunctionType => "Function type",
            SymbolKind::Type => "Type",
            SymbolKind::Var => "Variable",
            SymbolKind::Namespace => "Namespace",
            SymbolKind::Other(_) => return None,
        };
        Some(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    Reference,
    Definition,
    Declaration,
    Other(String),
}

impl Relation {
    pub fn code(&self) -> &str {
        match self {
            Relation::Reference => "REF",
            Relation::Definition => "DEF",
            Relation::Declaration => "DECL",
            Relation::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "REF" => Relation::Reference,
            "DEF" => Relation::Definition,
            "DECL" => Relation::Declaration,
            other => Relation::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            Relation::Reference => Some("reference"),
            Relation::Definition => Some("definition"),
            Relation::Declaration => Some("declaration"),
            Relation::Other(_) => None,
        }
    }
}

/// Which relations a lookup should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationFilter {
    Reference,
    Definition,
    Declaration,
    #[default]
    Any,
}

impl RelationFilter {
    /// Relation code to match in storage, `None` for `Any`.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            RelationFilter::Reference => Some("REF"),
            RelationFilter::Definition => Some("DEF"),
            RelationFilter::Declaration => Some("DECL"),
            RelationFilter::Any => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationFilter::Reference => "reference",
            RelationFilter::Definition => "definition",
            RelationFilter::Declaration => "declaration",
            RelationFilter::Any => "any",
        }
    }
}

/// Source dialect used to pick the extractor's parsing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dialect {
    C,
    Cpp,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::C => "c",
            Dialect::Cpp => "c++",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded appearance of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub identifier: String,
    pub file: String,
    /// 1-based
    pub line: u32,
    /// 1-based
    pub column: u32,
    pub kind: SymbolKind,
    pub relation: Relation,
    /// Trailing extractor token, preserved but never interpreted.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub classifier: String,
}

impl Occurrence {
    pub fn new(
        identifier: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        column: u32,
        kind: SymbolKind,
        relation: Relation,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            file: file.into(),
            line,
            column,
            kind,
            relation,
            classifier: String::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = classifier.into();
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.identifier.is_empty() && !self.file.is_empty() && self.line >= 1 && self.column >= 1
    }

    /// `file:line:col`, the encoded position editors understand.
    pub fn position(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.column)
    }
}

/// New content for one file in a `replace_file_batch` call.
#[derive(Debug, Clone, Default)]
pub struct FileOccurrences {
    pub file: String,
    pub content_hash: Option<String>,
    pub dialect: Option<Dialect>,
    pub occurrences: Vec<Occurrence>,
}

impl FileOccurrences {
    pub fn new(file: impl Into<String>, occurrences: Vec<Occurrence>) -> Self {
        Self {
            file: file.into(),
            content_hash: None,
            dialect: None,
            occurrences,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub format_version: u32,
    pub root: Option<String>,
    pub total_files: usize,
    pub total_identifiers: usize,
    pub total_occurrences: usize,
    pub occurrences_by_relation: Vec<(String, usize)>,
    pub files_by_dialect: Vec<(String, usize)>,
}
