//! Operator-facing expression names
//!
//! Maps short names ("smile") to the `.exp3.json` file IDs VTube Studio
//! uses. The table is fixed once built; expressions the model has beyond
//! it can be listed but not activated by name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Words the command prompt claims for itself
pub const RESERVED_WORDS: [&str; 5] = ["quit", "reset", "list", "help", "off"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Duplicate expression name: {0}")]
    DuplicateName(String),

    #[error("Expression name is reserved for a command: {0}")]
    ReservedName(String),

    #[error("Expression name must be a single non-empty word: {0:?}")]
    InvalidName(String),

    #[error("Expression {name} has an empty file ID")]
    EmptyFile { name: String },
}

/// A catalog row as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub file: String,
}

impl CatalogEntry {
    pub fn new(name: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            file: file.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionCatalog {
    // Names are stored lower-cased, in insertion order
    entries: Vec<(String, String)>,
}

impl ExpressionCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Result<Self, CatalogError> {
        let mut table: Vec<(String, String)> = Vec::new();

        for entry in entries {
            let name = entry.name.trim().to_lowercase();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(CatalogError::InvalidName(entry.name));
            }
            if RESERVED_WORDS.contains(&name.as_str()) {
                return Err(CatalogError::ReservedName(name));
            }
            if table.iter().any(|(n, _)| *n == name) {
                return Err(CatalogError::DuplicateName(name));
            }
            let file = entry.file.trim();
            if file.is_empty() {
                return Err(CatalogError::EmptyFile { name });
            }
            table.push((name, file.to_string()));
        }

        Ok(Self { entries: table })
    }

    /// File ID for a name, ignoring case. Exact match only.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == wanted)
            .map(|(_, file)| file.as_str())
    }

    /// Names in catalog order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// File IDs in catalog order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, f)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ExpressionCatalog {
    fn default() -> Self {
        Self {
            entries: builtin_entries()
                .into_iter()
                .map(|e| (e.name, e.file))
                .collect(),
        }
    }
}

/// Table used when the config file lists no expressions
pub fn builtin_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("angry", "Angry.exp3.json"),
        CatalogEntry::new("smile", "Smile.exp3.json"),
        CatalogEntry::new("sad", "Sad.exp3.json"),
        CatalogEntry::new("surprised", "Surprised.exp3.json"),
        CatalogEntry::new("blush", "Blush.exp3.json"),
        CatalogEntry::new("arms", "bras.exp3.json"),
    ]
}
