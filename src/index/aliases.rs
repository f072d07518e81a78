//! Canonical search term resolution.
//!
//! Each configured row maps one canonical term to a set of alias
//! spellings. A title resolves to a row's canonical term when it contains
//! any of the row's spellings as a whole word, case-insensitively.

use regex::Regex;

use crate::error::Result;
use crate::models::AliasGroup;

struct AliasRow {
    canonical: String,
    patterns: Vec<Regex>,
}

/// Compiled alias table.
pub struct AliasTable {
    rows: Vec<AliasRow>,
}

impl AliasTable {
    /// Compile the configured alias rows. The canonical term itself counts
    /// as one of its own aliases.
    pub fn from_config(groups: &[AliasGroup]) -> Result<Self> {
        let mut rows = Vec::with_capacity(groups.len());
        for group in groups {
            let mut patterns = Vec::with_capacity(group.aliases.len() + 1);
            for alias in std::iter::once(&group.canonical).chain(&group.aliases) {
                patterns.push(Regex::new(&format!(r"(?i)\b{}\b", regex::escape(alias)))?);
            }
            rows.push(AliasRow {
                canonical: group.canonical.clone(),
                patterns,
            });
        }
        Ok(Self { rows })
    }

    /// Canonical terms whose row matches the title, in row order. Each row
    /// contributes at most once.
    pub fn matches(&self, title: &str) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|row| row.patterns.iter().any(|p| p.is_match(title)))
            .map(|row| row.canonical.as_str())
            .collect()
    }

    /// The first canonical term the text resolves to, if any.
    pub fn resolve(&self, text: &str) -> Option<&str> {
        self.matches(text).into_iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
