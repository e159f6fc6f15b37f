//! Transcript formatting.
//!
//! Formatters turn the raw lower-case transcript into written text. The
//! built-in [`TableFormatter`] reads a substitution table from the
//! formatter model path given to the server.

use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Trait for transcript formatters.
pub trait Formatter: Send + Sync {
    /// Format a transcript.
    fn format(&self, text: &str) -> String;
}

/// Word-substitution formatter.
///
/// The table file holds one `spoken<TAB>written` pair per line; `#` starts a
/// comment. Substitution happens on whole words, then the first letter is
/// capitalised and the sentence terminated with a period.
#[derive(Debug, Clone, Default)]
pub struct TableFormatter {
    substitutions: HashMap<String, String>,
}

impl TableFormatter {
    /// Load a substitution table from `path`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Configuration(format!("Cannot read formatter {:?}: {}", path.as_ref(), e))
        })?;
        let formatter = Self::parse(&content)?;
        debug!(
            "Loaded formatter {:?} with {} substitutions",
            path.as_ref(),
            formatter.substitutions.len()
        );
        Ok(formatter)
    }

    /// Parse a substitution table.
    pub fn parse(content: &str) -> Result<Self> {
        let mut substitutions = HashMap::new();

        for (number, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim_end();
            if line.trim().is_empty() {
                continue;
            }
            let (spoken, written) = line.split_once('\t').ok_or_else(|| {
                AppError::Configuration(format!(
                    "Formatter line {} is not a tab-separated pair",
                    number + 1
                ))
            })?;
            substitutions.insert(spoken.trim().to_lowercase(), written.trim().to_string());
        }

        Ok(Self { substitutions })
    }
}

impl Formatter for TableFormatter {
    fn format(&self, text: &str) -> String {
        let mut formatted = text
            .split_whitespace()
            .map(|word| {
                self.substitutions
                    .get(&word.to_lowercase())
                    .map(String::as_str)
                    .unwrap_or(word)
            })
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if formatted.is_empty() {
            return formatted;
        }

        if let Some(first) = formatted.chars().next() {
            let upper: String = first.to_uppercase().collect();
            formatted.replace_range(..first.len_utf8(), &upper);
        }
        if !formatted.ends_with(['.', '?', '!']) {
            formatted.push('.');
        }
        formatted
    }
}
