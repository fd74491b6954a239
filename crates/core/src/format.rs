// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Format strings and the symbol table they resolve against.
//!
//! Commands, arguments, embedded-file bodies, and declared environment
//! variable values are all format strings: literal text with `{{Name}}`
//! references into a [`SymbolTable`] of fully-qualified value names such
//! as `Session.WorkingDirectory` or `Task.Param.Frame`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Regex for a `{{ Fully.Qualified.Name }}` reference.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
        .expect("constant regex pattern is valid")
});

/// Errors from resolving a format string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatStringError {
    #[error("expression references unknown value: {0}")]
    UnknownSymbol(String),
    #[error("unterminated or malformed expression at offset {0}")]
    Malformed(usize),
}

/// Mapping from fully-qualified value names to their string values.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    values: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table seeded with all entries of `source`.
    pub fn derived(source: &SymbolTable) -> Self {
        Self {
            values: source.values.clone(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// A template string containing `{{Name}}` references.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FormatString(String);

impl FormatString {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The unresolved template text.
    pub fn template(&self) -> &str {
        &self.0
    }

    /// Resolve every reference against `symtab`.
    ///
    /// Literal text passes through verbatim. A reference to a name that is
    /// not in the table, or a `{{` with no closing `}}`, is an error.
    pub fn resolve(&self, symtab: &SymbolTable) -> Result<String, FormatStringError> {
        let mut result = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        let mut offset = 0usize;
        while let Some(open) = rest.find("{{") {
            result.push_str(&rest[..open]);
            let tail = &rest[open..];
            match REFERENCE_PATTERN.find(tail) {
                Some(m) if m.start() == 0 => {
                    // Unwrap is safe: find() above matched the same pattern.
                    #[allow(clippy::unwrap_used)]
                    let caps = REFERENCE_PATTERN.captures(m.as_str()).unwrap();
                    let name = &caps[1];
                    match symtab.get(name) {
                        Some(value) => result.push_str(value),
                        None => return Err(FormatStringError::UnknownSymbol(name.to_string())),
                    }
                    offset += open + m.end();
                    rest = &rest[open + m.end()..];
                }
                _ => return Err(FormatStringError::Malformed(offset + open)),
            }
        }
        result.push_str(rest);
        Ok(result)
    }
}

impl From<&str> for FormatString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FormatString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for FormatString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
