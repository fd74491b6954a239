// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path mapping rules.
//!
//! A rule rewrites paths under a source prefix to a destination prefix.
//! Matching is component-wise in the rule's own path format; the result
//! is rendered with the host OS separator. Rules are applied longest
//! source path first; the first matching rule wins.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The path syntax a rule's source path is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFormat {
    Posix,
    Windows,
}

impl PathFormat {
    /// The format of the host this process runs on.
    pub fn host() -> Self {
        if cfg!(windows) {
            PathFormat::Windows
        } else {
            PathFormat::Posix
        }
    }

    fn separator(&self) -> char {
        match self {
            PathFormat::Posix => '/',
            PathFormat::Windows => '\\',
        }
    }

    fn is_separator(&self, c: char) -> bool {
        match self {
            PathFormat::Posix => c == '/',
            // Windows tooling accepts both separators on input.
            PathFormat::Windows => c == '\\' || c == '/',
        }
    }

    fn components_eq(&self, a: &str, b: &str) -> bool {
        match self {
            PathFormat::Posix => a == b,
            PathFormat::Windows => a.eq_ignore_ascii_case(b),
        }
    }
}

impl Serialize for PathFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathFormat::Posix => serializer.serialize_str("POSIX"),
            PathFormat::Windows => serializer.serialize_str("WINDOWS"),
        }
    }
}

impl<'de> Deserialize<'de> for PathFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_uppercase().as_str() {
            "POSIX" => Ok(PathFormat::Posix),
            "WINDOWS" => Ok(PathFormat::Windows),
            other => Err(serde::de::Error::custom(format!(
                "unknown path format: {other}"
            ))),
        }
    }
}

/// Errors constructing a rule from its wire representation.
#[derive(Debug, Error)]
pub enum PathMappingError {
    #[error("invalid path mapping rule: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("empty path mapping rule")]
    Empty,
}

/// One source-prefix → destination-prefix rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathMappingRule {
    pub source_path_format: PathFormat,
    pub source_path: String,
    pub destination_path: String,
}

/// Split a path into pathlib-style components.
///
/// An absolute path contributes a root component (`/`, `\`, or `C:\`);
/// empty and `.` segments are dropped.
fn components(path: &str, format: PathFormat) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut rest = path;
    if format == PathFormat::Windows {
        let bytes = rest.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            let anchored = rest
                .chars()
                .nth(2)
                .is_some_and(|c| format.is_separator(c));
            if anchored {
                parts.push(format!("{}\\", &rest[..2]));
            } else {
                parts.push(rest[..2].to_string());
            }
            rest = &rest[2..];
        } else if rest.starts_with(|c| format.is_separator(c)) {
            parts.push("\\".to_string());
        }
    } else if rest.starts_with('/') {
        parts.push("/".to_string());
    }
    parts.extend(
        rest.split(|c| format.is_separator(c))
            .filter(|s| !s.is_empty() && *s != ".")
            .map(String::from),
    );
    parts
}

/// Join components back into a path using the host separator.
fn render(parts: &[String], format: PathFormat) -> String {
    let sep = format.separator();
    match parts.split_first() {
        None => String::new(),
        Some((root, rest)) if root.ends_with(['/', '\\']) => {
            format!("{}{}", root, rest.join(&sep.to_string()))
        }
        Some((first, rest)) => {
            let mut out = first.clone();
            for part in rest {
                out.push(sep);
                out.push_str(part);
            }
            out
        }
    }
}

impl PathMappingRule {
    pub fn new(
        source_path_format: PathFormat,
        source_path: impl Into<String>,
        destination_path: impl Into<String>,
    ) -> Self {
        Self {
            source_path_format,
            source_path: source_path.into(),
            destination_path: destination_path.into(),
        }
    }

    /// Build a rule from its wire dict representation.
    pub fn from_dict(value: &serde_json::Value) -> Result<Self, PathMappingError> {
        if value.as_object().is_some_and(|o| o.is_empty()) {
            return Err(PathMappingError::Empty);
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// The wire dict representation of this rule.
    pub fn to_dict(&self) -> serde_json::Value {
        // Unwrap is safe: the struct serializes to a plain string map.
        #[allow(clippy::unwrap_used)]
        serde_json::to_value(self).unwrap()
    }

    /// Number of components in the source path. Rules with more specific
    /// (longer) source paths are applied first.
    pub fn specificity(&self) -> usize {
        components(&self.source_path, self.source_path_format).len()
    }

    /// Apply this rule to `path` if the rule's source path is an ancestor
    /// of it.
    ///
    /// Returns the remapped path rendered with the host separator, with a
    /// trailing separator preserved when the input carried one. Does not
    /// collapse `..` since symbolic links could be in play. Returns `None`
    /// when the rule does not match.
    pub fn apply(&self, path: &str) -> Option<String> {
        let format = self.source_path_format;
        let input_parts = components(path, format);
        let source_parts = components(&self.source_path, format);
        if input_parts.len() < source_parts.len() {
            return None;
        }
        let is_ancestor = source_parts
            .iter()
            .zip(&input_parts)
            .all(|(a, b)| format.components_eq(a, b));
        if !is_ancestor {
            return None;
        }

        let host = PathFormat::host();
        let mut remapped = components(&self.destination_path, host);
        remapped.extend(input_parts[source_parts.len()..].iter().cloned());
        let mut result = render(&remapped, host);
        if path.ends_with(format.separator()) {
            result.push(host.separator());
        }
        Some(result)
    }
}

/// Order rules longest source path first, preserving the given order
/// between rules of equal specificity.
pub fn sort_rules_for_application(rules: &mut [PathMappingRule]) {
    rules.sort_by_key(|rule| std::cmp::Reverse(rule.specificity()));
}

#[cfg(test)]
#[path = "path_mapping_tests.rs"]
mod tests;
