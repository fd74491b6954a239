// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable change tracking.
//!
//! Each entered Environment accumulates a simplified set of variable
//! mutations: the variables it declared, plus any `openjd_env:` /
//! `openjd_unset_env:` messages its actions emitted. The session replays
//! these, in enter order, over the baseline process environment to build
//! the effective environment for each Action.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static ENV_VAR_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("constant regex pattern is valid"));

/// True iff `name` is a valid environment-variable name
/// (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_env_var_name(name: &str) -> bool {
    ENV_VAR_NAME_PATTERN.is_match(name)
}

/// One ordered mutation to the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentVariableChange {
    Set { name: String, value: String },
    Unset { name: String },
}

impl EnvironmentVariableChange {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Self::Unset { name: name.into() }
    }
}

/// The variables one Environment needs set and unset.
///
/// A value of `None` means "unset that variable". Later changes to the
/// same name replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimplifiedEnvironmentVariableChanges {
    to_set: IndexMap<String, Option<String>>,
}

impl SimplifiedEnvironmentVariableChanges {
    /// Start from an Environment's declared (already resolved) variables.
    pub fn new(initial: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            to_set: initial.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Apply a list of sets and unsets to the current state, in order.
    pub fn simplify_ordered_changes(&mut self, changes: &[EnvironmentVariableChange]) {
        for change in changes {
            match change {
                EnvironmentVariableChange::Set { name, value } => {
                    self.to_set.insert(name.clone(), Some(value.clone()));
                }
                EnvironmentVariableChange::Unset { name } => {
                    self.to_set.insert(name.clone(), None);
                }
            }
        }
    }

    /// Modify `env_vars` to reflect the tracked changes.
    ///
    /// An entry of `None` marks the variable for removal from the
    /// eventual subprocess environment.
    pub fn apply_to_environment(&self, env_vars: &mut IndexMap<String, Option<String>>) {
        for (name, value) in &self.to_set {
            env_vars.insert(name.clone(), value.clone());
        }
    }

    /// The tracked changes, for inspection.
    pub fn changes(&self) -> &IndexMap<String, Option<String>> {
        &self.to_set
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
