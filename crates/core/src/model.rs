// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template entities consumed by the session runtime.
//!
//! These are the already-validated shapes a Job decomposes into:
//! parameter values, embedded files, Environments with their
//! onEnter/onExit bracket, and Step scripts with their onRun action.

use crate::action::Action;
use crate::format::FormatString;
use crate::revision::SpecificationRevision;
use indexmap::IndexMap;

/// The type tag of a job or task parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterKind {
    Int,
    Float,
    String,
    Path,
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterKind::Int => write!(f, "INT"),
            ParameterKind::Float => write!(f, "FLOAT"),
            ParameterKind::String => write!(f, "STRING"),
            ParameterKind::Path => write!(f, "PATH"),
        }
    }
}

/// A parameter's type and value.
///
/// PATH-typed values are subject to path mapping when the session has
/// mapping rules configured; all other kinds pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParameterValue {
    pub kind: ParameterKind,
    pub value: String,
}

impl ParameterValue {
    pub fn new(kind: ParameterKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ParameterKind::String, value)
    }

    pub fn path(value: impl Into<String>) -> Self {
        Self::new(ParameterKind::Path, value)
    }
}

/// Values for a Job's defined parameters, keyed by parameter name.
pub type JobParameterValues = IndexMap<String, ParameterValue>;

/// Values for the parameters that define one Task.
pub type TaskParameterSet = IndexMap<String, ParameterValue>;

/// An inline text payload materialised to disk before its referencing
/// Action runs.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFile {
    /// Symbol name; the file is referenced as `<scope>.File.<name>`.
    pub name: String,
    /// File body; resolved against the symbol table before writing.
    pub data: FormatString,
    /// On-disk filename within the session files directory. A random
    /// name is generated when absent.
    pub filename: Option<String>,
    /// Set the execute bits on the materialised file.
    pub runnable: bool,
}

impl EmbeddedFile {
    pub fn new(name: impl Into<String>, data: impl Into<FormatString>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            filename: None,
            runnable: false,
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn runnable(mut self, runnable: bool) -> Self {
        self.runnable = runnable;
        self
    }
}

/// The setup/teardown action pair of an Environment script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentActions {
    pub on_enter: Option<Action>,
    pub on_exit: Option<Action>,
}

/// The runnable part of an Environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentScript {
    pub actions: EnvironmentActions,
    pub embedded_files: Vec<EmbeddedFile>,
}

/// A named setup/teardown bracket around Tasks.
///
/// Contributes environment variables (values are format strings resolved
/// at enter time) and optional onEnter/onExit actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: String,
    pub revision: SpecificationRevision,
    pub script: Option<EnvironmentScript>,
    pub variables: Option<IndexMap<String, FormatString>>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: SpecificationRevision::default(),
            script: None,
            variables: None,
        }
    }

    pub fn script(mut self, script: EnvironmentScript) -> Self {
        self.script = Some(script);
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<FormatString>) -> Self {
        self.variables
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// The single action a Step runs per Task.
#[derive(Debug, Clone, PartialEq)]
pub struct StepActions {
    pub on_run: Action,
}

/// An onRun Action plus the embedded files it needs on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StepScript {
    pub revision: SpecificationRevision,
    pub actions: StepActions,
    pub embedded_files: Vec<EmbeddedFile>,
}

impl StepScript {
    pub fn new(on_run: Action) -> Self {
        Self {
            revision: SpecificationRevision::default(),
            actions: StepActions { on_run },
            embedded_files: Vec::new(),
        }
    }

    pub fn embedded_file(mut self, file: EmbeddedFile) -> Self {
        self.embedded_files.push(file);
        self
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
