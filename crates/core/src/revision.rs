// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Specification revisions and the services each revision supplies.
//!
//! The runtime narrows every template entity to a single schema revision.
//! Each revision contributes its value-reference constants and its default
//! cancellation grace periods; adding a revision means adding a variant
//! here and a constants table for it.

use std::time::Duration;

/// Which scope a set of embedded files (and their symbols) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedFilesScope {
    /// Files declared by an Environment script (`Env.File.<name>`).
    Env,
    /// Files declared by a Step script (`Task.File.<name>`).
    Task,
}

/// Value-reference name constants for one specification revision.
#[derive(Debug, Clone, Copy)]
pub struct ValueReferenceConstants {
    pub working_directory: &'static str,
    pub job_parameter_prefix: &'static str,
    pub job_parameter_raw_prefix: &'static str,
    pub task_parameter_prefix: &'static str,
    pub task_parameter_raw_prefix: &'static str,
    pub env_file_prefix: &'static str,
    pub task_file_prefix: &'static str,
    pub path_mapping_rules_file: &'static str,
    pub has_path_mapping_rules: &'static str,
}

static V2023_09_CONSTANTS: ValueReferenceConstants = ValueReferenceConstants {
    working_directory: "Session.WorkingDirectory",
    job_parameter_prefix: "Param",
    job_parameter_raw_prefix: "RawParam",
    task_parameter_prefix: "Task.Param",
    task_parameter_raw_prefix: "Task.RawParam",
    env_file_prefix: "Env.File",
    task_file_prefix: "Task.File",
    path_mapping_rules_file: "Session.PathMappingRulesFile",
    has_path_mapping_rules: "Session.HasPathMappingRules",
};

/// A supported template schema revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SpecificationRevision {
    #[default]
    #[serde(rename = "2023-09")]
    V2023_09,
}

impl SpecificationRevision {
    /// The value-reference constants for this revision.
    pub fn constants(&self) -> &'static ValueReferenceConstants {
        match self {
            SpecificationRevision::V2023_09 => &V2023_09_CONSTANTS,
        }
    }

    /// Default notify grace period for a notify-then-terminate cancel when
    /// the action does not declare one.
    pub fn default_notify_grace(&self, scope: EmbeddedFilesScope) -> Duration {
        match (self, scope) {
            (SpecificationRevision::V2023_09, EmbeddedFilesScope::Env) => Duration::from_secs(30),
            (SpecificationRevision::V2023_09, EmbeddedFilesScope::Task) => {
                Duration::from_secs(120)
            }
        }
    }

    /// Symbol prefix for embedded files in the given scope.
    pub fn file_prefix(&self, scope: EmbeddedFilesScope) -> &'static str {
        let constants = self.constants();
        match scope {
            EmbeddedFilesScope::Env => constants.env_file_prefix,
            EmbeddedFilesScope::Task => constants.task_file_prefix,
        }
    }
}

impl std::fmt::Display for SpecificationRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecificationRevision::V2023_09 => write!(f, "2023-09"),
        }
    }
}
