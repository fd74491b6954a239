// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ojs-core: data model for the Open Job Session runtime
//!
//! Pure types only: parameters, actions, environments, path mapping,
//! environment-variable change tracking, and the format-string resolver.
//! Everything that touches the OS lives in `ojs-sessions`.

pub mod action;
pub mod env;
pub mod format;
pub mod id;
pub mod model;
pub mod path_mapping;
pub mod revision;

pub use action::{Action, ActionState, ActionStatus, CancelationMethod};
pub use env::{
    is_valid_env_var_name, EnvironmentVariableChange, SimplifiedEnvironmentVariableChanges,
};
pub use format::{FormatString, FormatStringError, SymbolTable};
pub use id::{EnvironmentId, SessionId};
pub use model::{
    EmbeddedFile, Environment, EnvironmentActions, EnvironmentScript, JobParameterValues,
    ParameterKind, ParameterValue, StepActions, StepScript, TaskParameterSet,
};
pub use path_mapping::{PathFormat, PathMappingError, PathMappingRule};
pub use revision::{EmbeddedFilesScope, SpecificationRevision};
