// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the session runtime
//!
//! Precondition violations raise synchronously from the session entry
//! points; everything that goes wrong inside a running action surfaces
//! through `ActionStatus` and the status callback instead.

use ojs_core::EnvironmentId;
use thiserror::Error;

/// Errors raised by the caller-driven Session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session must be in the READY state to {0}")]
    NotReady(&'static str),
    #[error("session must be in the READY or READY_ENDING state to exit an environment")]
    NotReadyForExit,
    #[error("no actions are running")]
    NoActionRunning,
    #[error("environment {0} has already been entered in this session")]
    EnvironmentAlreadyEntered(EnvironmentId),
    #[error("cannot exit unknown environment with identifier {0}")]
    UnknownEnvironment(EnvironmentId),
    #[error("cannot exit environment {given}; must exit environment {expected} first")]
    NotInnermostEnvironment {
        given: EnvironmentId,
        expected: EnvironmentId,
    },
    #[error("ensure that the root directory ({0}) exists and is a directory")]
    BadRootDirectory(String),
    #[error("could not create session directories: {0}")]
    WorkingDirectory(String),
    #[error("a second action cannot be run with the same runner")]
    RunnerAlreadyUsed,
    #[error("{0}")]
    Format(#[from] ojs_core::FormatStringError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
