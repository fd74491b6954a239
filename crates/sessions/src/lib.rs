// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ojs-sessions: the Open Job Session runtime.
//!
//! Executes the decomposed pieces of a Job on a worker host: enters and
//! exits Environments, runs Tasks, materialises embedded files, streams
//! subprocess output into a structured log channel, parses the in-band
//! `openjd_*` control protocol, enforces runtime limits, and applies a
//! graceful-then-forceful cancellation discipline. Everything can run
//! as a distinct OS user when one is configured.

pub mod action_filter;
pub mod embedded_files;
pub mod error;
pub mod logging;
pub mod process;
#[cfg(unix)]
pub mod process_tree;
pub mod pwsh;
pub mod runner;
pub mod session;
pub mod subprocess;
pub mod tempdir;
pub mod user;
pub mod win32;

#[cfg(test)]
mod test_support;

pub use action_filter::{ActionMessage, ActionMessageFilter, FilterDecision};
pub use embedded_files::{write_file_for_user, EmbeddedFiles, EmbeddedFilesError};
pub use error::SessionError;
pub use logging::{LogLevel, SessionLogger, LOG_TARGET};
pub use runner::{
    ActionCallback, EnvironmentScriptRunner, ScriptRunner, ScriptRunnerConfig, ScriptRunnerState,
    StepScriptRunner,
};
pub use session::{Session, SessionBuilder, SessionCallback, SessionState};
pub use subprocess::{LoggingSubprocess, MAX_LINE_LENGTH};
pub use tempdir::{TempDir, TempDirError};
pub use user::{PosixSessionUser, SessionUser, UserError, WindowsCredential, WindowsSessionUser};
pub use win32::{Win32Services, WindowsSpawnRequest};
