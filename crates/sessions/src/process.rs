// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The spawned-child seam.
//!
//! [`LoggingSubprocess`](crate::subprocess::LoggingSubprocess) drives
//! children through this trait so that ordinary `tokio` children and
//! children produced by the Windows logon services share one lifecycle.

use async_trait::async_trait;
use std::io;
use tokio::io::AsyncRead;

/// A spawned child process.
#[async_trait]
pub trait ChildProcess: Send {
    /// OS process id, when the child started.
    fn pid(&self) -> Option<u32>;

    /// Take the child's stdout stream. Yields once.
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>>;

    /// Take the child's stderr stream. Yields once.
    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>>;

    /// Wait for the child to exit and return its signed exit code.
    ///
    /// POSIX children killed by a signal report the negated signal
    /// number; forcibly terminated Windows children report the positive
    /// code the terminator supplied.
    async fn wait(&mut self) -> io::Result<i32>;

    /// Hard-kill the child itself (not its descendants).
    async fn kill(&mut self) -> io::Result<()>;
}

/// [`ChildProcess`] implementation over [`tokio::process::Child`].
pub struct TokioChildProcess {
    child: tokio::process::Child,
}

impl TokioChildProcess {
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child }
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        // Killed by a signal; report the negated signal number.
        None => -status.signal().unwrap_or(1),
    }
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[async_trait]
impl ChildProcess for TokioChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>)
    }

    async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(exit_code_of(status))
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
