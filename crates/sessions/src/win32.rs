// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows host-OS service contracts and the pure logic around them.
//!
//! The raw Win32 primitives (credentialed process creation, user
//! environment-block retrieval, DACL editing, UPN name translation, and
//! console control-event dispatch) are consumed as host services
//! registered by the embedder. Everything that can be expressed as
//! plain code (environment-block merging, `where` output parsing,
//! username plumbing) lives here directly so it is compiled and tested
//! on every platform.

use crate::process::ChildProcess;
use crate::user::WindowsSessionUser;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Everything needed to create a process as another Windows user.
#[derive(Debug)]
pub struct WindowsSpawnRequest {
    /// Program plus arguments.
    pub args: Vec<String>,
    /// Full environment block for the child: the user's default block
    /// merged with the caller-composed variables (caller wins).
    pub env: IndexMap<String, String>,
    pub working_directory: Option<PathBuf>,
    pub user: WindowsSessionUser,
}

/// Win32 primitives supplied by the embedding host.
///
/// Contracts:
/// - `spawn_as_user` creates the process with a new console process
///   group and no window. When the user carries a logon token the
///   `CreateProcessAsUserW` path is used (it works from Session 0);
///   password credentials use `CreateProcessWithLogonW` with
///   `LOGON_WITH_PROFILE`.
/// - `default_environment_block` loads the environment block for the
///   user's profile.
/// - `grant_full_control` rewrites the DACL of `path` to grant full
///   control to exactly the named principals, with inheritance enabled
///   so children of a directory inherit the grant.
/// - `translate_to_down_level` converts a UPN (`user@domain`) to
///   down-level (`DOMAIN\user`) form.
/// - `send_ctrl_break` attaches to the target console process group and
///   raises `CTRL_BREAK_EVENT` in it.
#[async_trait]
pub trait Win32Services: Send + Sync {
    async fn spawn_as_user(
        &self,
        request: WindowsSpawnRequest,
    ) -> io::Result<Box<dyn ChildProcess>>;

    fn default_environment_block(
        &self,
        user: &WindowsSessionUser,
    ) -> io::Result<IndexMap<String, String>>;

    fn grant_full_control(&self, path: &Path, principals: &[String]) -> io::Result<()>;

    fn translate_to_down_level(&self, upn: &str) -> io::Result<String>;

    fn send_ctrl_break(&self, process_group: u32) -> io::Result<()>;

    /// Name of the user running the current process, in down-level form.
    fn process_user(&self) -> io::Result<String>;
}

static SERVICES: OnceLock<Arc<dyn Win32Services>> = OnceLock::new();

/// Register the host's Win32 services. First registration wins; later
/// calls return the rejected instance.
pub fn register_win32_services(
    services: Arc<dyn Win32Services>,
) -> Result<(), Arc<dyn Win32Services>> {
    SERVICES.set(services)
}

/// The registered services, if any.
pub fn win32_services() -> Option<Arc<dyn Win32Services>> {
    SERVICES.get().cloned()
}

pub(crate) fn services_required() -> io::Result<Arc<dyn Win32Services>> {
    win32_services().ok_or_else(|| {
        io::Error::other("no Win32 services registered; cross-user operations are unavailable")
    })
}

/// Merge a user's default environment block with caller-supplied
/// variables. Caller values override, matching names case-insensitively
/// as the Windows environment does.
pub fn merge_environment_block(
    base: &IndexMap<String, String>,
    overrides: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut merged = base.clone();
    for (name, value) in overrides {
        let existing = merged
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned();
        match existing {
            Some(key) => {
                merged.insert(key, value.clone());
            }
            None => {
                merged.insert(name.clone(), value.clone());
            }
        }
    }
    merged
}

/// First matching path from `cmd /C where <command>` output.
///
/// `where` prints one absolute path per line, best match first; the
/// first non-empty line wins.
pub fn parse_where_output(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Resolve a relative command against a composed PATH for same-principal
/// spawns. The session working directory is searched ahead of the PATH
/// entries; absolute commands pass through untouched.
pub fn resolve_with_path(
    command: &str,
    path_env: &str,
    working_directory: &Path,
) -> Option<PathBuf> {
    if Path::new(command).is_absolute() {
        return Some(PathBuf::from(command));
    }
    std::iter::once(working_directory.to_path_buf())
        .chain(std::env::split_paths(path_env))
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}

/// Resolve a relative command to an absolute path as the target user by
/// running `cmd /C where <command>` under that user's identity.
pub async fn locate_executable_as_user(
    command: &str,
    user: &WindowsSessionUser,
    working_directory: Option<&Path>,
) -> io::Result<String> {
    let services = services_required()?;
    let env = services.default_environment_block(user)?;
    let request = WindowsSpawnRequest {
        args: vec![
            "cmd".to_string(),
            "/C".to_string(),
            "where".to_string(),
            command.to_string(),
        ],
        env,
        working_directory: working_directory.map(Path::to_path_buf),
        user: user.clone(),
    };
    let mut child = services.spawn_as_user(request).await?;
    let mut output = String::new();
    if let Some(mut stdout) = child.take_stdout() {
        use tokio::io::AsyncReadExt;
        stdout.read_to_string(&mut output).await?;
    }
    let code = child.wait().await?;
    if code != 0 {
        return Err(io::Error::other(format!(
            "could not locate executable {command}: where exited with {code}"
        )));
    }
    parse_where_output(&output)
        .ok_or_else(|| io::Error::other(format!("could not locate executable {command}")))
}

#[cfg(test)]
#[path = "win32_tests.rs"]
mod tests;
