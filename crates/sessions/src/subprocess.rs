// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process spawn and supervision.
//!
//! A [`LoggingSubprocess`] owns one child: it spawns it (optionally as
//! a different OS user), copies the child's stdout and stderr into the
//! session log line by line, and delivers the notify and terminate
//! signals for cancellation. `run()` drives the whole lifecycle;
//! callers watch `wait_until_started()` to learn that the child pid is
//! observable (or that the spawn failed).

use crate::logging::SessionLogger;
use crate::process::{ChildProcess, TokioChildProcess};
use crate::user::SessionUser;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;

/// Output lines longer than this are split; content is preserved in
/// order.
pub const MAX_LINE_LENGTH: usize = 64_000;

#[derive(Default)]
struct SubprocessState {
    pid: Option<u32>,
    exit_code: Option<i32>,
    failed_to_start: bool,
    running: bool,
}

/// One child process whose output is forwarded to the session log.
pub struct LoggingSubprocess {
    logger: SessionLogger,
    args: Vec<String>,
    user: Option<SessionUser>,
    env: Option<IndexMap<String, String>>,
    working_directory: Option<PathBuf>,
    state: Mutex<SubprocessState>,
    started: watch::Sender<bool>,
}

impl LoggingSubprocess {
    pub fn new(logger: SessionLogger, args: Vec<String>) -> Self {
        let (started, _) = watch::channel(false);
        Self {
            logger,
            args,
            user: None,
            env: None,
            working_directory: None,
            state: Mutex::new(SubprocessState::default()),
            started,
        }
    }

    /// Run the child as this user. Crossing the user boundary on POSIX
    /// wraps the command in `sudo -u <user> -i`; the caller is expected
    /// to hold passwordless sudoers rights.
    pub fn with_user(mut self, user: Option<SessionUser>) -> Self {
        self.user = user;
        self
    }

    /// Environment for the child. Not inherited across the POSIX user
    /// boundary; only values the generated wrapper script exports cross
    /// it.
    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = Some(dir);
        self
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.lock().pid
    }

    /// Signed exit code; negative on POSIX when the child died to a
    /// signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.state.lock().exit_code
    }

    pub fn failed_to_start(&self) -> bool {
        self.state.lock().failed_to_start
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Block until the child pid is observable or the spawn failed.
    /// Only meaningful once `run()` has been started.
    pub async fn wait_until_started(&self) {
        let mut rx = self.started.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Spawn the child and block until it has exited and its output is
    /// drained.
    pub async fn run(&self) {
        let mut child = match self.spawn().await {
            Ok(child) => child,
            Err(error) => {
                self.logger.error(format!("Could not start process: {error}"));
                self.state.lock().failed_to_start = true;
                self.started.send_replace(true);
                return;
            }
        };
        let pid = child.pid();
        {
            let mut state = self.state.lock();
            state.pid = pid;
            state.running = true;
        }
        self.started.send_replace(true);
        if let Some(pid) = pid {
            self.logger.info(format!("Command started as pid: {pid}"));
        }

        let stdout = child.take_stdout();
        let stderr = child.take_stderr();
        let (exit, (), ()) = tokio::join!(
            child.wait(),
            self.pump_lines(stdout),
            self.pump_lines(stderr),
        );

        let exit_code = match exit {
            Ok(code) => Some(code),
            Err(error) => {
                self.logger
                    .warn(format!("Error waiting for process exit: {error}"));
                None
            }
        };
        {
            let mut state = self.state.lock();
            state.exit_code = exit_code;
            state.running = false;
        }
        if let (Some(pid), Some(code)) = (pid, exit_code) {
            self.logger
                .info(format!("Process pid {pid} exited with code: {code}"));
        }
    }

    /// Send the graceful-cancellation signal: SIGTERM on POSIX (sudo
    /// relays it across a user boundary), CTRL_BREAK_EVENT on Windows.
    pub fn notify(&self) -> io::Result<()> {
        let pid = self
            .pid()
            .ok_or_else(|| io::Error::other("process has not started"))?;
        #[cfg(unix)]
        {
            nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            )
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
        }
        #[cfg(windows)]
        {
            crate::win32::services_required()?.send_ctrl_break(pid)
        }
        #[cfg(not(any(unix, windows)))]
        {
            Err(io::Error::other("signalling unsupported on this platform"))
        }
    }

    /// Hard-kill the whole process tree.
    pub async fn terminate(&self) {
        let Some(pid) = self.pid() else {
            return;
        };
        #[cfg(unix)]
        {
            match &self.user {
                Some(user) if !user.is_process_user() => {
                    // The target user's processes cannot be signalled
                    // directly; kill the process group as that user.
                    let output = tokio::process::Command::new("sudo")
                        .args(["-u", user.user_name(), "-i", "kill", "-s", "KILL", "--"])
                        .arg(format!("-{pid}"))
                        .output()
                        .await;
                    match output {
                        Ok(out) if out.status.success() => {}
                        Ok(out) => self.logger.warn(format!(
                            "Failed to terminate process {pid}: {}",
                            String::from_utf8_lossy(&out.stderr).trim()
                        )),
                        Err(error) => self
                            .logger
                            .warn(format!("Failed to terminate process {pid}: {error}")),
                    }
                }
                _ => crate::process_tree::terminate_process_tree(pid, &self.logger).await,
            }
        }
        #[cfg(windows)]
        {
            let output = tokio::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .output()
                .await;
            if let Err(error) = output {
                self.logger
                    .warn(format!("Failed to terminate process {pid}: {error}"));
            }
        }
    }

    async fn spawn(&self) -> io::Result<Box<dyn ChildProcess>> {
        if self.args.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no command given",
            ));
        }

        #[cfg(windows)]
        if let Some(SessionUser::Windows(user)) = &self.user {
            if !user.is_process_user() {
                let services = crate::win32::services_required()?;
                let base = services.default_environment_block(user)?;
                let overrides = self.env.clone().unwrap_or_default();
                let request = crate::win32::WindowsSpawnRequest {
                    args: self.args.clone(),
                    env: crate::win32::merge_environment_block(&base, &overrides),
                    working_directory: self.working_directory.clone(),
                    user: user.clone(),
                };
                return services.spawn_as_user(request).await;
            }
        }

        let mut command = self.build_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command.spawn()?;
        Ok(Box::new(TokioChildProcess::new(child)))
    }

    fn build_command(&self) -> tokio::process::Command {
        let cross_user = self
            .user
            .as_ref()
            .is_some_and(|user| !user.is_process_user());

        let argv: Vec<String> = if cross_user {
            // cross_user implies the user is set.
            let user_name = self
                .user
                .as_ref()
                .map(|user| user.user_name().to_string())
                .unwrap_or_default();
            let mut argv = vec![
                "sudo".to_string(),
                "-u".to_string(),
                user_name,
                "-i".to_string(),
            ];
            argv.extend(self.args.iter().cloned());
            argv
        } else {
            self.args.clone()
        };

        let mut command = tokio::process::Command::new(&argv[0]);
        command.args(&argv[1..]);
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }
        if let Some(env) = &self.env {
            if !cross_user {
                command.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
        }
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        }
        command
    }

    async fn pump_lines(&self, stream: Option<Box<dyn AsyncRead + Send + Unpin>>) {
        let Some(stream) = stream else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(8192);
        loop {
            buf.clear();
            match read_line_bounded(&mut reader, &mut buf, MAX_LINE_LENGTH).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    self.logger.info(line.as_ref());
                }
                Err(error) => {
                    self.logger
                        .warn(format!("Error reading process output: {error}"));
                    break;
                }
            }
        }
    }
}

/// Read one line (without its terminator) into `buf`, consuming at most
/// enough input to fill `max` content bytes.
///
/// Returns the number of bytes consumed from the reader; zero means end
/// of stream. Overlong lines are returned in `max`-sized chunks, in
/// order, with the remainder left for subsequent calls.
async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<usize> {
    let mut consumed = 0usize;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }
        let room = max - buf.len();
        match available.iter().position(|b| *b == b'\n') {
            Some(newline) if newline <= room => {
                buf.extend_from_slice(&available[..newline]);
                reader.consume(newline + 1);
                consumed += newline + 1;
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                return Ok(consumed);
            }
            _ if available.len() >= room => {
                buf.extend_from_slice(&available[..room]);
                reader.consume(room);
                consumed += room;
                return Ok(consumed);
            }
            _ => {
                buf.extend_from_slice(available);
                let n = available.len();
                reader.consume(n);
                consumed += n;
            }
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
