// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action runners.
//!
//! A runner owns one subprocess for one Action: it resolves the command
//! through the symbol table, wraps it in a thin shell script, launches
//! it under a [`LoggingSubprocess`], enforces the runtime limit, and
//! implements the graceful-then-forceful cancellation discipline.
//! [`EnvironmentScriptRunner`] and [`StepScriptRunner`] layer the
//! environment enter/exit and task-run specifics on the shared base.

mod env_script;
mod step_script;

pub use env_script::EnvironmentScriptRunner;
pub use step_script::StepScriptRunner;

use crate::embedded_files::{write_file_for_user, EmbeddedFiles};
use crate::logging::{log_subsection_banner, SessionLogger};
use crate::subprocess::LoggingSubprocess;
use crate::user::SessionUser;
use indexmap::IndexMap;
use ojs_core::{
    Action, ActionState, CancelationMethod, EmbeddedFile, EmbeddedFilesScope,
    SpecificationRevision, SymbolTable,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// State of a script runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRunnerState {
    /// Not running anything yet; can run an Action.
    Ready,
    /// Actively running an Action.
    Running,
    /// In the notify grace period of a cancelation.
    Canceling,
    /// The Action was canceled.
    Canceled,
    /// The Action was canceled for reaching its runtime limit.
    Timeout,
    /// The subprocess failed to start or exited non-zero.
    Failed,
    /// The subprocess exited with success.
    Success,
}

/// How the runner cancels its Action, resolved against the revision
/// defaults at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelMethod {
    /// Immediately hard-kill the process tree.
    #[default]
    Terminate,
    /// Send the notify signal, wait out the grace period, then kill.
    NotifyThenTerminate { grace: Duration },
}

/// Callback invoked when the runner's Action starts, exits, or fails to
/// start.
pub type ActionCallback = Arc<dyn Fn(ActionState) + Send + Sync>;

/// Construction parameters shared by all runners.
pub struct ScriptRunnerConfig {
    pub logger: SessionLogger,
    /// Run the subprocess as this user; the current process user when
    /// absent.
    pub user: Option<SessionUser>,
    /// Environment for the subprocess. `None` values unset variables.
    pub os_env_vars: IndexMap<String, Option<String>>,
    /// The session working directory; scripts and `cancel_info.json`
    /// are written here.
    pub session_working_directory: PathBuf,
    /// cwd for the subprocess.
    pub startup_directory: Option<PathBuf>,
    pub callback: Option<ActionCallback>,
}

struct RunnerState {
    process: Option<Arc<LoggingSubprocess>>,
    run_finished: bool,
    canceled: bool,
    runtime_limit_reached: bool,
    state_override: Option<ScriptRunnerState>,
    cancel_method: CancelMethod,
    grace_deadline: Option<tokio::time::Instant>,
    grace_timer: Option<JoinHandle<()>>,
    grace_generation: u64,
    runtime_timer: Option<JoinHandle<()>>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self {
            process: None,
            run_finished: false,
            canceled: false,
            runtime_limit_reached: false,
            state_override: None,
            cancel_method: CancelMethod::Terminate,
            grace_deadline: None,
            grace_timer: None,
            grace_generation: 0,
            runtime_timer: None,
        }
    }
}

struct RunnerInner {
    config: ScriptRunnerConfig,
    state: Mutex<RunnerState>,
}

/// Base runner for a single Action.
#[derive(Clone)]
pub struct ScriptRunner {
    inner: Arc<RunnerInner>,
}

impl ScriptRunner {
    pub fn new(config: ScriptRunnerConfig) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                config,
                state: Mutex::new(RunnerState::default()),
            }),
        }
    }

    fn config(&self) -> &ScriptRunnerConfig {
        &self.inner.config
    }

    fn logger(&self) -> &SessionLogger {
        &self.inner.config.logger
    }

    pub fn state(&self) -> ScriptRunnerState {
        derived_state(&self.inner.state.lock())
    }

    /// Exit code of the subprocess, when it has exited. An action can
    /// fail without one.
    pub fn exit_code(&self) -> Option<i32> {
        let state = self.inner.state.lock();
        state.process.as_ref().and_then(|p| p.exit_code())
    }

    pub fn runtime_limit_reached(&self) -> bool {
        self.inner.state.lock().runtime_limit_reached
    }

    /// Cancel the running Action with its own cancelation method.
    ///
    /// `time_limit` caps the notify grace period for urgent cancels;
    /// repeated cancels only ever shrink the remaining grace. A zero
    /// limit collapses notify-then-terminate into a terminate.
    pub fn cancel(&self, time_limit: Option<Duration>) {
        let method = self.inner.state.lock().cancel_method;
        self.cancel_with(method, time_limit);
    }

    /// Stop timers and, if the Action still runs, hard-kill it.
    pub fn shutdown(&self) {
        let (runtime_timer, grace_timer, process, still_running) = {
            let mut state = self.inner.state.lock();
            let running = matches!(
                derived_state(&state),
                ScriptRunnerState::Running | ScriptRunnerState::Canceling
            );
            (
                state.runtime_timer.take(),
                state.grace_timer.take(),
                state.process.clone(),
                running,
            )
        };
        if let Some(timer) = runtime_timer {
            timer.abort();
        }
        if let Some(timer) = grace_timer {
            timer.abort();
        }
        if still_running {
            if let Some(process) = process {
                tokio::spawn(async move { process.terminate().await });
            }
        }
    }

    /// Report a failure that occurred before the subprocess could be
    /// spawned. The reason is surfaced through the action filter as an
    /// `openjd_fail:` line, and the terminal callback fires.
    pub(crate) fn fail_before_spawn(&self, message: &str) {
        self.logger().info(format!("openjd_fail: {message}"));
        {
            let mut state = self.inner.state.lock();
            state.state_override = Some(ScriptRunnerState::Failed);
        }
        if let Some(callback) = &self.config().callback {
            callback(ActionState::Failed);
        }
    }

    /// Complete immediately with SUCCESS; used when an environment
    /// defines no action for the requested phase.
    pub(crate) fn succeed_without_action(&self) {
        {
            let mut state = self.inner.state.lock();
            state.state_override = Some(ScriptRunnerState::Success);
        }
        if let Some(callback) = &self.config().callback {
            callback(ActionState::Success);
        }
    }

    /// Materialise embedded files, failing the action on any error.
    /// Returns false when the runner transitioned to FAILED.
    pub(crate) fn materialize_files(
        &self,
        revision: SpecificationRevision,
        scope: EmbeddedFilesScope,
        files: &[EmbeddedFile],
        dest_directory: &Path,
        symtab: &mut SymbolTable,
    ) -> bool {
        let writer = EmbeddedFiles::new(
            self.logger().clone(),
            revision,
            scope,
            dest_directory.to_path_buf(),
            self.config().user.clone(),
        );
        match writer.materialize(files, symtab) {
            Ok(()) => true,
            Err(error) => {
                self.fail_before_spawn(&error.to_string());
                false
            }
        }
    }

    /// Resolve and run one Action.
    pub(crate) async fn run_action(
        &self,
        action: &Action,
        symtab: &SymbolTable,
        default_notify_grace: Duration,
    ) {
        let method = match action.cancelation {
            None | Some(CancelationMethod::Terminate) => CancelMethod::Terminate,
            Some(CancelationMethod::NotifyThenTerminate { notify_period }) => {
                CancelMethod::NotifyThenTerminate {
                    grace: notify_period.unwrap_or(default_notify_grace),
                }
            }
        };

        let mut args = Vec::with_capacity(1 + action.args.len());
        match action.command.resolve(symtab) {
            Ok(command) => args.push(command),
            Err(error) => {
                self.fail_before_spawn(&error.to_string());
                return;
            }
        }
        for arg in &action.args {
            match arg.resolve(symtab) {
                Ok(arg) => args.push(arg),
                Err(error) => {
                    self.fail_before_spawn(&error.to_string());
                    return;
                }
            }
        }

        self.run(args, action.timeout, method).await;
    }

    async fn run(&self, args: Vec<String>, time_limit: Option<Duration>, method: CancelMethod) {
        if self.state() != ScriptRunnerState::Ready {
            self.logger()
                .error("This cannot be used to run a second subprocess.");
            return;
        }

        let (script, suffix) = if cfg!(windows) {
            (self.generate_power_shell_script(&args), ".ps1")
        } else {
            (self.generate_command_shell_script(&args), ".sh")
        };

        let script_path = match self.write_script_file(&script, suffix) {
            Ok(path) => path,
            Err(error) => {
                self.fail_before_spawn(&format!("Could not write script to disk: {error}"));
                return;
            }
        };
        self.logger().debug(format!(
            "Wrote the following script to {}:\n{script}",
            script_path.display()
        ));

        let subprocess_args = if cfg!(windows) {
            vec![
                "powershell.exe".to_string(),
                "-NonInteractive".to_string(),
                "-File".to_string(),
                script_path.display().to_string(),
            ]
        } else {
            vec![script_path.display().to_string()]
        };

        let process = Arc::new(
            LoggingSubprocess::new(self.logger().clone(), subprocess_args)
                .with_user(self.config().user.clone()),
        );

        {
            let mut state = self.inner.state.lock();
            state.process = Some(process.clone());
            state.cancel_method = method;
            if let Some(limit) = time_limit {
                let runner = self.clone();
                state.runtime_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(limit).await;
                    runner.on_runtime_limit();
                }));
            }
        }

        log_subsection_banner(self.logger(), "Phase: Running action");

        let runner = self.clone();
        let run_process = process.clone();
        tokio::spawn(async move {
            run_process.run().await;
            runner.on_process_exit();
        });

        // Block until the subprocess actually starts, so callers never
        // observe a READY runner for an action that is already underway.
        process.wait_until_started().await;

        if self.state() == ScriptRunnerState::Running {
            if let Some(callback) = &self.config().callback {
                callback(ActionState::Running);
            }
        }
    }

    fn cancel_with(&self, method: CancelMethod, time_limit: Option<Duration>) {
        let process = { self.inner.state.lock().process.clone() };
        let Some(process) = process else {
            return;
        };
        if !process.is_running() {
            return;
        }

        // A zero limit leaves no room for a notify period.
        let method = match (method, time_limit) {
            (CancelMethod::NotifyThenTerminate { .. }, Some(limit)) if limit.is_zero() => {
                CancelMethod::Terminate
            }
            (method, _) => method,
        };

        let pid = process.pid().unwrap_or_default();
        let now = chrono::Utc::now();
        let now_str = now.format(TIME_FORMAT).to_string();

        match method {
            CancelMethod::Terminate => {
                self.inner.state.lock().canceled = true;
                self.logger().info(format!(
                    "Canceling subprocess {pid} via termination method at {now_str}."
                ));
                tokio::spawn(async move { process.terminate().await });
            }
            CancelMethod::NotifyThenTerminate { grace } => {
                let grace_end = {
                    let mut state = self.inner.state.lock();
                    state.canceled = true;
                    let mut grace = time_limit.map_or(grace, |limit| limit.min(grace));
                    let now_instant = tokio::time::Instant::now();
                    if let Some(previous) = state.grace_deadline {
                        // The grace period only ever shrinks on
                        // repeated cancels.
                        grace = grace.min(previous.saturating_duration_since(now_instant));
                    }
                    let deadline = now_instant + grace;
                    state.grace_deadline = Some(deadline);
                    if let Some(old) = state.grace_timer.take() {
                        old.abort();
                    }
                    state.grace_generation += 1;
                    let generation = state.grace_generation;
                    // Arm the replacement while holding the lock so the
                    // child is never running past the grace end with no
                    // timer armed.
                    let runner = self.clone();
                    state.grace_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep_until(deadline).await;
                        runner.on_notify_period_end(generation).await;
                    }));
                    grace
                };

                self.logger().info(format!(
                    "Canceling subprocess {pid} via notify then terminate method at {now_str}."
                ));

                let grace_end_str = (now
                    + chrono::Duration::from_std(grace_end).unwrap_or_default())
                .format(TIME_FORMAT)
                .to_string();
                let notify_end =
                    serde_json::json!({ "NotifyEnd": grace_end_str }).to_string();
                let path = self
                    .config()
                    .session_working_directory
                    .join("cancel_info.json");
                if let Err(error) =
                    write_file_for_user(&path, &notify_end, self.config().user.as_ref(), 0)
                {
                    self.logger()
                        .warn(format!("Could not write cancel_info.json: {error}"));
                }
                self.logger()
                    .info(format!("Grace period ends at {grace_end_str}"));

                if let Err(error) = process.notify() {
                    self.logger().warn(format!(
                        "Cancelation could not send notify signal to process {pid}: {error}"
                    ));
                }
            }
        }
    }

    fn on_runtime_limit(&self) {
        let method = {
            let mut state = self.inner.state.lock();
            if state.run_finished {
                return;
            }
            state.runtime_timer = None;
            state.runtime_limit_reached = true;
            state.cancel_method
        };
        self.logger().info(format!(
            "TIMEOUT - Runtime limit reached at {}. Canceling action.",
            chrono::Utc::now().format(TIME_FORMAT)
        ));
        self.cancel_with(method, None);
    }

    async fn on_notify_period_end(&self, generation: u64) {
        let process = {
            let mut state = self.inner.state.lock();
            if state.grace_generation != generation {
                return;
            }
            state.grace_timer = None;
            state.process.clone()
        };
        self.logger().info(format!(
            "Notify period ended. Terminate at {}",
            chrono::Utc::now().format(TIME_FORMAT)
        ));
        if let Some(process) = process {
            process.terminate().await;
        }
    }

    fn on_process_exit(&self) {
        let final_state = {
            let mut state = self.inner.state.lock();
            if let Some(timer) = state.runtime_timer.take() {
                timer.abort();
            }
            if let Some(timer) = state.grace_timer.take() {
                timer.abort();
            }
            state.run_finished = true;
            derived_state(&state)
        };
        if let Some(callback) = &self.config().callback {
            callback(terminal_action_state(final_state));
        }
    }

    fn write_script_file(&self, script: &str, suffix: &str) -> std::io::Result<PathBuf> {
        let file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile_in(&self.config().session_working_directory)?;
        let path = file
            .into_temp_path()
            .keep()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        // Owner and (with a target user) group may read and execute.
        write_file_for_user(&path, script, self.config().user.as_ref(), 0o110)?;
        Ok(path)
    }

    /// POSIX wrapper: trap TERM and forward it to the command, run the
    /// command in the background, and propagate its exit code.
    fn generate_command_shell_script(&self, args: &[String]) -> String {
        let mut script = vec![POSIX_TRAP_PREAMBLE.to_string()];
        for (name, value) in &self.config().os_env_vars {
            match value {
                Some(value) => script.push(format!("export {name}={}", sh_quote(value))),
                None => script.push(format!("unset {name}")),
            }
        }
        if let Some(dir) = &self.config().startup_directory {
            // Single quotes: the path may have spaces and must not be
            // shell-expanded.
            script.push(format!("cd '{}'", dir.display()));
        }
        script.push(format!("{} &", sh_join(args)));
        script.push("CHILD_PID=$!\nwait \"$CHILD_PID\"\nexit $?\n".to_string());
        script.join("\n")
    }

    /// PowerShell wrapper: set location and environment, then run the
    /// command inside the exit-code-preserving try/catch.
    fn generate_power_shell_script(&self, args: &[String]) -> String {
        let mut script = Vec::new();
        if let Some(dir) = &self.config().startup_directory {
            script.push(format!("Set-Location '{}'", dir.display()));
        }
        for (name, value) in &self.config().os_env_vars {
            match value {
                Some(value) => {
                    script.push(format!("$env:{name} = '{}'", value.replace('\'', "''")))
                }
                None => script.push(format!("$env:{name} = $null")),
            }
        }
        script.push(crate::pwsh::generate_exit_code_wrapper(args));
        script.join("\n")
    }
}

const POSIX_TRAP_PREAMBLE: &str = r#"#!/bin/sh
_term() {
  echo 'Caught SIGTERM'
  test "${CHILD_PID:-}" != "" && echo "Sending SIGTERM to ${CHILD_PID}" && kill -s TERM "${CHILD_PID}"
  wait "${CHILD_PID}"
  exit $?
}
trap _term TERM"#;

fn derived_state(state: &RunnerState) -> ScriptRunnerState {
    if let Some(overridden) = state.state_override {
        return overridden;
    }
    let Some(process) = &state.process else {
        return ScriptRunnerState::Ready;
    };
    if state.grace_timer.is_some() {
        return ScriptRunnerState::Canceling;
    }
    if !state.run_finished {
        return ScriptRunnerState::Running;
    }
    if state.canceled && state.runtime_limit_reached {
        ScriptRunnerState::Timeout
    } else if state.canceled {
        ScriptRunnerState::Canceled
    } else if process.failed_to_start() || process.exit_code() != Some(0) {
        ScriptRunnerState::Failed
    } else {
        ScriptRunnerState::Success
    }
}

fn terminal_action_state(state: ScriptRunnerState) -> ActionState {
    match state {
        ScriptRunnerState::Canceled => ActionState::Canceled,
        ScriptRunnerState::Timeout => ActionState::Timeout,
        ScriptRunnerState::Success => ActionState::Success,
        _ => ActionState::Failed,
    }
}

/// Quote a string for safe use as one word in `/bin/sh`.
fn sh_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r#"'"'"'"#))
    }
}

/// Quote and join a command vector for `/bin/sh`.
fn sh_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| sh_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
