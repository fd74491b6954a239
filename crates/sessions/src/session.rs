// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Session coordinator.
//!
//! A Session is the context a Job's actions run in: it owns a working
//! directory shared (where configured) with a target OS user, an
//! ordered stack of entered Environments with their accumulated
//! environment-variable changes, and the status of the currently- or
//! last-running action. Environments enter in order and exit in
//! reverse; a failed, canceled, or timed-out action degrades the
//! session so that only environment exits remain admissible.

use crate::action_filter::ActionMessage;
use crate::error::SessionError;
use crate::logging::{log_section_banner, SessionLogger, LOG_TARGET};
use crate::runner::{
    ActionCallback, EnvironmentScriptRunner, ScriptRunner, ScriptRunnerConfig, StepScriptRunner,
};
use crate::subprocess::LoggingSubprocess;
use crate::tempdir::TempDir;
use crate::user::SessionUser;
use indexmap::IndexMap;
use ojs_core::path_mapping::sort_rules_for_application;
use ojs_core::{
    ActionState, ActionStatus, Environment, EnvironmentId, EnvironmentVariableChange,
    JobParameterValues, ParameterKind, ParameterValue, PathMappingRule, SessionId,
    SimplifiedEnvironmentVariableChanges, SpecificationRevision, StepScript, SymbolTable,
    TaskParameterSet,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// State of a Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready to run actions.
    Ready,
    /// Actively running an action.
    Running,
    /// Canceling the currently running action.
    Canceling,
    /// Only Environment exit actions are admissible; a previous action
    /// failed, timed out, or was canceled.
    ReadyEnding,
    /// Terminal; the session can no longer run actions.
    Ended,
}

/// Callback invoked on action start, on each in-band progress/status/
/// fail message, and on action exit. Must return quickly: it is called
/// from the threads that pump subprocess output.
pub type SessionCallback = Arc<dyn Fn(&SessionId, ActionStatus) + Send + Sync>;

#[derive(Default)]
struct ActionStatusFields {
    state: Option<ActionState>,
    progress: Option<f64>,
    status_message: Option<String>,
    fail_message: Option<String>,
    exit_code: Option<i32>,
}

impl ActionStatusFields {
    fn to_status(&self) -> Option<ActionStatus> {
        self.state.map(|state| ActionStatus {
            state,
            progress: self.progress,
            status_message: self.status_message.clone(),
            fail_message: self.fail_message.clone(),
            exit_code: self.exit_code,
        })
    }
}

struct SessionMutable {
    state: SessionState,
    ending_only: bool,
    environments: HashMap<EnvironmentId, Environment>,
    environments_entered: Vec<EnvironmentId>,
    created_env_vars: HashMap<EnvironmentId, SimplifiedEnvironmentVariableChanges>,
    running_environment: Option<EnvironmentId>,
    runner: Option<ScriptRunner>,
    action: ActionStatusFields,
    cleanup_called: bool,
}

impl SessionMutable {
    /// Clear per-action status and detach the previous runner, which
    /// the caller must shut down outside the lock.
    fn reset_action(&mut self) -> Option<ScriptRunner> {
        self.action = ActionStatusFields::default();
        self.running_environment = None;
        self.runner.take()
    }
}

struct SessionShared {
    session_id: SessionId,
    logger: SessionLogger,
    user: Option<SessionUser>,
    callback: Option<SessionCallback>,
    job_parameter_values: JobParameterValues,
    path_mapping_rules: Option<Vec<PathMappingRule>>,
    process_env: IndexMap<String, String>,
    retain_working_dir: bool,
    working_dir: TempDir,
    files_dir: TempDir,
    state: Mutex<SessionMutable>,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    session_id: SessionId,
    job_parameter_values: JobParameterValues,
    path_mapping_rules: Option<Vec<PathMappingRule>>,
    retain_working_dir: bool,
    user: Option<SessionUser>,
    callback: Option<SessionCallback>,
    os_env_vars: IndexMap<String, String>,
    session_root_directory: Option<PathBuf>,
}

impl SessionBuilder {
    pub fn new(session_id: SessionId, job_parameter_values: JobParameterValues) -> Self {
        Self {
            session_id,
            job_parameter_values,
            path_mapping_rules: None,
            retain_working_dir: false,
            user: None,
            callback: None,
            os_env_vars: IndexMap::new(),
            session_root_directory: None,
        }
    }

    /// Path mapping rules applied to PATH-typed parameters and exposed
    /// to actions through the path-mapping rules file.
    pub fn path_mapping_rules(mut self, rules: Vec<PathMappingRule>) -> Self {
        self.path_mapping_rules = Some(rules);
        self
    }

    /// Keep the working directory on disk after cleanup.
    pub fn retain_working_dir(mut self, retain: bool) -> Self {
        self.retain_working_dir = retain;
        self
    }

    /// Run all subprocesses as this user, and share the working
    /// directory with them.
    pub fn user(mut self, user: SessionUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn callback(mut self, callback: SessionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Baseline OS environment for every subprocess in the session.
    pub fn os_env_vars(mut self, env: IndexMap<String, String>) -> Self {
        self.os_env_vars = env;
        self
    }

    /// Create the working directory under this directory instead of the
    /// host default. Must already exist.
    pub fn session_root_directory(mut self, root: PathBuf) -> Self {
        self.session_root_directory = Some(root);
        self
    }

    /// Create the session: resolves the root directory, creates the
    /// working and embedded-files directories, and installs the log
    /// filter. On failure the session is not created and nothing is
    /// left running.
    pub fn build(mut self) -> Result<Session, SessionError> {
        if let Some(rules) = self.path_mapping_rules.as_mut() {
            sort_rules_for_application(rules);
        }

        let logger = SessionLogger::new(self.session_id.clone());
        logger.info(format!(
            "ojs-sessions Library Version: {}",
            env!("CARGO_PKG_VERSION")
        ));
        logger.info(format!("Platform: {}", std::env::consts::OS));
        logger.info(format!(
            "Initializing Open Job Description Session: {}",
            self.session_id
        ));

        let root_dir = self.resolve_root_directory(&logger)?;

        let working_dir = TempDir::new(
            &root_dir,
            &format!("{}-", self.session_id),
            self.user.as_ref(),
        )
        .map_err(|error| {
            logger.error(format!("ERROR creating Session Working Directory: {error}"));
            SessionError::WorkingDirectory(error.to_string())
        })?;
        let files_dir = TempDir::new(working_dir.path(), "embedded_files", self.user.as_ref())
            .map_err(|error| {
                logger.error(format!("ERROR creating Session Working Directory: {error}"));
                let _ = working_dir.cleanup();
                SessionError::WorkingDirectory(error.to_string())
            })?;

        logger.info(format!(
            "Session Working Directory: {}",
            working_dir.path().display()
        ));
        logger.info(format!(
            "Session's Embedded Files Directory: {}",
            files_dir.path().display()
        ));

        let shared = Arc::new(SessionShared {
            session_id: self.session_id,
            logger,
            user: self.user,
            callback: self.callback,
            job_parameter_values: self.job_parameter_values,
            path_mapping_rules: self.path_mapping_rules,
            process_env: self.os_env_vars,
            retain_working_dir: self.retain_working_dir,
            working_dir,
            files_dir,
            state: Mutex::new(SessionMutable {
                state: SessionState::Ready,
                ending_only: false,
                environments: HashMap::new(),
                environments_entered: Vec::new(),
                created_env_vars: HashMap::new(),
                running_environment: None,
                runner: None,
                action: ActionStatusFields::default(),
                cleanup_called: false,
            }),
        });

        let weak = Arc::downgrade(&shared);
        shared.logger.set_message_handler(Box::new(move |message| {
            if let Some(shared) = weak.upgrade() {
                SessionShared::on_action_message(&shared, message);
            }
        }));

        Ok(Session { shared })
    }

    fn resolve_root_directory(&self, logger: &SessionLogger) -> Result<PathBuf, SessionError> {
        let root = match &self.session_root_directory {
            Some(root) => {
                if !root.is_dir() {
                    return Err(SessionError::BadRootDirectory(
                        root.display().to_string(),
                    ));
                }
                root.clone()
            }
            None => {
                let root = std::env::temp_dir().join("openjd");
                std::fs::create_dir_all(&root)
                    .map_err(|e| SessionError::WorkingDirectory(e.to_string()))?;
                // The directory may predate us with tighter permissions;
                // group/other need traversal for a shared-group setup.
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755))
                        .map_err(|e| SessionError::WorkingDirectory(e.to_string()))?;
                }
                root
            }
        };

        #[cfg(unix)]
        audit_sticky_bits(logger, &root);
        #[cfg(not(unix))]
        let _ = logger;

        Ok(root)
    }
}

/// Audit world-writable ancestors of the session root: without the
/// sticky bit, any user could delete session directories out from
/// under running work.
#[cfg(unix)]
fn audit_sticky_bits(logger: &SessionLogger, root: &Path) {
    use std::os::unix::fs::MetadataExt;
    for parent in root.ancestors().skip(1) {
        let Ok(metadata) = std::fs::metadata(parent) else {
            continue;
        };
        let mode = metadata.mode();
        if mode & 0o002 != 0 && mode & 0o1000 == 0 {
            logger.warn(format!(
                "Sticky bit is not set on {}. This may pose a risk when running work on this \
                 host as users may modify or delete files in this directory which do not belong \
                 to them.",
                parent.display()
            ));
        }
    }
}

/// A context for running the actions of one Job on this host.
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub fn builder(session_id: SessionId, job_parameter_values: JobParameterValues) -> SessionBuilder {
        SessionBuilder::new(session_id, job_parameter_values)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().state
    }

    /// Directory created for this session's working files; available to
    /// format strings as `Session.WorkingDirectory`.
    pub fn working_directory(&self) -> &Path {
        self.shared.working_dir.path()
    }

    /// Subdirectory of the working directory where embedded files are
    /// materialised.
    pub fn files_directory(&self) -> &Path {
        self.shared.files_dir.path()
    }

    /// Status of the currently- or last-running action; `None` before
    /// the first action runs.
    pub fn action_status(&self) -> Option<ActionStatus> {
        self.shared.state.lock().action.to_status()
    }

    /// Identifiers of entered environments, in enter order.
    pub fn environments_entered(&self) -> Vec<EnvironmentId> {
        self.shared.state.lock().environments_entered.clone()
    }

    /// Initiate cancellation of the currently running action.
    ///
    /// `time_limit` bounds the cancel for urgent shutdowns; zero turns
    /// a notify-then-terminate cancel into an immediate terminate.
    pub fn cancel_action(&self, time_limit: Option<Duration>) -> Result<(), SessionError> {
        let runner = {
            let state = self.shared.state.lock();
            if state.state != SessionState::Running {
                return Err(SessionError::NoActionRunning);
            }
            state.runner.clone()
        };
        match runner {
            Some(runner) => {
                runner.cancel(time_limit);
                Ok(())
            }
            None => Err(SessionError::NoActionRunning),
        }
    }

    /// Enter an Environment: record its declared variables and run its
    /// onEnter action.
    ///
    /// Non-blocking past subprocess start: returns as soon as the
    /// subprocess is confirmed running or known to have failed to
    /// start. Returns the identifier to later pass to
    /// [`Session::exit_environment`].
    pub async fn enter_environment(
        &self,
        environment: Environment,
        identifier: Option<EnvironmentId>,
        os_env_vars: Option<IndexMap<String, String>>,
    ) -> Result<EnvironmentId, SessionError> {
        let shared = &self.shared;
        let (identifier, previous_runner) = {
            let mut state = shared.state.lock();
            if state.state != SessionState::Ready {
                return Err(SessionError::NotReady("enter an environment"));
            }
            if let Some(id) = &identifier {
                if state.environments.contains_key(id) {
                    return Err(SessionError::EnvironmentAlreadyEntered(id.clone()));
                }
            }
            let identifier =
                identifier.unwrap_or_else(|| EnvironmentId::generate(&shared.session_id));
            let previous = state.reset_action();
            state.environments.insert(identifier.clone(), environment.clone());
            state.environments_entered.push(identifier.clone());
            state.running_environment = Some(identifier.clone());
            (identifier, previous)
        };
        if let Some(runner) = previous_runner {
            runner.shutdown();
        }

        log_section_banner(
            &shared.logger,
            &format!("Entering Environment: {}", environment.name),
        );

        let mut symtab = shared.symbol_table(environment.revision, None);

        // Resolve the environment's declared variables before composing
        // the action env, so onEnter runs with them applied.
        let changes = match &environment.variables {
            Some(variables) => {
                let mut resolved: Vec<(String, String)> = Vec::with_capacity(variables.len());
                for (name, value) in variables {
                    let value = value.resolve(&symtab)?;
                    shared.logger.info(format!("Setting: {name}={value}"));
                    resolved.push((name.clone(), value));
                }
                SimplifiedEnvironmentVariableChanges::new(resolved)
            }
            // The environment's actions may still define variables via
            // stdout messages; capture those into an empty change set.
            None => SimplifiedEnvironmentVariableChanges::empty(),
        };

        let action_env = {
            let mut state = shared.state.lock();
            state.created_env_vars.insert(identifier.clone(), changes);
            shared.effective_env(&state, os_env_vars)
        };

        shared.materialize_path_mapping(environment.revision, &mut symtab)?;

        let runner = EnvironmentScriptRunner::new(
            SessionShared::runner_config(shared, action_env),
            environment.script.clone(),
            environment.revision,
            symtab,
            shared.files_dir.path().to_path_buf(),
        );
        // The run may fail immediately (e.g. an embedded-file write
        // error), so the action must read as RUNNING before enter() has
        // a chance to flip it to FAILED.
        shared.mark_action_running(runner.runner());
        runner.enter().await;

        Ok(identifier)
    }

    /// Exit the innermost entered Environment by running its onExit
    /// action. Environments must exit in reverse enter order.
    pub async fn exit_environment(
        &self,
        identifier: &EnvironmentId,
        os_env_vars: Option<IndexMap<String, String>>,
    ) -> Result<(), SessionError> {
        let shared = &self.shared;
        let (environment, previous_runner) = {
            let mut state = shared.state.lock();
            if state.state != SessionState::Ready && state.state != SessionState::ReadyEnding {
                return Err(SessionError::NotReadyForExit);
            }
            if !state.environments.contains_key(identifier) {
                return Err(SessionError::UnknownEnvironment(identifier.clone()));
            }
            match state.environments_entered.last() {
                Some(top) if top == identifier => {}
                Some(top) => {
                    return Err(SessionError::NotInnermostEnvironment {
                        given: identifier.clone(),
                        expected: top.clone(),
                    })
                }
                None => return Err(SessionError::UnknownEnvironment(identifier.clone())),
            }
            let previous = state.reset_action();
            // Once environments start exiting, only exits remain.
            state.ending_only = true;
            // Unwrap is safe: membership was checked above.
            #[allow(clippy::unwrap_used)]
            let environment = state.environments.remove(identifier).unwrap();
            (environment, previous)
        };
        if let Some(runner) = previous_runner {
            runner.shutdown();
        }

        log_section_banner(
            &shared.logger,
            &format!("Exiting Environment: {}", environment.name),
        );

        let action_env = {
            let mut state = shared.state.lock();
            // Composed before the pop so the exiting environment's own
            // variables apply to its onExit action; everything entered
            // after it has already exited.
            let action_env = shared.effective_env(&state, os_env_vars);
            state.environments_entered.pop();
            state.running_environment = Some(identifier.clone());
            action_env
        };

        let mut symtab = shared.symbol_table(environment.revision, None);
        shared.materialize_path_mapping(environment.revision, &mut symtab)?;

        let runner = EnvironmentScriptRunner::new(
            SessionShared::runner_config(shared, action_env),
            environment.script.clone(),
            environment.revision,
            symtab,
            shared.files_dir.path().to_path_buf(),
        );
        shared.mark_action_running(runner.runner());
        runner.exit().await;

        Ok(())
    }

    /// Run one Task of a Step script.
    pub async fn run_task(
        &self,
        step_script: StepScript,
        task_parameter_values: TaskParameterSet,
        os_env_vars: Option<IndexMap<String, String>>,
    ) -> Result<(), SessionError> {
        let shared = &self.shared;
        let previous_runner = {
            let mut state = shared.state.lock();
            if state.state != SessionState::Ready {
                return Err(SessionError::NotReady("run a task"));
            }
            state.reset_action()
        };
        if let Some(runner) = previous_runner {
            runner.shutdown();
        }

        log_section_banner(&shared.logger, "Running Task");
        if !task_parameter_values.is_empty() {
            shared.logger.info("Parameter values:");
            for (name, value) in &task_parameter_values {
                shared
                    .logger
                    .info(format!("{name}({}) = {}", value.kind, value.value));
            }
        }

        let action_env = {
            let state = shared.state.lock();
            shared.effective_env(&state, os_env_vars)
        };
        let mut symtab = shared.symbol_table(step_script.revision, Some(&task_parameter_values));
        shared.materialize_path_mapping(step_script.revision, &mut symtab)?;

        let runner = StepScriptRunner::new(
            SessionShared::runner_config(shared, action_env),
            step_script,
            symtab,
            shared.files_dir.path().to_path_buf(),
        );
        shared.mark_action_running(runner.runner());
        runner.run().await;

        Ok(())
    }

    /// Release everything the session created. Idempotent.
    ///
    /// With a target user configured the working directory is first
    /// deleted as that user (they may own files this process cannot
    /// remove), then as this process. Errors are logged and non-fatal;
    /// the session always ends.
    pub async fn cleanup(&self) {
        let shared = &self.shared;
        let runner = {
            let mut state = shared.state.lock();
            if state.cleanup_called {
                return;
            }
            state.cleanup_called = true;
            state.runner.take()
        };
        if let Some(runner) = runner {
            runner.shutdown();
        }

        if !shared.retain_working_dir {
            log_section_banner(&shared.logger, "Session Cleanup");
            shared.logger.info(format!(
                "Deleting working directory: {}",
                shared.working_dir.path().display()
            ));
            if let Some(user) = &shared.user {
                shared.delete_working_dir_as_user(user).await;
            }
            if let Err(error) = shared.working_dir.cleanup() {
                shared.logger.warn(error.to_string());
            }
        }

        shared.logger.clear_message_handler();
        shared.state.lock().state = SessionState::Ended;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let cleaned = self.shared.state.lock().cleanup_called;
        if !cleaned {
            tracing::warn!(
                target: LOG_TARGET,
                session_id = %self.shared.session_id,
                "Session dropped without cleanup; its working directory remains on disk"
            );
        }
    }
}

impl SessionShared {
    fn runner_config(
        shared: &Arc<Self>,
        os_env_vars: IndexMap<String, Option<String>>,
    ) -> ScriptRunnerConfig {
        ScriptRunnerConfig {
            logger: shared.logger.clone(),
            user: shared.user.clone(),
            os_env_vars,
            session_working_directory: shared.working_dir.path().to_path_buf(),
            startup_directory: Some(shared.working_dir.path().to_path_buf()),
            callback: Some(Self::action_exit_callback(shared)),
        }
    }

    fn action_exit_callback(shared: &Arc<Self>) -> ActionCallback {
        let weak = Arc::downgrade(shared);
        Arc::new(move |action_state| {
            if let Some(shared) = weak.upgrade() {
                SessionShared::on_action_exit(&shared, action_state);
            }
        })
    }

    /// Record the new runner and flip the session to RUNNING.
    fn mark_action_running(&self, runner: &ScriptRunner) {
        let mut state = self.state.lock();
        state.action.state = Some(ActionState::Running);
        state.state = SessionState::Running;
        state.runner = Some(runner.clone());
    }

    /// The cumulative environment for the next action: the baseline
    /// process env, overlaid with the per-call variables, then each
    /// entered environment's changes in enter order.
    fn effective_env(
        &self,
        state: &SessionMutable,
        extra: Option<IndexMap<String, String>>,
    ) -> IndexMap<String, Option<String>> {
        let mut result: IndexMap<String, Option<String>> = self
            .process_env
            .iter()
            .map(|(name, value)| (name.clone(), Some(value.clone())))
            .collect();
        if let Some(extra) = extra {
            for (name, value) in extra {
                result.insert(name, Some(value));
            }
        }
        for identifier in &state.environments_entered {
            if let Some(changes) = state.created_env_vars.get(identifier) {
                changes.apply_to_environment(&mut result);
            }
        }
        result
    }

    /// Construct the symbol table for running a script, with
    /// fully-qualified value names.
    fn symbol_table(
        &self,
        revision: SpecificationRevision,
        task_parameter_values: Option<&TaskParameterSet>,
    ) -> SymbolTable {
        let constants = revision.constants();
        let mut symtab = SymbolTable::new();
        symtab.insert(
            constants.working_directory,
            self.working_dir.path().display().to_string(),
        );
        for (name, param) in &self.job_parameter_values {
            symtab.insert(
                format!("{}.{}", constants.job_parameter_raw_prefix, name),
                &param.value,
            );
            symtab.insert(
                format!("{}.{}", constants.job_parameter_prefix, name),
                self.processed_parameter_value(param),
            );
        }
        if let Some(task_parameters) = task_parameter_values {
            for (name, param) in task_parameters {
                symtab.insert(
                    format!("{}.{}", constants.task_parameter_raw_prefix, name),
                    &param.value,
                );
                symtab.insert(
                    format!("{}.{}", constants.task_parameter_prefix, name),
                    self.processed_parameter_value(param),
                );
            }
        }
        symtab
    }

    /// PATH parameters pass through the path-mapping rules; the first
    /// matching rule (longest source path first) wins.
    fn processed_parameter_value(&self, param: &ParameterValue) -> String {
        if param.kind == ParameterKind::Path {
            if let Some(rules) = &self.path_mapping_rules {
                for rule in rules {
                    if let Some(mapped) = rule.apply(&param.value) {
                        return mapped;
                    }
                }
            }
        }
        param.value.clone()
    }

    /// Write the path-mapping rules file for the next action and expose
    /// its path and presence through the symbol table.
    fn materialize_path_mapping(
        &self,
        revision: SpecificationRevision,
        symtab: &mut SymbolTable,
    ) -> Result<(), SessionError> {
        let constants = revision.constants();
        let rules_json = match &self.path_mapping_rules {
            Some(rules) if !rules.is_empty() => {
                symtab.insert(constants.has_path_mapping_rules, "true");
                serde_json::json!({
                    "version": "pathmapping-1.0",
                    "path_mapping_rules": rules,
                })
                .to_string()
            }
            _ => {
                symtab.insert(constants.has_path_mapping_rules, "false");
                "{}".to_string()
            }
        };
        let file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile_in(self.working_dir.path())?;
        let path = file
            .into_temp_path()
            .keep()
            .map_err(|e| SessionError::WorkingDirectory(e.to_string()))?;
        crate::embedded_files::write_file_for_user(&path, &rules_json, self.user.as_ref(), 0)?;
        symtab.insert(
            constants.path_mapping_rules_file,
            path.display().to_string(),
        );
        Ok(())
    }

    /// Routing for in-band messages found in the log stream.
    fn on_action_message(shared: &Arc<Self>, message: ActionMessage) {
        let status = {
            let mut state = shared.state.lock();
            match message {
                ActionMessage::Progress(value) => state.action.progress = Some(value),
                ActionMessage::Status(text) => state.action.status_message = Some(text),
                ActionMessage::Fail(text) => state.action.fail_message = Some(text),
                ActionMessage::Env { name, value } => {
                    // Only environment actions may mutate the session's
                    // variables; messages outside one are dropped.
                    if let Some(identifier) = state.running_environment.clone() {
                        if let Some(changes) = state.created_env_vars.get_mut(&identifier) {
                            changes.simplify_ordered_changes(&[
                                EnvironmentVariableChange::set(name, value),
                            ]);
                        }
                    }
                    return;
                }
                ActionMessage::UnsetEnv(name) => {
                    if let Some(identifier) = state.running_environment.clone() {
                        if let Some(changes) = state.created_env_vars.get_mut(&identifier) {
                            changes
                                .simplify_ordered_changes(&[EnvironmentVariableChange::unset(name)]);
                        }
                    }
                    return;
                }
                ActionMessage::RuntimeLogLevel(level) => {
                    shared.logger.set_level(level);
                    return;
                }
            }
            state.action.to_status()
        };
        if let (Some(callback), Some(status)) = (&shared.callback, status) {
            callback(&shared.session_id, status);
        }
    }

    /// Invoked by the runner when its action starts or reaches a
    /// terminal state.
    fn on_action_exit(shared: &Arc<Self>, action_state: ActionState) {
        let exit_code = {
            let runner = shared.state.lock().runner.clone();
            runner.and_then(|r| r.exit_code())
        };
        let status = {
            let mut state = shared.state.lock();
            state.action.exit_code = exit_code;
            state.action.state = Some(action_state);
            if action_state.is_terminal() {
                // Sessions are brittle: any failure or cancelation
                // leaves only environment exits admissible.
                state.state = if state.ending_only || action_state != ActionState::Success {
                    SessionState::ReadyEnding
                } else {
                    SessionState::Ready
                };
            }
            state.action.to_status()
        };
        if let (Some(callback), Some(status)) = (&shared.callback, status) {
            callback(&shared.session_id, status);
        }
    }

    /// First phase of the two-phase delete: remove what we can as the
    /// target user, since they may own files this process cannot touch.
    async fn delete_working_dir_as_user(&self, user: &SessionUser) {
        let entries: Vec<String> = match std::fs::read_dir(self.working_dir.path()) {
            Ok(entries) => entries
                .flatten()
                .map(|entry| entry.path().display().to_string())
                .collect(),
            Err(_) => return,
        };
        if entries.is_empty() {
            return;
        }
        let mut args: Vec<String>;
        if cfg!(windows) {
            args = ["powershell", "-Command", "Remove-Item", "-Recurse", "-Force"]
                .map(String::from)
                .to_vec();
            args.push(entries.join(", "));
        } else {
            args = vec!["rm".to_string(), "-rf".to_string()];
            args.extend(entries);
        }
        let subprocess =
            LoggingSubprocess::new(self.logger.clone(), args).with_user(Some(user.clone()));
        subprocess.run().await;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
