// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner for Environment onEnter/onExit actions.

use super::{ScriptRunner, ScriptRunnerConfig, ScriptRunnerState};
use crate::logging::log_subsection_banner;
use ojs_core::{Action, EmbeddedFilesScope, EnvironmentScript, SpecificationRevision, SymbolTable};
use std::path::PathBuf;
use std::time::Duration;

/// Runs the actions of one Environment.
///
/// An environment with no script, or no action for the requested phase,
/// completes immediately with SUCCESS.
pub struct EnvironmentScriptRunner {
    base: ScriptRunner,
    script: Option<EnvironmentScript>,
    revision: SpecificationRevision,
    symtab: SymbolTable,
    session_files_directory: PathBuf,
}

impl EnvironmentScriptRunner {
    pub fn new(
        config: ScriptRunnerConfig,
        script: Option<EnvironmentScript>,
        revision: SpecificationRevision,
        symtab: SymbolTable,
        session_files_directory: PathBuf,
    ) -> Self {
        Self {
            base: ScriptRunner::new(config),
            script,
            revision,
            symtab,
            session_files_directory,
        }
    }

    /// The underlying runner handle; used to cancel and to observe
    /// state after this wrapper is dropped.
    pub fn runner(&self) -> &ScriptRunner {
        &self.base
    }

    /// Run the Environment's onEnter action.
    pub async fn enter(&self) {
        let action = self
            .script
            .as_ref()
            .and_then(|script| script.actions.on_enter.clone());
        self.run_env_action(action).await;
    }

    /// Run the Environment's onExit action.
    pub async fn exit(&self) {
        let action = self
            .script
            .as_ref()
            .and_then(|script| script.actions.on_exit.clone());
        self.run_env_action(action).await;
    }

    pub fn cancel(&self, time_limit: Option<Duration>) {
        self.base.cancel(time_limit);
    }

    pub fn state(&self) -> ScriptRunnerState {
        self.base.state()
    }

    async fn run_env_action(&self, action: Option<Action>) {
        let Some(action) = action else {
            // Nothing to do; tell the caller the run is complete.
            self.base.succeed_without_action();
            return;
        };

        log_subsection_banner(self.base.logger(), "Phase: Setup");

        let embedded_files = self
            .script
            .as_ref()
            .map(|script| script.embedded_files.as_slice())
            .unwrap_or_default();
        let symtab = if embedded_files.is_empty() {
            self.symtab.clone()
        } else {
            let mut derived = SymbolTable::derived(&self.symtab);
            if !self.base.materialize_files(
                self.revision,
                EmbeddedFilesScope::Env,
                embedded_files,
                &self.session_files_directory,
                &mut derived,
            ) {
                return;
            }
            derived
        };

        let default_grace = self.revision.default_notify_grace(EmbeddedFilesScope::Env);
        self.base.run_action(&action, &symtab, default_grace).await;
    }
}
