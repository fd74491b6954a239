// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner for a Step script's onRun action.

use super::{ScriptRunner, ScriptRunnerConfig, ScriptRunnerState};
use crate::logging::log_subsection_banner;
use ojs_core::{EmbeddedFilesScope, StepScript, SymbolTable};
use std::path::PathBuf;
use std::time::Duration;

/// Runs the onRun action of a Step script for one Task.
pub struct StepScriptRunner {
    base: ScriptRunner,
    script: StepScript,
    symtab: SymbolTable,
    session_files_directory: PathBuf,
}

impl StepScriptRunner {
    pub fn new(
        config: ScriptRunnerConfig,
        script: StepScript,
        symtab: SymbolTable,
        session_files_directory: PathBuf,
    ) -> Self {
        Self {
            base: ScriptRunner::new(config),
            script,
            symtab,
            session_files_directory,
        }
    }

    /// The underlying runner handle.
    pub fn runner(&self) -> &ScriptRunner {
        &self.base
    }

    /// Run the Step script's onRun action.
    pub async fn run(&self) {
        log_subsection_banner(self.base.logger(), "Phase: Setup");

        let symtab = if self.script.embedded_files.is_empty() {
            self.symtab.clone()
        } else {
            let mut derived = SymbolTable::derived(&self.symtab);
            if !self.base.materialize_files(
                self.script.revision,
                EmbeddedFilesScope::Task,
                &self.script.embedded_files,
                &self.session_files_directory,
                &mut derived,
            ) {
                return;
            }
            derived
        };

        let default_grace = self
            .script
            .revision
            .default_notify_grace(EmbeddedFilesScope::Task);
        self.base
            .run_action(&self.script.actions.on_run, &symtab, default_grace)
            .await;
    }

    pub fn cancel(&self, time_limit: Option<Duration>) {
        self.base.cancel(time_limit);
    }

    pub fn state(&self) -> ScriptRunnerState {
        self.base.state()
    }
}
