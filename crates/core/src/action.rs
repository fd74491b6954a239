// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions and their observable status

use crate::format::FormatString;
use std::time::Duration;

/// Runtime state of an Action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    /// The action is actively running.
    Running,
    /// The action has been canceled and is no longer running.
    Canceled,
    /// The action has been canceled due to reaching its runtime limit.
    Timeout,
    /// The action is no longer running; it failed to start or exited
    /// with a non-zero return code.
    Failed,
    /// The action is no longer running, and exited with a zero return code.
    Success,
}

impl ActionState {
    /// True for every state other than [`ActionState::Running`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionState::Running)
    }
}

/// Status of the currently- or last-running Action within a Session.
///
/// The progress, status, and failure fields reflect the most recent
/// in-band `openjd_*` message observed for the action; all fields reset
/// at the start of each new action.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionStatus {
    pub state: ActionState,
    /// Progress percentage reported by an `openjd_progress:` message.
    pub progress: Option<f64>,
    /// Status message reported by an `openjd_status:` message.
    pub status_message: Option<String>,
    /// Failure reason reported by an `openjd_fail:` message.
    pub fail_message: Option<String>,
    /// Exit code of the action's process, if it exited.
    ///
    /// May be absent in terminal states: entering an environment with no
    /// onEnter action produces SUCCESS with no exit code, and failing
    /// before spawn (e.g. an embedded-file write error) produces FAILED
    /// with no exit code.
    pub exit_code: Option<i32>,
}

impl ActionStatus {
    pub fn running() -> Self {
        Self {
            state: ActionState::Running,
            progress: None,
            status_message: None,
            fail_message: None,
            exit_code: None,
        }
    }
}

/// How an Action asks to be canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelationMethod {
    /// Immediately deliver the hard kill.
    Terminate,
    /// Send the notify signal, wait out a grace period, then hard kill.
    NotifyThenTerminate {
        /// Grace period between notify and kill. When absent the revision
        /// default for the action's scope applies.
        notify_period: Option<Duration>,
    },
}

/// A single command invocation defined by a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub command: FormatString,
    pub args: Vec<FormatString>,
    /// Runtime limit; the action is canceled when it elapses.
    pub timeout: Option<Duration>,
    /// Cancellation method; [`CancelationMethod::Terminate`] when absent.
    pub cancelation: Option<CancelationMethod>,
}

impl Action {
    pub fn new(command: impl Into<FormatString>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: None,
            cancelation: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<FormatString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FormatString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancelation(mut self, method: CancelationMethod) -> Self {
        self.cancelation = Some(method);
        self
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
