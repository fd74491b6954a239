// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    canceled = { ActionState::Canceled, true },
    timeout = { ActionState::Timeout, true },
    failed = { ActionState::Failed, true },
    success = { ActionState::Success, true },
    running = { ActionState::Running, false },
)]
fn terminal_states(state: ActionState, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}

#[test]
fn running_status_starts_empty() {
    let status = ActionStatus::running();
    assert_eq!(status.state, ActionState::Running);
    assert!(status.progress.is_none());
    assert!(status.status_message.is_none());
    assert!(status.fail_message.is_none());
    assert!(status.exit_code.is_none());
}

#[test]
fn action_builder_composes() {
    let action = Action::new("echo")
        .arg("{{Param.Greeting}}")
        .timeout(Duration::from_secs(5))
        .cancelation(CancelationMethod::NotifyThenTerminate {
            notify_period: Some(Duration::from_secs(2)),
        });
    assert_eq!(action.command.template(), "echo");
    assert_eq!(action.args.len(), 1);
    assert_eq!(action.timeout, Some(Duration::from_secs(5)));
}
