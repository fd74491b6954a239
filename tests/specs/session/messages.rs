// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-band message handling observed end to end.

use crate::prelude::*;
use ojs_core::{ActionState, TaskParameterSet};
use ojs_sessions::SessionState;

#[tokio::test]
async fn progress_and_status_reach_the_callback() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(
            shell_step("echo 'openjd_progress: 50'; echo 'openjd_status: halfway'"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    let statuses = fixture.statuses.statuses();
    assert!(statuses.iter().any(|s| s.progress == Some(50.0)));
    assert!(statuses
        .iter()
        .any(|s| s.status_message.as_deref() == Some("halfway")));
}

#[tokio::test]
async fn bad_progress_is_annotated_and_nonfatal() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(
            shell_step("echo 'openjd_progress: fifty'; echo still-running"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    // The line stays in the log, annotated; the action is unaffected.
    assert!(capture.contains(
        "openjd_progress: fifty -- ERROR: Progress must be a floating point value between \
         0.0 and 100.0, inclusive."
    ));
    assert!(capture.contains("still-running"));
    assert_eq!(
        session.action_status().unwrap().state,
        ActionState::Success
    );
    // No callback carried a progress value.
    assert!(fixture
        .statuses
        .statuses()
        .iter()
        .all(|s| s.progress.is_none()));
}

#[tokio::test]
async fn fail_message_is_captured_in_the_status() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(
            shell_step("echo 'openjd_fail: the disk is full'; exit 1"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::ReadyEnding).await;

    let status = session.action_status().unwrap();
    assert_eq!(status.state, ActionState::Failed);
    assert_eq!(status.fail_message.as_deref(), Some("the disk is full"));
    assert_eq!(status.exit_code, Some(1));
}

#[tokio::test]
async fn env_messages_outside_environments_are_dropped() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    // A task (not an environment action) tries to set a variable.
    session
        .run_task(
            shell_step("echo 'openjd_env: SNEAKY=value'"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    session
        .run_task(
            shell_step("echo SNEAKY=${SNEAKY:-ignored}"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    assert!(capture.contains("SNEAKY=ignored"));
}

#[tokio::test]
async fn runtime_loglevel_message_adjusts_the_session_logger() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(
            shell_step("echo 'openjd_session_runtime_loglevel: ERROR'; echo muted"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    // Output after the level change is below ERROR and suppressed.
    assert!(!capture.contains("muted"));
}
