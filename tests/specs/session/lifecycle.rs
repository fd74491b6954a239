// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle ordering and cleanup.

use crate::prelude::*;
use ojs_core::{Environment, TaskParameterSet};
use ojs_sessions::{SessionError, SessionState};

#[tokio::test]
async fn environment_stack_is_strictly_lifo() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    let first = session
        .enter_environment(Environment::new("first"), None, None)
        .await
        .unwrap();
    let second = session
        .enter_environment(Environment::new("second"), None, None)
        .await
        .unwrap();
    let third = session
        .enter_environment(Environment::new("third"), None, None)
        .await
        .unwrap();
    assert_eq!(
        session.environments_entered(),
        vec![first.clone(), second.clone(), third.clone()]
    );

    // Exits in any order other than reverse are rejected.
    for wrong in [&first, &second] {
        let error = session.exit_environment(wrong, None).await.unwrap_err();
        assert!(matches!(error, SessionError::NotInnermostEnvironment { .. }));
    }

    session.exit_environment(&third, None).await.unwrap();
    session.exit_environment(&second, None).await.unwrap();
    session.exit_environment(&first, None).await.unwrap();
    assert!(session.environments_entered().is_empty());
    assert_eq!(session.state(), SessionState::ReadyEnding);
}

#[tokio::test]
async fn after_a_failure_only_exits_are_admissible() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    let id = session
        .enter_environment(Environment::new("outer"), None, None)
        .await
        .unwrap();
    session
        .run_task(shell_step("exit 1"), TaskParameterSet::new(), None)
        .await
        .unwrap();
    wait_for_state(session, SessionState::ReadyEnding).await;

    assert!(matches!(
        session
            .run_task(shell_step("echo no"), TaskParameterSet::new(), None)
            .await,
        Err(SessionError::NotReady(_))
    ));
    assert!(matches!(
        session
            .enter_environment(Environment::new("late"), None, None)
            .await,
        Err(SessionError::NotReady(_))
    ));

    // The exit path stays open for teardown.
    session.exit_environment(&id, None).await.unwrap();
    wait_for_state(session, SessionState::ReadyEnding).await;
}

#[tokio::test]
async fn cleanup_ends_the_session_and_deletes_the_working_directory() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;
    let working = session.working_directory().to_path_buf();

    session
        .run_task(
            shell_step("echo scratch > produced.txt"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;
    assert!(working.join("produced.txt").exists());

    session.cleanup().await;
    assert_eq!(session.state(), SessionState::Ended);
    assert!(!working.exists());

    // Idempotent.
    session.cleanup().await;
    assert_eq!(session.state(), SessionState::Ended);
}

#[tokio::test]
async fn cleanup_stops_a_running_action() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(shell_step("sleep 30"), TaskParameterSet::new(), None)
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Running);

    session.cleanup().await;
    assert_eq!(session.state(), SessionState::Ended);
    assert!(!session.working_directory().exists());
}
