// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basic task execution: parameter symbols resolve and the action
//! completes cleanly.

use crate::prelude::*;
use ojs_core::{ActionState, JobParameterValues, ParameterValue, TaskParameterSet};
use ojs_sessions::SessionState;

#[tokio::test]
async fn task_sees_job_and_task_parameters() {
    let (capture, _guard) = capture_logs();
    let mut job_params = JobParameterValues::new();
    job_params.insert("J".to_string(), ParameterValue::string("Jvalue"));
    let fixture = session_with_params(job_params);

    let mut task_params = TaskParameterSet::new();
    task_params.insert("P".to_string(), ParameterValue::string("Pvalue"));

    fixture
        .session
        .run_task(
            shell_step("echo '{{Param.J}} {{RawParam.J}}'; echo '{{Task.Param.P}} {{Task.RawParam.P}}'"),
            task_params,
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains("Jvalue Jvalue"));
    assert!(capture.contains("Pvalue Pvalue"));

    let status = fixture.session.action_status().unwrap();
    assert_eq!(status.state, ActionState::Success);
    assert_eq!(status.exit_code, Some(0));
}

#[tokio::test]
async fn task_runs_in_the_session_working_directory() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let working = fixture
        .session
        .working_directory()
        .canonicalize()
        .unwrap();

    fixture
        .session
        .run_task(shell_step("echo cwd=$(pwd)"), TaskParameterSet::new(), None)
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains(&format!("cwd={}", working.display())));
}

#[tokio::test]
async fn working_directory_symbol_resolves() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();

    fixture
        .session
        .run_task(
            shell_step("echo 'wd={{Session.WorkingDirectory}}'"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    let working = fixture.session.working_directory().display().to_string();
    assert!(capture.contains(&format!("wd={working}")));
}

#[tokio::test]
async fn failing_task_degrades_the_session() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();

    fixture
        .session
        .run_task(shell_step("exit 12"), TaskParameterSet::new(), None)
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::ReadyEnding).await;

    let status = fixture.session.action_status().unwrap();
    assert_eq!(status.state, ActionState::Failed);
    assert_eq!(status.exit_code, Some(12));

    // Only environment exits are admissible now.
    let error = fixture
        .session
        .run_task(shell_step("echo nope"), TaskParameterSet::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(error, ojs_sessions::SessionError::NotReady(_)));
}
