// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path mapping applied to PATH parameters and exposed to actions.

use crate::prelude::*;
use ojs_core::{JobParameterValues, ParameterValue, PathFormat, PathMappingRule, TaskParameterSet};
use ojs_sessions::SessionState;

fn mapped_session() -> SessionFixture {
    build_session(JobParameterValues::new(), |builder| {
        builder.path_mapping_rules(vec![
            PathMappingRule::new(PathFormat::Posix, "/mnt", "/home"),
            PathMappingRule::new(PathFormat::Posix, "/mnt/share", "/share"),
        ])
    })
}

#[tokio::test]
async fn longest_source_path_wins_regardless_of_rule_order() {
    let (capture, _guard) = capture_logs();
    let fixture = mapped_session();

    let mut task_params = TaskParameterSet::new();
    task_params.insert(
        "P".to_string(),
        ParameterValue::path("/mnt/share/foo"),
    );
    fixture
        .session
        .run_task(
            shell_step("echo 'mapped={{Task.Param.P}} raw={{Task.RawParam.P}}'"),
            task_params,
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains("mapped=/share/foo raw=/mnt/share/foo"));
}

#[tokio::test]
async fn unmatched_paths_pass_through_unchanged() {
    let (capture, _guard) = capture_logs();
    let fixture = mapped_session();

    let mut task_params = TaskParameterSet::new();
    task_params.insert(
        "P".to_string(),
        ParameterValue::path("/elsewhere/foo"),
    );
    fixture
        .session
        .run_task(
            shell_step("echo 'mapped={{Task.Param.P}}'"),
            task_params,
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains("mapped=/elsewhere/foo"));
}

#[tokio::test]
async fn non_path_parameters_are_never_mapped() {
    let (capture, _guard) = capture_logs();
    let fixture = mapped_session();

    let mut task_params = TaskParameterSet::new();
    task_params.insert(
        "P".to_string(),
        ParameterValue::string("/mnt/share/foo"),
    );
    fixture
        .session
        .run_task(
            shell_step("echo 'mapped={{Task.Param.P}}'"),
            task_params,
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains("mapped=/mnt/share/foo"));
}

#[tokio::test]
async fn actions_see_the_rules_file_symbols() {
    let (capture, _guard) = capture_logs();
    let fixture = mapped_session();

    fixture
        .session
        .run_task(
            shell_step(
                "echo 'has={{Session.HasPathMappingRules}}'; cat '{{Session.PathMappingRulesFile}}'",
            ),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains("has=true"));
    assert!(capture.contains("pathmapping-1.0"));
}

#[tokio::test]
async fn without_rules_the_flag_symbol_is_false() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();

    fixture
        .session
        .run_task(
            shell_step("echo 'has={{Session.HasPathMappingRules}}'"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(&fixture.session, SessionState::Ready).await;

    assert!(capture.contains("has=false"));
}
