// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable layering across the environment stack.

use crate::prelude::*;
use ojs_core::{Action, Environment, EnvironmentActions, EnvironmentScript, TaskParameterSet};
use ojs_sessions::SessionState;

fn env_with_on_enter(name: &str, script: &str) -> Environment {
    Environment::new(name).script(EnvironmentScript {
        actions: EnvironmentActions {
            on_enter: Some(Action::new("/bin/sh").arg("-c").arg(script)),
            on_exit: None,
        },
        embedded_files: Vec::new(),
    })
}

#[tokio::test]
async fn environment_variables_layer_in_enter_order() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    let outer = Environment::new("outer")
        .variable("FOO", "FOO-value")
        .variable("BAR", "BAR-value");
    session.enter_environment(outer, None, None).await.unwrap();
    wait_for_state(session, SessionState::Ready).await;

    // The inner environment overrides FOO through the in-band protocol.
    let inner = env_with_on_enter("inner", "echo 'openjd_env: FOO=FOO-override'");
    session.enter_environment(inner, None, None).await.unwrap();
    wait_for_state(session, SessionState::Ready).await;

    session
        .run_task(
            shell_step("echo FOO=$FOO; echo BAR=$BAR"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    assert!(capture.contains("FOO=FOO-override"));
    assert!(capture.contains("BAR=BAR-value"));
}

#[tokio::test]
async fn unset_messages_remove_variables_from_later_actions() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    let env = Environment::new("clearing")
        .variable("DOOMED", "present")
        .script(EnvironmentScript {
            actions: EnvironmentActions {
                on_enter: Some(
                    Action::new("/bin/sh")
                        .arg("-c")
                        .arg("echo 'openjd_unset_env: DOOMED'"),
                ),
                on_exit: None,
            },
            embedded_files: Vec::new(),
        });
    session.enter_environment(env, None, None).await.unwrap();
    wait_for_state(session, SessionState::Ready).await;

    session
        .run_task(
            shell_step("echo DOOMED=${DOOMED:-cleared}"),
            TaskParameterSet::new(),
            None,
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    assert!(capture.contains("DOOMED=cleared"));
}

#[tokio::test]
async fn per_call_env_overlays_the_baseline_but_not_environments() {
    let (capture, _guard) = capture_logs();
    let mut baseline = indexmap::IndexMap::new();
    baseline.insert("LAYER".to_string(), "baseline".to_string());
    let fixture = build_session(ojs_core::JobParameterValues::new(), |builder| {
        builder.os_env_vars(baseline)
    });
    let session = &fixture.session;

    let env = Environment::new("winning").variable("LAYER", "environment");
    session.enter_environment(env, None, None).await.unwrap();
    wait_for_state(session, SessionState::Ready).await;

    let mut per_call = indexmap::IndexMap::new();
    per_call.insert("LAYER".to_string(), "per-call".to_string());
    session
        .run_task(
            shell_step("echo LAYER=$LAYER"),
            TaskParameterSet::new(),
            Some(per_call),
        )
        .await
        .unwrap();
    wait_for_state(session, SessionState::Ready).await;

    // Environment changes apply after the per-call overlay.
    assert!(capture.contains("LAYER=environment"));
}

#[tokio::test]
async fn exiting_environment_sees_its_own_variables() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    let env = Environment::new("self-aware")
        .variable("SELF", "visible")
        .script(EnvironmentScript {
            actions: EnvironmentActions {
                on_enter: None,
                on_exit: Some(
                    Action::new("/bin/sh")
                        .arg("-c")
                        .arg("echo exit-sees=$SELF"),
                ),
            },
            embedded_files: Vec::new(),
        });
    let id = session.enter_environment(env, None, None).await.unwrap();
    wait_for_state(session, SessionState::Ready).await;

    session.exit_environment(&id, None).await.unwrap();
    wait_for_state(session, SessionState::ReadyEnding).await;

    assert!(capture.contains("exit-sees=visible"));
}
