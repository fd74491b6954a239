// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase cancellation: notify, grace, terminate.

use crate::prelude::*;
use ojs_core::{Action, ActionState, CancelationMethod, StepScript, TaskParameterSet};
use ojs_sessions::SessionState;
use std::time::{Duration, Instant};

/// A long-running child that traps the notify signal, announces it, and
/// keeps printing numbers until killed.
fn chatty_trap_step() -> StepScript {
    StepScript::new(
        Action::new("/bin/sh")
            .arg("-c")
            .arg("trap 'echo Trapped' TERM; i=0; while [ $i -lt 400 ]; do echo $i; i=$((i+1)); sleep 0.05; done")
            .cancelation(CancelationMethod::NotifyThenTerminate { notify_period: None }),
    )
}

#[tokio::test]
async fn notify_then_terminate_lets_the_child_wind_down() {
    let (capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(chatty_trap_step(), TaskParameterSet::new(), None)
        .await
        .unwrap();
    // Let the child get into its print loop.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let canceled_at = chrono::Utc::now();
    session.cancel_action(Some(Duration::from_secs(2))).unwrap();

    assert_eq!(wait_until_idle(session).await, SessionState::ReadyEnding);
    let status = session.action_status().unwrap();
    assert_eq!(status.state, ActionState::Canceled);

    // The child observed the notify signal and kept printing.
    let trapped = capture.position("Trapped").expect("Trapped in log");
    let numbers_after = capture
        .lines()
        .iter()
        .skip(trapped + 1)
        .filter(|line| line.chars().all(|c| c.is_ascii_digit()) && !line.is_empty())
        .count();
    assert!(numbers_after >= 1, "no output after the notify signal");

    // cancel_info.json announces a grace end about two seconds out.
    let info = std::fs::read_to_string(session.working_directory().join("cancel_info.json"))
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&info).unwrap();
    let notify_end = chrono::NaiveDateTime::parse_from_str(
        parsed["NotifyEnd"].as_str().unwrap(),
        "%Y-%m-%dT%H:%M:%SZ",
    )
    .unwrap()
    .and_utc();
    let offset = notify_end - canceled_at;
    assert!(
        offset >= chrono::Duration::seconds(1) && offset <= chrono::Duration::seconds(3),
        "NotifyEnd {offset:?} not ~2s after the cancel"
    );
}

#[tokio::test]
async fn repeated_cancels_shrink_the_grace_period() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    session
        .run_task(chatty_trap_step(), TaskParameterSet::new(), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let first_cancel = Instant::now();
    session.cancel_action(Some(Duration::from_secs(15))).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    session.cancel_action(Some(Duration::from_secs(1))).unwrap();

    assert_eq!(wait_until_idle(session).await, SessionState::ReadyEnding);
    // Died on the shrunk grace (±scheduling slack), nowhere near 15s.
    assert!(
        first_cancel.elapsed() < Duration::from_secs(6),
        "child survived past the shrunk grace: {:?}",
        first_cancel.elapsed()
    );
    assert_eq!(
        session.action_status().unwrap().state,
        ActionState::Canceled
    );
}

#[tokio::test]
async fn runtime_limit_times_the_action_out() {
    let (_capture, _guard) = capture_logs();
    let fixture = simple_session();
    let session = &fixture.session;

    let step = StepScript::new(
        Action::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30")
            .timeout(Duration::from_millis(400)),
    );
    session
        .run_task(step, TaskParameterSet::new(), None)
        .await
        .unwrap();

    assert_eq!(wait_until_idle(session).await, SessionState::ReadyEnding);
    let status = session.action_status().unwrap();
    assert_eq!(status.state, ActionState::Timeout);
}
