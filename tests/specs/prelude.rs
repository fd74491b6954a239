// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use ojs_core::{Action, ActionStatus, JobParameterValues, SessionId, StepScript};
use ojs_sessions::{Session, SessionState};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt as _};

pub const SPEC_POLL_INTERVAL_MS: u64 = 25;
pub const SPEC_WAIT_MAX_MS: u64 = 30_000;

/// Log lines captured while the paired guard is alive.
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains(needle))
    }

    /// Index of the first captured line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .position(|line| line.contains(needle))
    }
}

struct CaptureLayer {
    capture: LogCapture,
}

struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor { message: None };
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            self.capture.lines.lock().unwrap().push(message);
        }
    }
}

/// Install a capturing subscriber as the thread default.
///
/// Specs run on tokio's current-thread runtime, so every task of the
/// session under test logs to the capturing subscriber.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        capture: capture.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

/// Collects every `ActionStatus` the session reports.
#[derive(Clone, Default)]
pub struct StatusLog {
    statuses: Arc<Mutex<Vec<ActionStatus>>>,
}

impl StatusLog {
    pub fn callback(&self) -> ojs_sessions::SessionCallback {
        let sink = self.statuses.clone();
        Arc::new(move |_, status| sink.lock().unwrap().push(status))
    }

    pub fn statuses(&self) -> Vec<ActionStatus> {
        self.statuses.lock().unwrap().clone()
    }
}

/// A session rooted in a throwaway directory, with a status log.
pub struct SessionFixture {
    pub session: Session,
    pub statuses: StatusLog,
    _root: tempfile::TempDir,
}

pub fn session_with_params(job_parameter_values: JobParameterValues) -> SessionFixture {
    build_session(job_parameter_values, |builder| builder)
}

pub fn simple_session() -> SessionFixture {
    session_with_params(JobParameterValues::new())
}

pub fn build_session(
    job_parameter_values: JobParameterValues,
    configure: impl FnOnce(ojs_sessions::SessionBuilder) -> ojs_sessions::SessionBuilder,
) -> SessionFixture {
    let root = tempfile::tempdir().unwrap();
    let statuses = StatusLog::default();
    let builder = Session::builder(SessionId::new("spec-session"), job_parameter_values)
        .session_root_directory(root.path().to_path_buf())
        .callback(statuses.callback());
    let session = configure(builder).build().unwrap();
    SessionFixture {
        session,
        statuses,
        _root: root,
    }
}

/// A step script that runs `script` through `/bin/sh -c`.
pub fn shell_step(script: &str) -> StepScript {
    StepScript::new(Action::new("/bin/sh").arg("-c").arg(script))
}

pub async fn wait_for_state(session: &Session, expected: SessionState) {
    let deadline =
        std::time::Instant::now() + std::time::Duration::from_millis(SPEC_WAIT_MAX_MS);
    while std::time::Instant::now() < deadline {
        if session.state() == expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
    panic!(
        "session never reached {expected:?}; still at {:?}",
        session.state()
    );
}

/// Wait until the session leaves RUNNING, returning its resting state.
pub async fn wait_until_idle(session: &Session) -> SessionState {
    let deadline =
        std::time::Instant::now() + std::time::Duration::from_millis(SPEC_WAIT_MAX_MS);
    while std::time::Instant::now() < deadline {
        let state = session.state();
        if state != SessionState::Running && state != SessionState::Canceling {
            return state;
        }
        tokio::time::sleep(std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
    panic!("session never left RUNNING");
}
