// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers: capture tracing output for assertions.
//!
//! Unit tests run on tokio's current-thread runtime, so a thread-local
//! default subscriber observes every event the runtime and its tasks
//! emit.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt as _};

/// Handle to the log lines captured while the paired guard is alive.
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }

    /// Index of the first captured line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines.lock().iter().position(|line| line.contains(needle))
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
            self.capture.lines.lock().push(message);
        }
    }
}

/// Install a capturing subscriber as the thread default. Keep the guard
/// alive for the duration of the assertions.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        capture: capture.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
