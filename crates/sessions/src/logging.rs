// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-scoped logging.
//!
//! All runtime output (the session's own messages and every line of
//! child stdout/stderr) flows through a [`SessionLogger`] bound to one
//! session id. The logger runs each line through the in-band action
//! message filter first, dispatches any structured message it finds to
//! the session, and then emits the (possibly annotated) record through
//! `tracing` with a `session_id` field. Callers attach their own
//! subscribers; nothing here writes to files or sockets.

use crate::action_filter::{ActionMessage, ActionMessageFilter};
use ojs_core::SessionId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Target used for every record the runtime emits.
pub const LOG_TARGET: &str = "ojs_sessions";

/// Handler invoked with each structured in-band message found in the
/// session's log stream.
pub type ActionMessageHandler = Box<dyn Fn(ActionMessage) + Send + Sync>;

/// Log severities addressable by the in-band
/// `openjd_session_runtime_loglevel` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }
}

struct LoggerInner {
    session_id: SessionId,
    filter: ActionMessageFilter,
    min_level: AtomicU8,
    handler: RwLock<Option<Arc<dyn Fn(ActionMessage) + Send + Sync>>>,
}

/// Clonable logging handle bound to one session.
#[derive(Clone)]
pub struct SessionLogger {
    inner: Arc<LoggerInner>,
}

impl SessionLogger {
    pub fn new(session_id: SessionId) -> Self {
        Self::with_filter(session_id, ActionMessageFilter::default())
    }

    pub fn with_filter(session_id: SessionId, filter: ActionMessageFilter) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                session_id,
                filter,
                min_level: AtomicU8::new(LogLevel::Info as u8),
                handler: RwLock::new(None),
            }),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Install the handler that receives structured in-band messages.
    /// Replaces any previous handler.
    pub fn set_message_handler(&self, handler: ActionMessageHandler) {
        *self.inner.handler.write() = Some(Arc::from(handler));
    }

    /// Remove the message handler. Subsequent in-band messages are
    /// parsed (and annotated on error) but not dispatched.
    pub fn clear_message_handler(&self) {
        *self.inner.handler.write() = None;
    }

    /// Adjust the minimum severity that reaches the log.
    pub fn set_level(&self, level: LogLevel) {
        self.inner.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.min_level.load(Ordering::Relaxed))
    }

    pub fn debug(&self, line: impl AsRef<str>) {
        self.log(LogLevel::Debug, line.as_ref());
    }

    pub fn info(&self, line: impl AsRef<str>) {
        self.log(LogLevel::Info, line.as_ref());
    }

    pub fn warn(&self, line: impl AsRef<str>) {
        self.log(LogLevel::Warning, line.as_ref());
    }

    pub fn error(&self, line: impl AsRef<str>) {
        self.log(LogLevel::Error, line.as_ref());
    }

    fn log(&self, level: LogLevel, line: &str) {
        if level < self.level() {
            return;
        }
        let decision = self.inner.filter.filter_line(line);
        if let Some(message) = decision.message {
            // Clone the handler out so the dispatch runs without the
            // lock; handlers may log through this same logger.
            let handler = self.inner.handler.read().clone();
            if let Some(handler) = handler {
                handler(message);
            }
        }
        let Some(record) = decision.record else {
            return;
        };
        let session_id = self.inner.session_id.as_str();
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: LOG_TARGET, session_id, "{record}")
            }
            LogLevel::Info => {
                tracing::info!(target: LOG_TARGET, session_id, "{record}")
            }
            LogLevel::Warning => {
                tracing::warn!(target: LOG_TARGET, session_id, "{record}")
            }
            LogLevel::Error => {
                tracing::error!(target: LOG_TARGET, session_id, "{record}")
            }
        }
    }
}

pub fn log_section_banner(logger: &SessionLogger, section_title: &str) {
    logger.info("");
    logger.info("==============================================");
    logger.info(format!("--------- {section_title}"));
    logger.info("==============================================");
}

pub fn log_subsection_banner(logger: &SessionLogger, section_title: &str) {
    logger.info("----------------------------------------------");
    logger.info(section_title);
    logger.info("----------------------------------------------");
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
