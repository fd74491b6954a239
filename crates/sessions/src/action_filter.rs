// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-band action message filter.
//!
//! Child processes communicate with the runtime through single lines of
//! stdout/stderr of the form:
//!
//! ```text
//! openjd_progress: <float between 0.0 and 100.0>
//! openjd_status: <string indicating the new status>
//! openjd_fail: <string indicating a failure message>
//! openjd_env: <env var name>=<string value>
//! openjd_unset_env: <env var name>
//! openjd_session_runtime_loglevel: [ERROR | WARNING | INFO | DEBUG]
//! ```
//!
//! The filter extracts these as structured [`ActionMessage`]s without
//! losing ordinary log lines. A line that matches a kind but fails to
//! parse stays in the log with an ` -- ERROR: <reason>` annotation and
//! produces no message.

use crate::logging::LogLevel;
use ojs_core::env::is_valid_env_var_name;
use regex::Regex;
use std::sync::LazyLock;

const MIN_PROGRESS: f64 = 0.0;
const MAX_PROGRESS: f64 = 100.0;

// A composite regex matching each message kind to a named capture group
// with the same name as the kind. Anchored; the prefix is case- and
// space-sensitive.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static FILTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "^openjd_(?:(?P<progress>progress)|(?P<status>status)|(?P<fail>fail)|(?P<env>env)\
         |(?P<unset_env>unset_env)|(?P<session_runtime_loglevel>session_runtime_loglevel)): (.+)$",
    )
    .expect("constant regex pattern is valid")
});

const KIND_GROUPS: [&str; 6] = [
    "progress",
    "status",
    "fail",
    "env",
    "unset_env",
    "session_runtime_loglevel",
];

/// A structured message extracted from the log stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionMessage {
    Progress(f64),
    Status(String),
    Fail(String),
    Env { name: String, value: String },
    UnsetEnv(String),
    RuntimeLogLevel(LogLevel),
}

/// Outcome of filtering one log line.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDecision {
    /// The record to keep in the log; `None` means the line is
    /// suppressed.
    pub record: Option<String>,
    /// The structured message to dispatch, when the line parsed as one.
    pub message: Option<ActionMessage>,
}

impl FilterDecision {
    fn pass_through(line: &str) -> Self {
        Self {
            record: Some(line.to_string()),
            message: None,
        }
    }
}

/// Line filter for one session's log stream.
#[derive(Debug, Clone, Default)]
pub struct ActionMessageFilter {
    /// When set, successfully parsed message lines are removed from the
    /// log instead of kept.
    suppress_filtered: bool,
}

impl ActionMessageFilter {
    pub fn new(suppress_filtered: bool) -> Self {
        Self { suppress_filtered }
    }

    /// Parse one log line.
    ///
    /// Lines that match no message kind pass through untouched. Matched
    /// lines yield a message and are kept or dropped per the suppression
    /// flag; matched lines whose payload fails to parse are annotated
    /// and kept, with no message.
    pub fn filter_line(&self, line: &str) -> FilterDecision {
        let Some(captures) = FILTER_PATTERN.captures(line) else {
            return FilterDecision::pass_through(line);
        };
        let matched_kinds: Vec<&str> = KIND_GROUPS
            .iter()
            .filter(|kind| captures.name(kind).is_some())
            .copied()
            .collect();
        if matched_kinds.len() != 1 {
            // Only reachable if the pattern itself is broken.
            tracing::error!(
                target: crate::logging::LOG_TARGET,
                "Open Job Description: Malformed output stream filter matched multiple kinds ({})",
                matched_kinds.join(",")
            );
            return FilterDecision::pass_through(line);
        }
        // The final unnamed group is the payload; present whenever the
        // pattern matched.
        let Some(payload) = captures.get(captures.len() - 1) else {
            return FilterDecision::pass_through(line);
        };
        match Self::parse_payload(matched_kinds[0], payload.as_str()) {
            Ok(message) => FilterDecision {
                record: (!self.suppress_filtered).then(|| line.to_string()),
                message: Some(message),
            },
            Err(reason) => FilterDecision {
                record: Some(format!("{line} -- ERROR: {reason}")),
                message: None,
            },
        }
    }

    fn parse_payload(kind: &str, payload: &str) -> Result<ActionMessage, String> {
        match kind {
            "progress" => Self::parse_progress(payload),
            "status" => Ok(ActionMessage::Status(payload.to_string())),
            "fail" => Ok(ActionMessage::Fail(payload.to_string())),
            "env" => Self::parse_env(payload),
            "unset_env" => Self::parse_unset_env(payload),
            "session_runtime_loglevel" => Self::parse_loglevel(payload),
            _ => Err(format!("Unhandled message kind ({kind})")),
        }
    }

    fn parse_progress(payload: &str) -> Result<ActionMessage, String> {
        let error = || {
            format!(
                "Progress must be a floating point value between {MIN_PROGRESS:?} and \
                 {MAX_PROGRESS:?}, inclusive."
            )
        };
        let value: f64 = payload.trim().parse().map_err(|_| error())?;
        if !value.is_finite() || !(MIN_PROGRESS..=MAX_PROGRESS).contains(&value) {
            return Err(error());
        }
        Ok(ActionMessage::Progress(value))
    }

    fn parse_env(payload: &str) -> Result<ActionMessage, String> {
        // <varname>=<value> where <value> may be empty.
        let payload = payload.trim_start();
        let Some((name, value)) = payload.split_once('=') else {
            return Err("Failed to parse environment variable assignment.".to_string());
        };
        if !is_valid_env_var_name(name) {
            return Err("Failed to parse environment variable assignment.".to_string());
        }
        Ok(ActionMessage::Env {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_unset_env(payload: &str) -> Result<ActionMessage, String> {
        let payload = payload.trim_start();
        if !is_valid_env_var_name(payload) {
            return Err("Failed to parse environment variable name.".to_string());
        }
        Ok(ActionMessage::UnsetEnv(payload.to_string()))
    }

    fn parse_loglevel(payload: &str) -> Result<ActionMessage, String> {
        let level = match payload.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            other => {
                return Err(format!(
                    "Unknown log level: {other}. Known values: DEBUG,INFO,WARNING,ERROR"
                ))
            }
        };
        Ok(ActionMessage::RuntimeLogLevel(level))
    }
}

#[cfg(test)]
#[path = "action_filter_tests.rs"]
mod tests;
