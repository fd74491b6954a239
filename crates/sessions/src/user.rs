// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS principals that session subprocesses run as.
//!
//! A session may be configured with a target principal distinct from
//! the process's own. On POSIX that is a user plus a shared group; on
//! Windows a user with either a password or a logon token. Everything
//! the runtime writes under the session working directory must remain
//! accessible to both the target principal and the current one.

use thiserror::Error;

/// Errors validating or resolving a principal descriptor.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid username: {0}")]
    BadUserName(String),
    #[error("invalid domain name: {0}")]
    BadDomainName(String),
    #[error("bad credentials: {0}")]
    BadCredentials(String),
    #[error("could not resolve process identity: {0}")]
    Identity(String),
}

/// The identity to run subprocesses as on Linux/macOS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixSessionUser {
    /// User name the subprocesses run under.
    pub user: String,
    /// Group shared between the target user and the current process;
    /// files in the session directory are group-owned by it.
    pub group: String,
}

impl PosixSessionUser {
    /// Descriptor with the group defaulting to this process's effective
    /// group.
    #[cfg(unix)]
    pub fn new(user: impl Into<String>) -> Result<Self, UserError> {
        let egid = nix::unistd::getegid();
        let group = nix::unistd::Group::from_gid(egid)
            .map_err(|e| UserError::Identity(e.to_string()))?
            .ok_or_else(|| UserError::Identity(format!("no group with gid {egid}")))?;
        Ok(Self {
            user: user.into(),
            group: group.name,
        })
    }

    pub fn with_group(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    /// True when this descriptor names the user running the current
    /// process.
    #[cfg(unix)]
    pub fn is_process_user(&self) -> bool {
        matches!(
            nix::unistd::User::from_uid(nix::unistd::geteuid()),
            Ok(Some(current)) if current.name == self.user
        )
    }
}

/// Credential material for a Windows logon.
///
/// When both forms are conceivable the logon-token path is preferred:
/// it supports running from Session 0. Password logon is the fallback.
#[derive(Clone)]
pub enum WindowsCredential {
    Password(String),
    /// A logon token handle obtained by the embedder.
    LogonToken(u64),
}

impl std::fmt::Debug for WindowsCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowsCredential::Password(_) => f.write_str("Password(<redacted>)"),
            WindowsCredential::LogonToken(handle) => write!(f, "LogonToken({handle})"),
        }
    }
}

/// The identity to run subprocesses as on Windows.
#[derive(Debug, Clone)]
pub struct WindowsSessionUser {
    /// Plain username for a local user, or a domain username in
    /// down-level logon form (`domain\user`). UPN form is normalised to
    /// down-level form at construction on domain-joined hosts.
    pub user: String,
    /// Optional group granted access alongside the user.
    pub group: Option<String>,
    /// Credential; required when the user differs from the process user.
    pub credential: Option<WindowsCredential>,
}

const RESTRICTED_USERNAME_CHARS: &str = "\"/[]:|<>+=;,?*%@";

impl WindowsSessionUser {
    pub fn new(
        user: impl Into<String>,
        group: Option<String>,
        credential: Option<WindowsCredential>,
    ) -> Result<Self, UserError> {
        let mut user = user.into();

        #[cfg(windows)]
        if user.contains('@') {
            if let Some(services) = crate::win32::win32_services() {
                user = services
                    .translate_to_down_level(&user)
                    .map_err(|e| UserError::BadUserName(e.to_string()))?;
            }
        }

        let (domain, username) = Self::split_domain_and_username(&user);
        Self::validate_username(username)?;
        if let Some(domain) = domain {
            Self::validate_domain(domain)?;
        }

        let built = Self {
            user: std::mem::take(&mut user),
            group,
            credential,
        };

        #[cfg(windows)]
        if built.credential.is_none() && !built.is_process_user() {
            return Err(UserError::BadCredentials(
                "a password or logon token is required when the user is not the process user"
                    .to_string(),
            ));
        }

        Ok(built)
    }

    /// Split a down-level `domain\user` name into its parts.
    pub fn split_domain_and_username(name: &str) -> (Option<&str>, &str) {
        match name.split_once('\\') {
            Some((domain, user)) => (Some(domain), user),
            None => (None, name),
        }
    }

    /// Username rules: 1–256 characters, none from the restricted set,
    /// and not the literal name `NONE`.
    pub fn validate_username(username: &str) -> Result<(), UserError> {
        if username.is_empty() || username.len() > 256 {
            return Err(UserError::BadUserName(
                "username must have a length between 1 and 256 characters".to_string(),
            ));
        }
        if let Some(bad) = username.chars().find(|c| RESTRICTED_USERNAME_CHARS.contains(*c)) {
            return Err(UserError::BadUserName(format!(
                "username contains restricted character {bad:?}"
            )));
        }
        if username.eq_ignore_ascii_case("NONE") {
            return Err(UserError::BadUserName(
                "username cannot be 'NONE'".to_string(),
            ));
        }
        Ok(())
    }

    /// Domain rules: characters from `[A-Za-z0-9\-.]` only, length 2–255.
    pub fn validate_domain(domain: &str) -> Result<(), UserError> {
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(UserError::BadDomainName(format!(
                "domain name '{domain}' contains disallowed characters"
            )));
        }
        if domain.len() < 2 || domain.len() > 255 {
            return Err(UserError::BadDomainName(
                "domain name must have a length between 2 and 255 characters".to_string(),
            ));
        }
        Ok(())
    }

    /// True when this descriptor names the user running the current
    /// process.
    pub fn is_process_user(&self) -> bool {
        crate::win32::win32_services()
            .and_then(|services| services.process_user().ok())
            .is_some_and(|current| current.eq_ignore_ascii_case(&self.user))
    }
}

/// A target principal for a session.
#[derive(Debug, Clone)]
pub enum SessionUser {
    Posix(PosixSessionUser),
    Windows(WindowsSessionUser),
}

impl SessionUser {
    /// The bare user name of the principal.
    pub fn user_name(&self) -> &str {
        match self {
            SessionUser::Posix(user) => &user.user,
            SessionUser::Windows(user) => &user.user,
        }
    }

    pub fn posix(&self) -> Option<&PosixSessionUser> {
        match self {
            SessionUser::Posix(user) => Some(user),
            SessionUser::Windows(_) => None,
        }
    }

    pub fn windows(&self) -> Option<&WindowsSessionUser> {
        match self {
            SessionUser::Windows(user) => Some(user),
            SessionUser::Posix(_) => None,
        }
    }

    /// True when the principal is the user running the current process.
    pub fn is_process_user(&self) -> bool {
        match self {
            #[cfg(unix)]
            SessionUser::Posix(user) => user.is_process_user(),
            #[cfg(not(unix))]
            SessionUser::Posix(_) => false,
            SessionUser::Windows(user) => user.is_process_user(),
        }
    }
}

impl From<PosixSessionUser> for SessionUser {
    fn from(user: PosixSessionUser) -> Self {
        SessionUser::Posix(user)
    }
}

impl From<WindowsSessionUser> for SessionUser {
    fn from(user: WindowsSessionUser) -> Self {
        SessionUser::Windows(user)
    }
}

#[cfg(test)]
#[path = "user_tests.rs"]
mod tests;
