// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[cfg(unix)]
#[test]
fn posix_user_defaults_to_effective_group() {
    let user = PosixSessionUser::new("jobuser").unwrap();
    assert_eq!(user.user, "jobuser");
    assert!(!user.group.is_empty());
}

#[cfg(unix)]
#[test]
fn posix_with_group_keeps_both() {
    let user = PosixSessionUser::with_group("jobuser", "jobgroup");
    assert_eq!(user.group, "jobgroup");
    assert!(!user.is_process_user());
}

#[parameterized(
    plain = { "localUser" },
    domain = { "corp\\renderfarm" },
    dotted_domain = { "corp.example.com\\renderfarm" },
)]
fn valid_windows_usernames(name: &str) {
    let user = WindowsSessionUser::new(
        name,
        None,
        Some(WindowsCredential::Password("pw".into())),
    )
    .unwrap();
    assert_eq!(user.user, name);
}

#[parameterized(
    empty = { "" },
    brackets = { "user[1]" },
    at_sign_not_joined = { "user@host?" },
    slash = { "a/b" },
    none_literal = { "NONE" },
    none_lowercase = { "none" },
)]
fn invalid_windows_usernames(name: &str) {
    let result = WindowsSessionUser::new(
        name,
        None,
        Some(WindowsCredential::Password("pw".into())),
    );
    assert!(matches!(result, Err(UserError::BadUserName(_))));
}

#[parameterized(
    underscore = { "bad_domain\\user" },
    too_short = { "d\\user" },
)]
fn invalid_windows_domains(name: &str) {
    let result = WindowsSessionUser::new(
        name,
        None,
        Some(WindowsCredential::Password("pw".into())),
    );
    assert!(matches!(result, Err(UserError::BadDomainName(_))));
}

#[test]
fn split_domain_and_username() {
    assert_eq!(
        WindowsSessionUser::split_domain_and_username("corp\\user"),
        (Some("corp"), "user")
    );
    assert_eq!(
        WindowsSessionUser::split_domain_and_username("user"),
        (None, "user")
    );
}

#[test]
fn credential_debug_redacts_passwords() {
    let debug = format!("{:?}", WindowsCredential::Password("hunter2".into()));
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("redacted"));
    let debug = format!("{:?}", WindowsCredential::LogonToken(42));
    assert!(debug.contains("42"));
}

#[cfg(unix)]
#[test]
fn session_user_accessors() {
    let user = SessionUser::from(PosixSessionUser::with_group("u", "g"));
    assert_eq!(user.user_name(), "u");
    assert!(user.posix().is_some());
    assert!(user.windows().is_none());
}
