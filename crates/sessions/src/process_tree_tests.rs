// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::logging::SessionLogger;
use ojs_core::SessionId;
use std::process::Stdio;

fn spawn_tree() -> tokio::process::Child {
    // A shell that spawns a grandchild sleep and then sleeps itself.
    let mut cmd = tokio::process::Command::new("/bin/sh");
    cmd.arg("-c")
        .arg("sleep 30 & wait")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true);
    cmd.spawn().unwrap()
}

#[test]
fn tree_contains_root() {
    let tree = process_tree(std::process::id());
    assert_eq!(tree.first().copied(), Some(std::process::id()));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn enumerates_descendants() {
    let child = spawn_tree();
    let pid = child.id().unwrap();
    // Give the shell a moment to fork its grandchild.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let tree = process_tree(pid);
    assert!(tree.len() >= 2, "expected the sleep grandchild in {tree:?}");
    assert_eq!(tree[0], pid);
}

#[tokio::test]
async fn terminate_kills_the_whole_tree() {
    let mut child = spawn_tree();
    let pid = child.id().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let tree = process_tree(pid);

    let logger = SessionLogger::new(SessionId::new("kill-test"));
    terminate_process_tree(pid, &logger).await;

    let status = child.wait().await.unwrap();
    assert!(!status.success());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    for pid in tree {
        assert!(!is_alive(pid), "pid {pid} survived termination");
    }
}
