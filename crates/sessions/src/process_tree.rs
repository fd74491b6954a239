// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! POSIX process-tree termination.
//!
//! Hard-killing an action must take down everything it spawned. The
//! descendants are enumerated and suspended first (top-down, so nothing
//! forks away mid-kill), then killed leaves first and root last, with
//! one retry for survivors. A final sweep kills the child's process
//! group, which catches anything enumeration missed.

use crate::logging::SessionLogger;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::time::Duration;

const KILL_SETTLE_TIME: Duration = Duration::from_millis(50);

/// Direct children of `pid`, from procfs.
#[cfg(target_os = "linux")]
fn children_of(pid: u32) -> Vec<u32> {
    let task_dir = format!("/proc/{pid}/task");
    let Ok(tasks) = std::fs::read_dir(task_dir) else {
        return Vec::new();
    };
    let mut children = Vec::new();
    for task in tasks.flatten() {
        let path = task.path().join("children");
        if let Ok(contents) = std::fs::read_to_string(path) {
            children.extend(
                contents
                    .split_ascii_whitespace()
                    .filter_map(|p| p.parse::<u32>().ok()),
            );
        }
    }
    children
}

#[cfg(not(target_os = "linux"))]
fn children_of(_pid: u32) -> Vec<u32> {
    Vec::new()
}

/// The process tree rooted at `root`, in breadth-first (parents before
/// children) order. Always contains `root` itself.
pub fn process_tree(root: u32) -> Vec<u32> {
    let mut ordered = Vec::new();
    let mut queue = std::collections::VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        ordered.push(pid);
        queue.extend(children_of(pid));
    }
    ordered
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // Third field of /proc/<pid>/stat is the state; the comm field may
    // contain spaces but is parenthesised, so look after the last ')'.
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    stat.rsplit(')')
        .next()
        .and_then(|rest| rest.split_ascii_whitespace().next())
        .is_some_and(|state| state == "Z")
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok() && !is_zombie(pid)
}

/// Kill the whole tree rooted at `root`.
///
/// The root is expected to lead its own process group (the subprocess
/// spawner guarantees this), so the final group sweep is safe.
pub async fn terminate_process_tree(root: u32, logger: &SessionLogger) {
    let tree = process_tree(root);

    // Suspend top-down so no process can fork between enumeration and
    // the kill pass.
    for pid in &tree {
        let _ = kill(Pid::from_raw(*pid as i32), Signal::SIGSTOP);
    }

    // Kill leaves first, root last. SIGKILL also takes down stopped
    // processes.
    for pid in tree.iter().rev() {
        let _ = kill(Pid::from_raw(*pid as i32), Signal::SIGKILL);
    }

    tokio::time::sleep(KILL_SETTLE_TIME).await;
    let survivors: Vec<u32> = tree.iter().rev().copied().filter(|p| is_alive(*p)).collect();
    if !survivors.is_empty() {
        for pid in &survivors {
            let _ = kill(Pid::from_raw(*pid as i32), Signal::SIGKILL);
        }
        tokio::time::sleep(KILL_SETTLE_TIME).await;
        for pid in survivors.into_iter().filter(|p| is_alive(*p)) {
            logger.warn(format!("Unable to kill process with pid {pid}"));
        }
    }

    let _ = killpg(Pid::from_raw(root as i32), Signal::SIGKILL);
}

#[cfg(test)]
#[path = "process_tree_tests.rs"]
mod tests;
