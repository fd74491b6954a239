// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secure scratch directory creation.
//!
//! Creates a randomly-named directory with `mkdtemp` semantics, with
//! the option of sharing it with a target user: on POSIX the directory
//! group is changed to the user's group and group rwx added (this
//! process stays the owner so it can delete the directory later); on
//! Windows the target principal is granted full control via the host's
//! DACL service.

use crate::user::SessionUser;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TempDirError {
    #[error("Could not create temp directory within {parent}: {reason}")]
    Create { parent: PathBuf, reason: String },
    #[error(
        "Could not change ownership of directory '{path}' (error: {reason}). Please ensure \
         that this process' user is a member of group {group}."
    )]
    Ownership {
        path: PathBuf,
        group: String,
        reason: String,
    },
    #[error("Could not change permissions of directory '{path}' (error: {reason})")]
    Permissions { path: PathBuf, reason: String },
    #[error("Files within temporary directory {path} could not be deleted.\n{files}")]
    Cleanup { path: PathBuf, files: String },
}

/// A randomly-named directory, deleted explicitly via [`TempDir::cleanup`].
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// Create the directory under `parent` and, when a user is given,
    /// make it accessible to that user.
    pub fn new(
        parent: &Path,
        prefix: &str,
        user: Option<&SessionUser>,
    ) -> Result<Self, TempDirError> {
        let parent = parent
            .canonicalize()
            .unwrap_or_else(|_| parent.to_path_buf());
        let path = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&parent)
            .map_err(|e| TempDirError::Create {
                parent: parent.clone(),
                reason: e.to_string(),
            })?
            .keep();

        let dir = Self { path };
        if let Some(user) = user {
            dir.share_with(user)?;
        }
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn share_with(&self, user: &SessionUser) -> Result<(), TempDirError> {
        let SessionUser::Posix(user) = user else {
            return Err(TempDirError::Permissions {
                path: self.path.clone(),
                reason: "user must be a posix user on this platform".to_string(),
            });
        };
        let group = nix::unistd::Group::from_name(&user.group)
            .ok()
            .flatten()
            .ok_or_else(|| TempDirError::Ownership {
                path: self.path.clone(),
                group: user.group.clone(),
                reason: format!("no group named {}", user.group),
            })?;
        nix::unistd::chown(&self.path, None, Some(group.gid)).map_err(|errno| {
            TempDirError::Ownership {
                path: self.path.clone(),
                group: user.group.clone(),
                reason: errno.to_string(),
            }
        })?;
        // Group permissions only after the group change took effect.
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o770)).map_err(
            |e| TempDirError::Permissions {
                path: self.path.clone(),
                reason: e.to_string(),
            },
        )
    }

    #[cfg(windows)]
    fn share_with(&self, user: &SessionUser) -> Result<(), TempDirError> {
        let SessionUser::Windows(user) = user else {
            return Err(TempDirError::Permissions {
                path: self.path.clone(),
                reason: "user must be a windows user on this platform".to_string(),
            });
        };
        let principal = user.group.clone().unwrap_or_else(|| user.user.clone());
        crate::win32::services_required()
            .and_then(|services| services.grant_full_control(&self.path, &[principal]))
            .map_err(|e| TempDirError::Permissions {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    #[cfg(not(any(unix, windows)))]
    fn share_with(&self, _user: &SessionUser) -> Result<(), TempDirError> {
        Ok(())
    }

    /// Delete the directory and everything in it.
    ///
    /// Deletion continues past individual failures; the paths that could
    /// not be removed are collected into the returned error.
    pub fn cleanup(&self) -> Result<(), TempDirError> {
        let mut failed: Vec<PathBuf> = Vec::new();
        remove_recursive(&self.path, &mut failed);
        if failed.is_empty() {
            Ok(())
        } else {
            Err(TempDirError::Cleanup {
                path: self.path.clone(),
                files: failed
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
        }
    }
}

fn remove_recursive(path: &Path, failed: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => {
            // Unreadable directory, or already gone.
            if path.exists() {
                failed.push(path.to_path_buf());
            }
            return;
        }
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let is_dir = entry
            .file_type()
            .map(|t| t.is_dir() && !t.is_symlink())
            .unwrap_or(false);
        if is_dir {
            remove_recursive(&entry_path, failed);
        } else if std::fs::remove_file(&entry_path).is_err() {
            failed.push(entry_path);
        }
    }
    if std::fs::remove_dir(path).is_err() && path.exists() {
        failed.push(path.to_path_buf());
    }
}

#[cfg(test)]
#[path = "tempdir_tests.rs"]
mod tests;
