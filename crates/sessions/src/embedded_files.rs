// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialises embedded files to disk.
//!
//! Files are declared inline in the template; before the referencing
//! Action runs they are written into the session's files directory and
//! their absolute paths exposed to format strings as
//! `<scope>.File.<name>` symbols. Symbols for all files of a script are
//! added before any body is resolved, so file bodies may reference each
//! other.

use crate::logging::SessionLogger;
use crate::user::SessionUser;
use ojs_core::{
    EmbeddedFile, EmbeddedFilesScope, FormatStringError, SpecificationRevision, SymbolTable,
};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors materialising embedded files. Runners surface these as
/// `openjd_fail:` lines rather than letting them escape to the caller.
#[derive(Debug, Error)]
pub enum EmbeddedFilesError {
    #[error("Could not write embedded file: {0}")]
    Write(#[from] io::Error),
    #[error("Error resolving format string: {0}")]
    Format(#[from] FormatStringError),
}

/// Write `data` to `filename` such that only the owner (and, when a
/// target user is given, that user's group or identity) can access it.
///
/// The file is created or truncated; repeated writes to the same path
/// for successive tasks overwrite cleanly. `additional_permissions` is
/// a POSIX mode mask; owner bits always apply, group bits apply when a
/// target user is set.
pub fn write_file_for_user(
    filename: &Path,
    data: &str,
    user: Option<&SessionUser>,
    additional_permissions: u32,
) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut mode = 0o600 | (additional_permissions & 0o700);
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(filename)?;
        file.write_all(data.as_bytes())?;
        drop(file);

        if let Some(SessionUser::Posix(user)) = user {
            let group = nix::unistd::Group::from_name(&user.group)
                .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?
                .ok_or_else(|| {
                    io::Error::other(format!("no group named {} on this host", user.group))
                })?;
            nix::unistd::chown(filename, None, Some(group.gid))
                .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
            // Group bits only after the group change took effect.
            mode |= 0o060 | (additional_permissions & 0o070);
        }

        // The file may predate this call (e.g. created by mkstemp), so
        // set the permissions unconditionally.
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(filename, std::fs::Permissions::from_mode(mode))
    }
    #[cfg(windows)]
    {
        std::fs::write(filename, data)?;
        let _ = additional_permissions;
        if let Some(SessionUser::Windows(user)) = user {
            let services = crate::win32::services_required()?;
            let process_user = services.process_user()?;
            services.grant_full_control(filename, &[process_user, user.user.clone()])?;
        }
        Ok(())
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (user, additional_permissions);
        std::fs::write(filename, data)
    }
}

struct FileRecord<'a> {
    symbol: String,
    filename: PathBuf,
    file: &'a EmbeddedFile,
}

/// Writes a script's embedded files and publishes their symbols.
pub struct EmbeddedFiles {
    logger: SessionLogger,
    revision: SpecificationRevision,
    scope: EmbeddedFilesScope,
    session_files_directory: PathBuf,
    user: Option<SessionUser>,
}

impl EmbeddedFiles {
    pub fn new(
        logger: SessionLogger,
        revision: SpecificationRevision,
        scope: EmbeddedFilesScope,
        session_files_directory: PathBuf,
        user: Option<SessionUser>,
    ) -> Self {
        Self {
            logger,
            revision,
            scope,
            session_files_directory,
            user,
        }
    }

    /// Write all files to disk and add their symbols to `symtab`.
    pub fn materialize(
        &self,
        files: &[EmbeddedFile],
        symtab: &mut SymbolTable,
    ) -> Result<(), EmbeddedFilesError> {
        match self.scope {
            EmbeddedFilesScope::Env => self
                .logger
                .info("Writing embedded files for Environment to disk."),
            EmbeddedFilesScope::Task => {
                self.logger.info("Writing embedded files for Task to disk.")
            }
        }

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let filename = self.resolve_filename(file)?;
            let symbol = format!("{}.{}", self.revision.file_prefix(self.scope), file.name);
            records.push(FileRecord {
                symbol,
                filename,
                file,
            });
        }

        // Publish every symbol before writing any body, so bodies can
        // reference sibling files.
        for record in &records {
            symtab.insert(&record.symbol, record.filename.display().to_string());
            self.logger.info(format!(
                "Mapping: {} -> {}",
                record.symbol,
                record.filename.display()
            ));
        }

        for record in &records {
            self.materialize_file(record, symtab)?;
        }
        Ok(())
    }

    /// The on-disk path for a file: the declared filename joined to the
    /// files directory, or a fresh mkstemp name reserved on disk.
    fn resolve_filename(&self, file: &EmbeddedFile) -> Result<PathBuf, EmbeddedFilesError> {
        match &file.filename {
            Some(name) => Ok(self.session_files_directory.join(name)),
            None => {
                let tmp = tempfile::Builder::new()
                    .tempfile_in(&self.session_files_directory)
                    .map_err(EmbeddedFilesError::Write)?;
                let path = tmp
                    .into_temp_path()
                    .keep()
                    .map_err(|e| EmbeddedFilesError::Write(io::Error::other(e.to_string())))?;
                Ok(path)
            }
        }
    }

    fn materialize_file(
        &self,
        record: &FileRecord<'_>,
        symtab: &SymbolTable,
    ) -> Result<(), EmbeddedFilesError> {
        let mut execute_permissions = 0;
        if record.file.runnable {
            execute_permissions |= 0o100;
            if self.user.is_some() {
                execute_permissions |= 0o010;
            }
        }
        let data = record.file.data.resolve(symtab)?;
        write_file_for_user(
            &record.filename,
            &data,
            self.user.as_ref(),
            execute_permissions,
        )?;
        self.logger.info(format!(
            "Wrote: {} -> {}",
            record.file.name,
            record.filename.display()
        ));
        self.logger.debug(format!("Contents:\n{data}"));
        Ok(())
    }
}

#[cfg(test)]
#[path = "embedded_files_tests.rs"]
mod tests;
