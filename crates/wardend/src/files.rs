//! Line-oriented file access used for daemon configuration, PID, and log
//! files.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Errors raised by [`FileAccess`] implementations.
#[derive(Debug, Error)]
pub enum FileAccessError {
    /// Reading the file failed.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// File path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the file failed.
    #[error("failed to write '{path}': {source}")]
    Write {
        /// File path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Read/rewrite access to the small text files the supervisor touches.
pub trait FileAccess: Send + Sync {
    /// Reads every line of `path` without trailing newlines.
    fn read_lines(&self, path: &Utf8Path) -> Result<Vec<String>, FileAccessError>;

    /// Replaces the contents of `path` with `lines`, newline terminated.
    fn rewrite_lines(&self, path: &Utf8Path, lines: &[String]) -> Result<(), FileAccessError>;

    /// Empties `path`, creating it and its parent directory when missing.
    fn truncate(&self, path: &Utf8Path) -> Result<(), FileAccessError>;

    /// Reports whether `path` exists.
    fn exists(&self, path: &Utf8Path) -> bool;

    /// Deletes `path`; a file that is already gone is not an error.
    fn remove(&self, path: &Utf8Path) -> Result<(), FileAccessError>;
}

/// [`FileAccess`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFileAccess;

impl FileAccess for SystemFileAccess {
    fn read_lines(&self, path: &Utf8Path) -> Result<Vec<String>, FileAccessError> {
        let content = fs::read_to_string(path).map_err(|source| FileAccessError::Read {
            path: path.to_owned(),
            source,
        })?;
        Ok(content.lines().map(str::to_owned).collect())
    }

    fn rewrite_lines(&self, path: &Utf8Path, lines: &[String]) -> Result<(), FileAccessError> {
        let mut payload = lines.join("\n");
        payload.push('\n');
        atomic_write(path.as_std_path(), payload.as_bytes()).map_err(|source| {
            FileAccessError::Write {
                path: path.to_owned(),
                source,
            }
        })
    }

    fn truncate(&self, path: &Utf8Path) -> Result<(), FileAccessError> {
        let write_error = |source| FileAccessError::Write {
            path: path.to_owned(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map(drop)
            .map_err(write_error)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Utf8Path) -> Result<(), FileAccessError> {
        match fs::remove_file(path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(FileAccessError::Write {
                path: path.to_owned(),
                source: error,
            }),
            _ => Ok(()),
        }
    }
}

/// Reads the first line of a PID file as a process id.
///
/// Missing files, empty files, and unparsable or zero values all yield
/// `None`.
pub fn read_pid(files: &dyn FileAccess, path: &Utf8Path) -> Option<u32> {
    let lines = files.read_lines(path).ok()?;
    let pid = lines.first()?.trim().parse::<u32>().ok()?;
    (pid != 0).then_some(pid)
}

/// Writes the provided bytes to the path using an atomic persist step.
///
/// Data is flushed and fsync'd before the temporary file is renamed into
/// place so readers never observe a partially written payload.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("warden"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        builder.permissions(Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
