//! Singleton lock and PID file for the supervisor process.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::{info, warn};
use warden_config::RuntimePaths;

use super::CONTROL_TARGET;
use super::errors::LaunchError;
use crate::process::check_process;

/// Holds the lock file for the lifetime of the supervisor and removes every
/// runtime artefact on drop.
#[derive(Debug)]
pub(crate) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
}

impl ProcessGuard {
    /// Takes the lock, clearing artefacts left by a supervisor that died.
    pub(crate) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self { paths, _lock: lock })
    }

    /// Records the supervisor PID for the control CLI.
    pub(crate) fn write_pid(&self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        let pid_error = |source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        };
        let mut file = private_options().truncate(true).open(path).map_err(pid_error)?;
        writeln!(file, "{pid}").map_err(pid_error)?;
        file.sync_all().map_err(pid_error)?;
        info!(target: CONTROL_TARGET, pid, file = %path.display(), "pid file written");
        Ok(())
    }

    pub(crate) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for path in [
            self.paths.state_path(),
            self.paths.pid_path(),
            self.paths.lock_path(),
        ] {
            if let Err(error) = remove_file(path) {
                warn!(target: CONTROL_TARGET, error = %error, "failed to remove runtime file");
            }
        }
    }
}

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let mut options = private_options();
    options.create_new(true);
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: CONTROL_TARGET,
                file = %paths.lock_path().display(),
                "acquired supervisor lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path()) {
        match check_process(pid) {
            Ok(true) => {
                info!(target: CONTROL_TARGET, pid, "refusing to start: supervisor alive");
                return Err(LaunchError::AlreadyRunning { pid });
            }
            Ok(false) => {
                warn!(target: CONTROL_TARGET, pid, "previous supervisor gone; cleaning stale files");
            }
            Err(source) => return Err(LaunchError::CheckProcess { pid, source }),
        }
    }
    remove_file(paths.lock_path())?;
    remove_file(paths.pid_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

fn remove_file(path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
