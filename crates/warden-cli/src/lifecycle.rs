//! Implements the supervisor lifecycle commands exposed by the CLI.
//!
//! The CLI never talks to the supervised daemons. It reads the runtime
//! artefacts written by `wardend`, signals the supervisor recorded in the pid
//! file, and spawns the supervisor binary with the same configuration flags
//! when none is running.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitCode, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use warden_config::{Config, RuntimePaths, RuntimePathsError};

use crate::AppError;

#[cfg(unix)]
use libc::{SIGHUP, SIGTERM, SIGUSR1, SIGUSR2, kill};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable overriding the supervisor binary.
pub const WARDEND_BIN_ENV_VAR: &str = "WARDEND_BIN";

/// Lifecycle command recognised by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleCommand {
    Start,
    Stop,
    Restart,
    Reload,
    Status,
}

impl LifecycleCommand {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Status => "status",
        }
    }

    /// Signal the supervisor maps back onto this command.
    #[cfg(unix)]
    fn signal(self) -> Option<libc::c_int> {
        match self {
            Self::Start => Some(SIGUSR2),
            Self::Stop => Some(SIGTERM),
            Self::Restart => Some(SIGUSR1),
            Self::Reload => Some(SIGHUP),
            Self::Status => None,
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Context shared with lifecycle handlers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LifecycleContext<'a> {
    pub(crate) config: &'a Config,
    pub(crate) config_arguments: &'a [OsString],
}

/// Wrapper around the CLI output streams used by lifecycle handlers.
pub(crate) struct LifecycleOutput<W, E> {
    pub(crate) stdout: W,
    pub(crate) stderr: E,
}

impl<W: Write, E: Write> LifecycleOutput<W, E> {
    pub(crate) fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    fn stdout_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        self.stdout.write_fmt(args).map_err(LifecycleError::Io)
    }

    fn stderr_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        self.stderr.write_fmt(args).map_err(LifecycleError::Io)
    }
}

/// Abstract interface for handling lifecycle commands.
pub(crate) trait LifecycleHandler {
    fn handle<W: Write, E: Write>(
        &self,
        command: LifecycleCommand,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, AppError>;
}

/// Lifecycle controller acting on the real supervisor.
#[derive(Debug, Default)]
pub(crate) struct SystemLifecycle {
    daemon_binary: Option<OsString>,
}

impl SystemLifecycle {
    /// Controller that launches `binary` instead of resolving `wardend`.
    #[cfg(test)]
    pub(crate) fn with_binary(binary: impl Into<OsString>) -> Self {
        Self {
            daemon_binary: Some(binary.into()),
        }
    }
}

impl LifecycleHandler for SystemLifecycle {
    fn handle<W: Write, E: Write>(
        &self,
        command: LifecycleCommand,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, AppError> {
        let paths = RuntimePaths::from_config(context.config).map_err(LifecycleError::from)?;
        let result = match command {
            LifecycleCommand::Start => self.start(&paths, context, output),
            LifecycleCommand::Stop => self.stop(&paths, output),
            LifecycleCommand::Restart | LifecycleCommand::Reload => {
                self.request(command, &paths, output)
            }
            LifecycleCommand::Status => self.status(&paths, output),
        };
        result.map_err(AppError::from)
    }
}

impl SystemLifecycle {
    fn start<W: Write, E: Write>(
        &self,
        paths: &RuntimePaths,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        if let Some(pid) = running_supervisor(paths)? {
            signal_supervisor(pid, LifecycleCommand::Start)?;
            output.stdout_line(format_args!(
                "supervisor pid {pid} already running; start requested\n"
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        let binary = daemon_binary(self.daemon_binary.as_deref());
        let mut child = spawn_supervisor(&binary, context.config_arguments)?;
        let pid = wait_for_pid(paths, &mut child)?;
        output.stdout_line(format_args!("supervisor running (pid {pid})\n"))?;
        output.stderr_line(format_args!(
            "runtime artefacts stored under {}\n",
            paths.runtime_dir().display()
        ))?;
        Ok(ExitCode::SUCCESS)
    }

    fn stop<W: Write, E: Write>(
        &self,
        paths: &RuntimePaths,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let Some(pid) = running_supervisor(paths)? else {
            output.stdout_line(format_args!(
                "supervisor is not running (no live pid in {})\n",
                paths.pid_path().display()
            ))?;
            return Ok(ExitCode::SUCCESS);
        };
        signal_supervisor(pid, LifecycleCommand::Stop)?;
        wait_for_shutdown(paths, pid)?;
        output.stdout_line(format_args!("supervisor pid {pid} stopped\n"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn request<W: Write, E: Write>(
        &self,
        command: LifecycleCommand,
        paths: &RuntimePaths,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let pid = running_supervisor(paths)?.ok_or_else(|| LifecycleError::NotRunning {
            command,
            pid_path: paths.pid_path().to_path_buf(),
        })?;
        signal_supervisor(pid, command)?;
        output.stdout_line(format_args!("{command} requested from supervisor pid {pid}\n"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn status<W: Write, E: Write>(
        &self,
        paths: &RuntimePaths,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let live = running_supervisor(paths)?;
        match (read_state(paths.state_path())?, live) {
            (Some(snapshot), live) => {
                output.stdout_line(format_args!(
                    "supervisor pid {} (updated {})\n",
                    snapshot.pid, snapshot.timestamp
                ))?;
                for (daemon, phase) in &snapshot.daemons {
                    output.stdout_line(format_args!("  {daemon}: {phase}\n"))?;
                }
                if live != Some(snapshot.pid) {
                    output.stderr_line(format_args!(
                        "snapshot at {} is stale; the supervisor that wrote it is gone\n",
                        paths.state_path().display()
                    ))?;
                }
            }
            (None, Some(pid)) => {
                output.stdout_line(format_args!(
                    "supervisor pid {pid} has not published a state snapshot yet\n"
                ))?;
            }
            (None, None) => {
                output.stdout_line(format_args!(
                    "supervisor is not running; use 'warden start' to launch it\n"
                ))?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn daemon_binary(overridden: Option<&OsStr>) -> OsString {
    overridden
        .map(OsStr::to_os_string)
        .or_else(|| std::env::var_os(WARDEND_BIN_ENV_VAR))
        .unwrap_or_else(|| OsString::from("wardend"))
}

fn spawn_supervisor(binary: &OsStr, config_arguments: &[OsString]) -> Result<Child, LifecycleError> {
    let mut command = Command::new(binary);
    command.args(config_arguments.iter().skip(1));
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| LifecycleError::LaunchSupervisor {
            binary: binary.to_os_string(),
            source,
        })
}

/// Waits for the supervisor to record a live pid.
///
/// The spawned process may exit successfully once it has detached, so only a
/// failing exit aborts the wait.
fn wait_for_pid(paths: &RuntimePaths, child: &mut Child) -> Result<u32, LifecycleError> {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(pid) = running_supervisor(paths)? {
            return Ok(pid);
        }
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
            .filter(|status| !status.success())
        {
            return Err(LifecycleError::StartupFailed {
                exit_status: status.code(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::StartupTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout_ms: duration_ms(STARTUP_TIMEOUT),
    })
}

fn wait_for_shutdown(paths: &RuntimePaths, pid: u32) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while Instant::now() < deadline {
        if !paths.pid_path().exists() || !process_alive(pid)? {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout_ms: duration_ms(SHUTDOWN_TIMEOUT),
    })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The recorded supervisor pid, when that process still exists.
fn running_supervisor(paths: &RuntimePaths) -> Result<Option<u32>, LifecycleError> {
    match read_pid(paths.pid_path())? {
        Some(pid) if process_alive(pid)? => Ok(Some(pid)),
        _ => Ok(None),
    }
}

fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u32>()
                .map(Some)
                .map_err(|source| LifecycleError::ParsePid {
                    path: path.to_path_buf(),
                    source,
                })
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadPid {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_state(path: &Path) -> Result<Option<StateSnapshot>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| LifecycleError::ParseState {
                path: path.to_path_buf(),
                source,
            }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadState {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn process_alive(pid: u32) -> Result<bool, LifecycleError> {
    #[cfg(unix)]
    {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return Ok(false);
        };
        if unsafe { kill(raw, 0) } == 0 {
            return Ok(true);
        }
        let error = io::Error::last_os_error();
        match error.raw_os_error() {
            Some(libc::ESRCH) => Ok(false),
            Some(libc::EPERM) => Ok(true),
            _ => Err(LifecycleError::ProbeProcess { pid, source: error }),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(LifecycleError::UnsupportedPlatform)
    }
}

fn signal_supervisor(pid: u32, command: LifecycleCommand) -> Result<(), LifecycleError> {
    #[cfg(unix)]
    {
        let Some(signal) = command.signal() else {
            return Ok(());
        };
        let raw = libc::pid_t::try_from(pid).map_err(|_| LifecycleError::SignalFailed {
            pid,
            command,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
        if unsafe { kill(raw, signal) } == 0 {
            Ok(())
        } else {
            Err(LifecycleError::SignalFailed {
                pid,
                command,
                source: io::Error::last_os_error(),
            })
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, command);
        Err(LifecycleError::UnsupportedPlatform)
    }
}

/// State document published by the supervisor.
#[derive(Debug, Deserialize, PartialEq, Eq)]
struct StateSnapshot {
    pid: u32,
    timestamp: u64,
    #[serde(default)]
    daemons: BTreeMap<String, String>,
}

/// Errors raised by lifecycle operations.
#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("failed to spawn supervisor binary '{binary:?}': {source}")]
    LaunchSupervisor {
        binary: OsString,
        #[source]
        source: io::Error,
    },
    #[error("supervisor exited before recording its pid (status: {exit_status:?})")]
    StartupFailed { exit_status: Option<i32> },
    #[error("timed out after {timeout_ms} ms waiting for a live pid in {pid_path:?}")]
    StartupTimeout { pid_path: PathBuf, timeout_ms: u64 },
    #[error("failed to monitor supervisor launch: {source}")]
    MonitorChild {
        #[source]
        source: io::Error,
    },
    #[error("cannot {command}: supervisor is not running (no live pid in {pid_path:?})")]
    NotRunning {
        command: LifecycleCommand,
        pid_path: PathBuf,
    },
    #[error("failed to read pid file {path:?}: {source}")]
    ReadPid {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse pid file {path:?}: {source}")]
    ParsePid {
        path: PathBuf,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to read state snapshot {path:?}: {source}")]
    ReadState {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse state snapshot {path:?}: {source}")]
    ParseState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to probe process {pid}: {source}")]
    ProbeProcess {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to send {command} to supervisor pid {pid}: {source}")]
    SignalFailed {
        pid: u32,
        command: LifecycleCommand,
        #[source]
        source: io::Error,
    },
    #[error("supervisor shutdown did not complete within {timeout_ms} ms; check {pid_path:?}")]
    ShutdownTimeout { pid_path: PathBuf, timeout_ms: u64 },
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
    #[cfg(not(unix))]
    #[error("platform does not support supervisor signalling")]
    UnsupportedPlatform,
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
}
