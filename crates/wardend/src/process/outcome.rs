//! Symbolic classification of how a command or daemon run ended.

use std::fmt;

/// Why an invocation ended.
///
/// Shell-level failures use negative codes so they never collide with a
/// process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitOutcome {
    /// Exit status zero.
    Success,
    /// The wait was cancelled before the process exited.
    WatchdogExit,
    /// The shell vanished while being waited on.
    ShellDied,
    /// The shell could not be started.
    ShellExecFailed,
    /// The shell could not be started for lack of permission.
    ShellWrongPrivilege,
    /// No shell binary was found.
    ShellNotFound,
    /// The process was terminated by a signal.
    Terminated,
    /// The command exists but is not executable.
    CommandNotExecutable,
    /// The command does not exist.
    CommandNotFound,
    /// Any other non-zero exit status.
    Failed(i32),
}

impl ExitOutcome {
    /// Numeric code for the outcome.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::WatchdogExit => -1,
            Self::ShellDied => -2,
            Self::ShellExecFailed => -3,
            Self::ShellWrongPrivilege => -4,
            Self::ShellNotFound => -5,
            Self::Terminated => 130,
            Self::CommandNotExecutable => 126,
            Self::CommandNotFound => 127,
            Self::Failed(code) => code,
        }
    }

    /// Classifies a numeric exit code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::WatchdogExit,
            -2 => Self::ShellDied,
            -3 => Self::ShellExecFailed,
            -4 => Self::ShellWrongPrivilege,
            -5 => Self::ShellNotFound,
            130 => Self::Terminated,
            126 => Self::CommandNotExecutable,
            127 => Self::CommandNotFound,
            other => Self::Failed(other),
        }
    }

    /// True for [`ExitOutcome::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// True when the shell itself, not the command, failed.
    #[must_use]
    pub const fn is_shell_failure(self) -> bool {
        matches!(
            self,
            Self::ShellDied | Self::ShellExecFailed | Self::ShellNotFound
        )
    }

    /// True when the command could not be executed at all.
    #[must_use]
    pub const fn is_launch_failure(self) -> bool {
        matches!(
            self,
            Self::CommandNotFound | Self::CommandNotExecutable | Self::ShellWrongPrivilege
        )
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::WatchdogExit => "WATCHDOG_EXIT",
            Self::ShellDied => "SHELL_DIED",
            Self::ShellExecFailed => "SHELL_EXEC_FAILED",
            Self::ShellWrongPrivilege => "SHELL_WRONG_PRIVILEGE",
            Self::ShellNotFound => "SHELL_NOT_FOUND",
            Self::Terminated => "TERMINATED",
            Self::CommandNotExecutable => "COMMAND_NOT_EXECUTABLE",
            Self::CommandNotFound => "COMMAND_NOT_FOUND",
            Self::Failed(_) => "FAILED",
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.code())
    }
}

/// Outcome plus the output captured from a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// How the invocation ended.
    pub outcome: ExitOutcome,
    /// Captured standard output lines (tail only for long-running daemons).
    pub stdout: Vec<String>,
    /// Captured standard error lines.
    pub stderr: Vec<String>,
}

impl CommandResult {
    /// Result carrying only an outcome.
    #[must_use]
    pub const fn from_outcome(outcome: ExitOutcome) -> Self {
        Self {
            outcome,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Result for an invocation that never produced output.
    #[must_use]
    pub fn failed(outcome: ExitOutcome, message: String) -> Self {
        Self {
            outcome,
            stdout: Vec::new(),
            stderr: vec![message],
        }
    }

    /// True when the invocation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}
