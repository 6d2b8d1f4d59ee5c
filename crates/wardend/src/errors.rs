//! Failure taxonomy for lifecycle sequences.
//!
//! None of these escape the lifecycle boundary. They are logged, turned into
//! phase transitions, and handed to the [`LifecycleReporter`].
//!
//! [`LifecycleReporter`]: crate::health::LifecycleReporter

use thiserror::Error;

use crate::process::ExitOutcome;

/// Why a lifecycle sequence did not reach its goal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisionError {
    /// The daemon's port stayed occupied after preemption.
    #[error("port {port} is still occupied")]
    PortUnavailable {
        /// Port that could not be freed.
        port: u16,
    },
    /// Every escalation level failed to stop the process.
    #[error("process '{module}' survived every termination attempt")]
    ProcessNotTerminated {
        /// Base name of the process.
        module: String,
    },
    /// The command could not be executed.
    #[error("failed to execute '{command}': {outcome}")]
    LaunchFailure {
        /// Command or task that failed to start.
        command: String,
        /// Classified cause.
        outcome: ExitOutcome,
    },
    /// The daemon exited with a failure status while expected to run.
    #[error("daemon '{daemon}' exited with {outcome}")]
    DaemonCrashed {
        /// Logical daemon name.
        daemon: String,
        /// Classified exit.
        outcome: ExitOutcome,
    },
    /// A dependent daemon gave up waiting for the daemon it relies on.
    #[error("'{daemon}' gave up waiting for '{dependency}' to run")]
    DependencyNotRunning {
        /// Dependent daemon.
        daemon: String,
        /// Daemon it waited for.
        dependency: String,
    },
    /// The shell used to run commands is unusable.
    #[error("shell unavailable: {outcome}")]
    ShellUnavailable {
        /// Classified cause.
        outcome: ExitOutcome,
    },
}

impl SupervisionError {
    /// Classifies a failed daemon run; `None` for success.
    #[must_use]
    pub fn from_outcome(daemon: &str, command: &str, outcome: ExitOutcome) -> Option<Self> {
        if outcome.is_success() {
            None
        } else if outcome.is_shell_failure() {
            Some(Self::ShellUnavailable { outcome })
        } else if outcome.is_launch_failure() {
            Some(Self::LaunchFailure {
                command: command.to_owned(),
                outcome,
            })
        } else {
            Some(Self::DaemonCrashed {
                daemon: daemon.to_owned(),
                outcome,
            })
        }
    }
}
