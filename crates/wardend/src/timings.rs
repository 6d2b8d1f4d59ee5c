//! Fixed waits used by lifecycle sequences.

use std::time::Duration;

/// Every fixed delay the supervisors use.
///
/// The defaults are the production values; tests shrink them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionTimings {
    /// Pause between launching a unit and judging its liveness.
    pub start_settle: Duration,
    /// Pause after a synchronous termination inside `restart`.
    pub restart_settle: Duration,
    /// Pause after terminating a port squatter before re-probing the port.
    pub port_release_settle: Duration,
    /// Delay after each escalation attempt; the last attempt uses a kill
    /// signal.
    pub escalation: [Duration; 3],
    /// Grace period after each interrupt of a surviving unit.
    pub interrupt_grace: Duration,
    /// Number of interrupts tried after escalation is exhausted.
    pub interrupt_attempts: u32,
    /// Interval between checks while a dependent waits for its primary.
    pub dependency_poll: Duration,
    /// Number of checks before a dependent gives up waiting.
    pub dependency_checks: u32,
    /// Interval between checks while an action waits for a configuration
    /// reset to finish.
    pub install_poll: Duration,
}

impl Default for SupervisionTimings {
    fn default() -> Self {
        Self {
            start_settle: Duration::from_secs(2),
            restart_settle: Duration::from_secs(5),
            port_release_settle: Duration::from_secs(5),
            escalation: [
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(1),
            ],
            interrupt_grace: Duration::from_secs(3),
            interrupt_attempts: 3,
            dependency_poll: Duration::from_secs(1),
            dependency_checks: 30,
            install_poll: Duration::from_secs(1),
        }
    }
}

impl SupervisionTimings {
    /// Every delay set to `step`, keeping the attempt counts.
    #[must_use]
    pub fn uniform(step: Duration) -> Self {
        Self {
            start_settle: step,
            restart_settle: step,
            port_release_settle: step,
            escalation: [step; 3],
            interrupt_grace: step,
            ..Self::default()
        }
    }
}
