//! Caller-facing notifications for lifecycle outcomes.

use std::sync::Arc;

use crate::errors::SupervisionError;
use crate::process::ExitOutcome;
use crate::terminator::TerminationOutcome;

/// Observer notified when a lifecycle sequence ends somewhere the caller
/// should know about.
pub trait LifecycleReporter: Send + Sync {
    /// A start sequence failed before the daemon was confirmed running.
    fn start_failed(&self, daemon: &str, error: &SupervisionError);

    /// The daemon exited and no automatic recovery was attempted.
    fn daemon_stopped(&self, daemon: &str, outcome: ExitOutcome);

    /// A termination sequence reached its terminal outcome.
    fn termination_finished(&self, daemon: &str, outcome: TerminationOutcome);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn start_failed(&self, daemon: &str, error: &SupervisionError) {
        (**self).start_failed(daemon, error);
    }

    fn daemon_stopped(&self, daemon: &str, outcome: ExitOutcome) {
        (**self).daemon_stopped(daemon, outcome);
    }

    fn termination_finished(&self, daemon: &str, outcome: TerminationOutcome) {
        (**self).termination_finished(daemon, outcome);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn start_failed(&self, daemon: &str, error: &SupervisionError) {
        tracing::error!(
            target: "wardend::health",
            event = "start_failed",
            daemon,
            error = %error,
            "daemon failed to start"
        );
    }

    fn daemon_stopped(&self, daemon: &str, outcome: ExitOutcome) {
        tracing::warn!(
            target: "wardend::health",
            event = "daemon_stopped",
            daemon,
            %outcome,
            "daemon stopped"
        );
    }

    fn termination_finished(&self, daemon: &str, outcome: TerminationOutcome) {
        tracing::info!(
            target: "wardend::health",
            event = "termination_finished",
            daemon,
            %outcome,
            "termination finished"
        );
    }
}
