//! Test double for [`LifecycleReporter`] recording notifications.

use std::sync::Mutex;

use crate::errors::SupervisionError;
use crate::health::LifecycleReporter;
use crate::process::ExitOutcome;
use crate::terminator::TerminationOutcome;

#[derive(Debug, Default)]
struct Events {
    start_failures: Vec<(String, String)>,
    stopped: Vec<(String, ExitOutcome)>,
    terminations: Vec<(String, TerminationOutcome)>,
}

/// Records lifecycle notifications for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Events>,
}

impl RecordingReporter {
    fn events(&self) -> std::sync::MutexGuard<'_, Events> {
        self.events.lock().expect("reporter mutex poisoned")
    }

    /// Start failures as `(daemon, rendered error)`.
    #[must_use]
    pub fn start_failures(&self) -> Vec<(String, String)> {
        self.events().start_failures.clone()
    }

    /// Unrecovered daemon exits.
    #[must_use]
    pub fn stopped(&self) -> Vec<(String, ExitOutcome)> {
        self.events().stopped.clone()
    }

    /// Finished terminations.
    #[must_use]
    pub fn terminations(&self) -> Vec<(String, TerminationOutcome)> {
        self.events().terminations.clone()
    }
}

impl LifecycleReporter for RecordingReporter {
    fn start_failed(&self, daemon: &str, error: &SupervisionError) {
        self.events()
            .start_failures
            .push((daemon.to_owned(), error.to_string()));
    }

    fn daemon_stopped(&self, daemon: &str, outcome: ExitOutcome) {
        self.events().stopped.push((daemon.to_owned(), outcome));
    }

    fn termination_finished(&self, daemon: &str, outcome: TerminationOutcome) {
        self.events().terminations.push((daemon.to_owned(), outcome));
    }
}
