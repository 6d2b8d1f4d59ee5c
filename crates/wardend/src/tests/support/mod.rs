//! Test doubles and harnesses shared by the unit and behaviour suites.

mod doubles;
mod publisher;
mod reporter;
mod runner;
mod world;

use std::thread;
use std::time::{Duration, Instant};

use crate::timings::SupervisionTimings;

pub use doubles::{
    MockActions, MockChecker, MockHost, MockInstaller, MockNetwork, MockPolicy,
};
pub use publisher::RecordingPublisher;
pub use reporter::RecordingReporter;
pub use runner::{ScriptLog, ScriptedDaemon};
pub use world::{STEP_TIMEOUT, SupervisionWorld};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Millisecond timings keeping the production attempt counts.
#[must_use]
pub fn fast_timings() -> SupervisionTimings {
    SupervisionTimings {
        dependency_poll: Duration::from_millis(10),
        dependency_checks: 50,
        install_poll: Duration::from_millis(10),
        ..SupervisionTimings::uniform(Duration::from_millis(20))
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
