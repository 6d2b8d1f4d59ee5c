//! Services shared by every supervisor in one `wardend` process.

use std::sync::Arc;

use crate::actions::ActionSender;
use crate::files::FileAccess;
use crate::health::LifecycleReporter;
use crate::host::HostActivity;
use crate::installer::Installer;
use crate::network::NetworkReachability;
use crate::probe::PortProbe;
use crate::process::{ProcessRegistry, ProcessRunner};
use crate::publisher::ConfigurationPublisher;
use crate::timings::SupervisionTimings;

/// External collaborators the supervision core depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Executes shell command lines.
    pub runner: Arc<dyn ProcessRunner>,
    /// Reads and rewrites configuration, PID, and log files.
    pub files: Arc<dyn FileAccess>,
    /// Restores a known-good daemon configuration.
    pub installer: Arc<dyn Installer>,
    /// Reports whether the host network is usable.
    pub network: Arc<dyn NetworkReachability>,
    /// Reports whether the host is in the foreground.
    pub host: Arc<dyn HostActivity>,
    /// Routes lifecycle requests to the control loop.
    pub actions: Arc<dyn ActionSender>,
    /// Receives caller-facing notifications.
    pub reporter: Arc<dyn LifecycleReporter>,
    /// Persists published phases.
    pub publisher: Arc<dyn ConfigurationPublisher>,
    /// Process-wide registry of execution units.
    pub registry: ProcessRegistry,
    /// Port availability checks.
    pub probe: PortProbe,
    /// Fixed delays.
    pub timings: SupervisionTimings,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("registry", &self.registry)
            .field("probe", &self.probe)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}
