//! Execution bookkeeping shared by the primary and dependent supervisors.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::collaborators::Collaborators;
use crate::errors::SupervisionError;
use crate::files::{FileAccess, read_pid};
use crate::health::LifecycleReporter;
use crate::probe::{PortProbe, first_free};
use crate::process::{ChildSlot, ExecutionHandle, ExitOutcome, ProcessRegistry};
use crate::state::{LifecycleState, Phase};
use crate::terminator::{TerminationOutcome, Terminator};
use crate::timings::SupervisionTimings;

const UNIT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Files identifying one daemon on disk.
#[derive(Debug, Clone)]
pub(crate) struct UnitFiles {
    /// Executable, used for name-based signalling.
    pub(crate) module: String,
    /// PID file written by the daemon.
    pub(crate) pid_file: Utf8PathBuf,
    /// Log truncated before each launch.
    pub(crate) log_file: Option<Utf8PathBuf>,
}

/// Owns the tracked execution handle of one supervised daemon.
pub(crate) struct DaemonUnit {
    state: Arc<LifecycleState>,
    terminator: Terminator,
    registry: ProcessRegistry,
    files: Arc<dyn FileAccess>,
    probe: PortProbe,
    timings: SupervisionTimings,
    reporter: Arc<dyn LifecycleReporter>,
    on_disk: UnitFiles,
    tracked: Mutex<Option<Arc<ExecutionHandle>>>,
}

impl DaemonUnit {
    pub(crate) fn new(state: Arc<LifecycleState>, deps: &Collaborators, on_disk: UnitFiles) -> Self {
        let terminator = Terminator::new(
            Arc::clone(&state),
            Arc::clone(&deps.runner),
            Arc::clone(&deps.reporter),
            deps.timings.clone(),
        );
        Self {
            state,
            terminator,
            registry: deps.registry.clone(),
            files: Arc::clone(&deps.files),
            probe: deps.probe,
            timings: deps.timings.clone(),
            reporter: Arc::clone(&deps.reporter),
            on_disk,
            tracked: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> &Arc<LifecycleState> {
        &self.state
    }

    pub(crate) fn module(&self) -> &str {
        &self.on_disk.module
    }

    pub(crate) fn timings(&self) -> &SupervisionTimings {
        &self.timings
    }

    pub(crate) fn reporter(&self) -> &Arc<dyn LifecycleReporter> {
        &self.reporter
    }

    /// The handle this unit launched or adopted, if any.
    pub(crate) fn tracked(&self) -> Option<Arc<ExecutionHandle>> {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn track(&self, handle: Option<Arc<ExecutionHandle>>) {
        *self.tracked.lock().unwrap_or_else(PoisonError::into_inner) = handle;
    }

    /// Best-effort PID: the daemon's PID file, else the tracked child.
    pub(crate) fn pid(&self) -> Option<u32> {
        read_pid(&*self.files, &self.on_disk.pid_file)
            .or_else(|| self.tracked().and_then(|handle| handle.pid()))
    }

    /// Adopts a live unit with this daemon's name, including one left
    /// behind by an earlier supervisor.
    pub(crate) fn adopt_orphan(&self) -> bool {
        let daemon = self.state.daemon();
        let Some(orphan) = self.registry.find_by_name(daemon) else {
            return false;
        };
        info!(target: UNIT_TARGET, daemon, pid = ?orphan.pid(), "adopting running execution unit");
        self.track(Some(orphan));
        self.state.set_phase(Phase::Running);
        true
    }

    /// Frees `port` from a foreign occupant, returning the port to use.
    ///
    /// With `remap`, a port that stays busy is swapped for a free neighbour.
    pub(crate) fn preempt_port(&self, port: u16, remap: bool) -> Result<u16, SupervisionError> {
        if !self.probe.is_busy(port) {
            return Ok(port);
        }
        let daemon = self.state.daemon();
        warn!(target: UNIT_TARGET, daemon, port, "port busy; terminating occupant");
        self.state.set_phase(Phase::Restarting);
        let live = self.tracked().filter(|handle| handle.is_alive());
        self.stop_with(live);
        thread::sleep(self.timings.port_release_settle);
        if !self.probe.is_busy(port) {
            self.state.set_phase(Phase::Starting);
            return Ok(port);
        }
        if remap {
            let alternative = first_free(port, |candidate| self.probe.is_busy(candidate));
            if alternative != port {
                info!(target: UNIT_TARGET, daemon, port, alternative, "remapped busy port");
                self.state.set_phase(Phase::Starting);
                return Ok(alternative);
            }
        }
        Err(SupervisionError::PortUnavailable { port })
    }

    /// Stops the daemon with the tracked handle as liveness ground truth.
    pub(crate) fn terminate(&self) -> TerminationOutcome {
        self.stop_with(self.tracked())
    }

    fn stop_with(&self, handle: Option<Arc<ExecutionHandle>>) -> TerminationOutcome {
        let outcome = self
            .terminator
            .stop(&self.on_disk.module, self.pid(), handle.as_ref());
        if outcome != TerminationOutcome::Survived {
            self.track(None);
        }
        outcome
    }

    /// Truncates the log and spawns `routine` as the tracked unit.
    pub(crate) fn launch<F>(&self, routine: F) -> Result<Arc<ExecutionHandle>, SupervisionError>
    where
        F: FnOnce(&ChildSlot) + Send + 'static,
    {
        let daemon = self.state.daemon();
        if let Some(log_file) = &self.on_disk.log_file {
            if let Err(error) = self.files.truncate(log_file) {
                warn!(target: UNIT_TARGET, daemon, error = %error, "could not truncate daemon log");
            }
        }
        match ExecutionHandle::spawn(daemon, routine) {
            Ok(handle) => {
                self.registry.register(&handle);
                self.track(Some(Arc::clone(&handle)));
                Ok(handle)
            }
            Err(error) => {
                warn!(target: UNIT_TARGET, daemon, error = %error, "could not spawn execution unit");
                self.state.set_phase(Phase::Stopped);
                Err(SupervisionError::LaunchFailure {
                    command: self.on_disk.module.clone(),
                    outcome: ExitOutcome::ShellExecFailed,
                })
            }
        }
    }

    /// Waits the settle delay, then records whether `handle` survived.
    pub(crate) fn settle(&self, handle: &Arc<ExecutionHandle>) -> bool {
        thread::sleep(self.timings.start_settle);
        self.verdict(Some(handle))
    }

    /// Sets RUNNING when `handle` is alive, STOPPED otherwise.
    ///
    /// Taken under the terminator's lock so a concurrent termination's final
    /// phase is never overwritten.
    pub(crate) fn verdict(&self, handle: Option<&Arc<ExecutionHandle>>) -> bool {
        let _serial = self.terminator.serialize();
        let alive = handle.is_some_and(|handle| handle.is_alive());
        let daemon = self.state.daemon();
        debug!(target: UNIT_TARGET, daemon, alive, "settle verdict");
        self.state.set_phase(if alive { Phase::Running } else { Phase::Stopped });
        alive
    }
}

impl std::fmt::Debug for DaemonUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonUnit")
            .field("state", &self.state)
            .field("on_disk", &self.on_disk)
            .finish_non_exhaustive()
    }
}
