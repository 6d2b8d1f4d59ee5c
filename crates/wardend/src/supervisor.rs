//! Lifecycle state machine for the primary daemon.
//!
//! Every public operation dispatches onto the supervisor's [`TaskPool`] and
//! returns at once. `start`, `restart` and `reload` share one
//! [`ExclusiveGate`]: a call that cannot take it is dropped, so at most one
//! lifecycle-mutating sequence runs at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;

use tracing::{debug, error, info};
use warden_config::{Config, DaemonPaths};

use crate::collaborators::Collaborators;
use crate::connectivity::ConnectivityChecker;
use crate::errors::SupervisionError;
use crate::launcher::Launcher;
use crate::network::NetworkReachability;
use crate::process::{ExclusiveGate, TaskPool};
use crate::reconnect::ReconnectionPolicy;
use crate::reloader::Reloader;
use crate::state::{LifecycleState, Phase, StateSnapshot};
use crate::unit::{DaemonUnit, UnitFiles};

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Logical name of the primary daemon.
pub const PRIMARY: &str = "primary";

/// Resolved settings for the primary daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryDaemon {
    /// Executable and file locations.
    pub paths: DaemonPaths,
    /// Port the daemon listens on.
    pub socks_port: u16,
    /// Whether a port that stays busy is swapped for a free neighbour.
    pub remap_busy_ports: bool,
    /// Hosts passed through `-fake-hosts`.
    pub fake_sni_hosts: Vec<String>,
}

impl PrimaryDaemon {
    /// Resolves the primary daemon from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: DaemonPaths::from_config(config),
            socks_port: config.socks_port(),
            remap_busy_ports: config.remap_busy_ports(),
            fake_sni_hosts: config.fake_sni_hosts().to_vec(),
        }
    }
}

struct Inner {
    unit: DaemonUnit,
    launcher: Arc<Launcher>,
    reloader: Arc<Reloader>,
    policy: Arc<dyn ReconnectionPolicy>,
    checker: Arc<dyn ConnectivityChecker>,
    network: Arc<dyn NetworkReachability>,
    gate: ExclusiveGate,
    tasks: TaskPool,
    socks_port: Arc<AtomicU16>,
    remap_busy_ports: bool,
}

/// Supervises the primary daemon.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Supervisor driving `state` for the daemon described by `daemon`.
    pub fn new(
        state: Arc<LifecycleState>,
        deps: &Collaborators,
        daemon: PrimaryDaemon,
        policy: Arc<dyn ReconnectionPolicy>,
        checker: Arc<dyn ConnectivityChecker>,
    ) -> Self {
        let PrimaryDaemon {
            paths,
            socks_port,
            remap_busy_ports,
            fake_sni_hosts,
        } = daemon;
        let unit = DaemonUnit::new(
            Arc::clone(&state),
            deps,
            UnitFiles {
                module: paths.binary.to_string(),
                pid_file: paths.pid_file.clone(),
                log_file: Some(paths.log_file.clone()),
            },
        );
        let reloader = Arc::new(Reloader::new(
            Arc::clone(&deps.runner),
            Arc::clone(&deps.actions),
        ));
        let launcher = Arc::new(Launcher::new(
            state,
            deps,
            Arc::clone(&reloader),
            paths,
            fake_sni_hosts,
        ));
        Self {
            inner: Arc::new(Inner {
                unit,
                launcher,
                reloader,
                policy,
                checker,
                network: Arc::clone(&deps.network),
                gate: ExclusiveGate::default(),
                tasks: TaskPool::new(PRIMARY),
                socks_port: Arc::new(AtomicU16::new(socks_port)),
                remap_busy_ports,
            }),
        }
    }

    /// Shared lifecycle register.
    #[must_use]
    pub fn state(&self) -> &Arc<LifecycleState> {
        self.inner.unit.state()
    }

    /// Phase, readiness, and connectivity at this instant.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state().snapshot()
    }

    /// Port the daemon was last launched on.
    #[must_use]
    pub fn socks_port(&self) -> u16 {
        self.inner.socks_port.load(Ordering::SeqCst)
    }

    pub(crate) fn socks_port_cell(&self) -> Arc<AtomicU16> {
        Arc::clone(&self.inner.socks_port)
    }

    /// Starts the daemon unless a lifecycle sequence is already running.
    ///
    /// Returns whether a start sequence was dispatched.
    pub fn start(&self) -> bool {
        let Some(guard) = self.inner.gate.try_acquire() else {
            debug!(target: SUPERVISOR_TARGET, "start skipped; lifecycle busy");
            return false;
        };
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.submit("start", move || {
            let _guard = guard;
            inner.run_start();
        })
    }

    /// Stops the daemon in the background.
    pub fn stop(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.submit("stop", move || {
            inner.policy.cancel();
            inner.unit.terminate();
        })
    }

    /// Fully restarts a running daemon.
    ///
    /// A no-op unless the phase is RUNNING and the lifecycle is idle.
    pub fn restart(&self) -> bool {
        if self.state().phase() != Phase::Running {
            return false;
        }
        let Some(guard) = self.inner.gate.try_acquire() else {
            debug!(target: SUPERVISOR_TARGET, "restart skipped; lifecycle busy");
            return false;
        };
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.submit("restart", move || {
            let _guard = guard;
            inner.run_restart();
        })
    }

    /// Asks a running daemon to reload its configuration in place.
    ///
    /// A no-op unless the phase is RUNNING and the lifecycle is idle.
    pub fn reload(&self) -> bool {
        if self.state().phase() != Phase::Running {
            return false;
        }
        let Some(guard) = self.inner.gate.try_acquire() else {
            debug!(target: SUPERVISOR_TARGET, "reload skipped; lifecycle busy");
            return false;
        };
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.submit("reload", move || {
            let _guard = guard;
            inner
                .reloader
                .reload(inner.unit.module(), inner.unit.pid());
            inner.request_connectivity_check();
        })
    }

    /// Feeds a connectivity verdict into the recovery policy.
    pub fn on_connection_checked(&self, available: bool) {
        self.inner.on_connection_checked(available);
    }

    /// Re-checks connectivity through the daemon in the background.
    pub fn check_connectivity(&self) -> bool {
        Inner::check_connectivity(&self.inner)
    }

    /// Blocks until every dispatched lifecycle task has finished.
    ///
    /// Must not be called from a lifecycle task.
    pub fn wait_idle(&self) {
        self.inner.tasks.drain();
    }
}

impl Inner {
    fn run_start(&self) {
        if let Err(error) = self.start_sequence() {
            error!(
                target: SUPERVISOR_TARGET,
                daemon = PRIMARY,
                error = %error,
                "start sequence failed"
            );
            self.unit.reporter().start_failed(PRIMARY, &error);
        }
    }

    fn start_sequence(&self) -> Result<(), SupervisionError> {
        let state = self.unit.state();
        if state.phase() == Phase::Stopped {
            state.set_phase(Phase::Starting);
        }
        if state.phase() != Phase::Restarting && self.unit.adopt_orphan() {
            return Ok(());
        }
        let requested = self.socks_port.load(Ordering::SeqCst);
        let port = self
            .unit
            .preempt_port(requested, self.remap_busy_ports)
            .inspect_err(|_| {
                self.unit.verdict(None);
            })?;
        self.socks_port.store(port, Ordering::SeqCst);
        let remapped = (port != requested).then_some(port);

        let launcher = Arc::clone(&self.launcher);
        let handle = self.unit.launch(move |slot| {
            launcher.run(slot, remapped);
        })?;
        info!(target: SUPERVISOR_TARGET, daemon = PRIMARY, port, "daemon launched");
        if self.unit.settle(&handle) {
            self.request_connectivity_check();
        }
        Ok(())
    }

    fn run_restart(&self) {
        let state = self.unit.state();
        state.set_phase(Phase::Restarting);
        self.policy.cancel();
        let outcome = self.unit.terminate();
        info!(target: SUPERVISOR_TARGET, daemon = PRIMARY, %outcome, "restart: old daemon stopped");
        thread::sleep(self.unit.timings().restart_settle);
        if state.phase() != Phase::Running {
            self.run_start();
        }
        self.request_connectivity_check();
    }

    fn on_connection_checked(&self, available: bool) {
        let state = self.unit.state();
        if state.phase() != Phase::Running {
            return;
        }
        if available {
            self.policy.cancel();
            state.set_connection_available(true);
        } else {
            if self.network.is_network_available() {
                self.policy.arm();
            }
            state.set_connection_available(false);
        }
    }

    /// Probes synchronously; used from inside lifecycle tasks.
    fn request_connectivity_check(&self) {
        let port = self.socks_port.load(Ordering::SeqCst);
        let available = self.checker.check(port);
        debug!(target: SUPERVISOR_TARGET, port, available, "connectivity re-checked");
        self.on_connection_checked(available);
    }

    fn check_connectivity(inner: &Arc<Self>) -> bool {
        let task = Arc::clone(inner);
        inner
            .tasks
            .submit("connectivity", move || task.request_connectivity_check())
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("unit", &self.inner.unit)
            .field("socks_port", &self.socks_port())
            .finish_non_exhaustive()
    }
}
