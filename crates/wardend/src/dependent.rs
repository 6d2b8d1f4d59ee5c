//! Lifecycle state machine for the reverse proxy that depends on the
//! primary daemon.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;

use tracing::{debug, error, info, warn};
use warden_config::{Config, ProxyPaths};

use crate::collaborators::Collaborators;
use crate::errors::SupervisionError;
use crate::launcher::ProxyLauncher;
use crate::process::{ExclusiveGate, TaskPool};
use crate::state::{LifecycleState, Phase, StateSnapshot};
use crate::supervisor::{PRIMARY, Supervisor};
use crate::unit::{DaemonUnit, UnitFiles};

const DEPENDENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dependent");

/// Logical name of the dependent daemon.
pub const REVERSE_PROXY: &str = "reverse-proxy";

/// Resolved settings for the dependent daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentDaemon {
    /// Executable and file locations.
    pub paths: ProxyPaths,
    /// Port the proxy listens on.
    pub proxy_port: u16,
}

impl DependentDaemon {
    /// Resolves the dependent daemon from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: ProxyPaths::from_config(config),
            proxy_port: config.proxy_port(),
        }
    }
}

struct Inner {
    unit: DaemonUnit,
    primary: Arc<LifecycleState>,
    socks_port: Arc<AtomicU16>,
    launcher: Arc<ProxyLauncher>,
    gate: ExclusiveGate,
    tasks: TaskPool,
    proxy_port: u16,
}

/// Supervises the dependent daemon.
///
/// Starting blocks until the primary is RUNNING; there is no readiness or
/// connectivity tracking.
#[derive(Clone)]
pub struct DependentSupervisor {
    inner: Arc<Inner>,
}

impl DependentSupervisor {
    /// Supervisor for the proxy in front of `primary`'s daemon.
    pub fn new(
        state: Arc<LifecycleState>,
        primary: &Supervisor,
        deps: &Collaborators,
        daemon: DependentDaemon,
    ) -> Self {
        let DependentDaemon { paths, proxy_port } = daemon;
        let unit = DaemonUnit::new(
            Arc::clone(&state),
            deps,
            UnitFiles {
                module: paths.binary.to_string(),
                pid_file: paths.pid_file.clone(),
                log_file: None,
            },
        );
        let launcher = Arc::new(ProxyLauncher::new(
            state,
            Arc::clone(primary.state()),
            deps,
            paths,
            proxy_port,
        ));
        Self {
            inner: Arc::new(Inner {
                unit,
                primary: Arc::clone(primary.state()),
                socks_port: primary.socks_port_cell(),
                launcher,
                gate: ExclusiveGate::default(),
                tasks: TaskPool::new(REVERSE_PROXY),
                proxy_port,
            }),
        }
    }

    /// Shared lifecycle register.
    #[must_use]
    pub fn state(&self) -> &Arc<LifecycleState> {
        self.inner.unit.state()
    }

    /// Phase at this instant.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state().snapshot()
    }

    /// Starts the proxy once the primary runs, unless a start is in flight.
    pub fn start(&self) -> bool {
        let Some(guard) = self.inner.gate.try_acquire() else {
            debug!(target: DEPENDENT_TARGET, "start skipped; lifecycle busy");
            return false;
        };
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.submit("start", move || {
            let _guard = guard;
            inner.run_start();
        })
    }

    /// Stops the proxy in the background.
    pub fn stop(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.submit("stop", move || {
            inner.unit.terminate();
        })
    }

    /// Blocks until every dispatched lifecycle task has finished.
    pub fn wait_idle(&self) {
        self.inner.tasks.drain();
    }
}

impl Inner {
    fn run_start(&self) {
        if let Err(error) = self.start_sequence() {
            error!(
                target: DEPENDENT_TARGET,
                daemon = REVERSE_PROXY,
                error = %error,
                "start sequence failed"
            );
            self.unit.reporter().start_failed(REVERSE_PROXY, &error);
        }
    }

    fn start_sequence(&self) -> Result<(), SupervisionError> {
        let state = self.unit.state();
        if state.phase() == Phase::Stopped {
            state.set_phase(Phase::Starting);
        }
        if !self.wait_for_primary() {
            state.set_phase(Phase::Stopped);
            return Err(SupervisionError::DependencyNotRunning {
                daemon: REVERSE_PROXY.to_owned(),
                dependency: PRIMARY.to_owned(),
            });
        }
        if self.unit.adopt_orphan() {
            return Ok(());
        }
        self.unit
            .preempt_port(self.proxy_port, false)
            .inspect_err(|_| {
                self.unit.verdict(None);
            })?;

        let socks_port = self.socks_port.load(Ordering::SeqCst);
        let launcher = Arc::clone(&self.launcher);
        let handle = self.unit.launch(move |slot| {
            launcher.run(slot, socks_port);
        })?;
        info!(target: DEPENDENT_TARGET, daemon = REVERSE_PROXY, socks_port, "proxy launched");
        self.unit.settle(&handle);
        Ok(())
    }

    /// Polls the primary's phase at the configured interval.
    fn wait_for_primary(&self) -> bool {
        let timings = self.unit.timings();
        for check in 0..timings.dependency_checks {
            if self.primary.phase() == Phase::Running {
                return true;
            }
            debug!(target: DEPENDENT_TARGET, check, "waiting for primary daemon");
            thread::sleep(timings.dependency_poll);
        }
        let running = self.primary.phase() == Phase::Running;
        if !running {
            warn!(target: DEPENDENT_TARGET, "primary daemon never reached RUNNING");
        }
        running
    }
}

impl std::fmt::Debug for DependentSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependentSupervisor")
            .field("unit", &self.inner.unit)
            .field("proxy_port", &self.inner.proxy_port)
            .finish_non_exhaustive()
    }
}
