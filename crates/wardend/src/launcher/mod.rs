//! Runs a supervised daemon to completion and reacts to how it ended.
//!
//! The calling thread is the daemon's execution unit: [`Launcher::run`]
//! blocks for the daemon's whole lifetime. Output is observed line by line
//! so readiness is known long before the process exits.

mod command;
mod patch;
mod proxy;

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use warden_config::DaemonPaths;

use crate::collaborators::Collaborators;
use crate::errors::SupervisionError;
use crate::files::FileAccess;
use crate::health::LifecycleReporter;
use crate::host::HostActivity;
use crate::installer::Installer;
use crate::process::{ChildSlot, CommandResult, ExitOutcome, ProcessRunner, RunRequest};
use crate::reloader::Reloader;
use crate::state::{LifecycleState, Phase};

pub use proxy::ProxyLauncher;

pub(crate) const LAUNCHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launcher");

/// Line suffix the daemon prints once it has fully bootstrapped.
pub const READY_MARKER: &str = "Bootstrapped 100% (done): Done";

/// Launches the primary daemon.
pub struct Launcher {
    state: Arc<LifecycleState>,
    runner: Arc<dyn ProcessRunner>,
    files: Arc<dyn FileAccess>,
    installer: Arc<dyn Installer>,
    host: Arc<dyn HostActivity>,
    reporter: Arc<dyn LifecycleReporter>,
    reloader: Arc<Reloader>,
    paths: DaemonPaths,
    fake_sni_hosts: Vec<String>,
}

impl Launcher {
    /// Launcher for the daemon described by `paths`.
    pub fn new(
        state: Arc<LifecycleState>,
        deps: &Collaborators,
        reloader: Arc<Reloader>,
        paths: DaemonPaths,
        fake_sni_hosts: Vec<String>,
    ) -> Self {
        Self {
            state,
            runner: Arc::clone(&deps.runner),
            files: Arc::clone(&deps.files),
            installer: Arc::clone(&deps.installer),
            host: Arc::clone(&deps.host),
            reporter: Arc::clone(&deps.reporter),
            reloader,
            paths,
            fake_sni_hosts,
        }
    }

    /// Resolved daemon locations.
    #[must_use]
    pub fn paths(&self) -> &DaemonPaths {
        &self.paths
    }

    /// Patches the configuration, runs the daemon until it exits, and
    /// applies the exit policy.
    ///
    /// `remapped_port` is set only when the configured socks port was busy
    /// and a free neighbour was chosen instead.
    pub fn run(&self, slot: &ChildSlot, remapped_port: Option<u16>) -> ExitOutcome {
        self.state.set_ready(false);
        let webtunnel = match patch::prepare_config(&*self.files, &self.paths, remapped_port) {
            Ok(facts) => facts.webtunnel,
            Err(error) => {
                warn!(
                    target: LAUNCHER_TARGET,
                    error = %error,
                    "could not patch daemon configuration; launching as is"
                );
                false
            }
        };
        let script = command::daemon_command(&self.paths, &self.fake_sni_hosts, webtunnel);
        let state = &self.state;
        let listener = |line: &str| {
            debug!(target: LAUNCHER_TARGET, daemon = state.daemon(), line, "daemon output");
            if line.ends_with(READY_MARKER) {
                info!(target: LAUNCHER_TARGET, daemon = state.daemon(), "daemon bootstrapped");
                state.set_ready(true);
            }
        };
        info!(target: LAUNCHER_TARGET, daemon = state.daemon(), %script, "launching daemon");
        let result = self.runner.run(
            RunRequest::new(script)
                .with_env("LD_LIBRARY_PATH", self.paths.library_dir.as_str())
                .with_listener(&listener)
                .with_slot(slot),
        );
        self.handle_result(&result);
        result.outcome
    }

    fn handle_result(&self, result: &CommandResult) {
        let daemon = self.state.daemon();
        let phase = self.state.phase();
        if result.is_success() {
            info!(target: LAUNCHER_TARGET, daemon, %phase, "daemon exited cleanly");
            if phase == Phase::Running {
                self.state.set_phase(Phase::Stopped);
            }
            self.state.set_ready(false);
            return;
        }

        log_failure(daemon, self.paths.binary.as_str(), result);
        if phase == Phase::Restarting {
            self.state.set_ready(false);
            return;
        }
        if !matches!(phase, Phase::Stopping | Phase::Stopped) {
            let reset = self.installer.reset_configuration();
            info!(target: LAUNCHER_TARGET, daemon, reset, "crash recovery reset");
        }
        let was_ready = self.state.is_ready();
        if !self.host.is_foreground() && phase == Phase::Running && was_ready {
            self.reloader.request_restart();
        } else {
            self.state.set_phase(Phase::Stopped);
            self.reporter.daemon_stopped(daemon, result.outcome);
        }
        self.state.set_ready(false);
    }
}

pub(crate) fn log_failure(daemon: &str, command: &str, result: &CommandResult) {
    for line in &result.stderr {
        error!(target: LAUNCHER_TARGET, daemon, line = line.as_str(), "daemon stderr");
    }
    if let Some(error) = SupervisionError::from_outcome(daemon, command, result.outcome) {
        error!(target: LAUNCHER_TARGET, daemon, error = %error, "daemon run failed");
    }
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
